//! REST backend adapter.
//!
//! `ureq` is blocking, so every request runs on tokio's blocking pool.

use std::sync::Arc;
use std::time::Duration;

use collabflow_proto::task::{WireNewTask, WireTaskUpdate};
use serde_json::{Value, json};

use super::{PersistError, PersistenceAdapter};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Talks to the board REST API with a bearer token.
#[derive(Clone)]
pub struct HttpAdapter {
    agent: ureq::Agent,
    base: Arc<str>,
    token: Arc<str>,
}

impl std::fmt::Debug for HttpAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAdapter")
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}

impl HttpAdapter {
    /// Creates an adapter for the API rooted at `base_url`
    /// (for example `https://boards.example.com`).
    pub fn new(base_url: &str, token: &str) -> Self {
        Self::with_timeout(base_url, token, DEFAULT_TIMEOUT)
    }

    /// Like [`HttpAdapter::new`] with an explicit request timeout.
    pub fn with_timeout(base_url: &str, token: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            agent,
            base: Arc::from(base_url.trim_end_matches('/')),
            token: Arc::from(token),
        }
    }

    /// API root without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base
    }

    async fn send(&self, method: &'static str, path: String, body: Option<Value>) -> Result<Value, PersistError> {
        let agent = self.agent.clone();
        let url = format!("{}{path}", self.base);
        let bearer = format!("Bearer {}", self.token);
        tracing::debug!(method, url = %url, "API request");

        tokio::task::spawn_blocking(move || {
            let request = agent
                .request(method, &url)
                .set("Authorization", &bearer)
                .set("Accept", "application/json");
            let result = match body {
                Some(body) => request.send_json(body),
                None => request.call(),
            };
            match result {
                Ok(response) => read_json(response),
                Err(ureq::Error::Status(status, response)) => {
                    let body = response.into_string().unwrap_or_default();
                    tracing::warn!(method, url = %url, status, "API request rejected");
                    Err(PersistError::Status { status, body })
                }
                Err(ureq::Error::Transport(e)) => {
                    tracing::warn!(method, url = %url, err = %e, "API request failed");
                    Err(PersistError::Transport(e.to_string()))
                }
            }
        })
        .await
        .map_err(|e| PersistError::Worker(e.to_string()))?
    }
}

fn read_json(response: ureq::Response) -> Result<Value, PersistError> {
    let text = response.into_string()?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text)?)
}

impl PersistenceAdapter for HttpAdapter {
    async fn list(&self, project_id: &str) -> Result<Value, PersistError> {
        self.send("GET", format!("/api/tasks/project/{project_id}"), None)
            .await
    }

    async fn create(&self, task: &WireNewTask) -> Result<Value, PersistError> {
        let body = serde_json::to_value(task)?;
        self.send("POST", "/api/tasks".into(), Some(body)).await
    }

    async fn update(&self, task_id: &str, fields: &WireTaskUpdate) -> Result<Value, PersistError> {
        let body = serde_json::to_value(fields)?;
        self.send("PUT", format!("/api/tasks/{task_id}"), Some(body))
            .await
    }

    async fn move_task(&self, task_id: &str, status: &str) -> Result<Value, PersistError> {
        self.send(
            "PATCH",
            format!("/api/tasks/{task_id}/move"),
            Some(json!({ "status": status })),
        )
        .await
    }

    async fn delete(&self, task_id: &str) -> Result<(), PersistError> {
        match self.send("DELETE", format!("/api/tasks/{task_id}"), None).await {
            Ok(_) => Ok(()),
            Err(PersistError::Status { status: 404, .. }) => {
                tracing::debug!(task_id, "task already gone on server");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
