//! Durable storage behind the board.
//!
//! Adapters speak the backend's JSON: bodies come back as
//! [`serde_json::Value`] and are validated by [`crate::schema`] before
//! anything reaches the store. Two adapters ship:
//!
//! - [`local::LocalStore`]: one JSON file per project, used when no
//!   backend is configured
//! - [`http::HttpAdapter`]: the REST API

pub mod http;
pub mod local;

pub use http::HttpAdapter;
pub use local::LocalStore;

use collabflow_proto::task::{WireNewTask, WireTaskUpdate};
use serde_json::Value;

use crate::board::Board;
use crate::schema::ValidationError;

/// Errors from a persistence adapter.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// The backend answered with an error status.
    #[error("HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },

    /// The request never got an answer.
    #[error("request failed: {0}")]
    Transport(String),

    /// Local file I/O failed.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A body could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A body had an unexpected shape.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The adapter has no such task.
    #[error("task not found: {0}")]
    NotFound(String),

    /// The blocking worker running the request panicked or was cancelled.
    #[error("storage worker failed: {0}")]
    Worker(String),
}

/// Storage operations used by a board session.
///
/// Task ids, statuses and priorities are in wire vocabulary.
pub trait PersistenceAdapter: Send + Sync {
    /// Lists a project's tasks (flat or board-shaped).
    fn list(
        &self,
        project_id: &str,
    ) -> impl std::future::Future<Output = Result<Value, PersistError>> + Send;

    /// Creates a task; the response carries the stored record.
    fn create(
        &self,
        task: &WireNewTask,
    ) -> impl std::future::Future<Output = Result<Value, PersistError>> + Send;

    /// Changes some fields of a task.
    fn update(
        &self,
        task_id: &str,
        fields: &WireTaskUpdate,
    ) -> impl std::future::Future<Output = Result<Value, PersistError>> + Send;

    /// Moves a task to the column for `status`.
    fn move_task(
        &self,
        task_id: &str,
        status: &str,
    ) -> impl std::future::Future<Output = Result<Value, PersistError>> + Send;

    /// Deletes a task.
    fn delete(
        &self,
        task_id: &str,
    ) -> impl std::future::Future<Output = Result<(), PersistError>> + Send;

    /// Whether the store itself tells the room about created, updated and
    /// deleted tasks. When it does not, the session announces them.
    fn broadcasts_changes(&self) -> bool {
        true
    }

    /// Stores a whole board. Only whole-board stores need this.
    fn snapshot(
        &self,
        _project_id: &str,
        _board: &Board,
    ) -> impl std::future::Future<Output = Result<(), PersistError>> + Send {
        async { Ok(()) }
    }
}
