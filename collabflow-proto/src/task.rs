//! Wire-shaped task records.
//!
//! These mirror what the backend sends and accepts: wire vocabulary for
//! `status` and `priority`, optional fields omitted rather than sent empty,
//! and the historical quirks (`_id` instead of `id`, assignee given either as
//! a plain name or as a populated user object) captured as explicit serde
//! shapes instead of runtime guessing.

use serde::{Deserialize, Serialize};

/// Assignee as sent by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireAssignee {
    /// Plain display name.
    Name(String),
    /// Populated user document.
    User {
        /// User's display name.
        name: String,
        /// User id, when the backend includes it.
        #[serde(default, alias = "_id", skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
}

impl WireAssignee {
    /// The assignee's display name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) | Self::User { name, .. } => name,
        }
    }
}

/// A task in wire form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireTask {
    /// Task identifier.
    #[serde(alias = "_id")]
    pub id: String,
    /// Task title.
    pub title: String,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Wire priority token (`low`, `medium`, `high`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    /// Assignee, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<WireAssignee>,
    /// Due date, usually an ISO-8601 date or timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    /// Wire status token (`todo`, `in_progress`, `done`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Owning project, when the backend echoes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

/// A new task as submitted to the backend (no id yet).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireNewTask {
    /// Owning project.
    pub project_id: String,
    /// Task title.
    pub title: String,
    /// Free-form description; omitted when empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Wire priority token.
    pub priority: String,
    /// Assignee name; omitted when empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    /// Due date; omitted when empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    /// Wire status token.
    pub status: String,
}

/// A partial task update in wire form. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WireTaskUpdate {
    /// New title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// New wire priority token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    /// New assignee.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<WireAssignee>,
    /// New due date.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    /// New wire status token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl WireTaskUpdate {
    /// Whether the update carries no fields at all.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.assignee.is_none()
            && self.due_date.is_none()
            && self.status.is_none()
    }
}
