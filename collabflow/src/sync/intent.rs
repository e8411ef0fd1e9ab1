//! Local mutation intents.

use crate::board::TaskPatch;

/// Fields for a new task. Missing title and priority take the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDraft {
    /// Preassigned id; a provisional `local-<uuid>` id is used when `None`.
    pub id: Option<String>,
    /// Card title.
    pub title: Option<String>,
    /// Description.
    pub description: Option<String>,
    /// Display priority.
    pub priority: Option<String>,
    /// Assignee display name.
    pub assignee: Option<String>,
    /// Due date (ISO-8601).
    pub due_date: Option<String>,
}

impl TaskDraft {
    /// A draft with only a title.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }
}

/// A drag from one position to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveIntent {
    /// Task being moved.
    pub task_id: String,
    /// Column the caller saw the task in.
    pub from_column: String,
    /// Destination column.
    pub to_column: String,
    /// Index the caller saw the task at; ignored if stale.
    pub from_index: Option<usize>,
    /// Destination index; clamped, `None` appends.
    pub to_index: Option<usize>,
}

/// A local mutation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Add a task to a column.
    Create {
        /// Destination column.
        column_id: String,
        /// Task fields.
        draft: TaskDraft,
    },
    /// Change some task fields.
    Update {
        /// Target task.
        task_id: String,
        /// Fields to change.
        patch: TaskPatch,
    },
    /// Reposition a task.
    Move(MoveIntent),
    /// Remove a task.
    Delete {
        /// Target task.
        task_id: String,
    },
}
