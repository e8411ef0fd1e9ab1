//! Display-form board records.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};

use super::InvariantViolation;

/// Status given to tasks created without one.
pub const DEFAULT_STATUS: &str = "To Do";
/// Title given to tasks created without one.
pub const DEFAULT_TITLE: &str = "New Task";
/// Priority given to tasks created without one.
pub const DEFAULT_PRIORITY: &str = "Medium";

/// A task card in display vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Task identifier.
    pub id: String,
    /// Card title.
    pub title: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Display priority (`Low`, `Medium`, `High`, ...).
    pub priority: String,
    /// Assignee display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    /// Due date as received (ISO-8601 date or timestamp).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    /// Display status; equals the title of the column listing the task.
    pub status: String,
}

impl Task {
    /// Short due-date label such as `Oct 24`.
    ///
    /// Returns `None` when there is no due date. Values that are neither an
    /// ISO date nor an RFC 3339 timestamp are returned unchanged.
    #[must_use]
    pub fn due_label(&self) -> Option<String> {
        self.due_date.as_deref().map(due_label)
    }
}

/// Formats an ISO date or RFC 3339 timestamp as `Mon D`.
#[must_use]
pub fn due_label(raw: &str) -> String {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return ts.format("%b %-d").to_string();
    }
    raw.get(..10)
        .and_then(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d").ok())
        .map_or_else(|| raw.to_string(), |d| d.format("%b %-d").to_string())
}

/// Shallow field update for a task. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskPatch {
    /// New title.
    pub title: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New display priority.
    pub priority: Option<String>,
    /// New assignee; an empty name clears it.
    pub assignee: Option<String>,
    /// New due date; an empty value clears it.
    pub due_date: Option<String>,
    /// Display status. Only accepted when it matches the task's column.
    pub status: Option<String>,
}

impl TaskPatch {
    /// Whether the patch carries no fields.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.assignee.is_none()
            && self.due_date.is_none()
            && self.status.is_none()
    }

    /// Merges the non-status fields into `task`. Returns whether anything
    /// changed.
    pub(crate) fn merge_into(&self, task: &mut Task) -> bool {
        let before = task.clone();
        if let Some(title) = &self.title {
            task.title.clone_from(title);
        }
        if let Some(description) = &self.description {
            task.description.clone_from(description);
        }
        if let Some(priority) = &self.priority {
            task.priority.clone_from(priority);
        }
        if let Some(assignee) = &self.assignee {
            task.assignee = (!assignee.is_empty()).then(|| assignee.clone());
        }
        if let Some(due) = &self.due_date {
            task.due_date = (!due.is_empty()).then(|| due.clone());
        }
        *task != before
    }

    /// The non-status fields of `after` that differ from `before`. A
    /// cleared assignee or due date comes out as an empty value.
    #[must_use]
    pub fn between(before: &Task, after: &Task) -> Self {
        let changed = |old: &String, new: &String| (old != new).then(|| new.clone());
        let cleared = |old: &Option<String>, new: &Option<String>| {
            (old != new).then(|| new.clone().unwrap_or_default())
        };
        Self {
            title: changed(&before.title, &after.title),
            description: changed(&before.description, &after.description),
            priority: changed(&before.priority, &after.priority),
            assignee: cleared(&before.assignee, &after.assignee),
            due_date: cleared(&before.due_date, &after.due_date),
            status: None,
        }
    }
}

/// A board column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    /// Column identifier.
    pub id: String,
    /// Column title; doubles as the status of every task it lists.
    pub title: String,
    /// Ordered task ids.
    #[serde(default)]
    pub task_ids: Vec<String>,
}

impl Column {
    /// Creates an empty column.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            task_ids: Vec::new(),
        }
    }

    /// Position of `task_id` in this column.
    #[must_use]
    pub fn position(&self, task_id: &str) -> Option<usize> {
        self.task_ids.iter().position(|id| id == task_id)
    }
}

/// A task board: task records, columns, and column order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    /// Task records keyed by id.
    pub tasks: HashMap<String, Task>,
    /// Columns keyed by id.
    pub columns: HashMap<String, Column>,
    /// Display order of the columns.
    pub column_order: Vec<String>,
}

impl Board {
    /// The three-column layout every new board starts from.
    #[must_use]
    pub fn default_layout() -> Self {
        let columns = [
            Column::new("col-1", "To Do"),
            Column::new("col-2", "In Progress"),
            Column::new("col-3", "Done"),
        ];
        Self {
            tasks: HashMap::new(),
            column_order: columns.iter().map(|c| c.id.clone()).collect(),
            columns: columns.into_iter().map(|c| (c.id.clone(), c)).collect(),
        }
    }

    /// Looks up a task by id.
    #[must_use]
    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.get(task_id)
    }

    /// Looks up a column by id.
    #[must_use]
    pub fn column(&self, column_id: &str) -> Option<&Column> {
        self.columns.get(column_id)
    }

    /// Columns in display order.
    pub fn ordered_columns(&self) -> impl Iterator<Item = &Column> {
        self.column_order.iter().filter_map(|id| self.columns.get(id))
    }

    /// The column whose title equals `status`.
    ///
    /// This is the only place a status is resolved to a column.
    #[must_use]
    pub fn column_for_status(&self, status: &str) -> Option<&Column> {
        self.ordered_columns().find(|c| c.title == status)
    }

    /// Appends an empty column titled `title` under the next free `col-N`
    /// id and returns that id. The caller makes sure the title is new.
    pub fn append_column(&mut self, title: &str) -> String {
        let mut n = self.columns.len() + 1;
        while self.columns.contains_key(&format!("col-{n}")) {
            n += 1;
        }
        let id = format!("col-{n}");
        self.columns.insert(id.clone(), Column::new(id.clone(), title));
        self.column_order.push(id.clone());
        id
    }

    /// The column currently listing `task_id`.
    #[must_use]
    pub fn column_of(&self, task_id: &str) -> Option<&Column> {
        self.ordered_columns().find(|c| c.position(task_id).is_some())
    }

    /// Tasks of a column in column order.
    pub fn tasks_in<'a>(&'a self, column: &'a Column) -> impl Iterator<Item = &'a Task> + 'a {
        column.task_ids.iter().filter_map(|id| self.tasks.get(id))
    }

    /// One-line `Title: count` summary in column order.
    #[must_use]
    pub fn summary(&self) -> String {
        self.ordered_columns()
            .map(|c| format!("{}: {}", c.title, c.task_ids.len()))
            .collect::<Vec<_>>()
            .join(" | ")
    }

    /// Checks every board invariant.
    ///
    /// # Errors
    ///
    /// Returns the first [`InvariantViolation`] found.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let mut titles = HashSet::new();
        for (key, column) in &self.columns {
            if *key != column.id {
                return Err(InvariantViolation::ColumnKeyMismatch {
                    key: key.clone(),
                    id: column.id.clone(),
                });
            }
            if !titles.insert(column.title.as_str()) {
                return Err(InvariantViolation::DuplicateColumnTitle(column.title.clone()));
            }
        }

        let order: HashSet<&str> = self.column_order.iter().map(String::as_str).collect();
        if order.len() != self.column_order.len()
            || order.len() != self.columns.len()
            || !self.columns.keys().all(|k| order.contains(k.as_str()))
        {
            return Err(InvariantViolation::ColumnOrder);
        }

        let mut listed = HashSet::new();
        for column in self.columns.values() {
            for task_id in &column.task_ids {
                let Some(task) = self.tasks.get(task_id) else {
                    return Err(InvariantViolation::DanglingTaskId {
                        column: column.id.clone(),
                        task_id: task_id.clone(),
                    });
                };
                if !listed.insert(task_id.as_str()) {
                    return Err(InvariantViolation::ListedTwice(task_id.clone()));
                }
                if task.status != column.title {
                    return Err(InvariantViolation::StatusMismatch {
                        task_id: task_id.clone(),
                        status: task.status.clone(),
                        column: column.title.clone(),
                    });
                }
            }
        }

        if let Some(orphan) = self.tasks.keys().find(|id| !listed.contains(id.as_str())) {
            return Err(InvariantViolation::Orphaned(orphan.clone()));
        }
        Ok(())
    }
}
