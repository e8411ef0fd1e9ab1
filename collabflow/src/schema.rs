//! Boundary conversions between backend JSON and display-form records.
//!
//! Persistence responses arrive as loosely shaped JSON. Everything is
//! checked here, once, and turned into either a typed record or a
//! [`ValidationError`]; nothing past this module inspects raw JSON.

use std::collections::HashMap;

use collabflow_proto::task::{WireAssignee, WireNewTask, WireTask, WireTaskUpdate};
use collabflow_proto::vocab;
use serde::Deserialize;
use serde_json::Value;

use crate::board::model::{DEFAULT_PRIORITY, DEFAULT_STATUS, DEFAULT_TITLE};
use crate::board::{Board, Column, InvariantViolation, Task, TaskPatch};

/// A malformed intent or response, rejected before it reaches the store.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A create intent named no column.
    #[error("missing column id")]
    MissingColumn,
    /// An intent named a column the board does not have.
    #[error("unknown column: {0}")]
    UnknownColumn(String),
    /// An intent named no task.
    #[error("missing task id")]
    MissingTaskId,
    /// Connecting requires a non-empty bearer credential.
    #[error("empty credential")]
    EmptyCredential,
    /// The backend answered `{"success": false}`.
    #[error("request unsuccessful: {0}")]
    Unsuccessful(String),
    /// The body does not have any accepted shape.
    #[error("unexpected response shape: {0}")]
    Shape(String),
    /// A task record could not be read.
    #[error("invalid task record: {0}")]
    Task(String),
    /// A board-shaped listing breaks a board invariant.
    #[error("inconsistent board: {0}")]
    Board(#[from] InvariantViolation),
}

/// Strips a `{"success": ..., "data": ...}` envelope if present.
///
/// # Errors
///
/// [`ValidationError::Unsuccessful`] for `success: false`,
/// [`ValidationError::Shape`] for an envelope without `data`.
pub fn unwrap_envelope(body: Value) -> Result<Value, ValidationError> {
    let Value::Object(mut map) = body else {
        return Ok(body);
    };
    let Some(success) = map.get("success").and_then(Value::as_bool) else {
        return Ok(Value::Object(map));
    };
    if !success {
        let reason = map
            .get("message")
            .or_else(|| map.get("error"))
            .and_then(Value::as_str)
            .unwrap_or("no reason given")
            .to_string();
        return Err(ValidationError::Unsuccessful(reason));
    }
    map.remove("data")
        .ok_or_else(|| ValidationError::Shape("envelope without data".into()))
}

/// Board-shaped listing: column titles and task fields in wire
/// vocabulary, records keyed by id.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireBoard {
    tasks: HashMap<String, WireBoardTask>,
    columns: HashMap<String, WireColumn>,
    #[serde(default)]
    column_order: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireColumn {
    title: String,
    #[serde(default)]
    task_ids: Vec<String>,
}

/// Task record inside a board-shaped listing. The id is the map key.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WireBoardTask {
    title: Option<String>,
    description: Option<String>,
    priority: Option<String>,
    assignee: Option<WireAssignee>,
    due_date: Option<String>,
    status: Option<String>,
}

impl WireBoardTask {
    /// Display-form task listed in a column titled `column_title`.
    fn into_task(self, id: &str, column_title: &str) -> Task {
        if let Some(status) = &self.status
            && vocab::status_to_display(status) != column_title
        {
            tracing::debug!(task_id = id, %status, column = column_title, "listed status disagrees with column, using column");
        }
        let mut task = task_from_wire(&WireTask {
            id: id.to_string(),
            title: self.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            description: self.description,
            priority: self.priority,
            assignee: self.assignee,
            due_date: self.due_date,
            status: None,
            project_id: None,
        });
        task.status = column_title.to_string();
        task
    }
}

/// Reads a task listing into a consistent board.
///
/// Accepts a board-shaped object (`tasks` map, `columns`, optional
/// `columnOrder`), a flat array of wire tasks, or `{"tasks": [...]}`, each
/// optionally wrapped in an envelope. Board-shaped listings are translated
/// to display vocabulary; a task takes the title of the column listing it
/// as its status. Flat listings are laid out into the default columns by
/// status; unknown statuses get a new column, appended in the order they
/// are first seen.
///
/// # Errors
///
/// [`ValidationError`] when the body matches none of the shapes, a task is
/// unreadable, or a board-shaped listing is inconsistent.
pub fn board_from_listing(body: Value) -> Result<Board, ValidationError> {
    let body = unwrap_envelope(body)?;
    match body {
        Value::Array(items) => layout_flat(items),
        Value::Object(mut map) => {
            if map.get("columns").is_some_and(Value::is_object) {
                let wire: WireBoard = serde_json::from_value(Value::Object(map))
                    .map_err(|e| ValidationError::Shape(e.to_string()))?;
                return layout_board(wire);
            }
            match map.remove("tasks") {
                Some(Value::Array(items)) => layout_flat(items),
                Some(other) => Err(ValidationError::Shape(format!(
                    "`tasks` is {}, expected an array",
                    kind_of(&other)
                ))),
                None => Err(ValidationError::Shape("object without tasks".into())),
            }
        }
        other => Err(ValidationError::Shape(format!(
            "listing is {}",
            kind_of(&other)
        ))),
    }
}

/// Reads a single task from a create/update response.
///
/// # Errors
///
/// [`ValidationError`] if the body is not a task record.
pub fn task_from_response(body: Value) -> Result<Task, ValidationError> {
    let body = unwrap_envelope(body)?;
    let wire: WireTask =
        serde_json::from_value(body).map_err(|e| ValidationError::Task(e.to_string()))?;
    Ok(task_from_wire(&wire))
}

/// Display-form task from a wire record. Missing status and priority take
/// the creation defaults.
#[must_use]
pub fn task_from_wire(wire: &WireTask) -> Task {
    Task {
        id: wire.id.clone(),
        title: wire.title.clone(),
        description: wire.description.clone().unwrap_or_default(),
        priority: wire
            .priority
            .as_deref()
            .map_or_else(|| DEFAULT_PRIORITY.to_string(), vocab::priority_to_display),
        assignee: wire.assignee.as_ref().map(|a| a.name().to_string()),
        due_date: wire.due_date.clone(),
        status: wire
            .status
            .as_deref()
            .map_or_else(|| DEFAULT_STATUS.to_string(), vocab::status_to_display),
    }
}

/// Wire record of a display-form task.
#[must_use]
pub fn task_to_wire(project_id: &str, task: &Task) -> WireTask {
    WireTask {
        id: task.id.clone(),
        title: task.title.clone(),
        description: non_empty(&task.description),
        priority: Some(vocab::priority_to_wire(&task.priority)),
        assignee: task.assignee.clone().map(WireAssignee::Name),
        due_date: task.due_date.clone(),
        status: Some(vocab::status_to_wire(&task.status)),
        project_id: Some(project_id.to_string()),
    }
}

/// Wire body for creating `task` in `project_id`.
#[must_use]
pub fn task_to_new_wire(project_id: &str, task: &Task) -> WireNewTask {
    WireNewTask {
        project_id: project_id.to_string(),
        title: task.title.clone(),
        description: non_empty(&task.description),
        priority: vocab::priority_to_wire(&task.priority),
        assignee: task.assignee.as_deref().and_then(non_empty),
        due_date: task.due_date.as_deref().and_then(non_empty),
        status: vocab::status_to_wire(&task.status),
    }
}

/// Display-form patch from a wire update.
#[must_use]
pub fn patch_from_wire(update: &WireTaskUpdate) -> TaskPatch {
    TaskPatch {
        title: update.title.clone(),
        description: update.description.clone(),
        priority: update.priority.as_deref().map(vocab::priority_to_display),
        assignee: update.assignee.as_ref().map(|a| a.name().to_string()),
        due_date: update.due_date.clone(),
        status: update.status.as_deref().map(vocab::status_to_display),
    }
}

/// Wire update from a display-form patch.
#[must_use]
pub fn patch_to_wire(patch: &TaskPatch) -> WireTaskUpdate {
    WireTaskUpdate {
        title: patch.title.clone(),
        description: patch.description.clone(),
        priority: patch.priority.as_deref().map(vocab::priority_to_wire),
        assignee: patch.assignee.clone().map(WireAssignee::Name),
        due_date: patch.due_date.clone(),
        status: patch.status.as_deref().map(vocab::status_to_wire),
    }
}

fn layout_board(wire: WireBoard) -> Result<Board, ValidationError> {
    let mut column_order = wire.column_order;
    if column_order.is_empty() {
        column_order = wire.columns.keys().cloned().collect();
        column_order.sort();
    }
    let mut board = Board {
        tasks: HashMap::new(),
        columns: HashMap::new(),
        column_order,
    };
    let mut records = wire.tasks;
    for (column_id, column) in wire.columns {
        let title = vocab::status_to_display(&column.title);
        for task_id in &column.task_ids {
            if board.tasks.contains_key(task_id) {
                return Err(InvariantViolation::ListedTwice(task_id.clone()).into());
            }
            let Some(record) = records.remove(task_id) else {
                return Err(InvariantViolation::DanglingTaskId {
                    column: column_id,
                    task_id: task_id.clone(),
                }
                .into());
            };
            board
                .tasks
                .insert(task_id.clone(), record.into_task(task_id, &title));
        }
        board.columns.insert(
            column_id.clone(),
            Column {
                id: column_id,
                title,
                task_ids: column.task_ids,
            },
        );
    }
    if let Some(orphan) = records.into_keys().next() {
        return Err(InvariantViolation::Orphaned(orphan).into());
    }
    board.check_invariants()?;
    Ok(board)
}

fn layout_flat(items: Vec<Value>) -> Result<Board, ValidationError> {
    let mut board = Board::default_layout();
    for item in items {
        let wire: WireTask =
            serde_json::from_value(item).map_err(|e| ValidationError::Task(e.to_string()))?;
        let task = task_from_wire(&wire);
        if board.tasks.contains_key(&task.id) {
            tracing::warn!(task_id = %task.id, "duplicate task in listing, keeping first");
            continue;
        }
        let column_id = match board.column_for_status(&task.status) {
            Some(column) => column.id.clone(),
            None => board.append_column(&task.status),
        };
        if let Some(column) = board.columns.get_mut(&column_id) {
            column.task_ids.push(task.id.clone());
        }
        board.tasks.insert(task.id.clone(), task);
    }
    Ok(board)
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

const fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
