//! Board state for one room view.
//!
//! A [`Board`] is an ordered set of columns, each holding an ordered list of
//! task ids, plus the task records themselves. [`BoardStore`] owns the live
//! board and only admits mutations that keep it consistent:
//!
//! - every id listed in a column exists in the task map,
//! - every task is listed in exactly one column, once,
//! - a task's `status` equals the title of the column that lists it,
//! - column titles are unique and `column_order` is a permutation of the
//!   column keys.

pub mod model;
pub mod store;

pub use model::{Board, Column, Task, TaskPatch};
pub use store::BoardStore;

use thiserror::Error;

/// A mutation that would leave the board inconsistent.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvariantViolation {
    /// No task with this id exists.
    #[error("unknown task: {0}")]
    UnknownTask(String),
    /// No column with this id exists.
    #[error("unknown column: {0}")]
    UnknownColumn(String),
    /// A task with this id already exists.
    #[error("task already exists: {0}")]
    DuplicateTask(String),
    /// A column lists a task id that has no record.
    #[error("column {column} lists missing task {task_id}")]
    DanglingTaskId {
        /// Offending column.
        column: String,
        /// Id without a record.
        task_id: String,
    },
    /// A task id is listed more than once across the board.
    #[error("task {0} is listed more than once")]
    ListedTwice(String),
    /// A task record is not listed in any column.
    #[error("task {0} is not listed in any column")]
    Orphaned(String),
    /// A task's status disagrees with the column that lists it.
    #[error("task {task_id} has status {status:?} but sits in column {column:?}")]
    StatusMismatch {
        /// Offending task.
        task_id: String,
        /// Status on the record.
        status: String,
        /// Title of the column that lists it.
        column: String,
    },
    /// Two columns share a title.
    #[error("duplicate column title: {0}")]
    DuplicateColumnTitle(String),
    /// A column record is keyed under a different id than it carries.
    #[error("column keyed as {key} carries id {id}")]
    ColumnKeyMismatch {
        /// Map key.
        key: String,
        /// Id inside the record.
        id: String,
    },
    /// `column_order` is not a permutation of the column keys.
    #[error("column order does not match the column set")]
    ColumnOrder,
}
