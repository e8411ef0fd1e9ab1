//! Reconciliation of local intents and remote events into one board.
//!
//! Local intents are applied to the store immediately (optimistic) and
//! then handed to the persistence and channel layers by the session.
//! Remote events are merged independently and idempotently: anything that
//! cannot be matched to the current board is absorbed as a
//! [`ConflictOutcome`], never raised as an error.

pub mod engine;
pub mod intent;

pub use engine::Reconciler;
pub use intent::{Intent, MoveIntent, TaskDraft};

use crate::board::{InvariantViolation, Task, TaskPatch};
use crate::channel::TransportError;
use crate::persist::PersistError;
use crate::schema::ValidationError;

/// Errors surfaced by local board operations.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The intent was malformed; the board was not touched.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The mutation would break a board invariant; the board was not touched.
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
    /// The realtime channel failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The persistence adapter failed; the optimistic change was kept.
    #[error(transparent)]
    Persistence(#[from] PersistError),
}

/// Why a remote event was not considered at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Scoped to a room other than the one this board belongs to.
    ForeignRoom,
    /// Broadcast echo of this participant's own change.
    SelfEcho,
    /// Presence or activity event; not a board change.
    NotATaskEvent,
}

/// A remote event that could not be matched to the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictOutcome {
    /// The event names a task this board does not have.
    UnknownTask(String),
    /// The event's status resolves to no column.
    UnknownColumn(String),
    /// The store refused the change.
    Rejected(InvariantViolation),
}

/// A detected disagreement that was corrected instead of applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inconsistency {
    /// An update carried a status that does not match the task's column.
    /// The status was dropped; moves go through the move path only.
    StatusWithoutMove {
        /// Task the update targeted.
        task_id: String,
        /// The status that was dropped.
        status: String,
    },
}

/// Result of merging one remote event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The board changed.
    Applied,
    /// The event was already reflected in the board.
    Unchanged,
    /// The event was not for this board.
    Skipped(SkipReason),
    /// The event could not be matched; nothing changed.
    Conflict(ConflictOutcome),
    /// The event was applied with a correction.
    Flagged(Inconsistency),
}

impl ApplyOutcome {
    /// Whether the board may have changed.
    #[must_use]
    pub const fn changed_board(&self) -> bool {
        matches!(self, Self::Applied | Self::Flagged(_))
    }
}

/// What a local update did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    /// Whether any field changed.
    pub changed: bool,
    /// Set when a mismatched status was stripped from the patch.
    pub flagged: Option<Inconsistency>,
}

/// What a local move did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveReport {
    /// Whether the task changed column.
    pub cross_column: bool,
    /// Whether the board changed at all.
    pub changed: bool,
    /// The task's display status after the move.
    pub status: String,
}

/// How a provisional task was settled once the server stored it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    /// The task now carries the server's id.
    Confirmed {
        /// The task as it stands on the board.
        task: Task,
        /// Fields edited locally while the create was in flight.
        edits: TaskPatch,
        /// Display status, if the task changed column in the meantime.
        moved_to: Option<String>,
    },
    /// The task was deleted locally before the server answered.
    Discarded,
}
