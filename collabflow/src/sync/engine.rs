//! The reconciliation engine for one room's board.

use std::sync::Arc;

use collabflow_proto::event::ServerEvent;
use collabflow_proto::vocab;

use super::intent::{Intent, MoveIntent, TaskDraft};
use super::{
    ApplyOutcome, Confirmation, ConflictOutcome, Inconsistency, MoveReport, SkipReason, SyncError,
    UpdateReport,
};
use crate::board::model::{DEFAULT_PRIORITY, DEFAULT_TITLE};
use crate::board::{Board, BoardStore, InvariantViolation, Task, TaskPatch};
use crate::schema::{self, ValidationError};

/// Prefix of ids handed out before the server assigns one.
pub const PROVISIONAL_PREFIX: &str = "local-";

/// Result of a local intent applied through [`Reconciler::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalEffect {
    /// The created task, with its provisional or preassigned id.
    Created(Task),
    /// Outcome of an update.
    Updated(UpdateReport),
    /// Outcome of a move.
    Moved(MoveReport),
    /// The removed task, if it existed.
    Deleted(Option<Task>),
}

/// Applies local intents and remote events to a [`BoardStore`].
#[derive(Debug)]
pub struct Reconciler {
    store: BoardStore,
    room_id: String,
    local_user: Option<String>,
}

impl Reconciler {
    /// Creates an engine for `room_id` holding the default layout.
    ///
    /// `local_user` is this participant's id; remote events carrying it as
    /// their actor are treated as echoes.
    pub fn new(room_id: impl Into<String>, local_user: Option<String>) -> Self {
        Self {
            store: BoardStore::new(),
            room_id: room_id.into(),
            local_user,
        }
    }

    /// Room this board belongs to.
    #[must_use]
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Current board snapshot.
    #[must_use]
    pub fn board(&self) -> Arc<Board> {
        self.store.board()
    }

    /// Replaces the board with a hydrated one.
    ///
    /// # Errors
    ///
    /// [`SyncError::Invariant`] if `board` is inconsistent.
    pub fn hydrate(&mut self, board: Board) -> Result<(), SyncError> {
        self.store.replace_board(board)?;
        tracing::info!(
            room = %self.room_id,
            tasks = self.store.board().tasks.len(),
            "board hydrated"
        );
        Ok(())
    }

    /// Applies any local intent.
    ///
    /// # Errors
    ///
    /// As for the individual operation.
    pub fn apply(&mut self, intent: Intent) -> Result<LocalEffect, SyncError> {
        match intent {
            Intent::Create { column_id, draft } => {
                self.create(&column_id, draft).map(LocalEffect::Created)
            }
            Intent::Update { task_id, patch } => {
                self.update(&task_id, patch).map(LocalEffect::Updated)
            }
            Intent::Move(mv) => self.move_task(&mv).map(LocalEffect::Moved),
            Intent::Delete { task_id } => Ok(LocalEffect::Deleted(self.delete(&task_id))),
        }
    }

    /// Appends a new task to `column_id`.
    ///
    /// Without a draft id the task gets a provisional `local-<uuid>` id,
    /// to be swapped for the server's by [`confirm_created`].
    ///
    /// # Errors
    ///
    /// [`ValidationError::MissingColumn`] or
    /// [`ValidationError::UnknownColumn`]; [`SyncError::Invariant`] if the
    /// draft id is already taken.
    ///
    /// [`confirm_created`]: Self::confirm_created
    pub fn create(&mut self, column_id: &str, draft: TaskDraft) -> Result<Task, SyncError> {
        if column_id.is_empty() {
            return Err(ValidationError::MissingColumn.into());
        }
        if self.store.board().column(column_id).is_none() {
            return Err(ValidationError::UnknownColumn(column_id.to_string()).into());
        }
        let id = draft
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("{PROVISIONAL_PREFIX}{}", uuid::Uuid::now_v7()));
        let task = Task {
            id: id.clone(),
            title: draft.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            description: draft.description.unwrap_or_default(),
            priority: draft.priority.unwrap_or_else(|| DEFAULT_PRIORITY.to_string()),
            assignee: draft.assignee.filter(|a| !a.is_empty()),
            due_date: draft.due_date.filter(|d| !d.is_empty()),
            status: String::new(),
        };
        self.store.insert_task(column_id, task, None)?;
        tracing::debug!(room = %self.room_id, task_id = %id, column = column_id, "task created locally");
        self.store
            .board()
            .task(&id)
            .cloned()
            .ok_or_else(|| InvariantViolation::UnknownTask(id).into())
    }

    /// Swaps the provisional copy of `sent` for the server's record.
    ///
    /// Edits and moves made to the provisional task while the create was
    /// in flight are kept on top of the server's fields and reported, so
    /// they can be stored too. A copy of the server task that arrived
    /// through a broadcast first is folded into the provisional one. A
    /// provisional task deleted in the meantime stays deleted.
    ///
    /// # Errors
    ///
    /// [`SyncError::Invariant`] if the store refuses the re-key.
    pub fn confirm_created(&mut self, sent: &Task, server: &Task) -> Result<Confirmation, SyncError> {
        let board = self.store.board();
        let Some(current) = board.task(&sent.id).cloned() else {
            if sent.id != server.id {
                self.store.remove_task(&server.id);
            }
            tracing::debug!(
                provisional = %sent.id,
                task_id = %server.id,
                "provisional task deleted before confirmation"
            );
            return Ok(Confirmation::Discarded);
        };
        if sent.id != server.id && board.task(&server.id).is_some() {
            self.store.remove_task(&server.id);
            tracing::debug!(
                provisional = %sent.id,
                task_id = %server.id,
                "server task already present, folded into provisional copy"
            );
        }
        let edits = TaskPatch::between(sent, &current);
        let moved_to = (current.status != sent.status).then(|| current.status.clone());
        let fields = fields_of(server);
        let merged = TaskPatch {
            title: edits.title.clone().or(fields.title),
            description: edits.description.clone().or(fields.description),
            priority: edits.priority.clone().or(fields.priority),
            assignee: edits.assignee.clone().or(fields.assignee),
            due_date: edits.due_date.clone().or(fields.due_date),
            status: None,
        };
        self.store.rekey_task(&sent.id, &server.id)?;
        self.store.patch_task(&server.id, &merged)?;
        let task = self
            .store
            .board()
            .task(&server.id)
            .cloned()
            .ok_or_else(|| InvariantViolation::UnknownTask(server.id.clone()))?;
        Ok(Confirmation::Confirmed { task, edits, moved_to })
    }

    /// Shallow-merges `patch` into a task.
    ///
    /// A status that differs from the task's column is dropped and reported
    /// as [`Inconsistency::StatusWithoutMove`]; use a move to change
    /// columns.
    ///
    /// # Errors
    ///
    /// [`ValidationError::MissingTaskId`], or [`SyncError::Invariant`] for
    /// an unknown task.
    pub fn update(&mut self, task_id: &str, patch: TaskPatch) -> Result<UpdateReport, SyncError> {
        if task_id.is_empty() {
            return Err(ValidationError::MissingTaskId.into());
        }
        let (patch, flagged) = self.strip_status(task_id, patch)?;
        let changed = self.store.patch_task(task_id, &patch)?;
        Ok(UpdateReport { changed, flagged })
    }

    /// Moves a task within or across columns.
    ///
    /// # Errors
    ///
    /// [`ValidationError`] for a missing id or unknown destination,
    /// [`SyncError::Invariant`] for an unknown task.
    pub fn move_task(&mut self, mv: &MoveIntent) -> Result<MoveReport, SyncError> {
        if mv.task_id.is_empty() {
            return Err(ValidationError::MissingTaskId.into());
        }
        if mv.to_column.is_empty() {
            return Err(ValidationError::MissingColumn.into());
        }
        let board = self.store.board();
        if board.column(&mv.to_column).is_none() {
            return Err(ValidationError::UnknownColumn(mv.to_column.clone()).into());
        }
        let source = board
            .column_of(&mv.task_id)
            .map(|c| c.id.clone())
            .ok_or_else(|| InvariantViolation::UnknownTask(mv.task_id.clone()))?;
        let from_index = if source == mv.from_column {
            mv.from_index
        } else {
            tracing::debug!(
                task_id = %mv.task_id,
                claimed = %mv.from_column,
                actual = %source,
                "stale source column, locating task by value"
            );
            None
        };

        let changed =
            self.store
                .relocate_task(&mv.task_id, &mv.to_column, from_index, mv.to_index)?;
        let status = self
            .store
            .board()
            .task(&mv.task_id)
            .map(|t| t.status.clone())
            .unwrap_or_default();
        Ok(MoveReport {
            cross_column: source != mv.to_column,
            changed,
            status,
        })
    }

    /// Removes a task. Deleting an absent task is a no-op.
    pub fn delete(&mut self, task_id: &str) -> Option<Task> {
        self.store.remove_task(task_id)
    }

    /// Merges one remote event into the board.
    pub fn apply_remote(&mut self, event: &ServerEvent) -> ApplyOutcome {
        let Some(room) = event.room_id() else {
            return ApplyOutcome::Skipped(SkipReason::NotATaskEvent);
        };
        if room != self.room_id {
            return ApplyOutcome::Skipped(SkipReason::ForeignRoom);
        }
        if let (Some(actor), Some(me)) = (event.actor_id(), self.local_user.as_deref())
            && actor == me
        {
            return ApplyOutcome::Skipped(SkipReason::SelfEcho);
        }

        let outcome = match event {
            ServerEvent::TaskCreated(e) => self.remote_created(schema::task_from_wire(&e.task)),
            ServerEvent::TaskUpdated(e) => {
                self.remote_updated(&e.task_id, schema::patch_from_wire(&e.updates))
            }
            ServerEvent::TaskMoved(e) => {
                self.remote_moved(&e.task_id, &vocab::status_to_display(&e.new_status))
            }
            ServerEvent::TaskDeleted(e) => match self.store.remove_task(&e.task_id) {
                Some(_) => ApplyOutcome::Applied,
                None => ApplyOutcome::Conflict(ConflictOutcome::UnknownTask(e.task_id.clone())),
            },
            _ => ApplyOutcome::Skipped(SkipReason::NotATaskEvent),
        };

        match &outcome {
            ApplyOutcome::Conflict(ConflictOutcome::Rejected(violation)) => {
                tracing::warn!(event = %event.kind(), %violation, "remote event rejected");
            }
            ApplyOutcome::Conflict(conflict) => {
                tracing::debug!(event = %event.kind(), ?conflict, "remote event absorbed");
            }
            ApplyOutcome::Flagged(inconsistency) => {
                tracing::warn!(event = %event.kind(), ?inconsistency, "remote event corrected");
            }
            _ => {}
        }
        outcome
    }

    fn remote_created(&mut self, task: Task) -> ApplyOutcome {
        if self.store.board().task(&task.id).is_some() {
            return self.merge_existing(&task);
        }
        let column = self.store.ensure_column(&task.status);
        match self.store.insert_task(&column, task, None) {
            Ok(()) => ApplyOutcome::Applied,
            Err(violation) => ApplyOutcome::Conflict(ConflictOutcome::Rejected(violation)),
        }
    }

    /// A second `task:created` for a known task: take its fields, and its
    /// column if that column exists.
    fn merge_existing(&mut self, task: &Task) -> ApplyOutcome {
        let mut changed = match self.store.patch_task(&task.id, &fields_of(task)) {
            Ok(changed) => changed,
            Err(violation) => return ApplyOutcome::Conflict(ConflictOutcome::Rejected(violation)),
        };
        let board = self.store.board();
        let current = board.column_of(&task.id).map(|c| c.id.clone());
        if let Some(target) = board.column_for_status(&task.status)
            && current.as_deref() != Some(target.id.as_str())
        {
            match self.store.relocate_task(&task.id, &target.id, None, None) {
                Ok(moved) => changed |= moved,
                Err(violation) => {
                    return ApplyOutcome::Conflict(ConflictOutcome::Rejected(violation));
                }
            }
        }
        if changed {
            ApplyOutcome::Applied
        } else {
            ApplyOutcome::Unchanged
        }
    }

    fn remote_updated(&mut self, task_id: &str, patch: TaskPatch) -> ApplyOutcome {
        let (patch, flagged) = match self.strip_status(task_id, patch) {
            Ok(stripped) => stripped,
            Err(_) => {
                return ApplyOutcome::Conflict(ConflictOutcome::UnknownTask(task_id.to_string()));
            }
        };
        match (self.store.patch_task(task_id, &patch), flagged) {
            (Err(violation), _) => ApplyOutcome::Conflict(ConflictOutcome::Rejected(violation)),
            (Ok(_), Some(inconsistency)) => ApplyOutcome::Flagged(inconsistency),
            (Ok(true), None) => ApplyOutcome::Applied,
            (Ok(false), None) => ApplyOutcome::Unchanged,
        }
    }

    fn remote_moved(&mut self, task_id: &str, status: &str) -> ApplyOutcome {
        let board = self.store.board();
        if board.task(task_id).is_none() {
            return ApplyOutcome::Conflict(ConflictOutcome::UnknownTask(task_id.to_string()));
        }
        let Some(dest) = board.column_for_status(status) else {
            return ApplyOutcome::Conflict(ConflictOutcome::UnknownColumn(status.to_string()));
        };
        if dest.position(task_id).is_some() {
            return ApplyOutcome::Unchanged;
        }
        match self.store.relocate_task(task_id, &dest.id, None, None) {
            Ok(_) => ApplyOutcome::Applied,
            Err(violation) => ApplyOutcome::Conflict(ConflictOutcome::Rejected(violation)),
        }
    }

    /// Drops a status that disagrees with the task's column.
    fn strip_status(
        &self,
        task_id: &str,
        mut patch: TaskPatch,
    ) -> Result<(TaskPatch, Option<Inconsistency>), InvariantViolation> {
        let board = self.store.board();
        let Some(task) = board.task(task_id) else {
            return Err(InvariantViolation::UnknownTask(task_id.to_string()));
        };
        let flagged = match patch.status.take() {
            Some(status) if status != task.status => {
                tracing::warn!(
                    task_id,
                    status = %status,
                    column = %task.status,
                    "status change without move, ignoring status"
                );
                Some(Inconsistency::StatusWithoutMove {
                    task_id: task_id.to_string(),
                    status,
                })
            }
            _ => None,
        };
        Ok((patch, flagged))
    }
}

/// Every non-status field of `task` as a patch.
fn fields_of(task: &Task) -> TaskPatch {
    TaskPatch {
        title: Some(task.title.clone()),
        description: Some(task.description.clone()),
        priority: Some(task.priority.clone()),
        assignee: Some(task.assignee.clone().unwrap_or_default()),
        due_date: Some(task.due_date.clone().unwrap_or_default()),
        status: None,
    }
}
