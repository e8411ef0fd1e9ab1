//! Copy-on-write owner of the live [`Board`].
//!
//! Readers take an `Arc<Board>` snapshot with [`BoardStore::board`] and keep
//! it for as long as they like; mutators clone the board only when a
//! snapshot is still shared. Every mutator validates before it touches the
//! board, so a rejected mutation leaves the state exactly as it was.

use std::sync::Arc;

use super::InvariantViolation;
use super::model::{Board, Task, TaskPatch};

/// Owner of one room's board.
#[derive(Debug, Clone)]
pub struct BoardStore {
    board: Arc<Board>,
}

impl Default for BoardStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BoardStore {
    /// Creates a store holding the default three-column layout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            board: Arc::new(Board::default_layout()),
        }
    }

    /// Current board snapshot.
    #[must_use]
    pub fn board(&self) -> Arc<Board> {
        Arc::clone(&self.board)
    }

    /// Replaces the whole board after checking every invariant.
    ///
    /// # Errors
    ///
    /// Returns the first [`InvariantViolation`] of `board`; the current
    /// board is kept.
    pub fn replace_board(&mut self, board: Board) -> Result<(), InvariantViolation> {
        board.check_invariants()?;
        self.board = Arc::new(board);
        Ok(())
    }

    /// Inserts a new task into `column_id` at `index` (clamped; `None`
    /// appends). The task's status is set to the column title.
    ///
    /// # Errors
    ///
    /// [`InvariantViolation::UnknownColumn`] or
    /// [`InvariantViolation::DuplicateTask`].
    pub fn insert_task(
        &mut self,
        column_id: &str,
        mut task: Task,
        index: Option<usize>,
    ) -> Result<(), InvariantViolation> {
        let Some(column) = self.board.columns.get(column_id) else {
            return Err(InvariantViolation::UnknownColumn(column_id.to_string()));
        };
        if self.board.tasks.contains_key(&task.id) {
            return Err(InvariantViolation::DuplicateTask(task.id));
        }
        task.status.clone_from(&column.title);

        let board = Arc::make_mut(&mut self.board);
        let Some(column) = board.columns.get_mut(column_id) else {
            return Err(InvariantViolation::UnknownColumn(column_id.to_string()));
        };
        let at = index.map_or(column.task_ids.len(), |i| i.min(column.task_ids.len()));
        column.task_ids.insert(at, task.id.clone());
        board.tasks.insert(task.id.clone(), task);
        Ok(())
    }

    /// Shallow-merges `patch` into a task. Returns whether anything changed.
    ///
    /// A `status` in the patch is accepted only when it equals the title of
    /// the column listing the task; changing columns is [`relocate_task`]'s
    /// job.
    ///
    /// # Errors
    ///
    /// [`InvariantViolation::UnknownTask`] or
    /// [`InvariantViolation::StatusMismatch`].
    ///
    /// [`relocate_task`]: Self::relocate_task
    pub fn patch_task(&mut self, task_id: &str, patch: &TaskPatch) -> Result<bool, InvariantViolation> {
        let Some(task) = self.board.tasks.get(task_id) else {
            return Err(InvariantViolation::UnknownTask(task_id.to_string()));
        };
        if let Some(status) = &patch.status
            && *status != task.status
        {
            return Err(InvariantViolation::StatusMismatch {
                task_id: task_id.to_string(),
                status: status.clone(),
                column: task.status.clone(),
            });
        }
        let mut updated = task.clone();
        if !patch.merge_into(&mut updated) {
            return Ok(false);
        }
        Arc::make_mut(&mut self.board)
            .tasks
            .insert(task_id.to_string(), updated);
        Ok(true)
    }

    /// Removes a task and strips its id from every column.
    ///
    /// Returns the removed record, or `None` if there was none.
    pub fn remove_task(&mut self, task_id: &str) -> Option<Task> {
        let listed = self
            .board
            .columns
            .values()
            .any(|c| c.position(task_id).is_some());
        if !listed && !self.board.tasks.contains_key(task_id) {
            return None;
        }
        let board = Arc::make_mut(&mut self.board);
        for column in board.columns.values_mut() {
            column.task_ids.retain(|id| id != task_id);
        }
        board.tasks.remove(task_id)
    }

    /// Moves a task to `to_column` at `to_index` (clamped; `None` appends).
    ///
    /// The source column is wherever the task is actually listed.
    /// `from_index` is used only if it still names the task there;
    /// otherwise the task is located by value. A cross-column move sets the
    /// task's status to the destination title. Returns whether the board
    /// changed.
    ///
    /// # Errors
    ///
    /// [`InvariantViolation::UnknownTask`] or
    /// [`InvariantViolation::UnknownColumn`].
    pub fn relocate_task(
        &mut self,
        task_id: &str,
        to_column: &str,
        from_index: Option<usize>,
        to_index: Option<usize>,
    ) -> Result<bool, InvariantViolation> {
        if !self.board.tasks.contains_key(task_id) {
            return Err(InvariantViolation::UnknownTask(task_id.to_string()));
        }
        let Some(dest) = self.board.columns.get(to_column) else {
            return Err(InvariantViolation::UnknownColumn(to_column.to_string()));
        };
        let Some(source) = self.board.column_of(task_id) else {
            return Err(InvariantViolation::Orphaned(task_id.to_string()));
        };
        let source_id = source.id.clone();
        let from = from_index
            .filter(|&i| source.task_ids.get(i).is_some_and(|id| id == task_id))
            .or_else(|| source.position(task_id))
            .ok_or_else(|| InvariantViolation::Orphaned(task_id.to_string()))?;
        let dest_title = dest.title.clone();

        let board = Arc::make_mut(&mut self.board);
        if source_id == to_column {
            let Some(column) = board.columns.get_mut(to_column) else {
                return Err(InvariantViolation::UnknownColumn(to_column.to_string()));
            };
            let moved = column.task_ids.remove(from);
            let at = to_index.map_or(column.task_ids.len(), |i| i.min(column.task_ids.len()));
            column.task_ids.insert(at, moved);
            return Ok(at != from);
        }

        if let Some(column) = board.columns.get_mut(&source_id) {
            column.task_ids.remove(from);
        }
        let Some(column) = board.columns.get_mut(to_column) else {
            return Err(InvariantViolation::UnknownColumn(to_column.to_string()));
        };
        let at = to_index.map_or(column.task_ids.len(), |i| i.min(column.task_ids.len()));
        column.task_ids.insert(at, task_id.to_string());
        if let Some(task) = board.tasks.get_mut(task_id) {
            task.status = dest_title;
        }
        Ok(true)
    }

    /// Renames a task id in place, keeping its position.
    ///
    /// # Errors
    ///
    /// [`InvariantViolation::UnknownTask`] if `old_id` is absent,
    /// [`InvariantViolation::DuplicateTask`] if `new_id` is taken.
    pub fn rekey_task(&mut self, old_id: &str, new_id: &str) -> Result<(), InvariantViolation> {
        if old_id == new_id {
            return Ok(());
        }
        if !self.board.tasks.contains_key(old_id) {
            return Err(InvariantViolation::UnknownTask(old_id.to_string()));
        }
        if self.board.tasks.contains_key(new_id) {
            return Err(InvariantViolation::DuplicateTask(new_id.to_string()));
        }
        let board = Arc::make_mut(&mut self.board);
        if let Some(mut task) = board.tasks.remove(old_id) {
            task.id = new_id.to_string();
            board.tasks.insert(new_id.to_string(), task);
        }
        for column in board.columns.values_mut() {
            for id in &mut column.task_ids {
                if id == old_id {
                    *id = new_id.to_string();
                }
            }
        }
        Ok(())
    }

    /// Id of the column titled `title`, appending one if the board has
    /// none.
    pub fn ensure_column(&mut self, title: &str) -> String {
        if let Some(column) = self.board.column_for_status(title) {
            return column.id.clone();
        }
        Arc::make_mut(&mut self.board).append_column(title)
    }

    /// Reorders the columns.
    ///
    /// # Errors
    ///
    /// [`InvariantViolation::ColumnOrder`] unless `order` is a permutation
    /// of the current column ids.
    pub fn set_column_order(&mut self, order: Vec<String>) -> Result<(), InvariantViolation> {
        let mut sorted = order.clone();
        sorted.sort();
        sorted.dedup();
        if sorted.len() != order.len()
            || order.len() != self.board.columns.len()
            || !order.iter().all(|id| self.board.columns.contains_key(id))
        {
            return Err(InvariantViolation::ColumnOrder);
        }
        Arc::make_mut(&mut self.board).column_order = order;
        Ok(())
    }
}
