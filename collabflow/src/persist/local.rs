//! File-backed fallback store.
//!
//! Each project lives in `<data_dir>/tasks_<project>.json` as a
//! display-form board. Missing files start from the default layout. Every
//! mutation rewrites the project's file. Writes take turns, and each one
//! writes the board as it is when its turn comes, so the file never ends
//! up older than memory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use collabflow_proto::task::{WireNewTask, WireTaskUpdate};
use collabflow_proto::vocab;
use parking_lot::Mutex;
use serde_json::{Value, json};

use super::{PersistError, PersistenceAdapter};
use crate::board::{Board, BoardStore, Task};
use crate::schema;

/// Prefix of ids assigned by the local store.
pub const LOCAL_ID_PREFIX: &str = "task-";

/// Boards kept on disk under a data directory.
#[derive(Debug)]
pub struct LocalStore {
    dir: PathBuf,
    loaded: Mutex<HashMap<String, BoardStore>>,
    writing: tokio::sync::Mutex<()>,
}

impl LocalStore {
    /// Creates a store rooted at `dir`. Nothing is read until first use.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            loaded: Mutex::new(HashMap::new()),
            writing: tokio::sync::Mutex::new(()),
        }
    }

    /// Directory holding the project files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding `project_id`'s board.
    #[must_use]
    pub fn path_for(&self, project_id: &str) -> PathBuf {
        self.dir.join(format!("tasks_{project_id}.json"))
    }

    async fn load(&self, project_id: &str) -> Result<Board, PersistError> {
        if let Some(store) = self.loaded.lock().get(project_id) {
            return Ok((*store.board()).clone());
        }
        let path = self.path_for(project_id);
        let (board, seeded) = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => (schema::board_from_listing(serde_json::from_str(&contents)?)?, false),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(project = project_id, "no stored board, seeding default layout");
                (Board::default_layout(), true)
            }
            Err(e) => return Err(e.into()),
        };
        let mut store = BoardStore::new();
        store.replace_board(board).map_err(schema::ValidationError::from)?;
        let board = self
            .loaded
            .lock()
            .entry(project_id.to_string())
            .or_insert(store)
            .board();
        if seeded {
            self.flush(project_id).await?;
        }
        Ok((*board).clone())
    }

    /// Writes the project's current board once every earlier write is done.
    async fn flush(&self, project_id: &str) -> Result<(), PersistError> {
        let _turn = self.writing.lock().await;
        let board = self.loaded.lock().get(project_id).map(BoardStore::board);
        let Some(board) = board else {
            return Ok(());
        };
        tokio::fs::create_dir_all(&self.dir).await?;
        let contents = serde_json::to_string_pretty(&*board)?;
        tokio::fs::write(self.path_for(project_id), contents).await?;
        Ok(())
    }

    /// Runs `mutate` against the project holding `task_id` and persists
    /// the result. Returns the project id and the task afterwards.
    async fn mutate_task<F>(&self, task_id: &str, mutate: F) -> Result<(String, Option<Task>), PersistError>
    where
        F: FnOnce(&mut BoardStore) -> Result<(), PersistError>,
    {
        let (project_id, board) = {
            let mut loaded = self.loaded.lock();
            let Some((project_id, store)) = loaded
                .iter_mut()
                .find(|(_, store)| store.board().task(task_id).is_some())
            else {
                return Err(PersistError::NotFound(task_id.to_string()));
            };
            mutate(store)?;
            (project_id.clone(), store.board())
        };
        self.flush(&project_id).await?;
        Ok((project_id, board.task(task_id).cloned()))
    }
}

impl PersistenceAdapter for LocalStore {
    async fn list(&self, project_id: &str) -> Result<Value, PersistError> {
        let board = self.load(project_id).await?;
        Ok(json!({ "success": true, "data": board }))
    }

    async fn create(&self, task: &WireNewTask) -> Result<Value, PersistError> {
        self.load(&task.project_id).await?;
        let record = Task {
            id: format!("{LOCAL_ID_PREFIX}{}", uuid::Uuid::now_v7()),
            title: task.title.clone(),
            description: task.description.clone().unwrap_or_default(),
            priority: vocab::priority_to_display(&task.priority),
            assignee: task.assignee.clone(),
            due_date: task.due_date.clone(),
            status: vocab::status_to_display(&task.status),
        };
        let board = {
            let mut loaded = self.loaded.lock();
            let store = loaded.entry(task.project_id.clone()).or_default();
            let column = store.ensure_column(&record.status);
            store
                .insert_task(&column, record.clone(), None)
                .map_err(schema::ValidationError::from)?;
            store.board()
        };
        self.flush(&task.project_id).await?;
        let stored = board.task(&record.id).unwrap_or(&record);
        Ok(json!({ "success": true, "data": schema::task_to_wire(&task.project_id, stored) }))
    }

    async fn update(&self, task_id: &str, fields: &WireTaskUpdate) -> Result<Value, PersistError> {
        let patch = schema::patch_from_wire(fields);
        let (project_id, task) = self
            .mutate_task(task_id, |store| {
                let mut patch = patch;
                if let Some(status) = patch.status.take() {
                    relocate_to_status(store, task_id, &status)?;
                }
                store
                    .patch_task(task_id, &patch)
                    .map_err(schema::ValidationError::from)?;
                Ok(())
            })
            .await?;
        let task = task.ok_or_else(|| PersistError::NotFound(task_id.to_string()))?;
        Ok(json!({ "success": true, "data": schema::task_to_wire(&project_id, &task) }))
    }

    async fn move_task(&self, task_id: &str, status: &str) -> Result<Value, PersistError> {
        let display = vocab::status_to_display(status);
        let (project_id, task) = self
            .mutate_task(task_id, |store| relocate_to_status(store, task_id, &display))
            .await?;
        let task = task.ok_or_else(|| PersistError::NotFound(task_id.to_string()))?;
        Ok(json!({ "success": true, "data": schema::task_to_wire(&project_id, &task) }))
    }

    async fn delete(&self, task_id: &str) -> Result<(), PersistError> {
        match self
            .mutate_task(task_id, |store| {
                store.remove_task(task_id);
                Ok(())
            })
            .await
        {
            Ok(_) | Err(PersistError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn broadcasts_changes(&self) -> bool {
        false
    }

    async fn snapshot(&self, project_id: &str, board: &Board) -> Result<(), PersistError> {
        let mut store = BoardStore::new();
        store
            .replace_board(board.clone())
            .map_err(schema::ValidationError::from)?;
        self.loaded.lock().insert(project_id.to_string(), store);
        self.flush(project_id).await
    }
}

/// Moves a task to the column titled `status`, adding the column if the
/// board has none.
fn relocate_to_status(store: &mut BoardStore, task_id: &str, status: &str) -> Result<(), PersistError> {
    let column = store.ensure_column(status);
    if store.board().column_of(task_id).is_some_and(|c| c.id == column) {
        return Ok(());
    }
    store
        .relocate_task(task_id, &column, None, None)
        .map_err(schema::ValidationError::from)?;
    Ok(())
}
