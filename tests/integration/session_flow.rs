// Integration tests use unwrap/expect freely.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_panics_doc,
    clippy::future_not_send
)]

//! End-to-end board session over the loopback channel and a file store.

use std::sync::Arc;
use std::time::Duration;

use collabflow::activity::{self, ActivityFeed};
use collabflow::board::{Board, TaskPatch};
use collabflow::channel::loopback::{LoopbackConnector, LoopbackPeer};
use collabflow::channel::{ReconnectPolicy, SyncChannel};
use collabflow::persist::{LocalStore, PersistError, PersistenceAdapter};
use collabflow::schema;
use collabflow::session::{BoardSession, Identity, SessionUpdate};
use collabflow::sync::{ApplyOutcome, Inconsistency, MoveIntent, SkipReason, SyncError, TaskDraft};
use collabflow_proto::event::{
    ActivityActor, ActivityKind, ActivityTask, ClientEvent, ServerEvent, TaskCreated, WireActivity,
};
use collabflow_proto::task::{WireNewTask, WireTask, WireTaskUpdate};
use serde_json::{Value, json};
use tokio::sync::Semaphore;

fn me() -> Identity {
    Identity {
        user_id: "me".into(),
        display_name: "Me".into(),
    }
}

async fn open<P: PersistenceAdapter>(
    adapter: P,
    capacity: usize,
) -> (BoardSession<LoopbackConnector, P>, LoopbackPeer) {
    let (connector, mut server) = LoopbackConnector::pair();
    let channel = Arc::new(SyncChannel::new(connector, ReconnectPolicy::default()));
    channel.connect("tok").await.unwrap();
    let mut peer = server.accept().await.unwrap();
    let session = BoardSession::open(channel, adapter, "p1", me(), ActivityFeed::new(capacity)).await;
    peer.recv().await.unwrap();
    (session, peer)
}

async fn next<C, P>(session: &BoardSession<C, P>) -> SessionUpdate
where
    C: collabflow::channel::Connector,
    P: PersistenceAdapter,
{
    tokio::time::timeout(Duration::from_secs(5), session.process_next())
        .await
        .unwrap()
        .unwrap()
}

fn remote_task(id: &str, status: &str, actor: &str) -> ServerEvent {
    ServerEvent::TaskCreated(TaskCreated {
        task: WireTask {
            id: id.into(),
            title: format!("Task {id}"),
            description: None,
            priority: Some("low".into()),
            assignee: None,
            due_date: None,
            status: Some(status.into()),
            project_id: Some("p1".into()),
        },
        room_id: "p1".into(),
        actor_id: Some(actor.into()),
    })
}

fn activity_entry(id: &str) -> WireActivity {
    let mut details = serde_json::Map::new();
    details.insert("from".into(), json!("To Do"));
    details.insert("to".into(), json!("Done"));
    WireActivity {
        id: id.into(),
        kind: ActivityKind::TaskMoved,
        user: ActivityActor {
            id: "u2".into(),
            name: "Bob".into(),
        },
        task: ActivityTask {
            id: "t1".into(),
            title: "Design".into(),
        },
        details,
        timestamp: "2026-01-01T10:00:00Z".into(),
    }
}

#[tokio::test]
async fn local_changes_survive_a_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let (session, _peer) = open(LocalStore::new(dir.path()), 50).await;

    let task = session
        .create_task(
            "col-1",
            TaskDraft {
                priority: Some("High".into()),
                ..TaskDraft::titled("Write spec")
            },
        )
        .await
        .unwrap();
    session
        .update_task(
            &task.id,
            TaskPatch {
                assignee: Some("Alice".into()),
                ..TaskPatch::default()
            },
        )
        .await
        .unwrap();
    session
        .move_task(MoveIntent {
            task_id: task.id.clone(),
            from_column: "col-1".into(),
            to_column: "col-2".into(),
            from_index: Some(0),
            to_index: None,
        })
        .await
        .unwrap();
    session.close();

    let (reopened, _peer) = open(LocalStore::new(dir.path()), 50).await;
    let board = reopened.board();
    let stored = &board.tasks[&task.id];
    assert_eq!(stored.title, "Write spec");
    assert_eq!(stored.priority, "High");
    assert_eq!(stored.assignee.as_deref(), Some("Alice"));
    assert_eq!(stored.status, "In Progress");
    assert_eq!(board.columns["col-2"].task_ids, [task.id.clone()]);

    reopened.delete_task(&task.id).await.unwrap();
    let (third, _peer) = open(LocalStore::new(dir.path()), 50).await;
    assert!(third.board().tasks.is_empty());
}

#[tokio::test]
async fn remote_events_merge_and_echoes_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let (session, peer) = open(LocalStore::new(dir.path()), 50).await;

    peer.send(&remote_task("r1", "done", "u2")).await.unwrap();
    assert_eq!(next(&session).await, SessionUpdate::Board(ApplyOutcome::Applied));
    assert_eq!(session.board().column_for_status("Done").unwrap().task_ids, ["r1"]);

    peer.send(&remote_task("r2", "todo", "me")).await.unwrap();
    assert_eq!(
        next(&session).await,
        SessionUpdate::Board(ApplyOutcome::Skipped(SkipReason::SelfEcho))
    );
    assert!(session.board().task("r2").is_none());
}

#[tokio::test]
async fn status_in_a_patch_is_flagged_and_not_stored() {
    let dir = tempfile::tempdir().unwrap();
    let store_dir = dir.path().to_path_buf();
    let (session, _peer) = open(LocalStore::new(&store_dir), 50).await;
    let task = session
        .create_task("col-1", TaskDraft::titled("A"))
        .await
        .unwrap();

    let report = session
        .update_task(
            &task.id,
            TaskPatch {
                title: Some("B".into()),
                status: Some("Done".into()),
                ..TaskPatch::default()
            },
        )
        .await
        .unwrap();
    assert!(report.changed);
    assert_eq!(
        report.flagged,
        Some(Inconsistency::StatusWithoutMove {
            task_id: task.id.clone(),
            status: "Done".into(),
        })
    );

    let listed = LocalStore::new(&store_dir).list("p1").await.unwrap();
    let board = schema::board_from_listing(listed).unwrap();
    assert_eq!(board.tasks[&task.id].title, "B");
    assert_eq!(board.tasks[&task.id].status, "To Do");
}

#[tokio::test]
async fn activity_feed_is_bounded_and_deduplicated() {
    let dir = tempfile::tempdir().unwrap();
    let (session, peer) = open(LocalStore::new(dir.path()), 2).await;

    for id in ["a1", "a1", "a2", "a3"] {
        peer.send(&ServerEvent::ActivityNew(activity_entry(id)))
            .await
            .unwrap();
    }
    let mut added = Vec::new();
    for _ in 0..4 {
        match next(&session).await {
            SessionUpdate::Activity { added: a } => added.push(a),
            other => panic!("unexpected update {other:?}"),
        }
    }
    assert_eq!(added, [true, false, true, true]);

    let entries = session.activity();
    let ids: Vec<_> = entries.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, ["a3", "a2"]);
    assert_eq!(
        activity::describe(&entries[0]),
        "Bob moved Design from To Do to Done"
    );
}

/// Adapter for a backend that cannot be reached.
struct Unreachable;

impl PersistenceAdapter for Unreachable {
    async fn list(&self, _project_id: &str) -> Result<Value, PersistError> {
        Err(PersistError::Transport("connection refused".into()))
    }

    async fn create(&self, _task: &WireNewTask) -> Result<Value, PersistError> {
        Err(PersistError::Transport("connection refused".into()))
    }

    async fn update(&self, _task_id: &str, _fields: &WireTaskUpdate) -> Result<Value, PersistError> {
        Err(PersistError::Transport("connection refused".into()))
    }

    async fn move_task(&self, _task_id: &str, _status: &str) -> Result<Value, PersistError> {
        Err(PersistError::Transport("connection refused".into()))
    }

    async fn delete(&self, _task_id: &str) -> Result<(), PersistError> {
        Err(PersistError::Transport("connection refused".into()))
    }
}

#[tokio::test]
async fn failed_load_falls_back_and_failed_writes_keep_local_state() {
    let (session, _peer) = open(Unreachable, 50).await;
    assert!(matches!(
        session.load_error(),
        Some(SyncError::Persistence(PersistError::Transport(_)))
    ));
    assert_eq!(*session.board(), Board::default_layout());

    let result = session.create_task("col-1", TaskDraft::titled("Offline")).await;
    assert!(matches!(result, Err(SyncError::Persistence(_))));
    let board = session.board();
    assert_eq!(board.tasks.len(), 1);
    assert_eq!(board.columns["col-1"].task_ids.len(), 1);

    // Bad input never reaches the adapter.
    assert!(matches!(
        session.create_task("col-9", TaskDraft::titled("Nowhere")).await,
        Err(SyncError::Validation(_))
    ));
    assert_eq!(session.board().tasks.len(), 1);
}

async fn emitted(peer: &mut LoopbackPeer) -> ClientEvent {
    tokio::time::timeout(Duration::from_secs(5), peer.recv())
        .await
        .unwrap()
        .unwrap()
}

async fn stored_board(dir: &std::path::Path) -> Board {
    schema::board_from_listing(LocalStore::new(dir).list("p1").await.unwrap()).unwrap()
}

#[tokio::test]
async fn reorder_within_a_column_survives_a_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let (session, _peer) = open(LocalStore::new(dir.path()), 50).await;
    let a = session.create_task("col-1", TaskDraft::titled("A")).await.unwrap();
    let b = session.create_task("col-1", TaskDraft::titled("B")).await.unwrap();

    let report = session
        .move_task(MoveIntent {
            task_id: b.id.clone(),
            from_column: "col-1".into(),
            to_column: "col-1".into(),
            from_index: Some(1),
            to_index: Some(0),
        })
        .await
        .unwrap();
    assert!(!report.cross_column);

    assert_eq!(stored_board(dir.path()).await.columns["col-1"].task_ids, [b.id, a.id]);
}

#[tokio::test]
async fn file_store_changes_are_announced_to_the_room() {
    let dir = tempfile::tempdir().unwrap();
    let (session, mut peer) = open(LocalStore::new(dir.path()), 50).await;

    let task = session.create_task("col-1", TaskDraft::titled("A")).await.unwrap();
    match emitted(&mut peer).await {
        ClientEvent::CreateTask(notice) => {
            assert_eq!(notice.task.id, task.id);
            assert_eq!(notice.task.status.as_deref(), Some("todo"));
            assert_eq!(notice.room_id, "p1");
        }
        other => panic!("unexpected event {other:?}"),
    }

    session
        .update_task(
            &task.id,
            TaskPatch {
                title: Some("B".into()),
                ..TaskPatch::default()
            },
        )
        .await
        .unwrap();
    match emitted(&mut peer).await {
        ClientEvent::UpdateTask(notice) => {
            assert_eq!(notice.task_id, task.id);
            assert_eq!(notice.updates.title.as_deref(), Some("B"));
        }
        other => panic!("unexpected event {other:?}"),
    }

    session.delete_task(&task.id).await.unwrap();
    match emitted(&mut peer).await {
        ClientEvent::DeleteTask(notice) => assert_eq!(notice.task_id, task.id),
        other => panic!("unexpected event {other:?}"),
    }
}

/// File store whose creates wait for a permit.
struct HeldCreates {
    inner: LocalStore,
    permits: Arc<Semaphore>,
}

impl PersistenceAdapter for HeldCreates {
    async fn list(&self, project_id: &str) -> Result<Value, PersistError> {
        self.inner.list(project_id).await
    }

    async fn create(&self, task: &WireNewTask) -> Result<Value, PersistError> {
        self.permits.acquire().await.unwrap().forget();
        self.inner.create(task).await
    }

    async fn update(&self, task_id: &str, fields: &WireTaskUpdate) -> Result<Value, PersistError> {
        self.inner.update(task_id, fields).await
    }

    async fn move_task(&self, task_id: &str, status: &str) -> Result<Value, PersistError> {
        self.inner.move_task(task_id, status).await
    }

    async fn delete(&self, task_id: &str) -> Result<(), PersistError> {
        self.inner.delete(task_id).await
    }

    fn broadcasts_changes(&self) -> bool {
        self.inner.broadcasts_changes()
    }

    async fn snapshot(&self, project_id: &str, board: &Board) -> Result<(), PersistError> {
        self.inner.snapshot(project_id, board).await
    }
}

async fn open_held(dir: &std::path::Path) -> (BoardSession<LoopbackConnector, HeldCreates>, LoopbackPeer, Arc<Semaphore>) {
    let permits = Arc::new(Semaphore::new(0));
    let adapter = HeldCreates {
        inner: LocalStore::new(dir),
        permits: Arc::clone(&permits),
    };
    let (session, peer) = open(adapter, 50).await;
    (session, peer, permits)
}

async fn pending_task<C, P>(session: &BoardSession<C, P>) -> String
where
    C: collabflow::channel::Connector,
    P: PersistenceAdapter,
{
    loop {
        if let Some(id) = session.board().tasks.keys().next() {
            return id.clone();
        }
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn delete_before_the_store_answers_removes_the_stored_task() {
    let dir = tempfile::tempdir().unwrap();
    let (session, _peer, permits) = open_held(dir.path()).await;

    let delete_pending = async {
        let provisional = pending_task(&session).await;
        let removed = session.delete_task(&provisional).await.unwrap();
        assert!(removed.is_some());
        permits.add_permits(1);
    };
    let (created, ()) = tokio::join!(session.create_task("col-1", TaskDraft::titled("Draft")), delete_pending);
    created.unwrap();

    assert!(session.board().tasks.is_empty());
    assert!(stored_board(dir.path()).await.tasks.is_empty());
}

#[tokio::test]
async fn edits_before_the_store_answers_are_stored_and_announced() {
    let dir = tempfile::tempdir().unwrap();
    let (session, mut peer, permits) = open_held(dir.path()).await;

    let edit_pending = async {
        let provisional = pending_task(&session).await;
        session
            .update_task(
                &provisional,
                TaskPatch {
                    title: Some("Final".into()),
                    ..TaskPatch::default()
                },
            )
            .await
            .unwrap();
        session
            .move_task(MoveIntent {
                task_id: provisional,
                from_column: "col-1".into(),
                to_column: "col-3".into(),
                from_index: Some(0),
                to_index: None,
            })
            .await
            .unwrap();
        permits.add_permits(1);
    };
    let (created, ()) = tokio::join!(session.create_task("col-1", TaskDraft::titled("Draft")), edit_pending);
    let task = created.unwrap();
    assert_eq!(task.title, "Final");
    assert_eq!(task.status, "Done");

    let stored = stored_board(dir.path()).await;
    assert_eq!(stored.tasks[&task.id].title, "Final");
    assert_eq!(stored.columns["col-3"].task_ids, [task.id.clone()]);
    assert!(stored.columns["col-1"].task_ids.is_empty());

    assert!(matches!(emitted(&mut peer).await, ClientEvent::CreateTask(n) if n.task.title == "Draft"));
    assert!(matches!(
        emitted(&mut peer).await,
        ClientEvent::UpdateTask(n) if n.updates.title.as_deref() == Some("Final")
    ));
    assert!(matches!(
        emitted(&mut peer).await,
        ClientEvent::MoveTask(n) if n.task_id == task.id && n.new_status == "done"
    ));
}
