//! One participant's view of one room.
//!
//! A [`BoardSession`] ties the reconciliation engine to a persistence
//! adapter and a shared [`SyncChannel`]. Local operations apply to the
//! board first, then persist, then notify the room. Inbound events are
//! pulled one at a time with [`BoardSession::process_next`].
//!
//! The engine lock is only held for the synchronous part of an operation,
//! so remote events can land while an adapter call is in flight.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use collabflow_proto::event::{
    ClientEvent, CreateNotice, DeleteNotice, EditingNotice, EventKind, MoveNotice, ServerEvent,
    UpdateNotice, WireActivity,
};
use collabflow_proto::vocab;
use parking_lot::Mutex;

use crate::activity::ActivityFeed;
use crate::board::{Board, Task, TaskPatch};
use crate::channel::{ChannelEvent, ChannelSignal, Connector, Subscription, SyncChannel};
use crate::persist::PersistenceAdapter;
use crate::presence::{Participant, PresenceTracker};
use crate::schema;
use crate::sync::engine::PROVISIONAL_PREFIX;
use crate::sync::{
    ApplyOutcome, Confirmation, MoveIntent, MoveReport, Reconciler, SyncError, TaskDraft, UpdateReport,
};

/// Who this participant is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Participant id, matched against event actors to drop echoes.
    pub user_id: String,
    /// Name shown to other participants.
    pub display_name: String,
}

/// What one call to [`BoardSession::process_next`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    /// A task event was merged.
    Board(ApplyOutcome),
    /// A presence event was applied; `changed` is `false` for no-ops.
    Presence {
        /// Whether the roster changed.
        changed: bool,
    },
    /// An activity entry arrived; `added` is `false` for duplicates.
    Activity {
        /// Whether the entry was new.
        added: bool,
    },
    /// A connection signal.
    Connection(ChannelSignal),
}

/// Event kinds a session listens to.
const SESSION_EVENTS: [EventKind; 9] = [
    EventKind::TaskCreated,
    EventKind::TaskUpdated,
    EventKind::TaskMoved,
    EventKind::TaskDeleted,
    EventKind::UserJoined,
    EventKind::UserLeft,
    EventKind::UserEditing,
    EventKind::ActivityNew,
    EventKind::Connection,
];

/// A room's board, roster and activity, kept in sync.
pub struct BoardSession<C: Connector, P: PersistenceAdapter> {
    room_id: String,
    identity: Identity,
    engine: Mutex<Reconciler>,
    presence: Mutex<PresenceTracker>,
    activity: Mutex<ActivityFeed>,
    channel: Arc<SyncChannel<C>>,
    adapter: P,
    events: tokio::sync::Mutex<Subscription>,
    load_error: Option<SyncError>,
    creating: AtomicUsize,
}

/// Counts one create as in flight until dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn start(count: &'a AtomicUsize) -> Self {
        count.fetch_add(1, Ordering::AcqRel);
        Self(count)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl<C: Connector, P: PersistenceAdapter> BoardSession<C, P> {
    /// Opens `room_id`: subscribes, hydrates from `adapter` and joins.
    ///
    /// A failed listing does not stop the session; it starts from the
    /// default layout and the error is kept in [`load_error`].
    ///
    /// [`load_error`]: Self::load_error
    pub async fn open(
        channel: Arc<SyncChannel<C>>,
        adapter: P,
        room_id: &str,
        identity: Identity,
        activity: ActivityFeed,
    ) -> Self {
        let events = channel.subscribe(&SESSION_EVENTS);
        let mut engine = Reconciler::new(room_id, Some(identity.user_id.clone()));

        let load_error = match load_board(&adapter, room_id).await {
            Ok(board) => engine.hydrate(board).err(),
            Err(e) => Some(e),
        };
        if let Some(e) = &load_error {
            tracing::warn!(room = room_id, err = %e, "board load failed, starting from default layout");
        }

        channel.join_room(room_id);
        tracing::info!(room = room_id, user = %identity.user_id, "session opened");

        Self {
            room_id: room_id.to_string(),
            identity,
            engine: Mutex::new(engine),
            presence: Mutex::new(PresenceTracker::new()),
            activity: Mutex::new(activity),
            channel,
            adapter,
            events: tokio::sync::Mutex::new(events),
            load_error,
            creating: AtomicUsize::new(0),
        }
    }

    /// Room this session belongs to.
    #[must_use]
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Why hydration fell back to the default layout, if it did.
    #[must_use]
    pub const fn load_error(&self) -> Option<&SyncError> {
        self.load_error.as_ref()
    }

    /// Current board snapshot.
    #[must_use]
    pub fn board(&self) -> Arc<Board> {
        self.engine.lock().board()
    }

    /// Participants in join order.
    #[must_use]
    pub fn participants(&self) -> Vec<Participant> {
        self.presence.lock().participants().to_vec()
    }

    /// Participants editing `task_id`.
    #[must_use]
    pub fn editors_of(&self, task_id: &str) -> Vec<Participant> {
        self.presence.lock().editors_of(task_id).cloned().collect()
    }

    /// Recent activity, newest first.
    #[must_use]
    pub fn activity(&self) -> Vec<WireActivity> {
        self.activity.lock().entries().cloned().collect()
    }

    /// Creates a task in `column_id` and stores it.
    ///
    /// The task shows up at once under a provisional id, which is replaced
    /// by the server's id when the store answers. Edits and moves made in
    /// the meantime are then stored as well. If the task was deleted before
    /// the store answered, the stored record is deleted again and returned.
    ///
    /// # Errors
    ///
    /// [`SyncError::Validation`] for a bad column (nothing changes), or
    /// [`SyncError::Persistence`] if storing failed (the provisional task
    /// stays).
    pub async fn create_task(&self, column_id: &str, draft: TaskDraft) -> Result<Task, SyncError> {
        let in_flight = InFlight::start(&self.creating);
        let provisional = self.engine.lock().create(column_id, draft)?;
        let wire = schema::task_to_new_wire(&self.room_id, &provisional);
        let response = self.adapter.create(&wire).await?;
        let stored = schema::task_from_response(response)?;

        let confirmation = self.engine.lock().confirm_created(&provisional, &stored)?;
        let Confirmation::Confirmed { task, edits, moved_to } = confirmation else {
            self.adapter.delete(&stored.id).await?;
            drop(in_flight);
            self.persist_layout().await?;
            return Ok(stored);
        };
        self.announce(ClientEvent::CreateTask(CreateNotice {
            task: schema::task_to_wire(&self.room_id, &stored),
            room_id: self.room_id.clone(),
        }));
        if !edits.is_empty() {
            let fields = schema::patch_to_wire(&edits);
            self.adapter.update(&task.id, &fields).await?;
            self.announce(ClientEvent::UpdateTask(UpdateNotice {
                task_id: task.id.clone(),
                updates: fields,
                room_id: self.room_id.clone(),
            }));
        }
        if let Some(status) = moved_to {
            self.store_move(&task.id, &status).await?;
        }
        drop(in_flight);
        self.persist_layout().await?;
        Ok(task)
    }

    /// Changes some fields of a task and stores the change.
    ///
    /// # Errors
    ///
    /// [`SyncError::Validation`]/[`SyncError::Invariant`] before anything
    /// changes, or [`SyncError::Persistence`] after the local change.
    pub async fn update_task(&self, task_id: &str, patch: TaskPatch) -> Result<UpdateReport, SyncError> {
        let mut fields = patch.clone();
        fields.status = None;
        let report = self.engine.lock().update(task_id, patch)?;
        if !report.changed {
            return Ok(report);
        }
        if !task_id.starts_with(PROVISIONAL_PREFIX) {
            let fields = schema::patch_to_wire(&fields);
            self.adapter.update(task_id, &fields).await?;
            self.announce(ClientEvent::UpdateTask(UpdateNotice {
                task_id: task_id.to_string(),
                updates: fields,
                room_id: self.room_id.clone(),
            }));
        }
        self.persist_layout().await?;
        Ok(report)
    }

    /// Moves a task. A move to another column is stored and announced to
    /// the room; a reorder within a column only reaches whole-board stores.
    ///
    /// # Errors
    ///
    /// As for [`Reconciler::move_task`], or [`SyncError::Persistence`].
    pub async fn move_task(&self, mv: MoveIntent) -> Result<MoveReport, SyncError> {
        let report = self.engine.lock().move_task(&mv)?;
        if !report.changed {
            return Ok(report);
        }
        if report.cross_column && !mv.task_id.starts_with(PROVISIONAL_PREFIX) {
            self.store_move(&mv.task_id, &report.status).await?;
        }
        self.persist_layout().await?;
        Ok(report)
    }

    /// Deletes a task locally and from the store.
    ///
    /// # Errors
    ///
    /// [`SyncError::Persistence`]; the task is gone locally regardless.
    pub async fn delete_task(&self, task_id: &str) -> Result<Option<Task>, SyncError> {
        let removed = self.engine.lock().delete(task_id);
        if !task_id.starts_with(PROVISIONAL_PREFIX) {
            self.adapter.delete(task_id).await?;
            if removed.is_some() {
                self.announce(ClientEvent::DeleteTask(DeleteNotice {
                    task_id: task_id.to_string(),
                    room_id: self.room_id.clone(),
                }));
            }
        }
        if removed.is_some() {
            self.persist_layout().await?;
        }
        Ok(removed)
    }

    /// Stores a column change and tells the room.
    async fn store_move(&self, task_id: &str, display_status: &str) -> Result<(), SyncError> {
        let status = vocab::status_to_wire(display_status);
        self.adapter.move_task(task_id, &status).await?;
        self.channel.emit(ClientEvent::MoveTask(MoveNotice {
            task_id: task_id.to_string(),
            new_status: status,
            room_id: self.room_id.clone(),
        }));
        Ok(())
    }

    /// Emits a task change the store does not broadcast itself.
    fn announce(&self, event: ClientEvent) {
        if !self.adapter.broadcasts_changes() {
            self.channel.emit(event);
        }
    }

    /// Snapshots the board unless a create is still waiting for its id.
    /// The last create to finish writes the layout instead.
    async fn persist_layout(&self) -> Result<(), SyncError> {
        if self.creating.load(Ordering::Acquire) > 0 {
            tracing::debug!(room = %self.room_id, "create in flight, deferring snapshot");
            return Ok(());
        }
        self.snapshot().await
    }

    /// Tells the room this participant started or stopped editing a task.
    pub fn set_editing(&self, task_id: &str, editing: bool) {
        self.channel.emit(ClientEvent::TaskEditing(EditingNotice {
            task_id: task_id.to_string(),
            is_editing: editing,
            room_id: self.room_id.clone(),
            user_id: self.identity.user_id.clone(),
            username: self.identity.display_name.clone(),
        }));
    }

    /// Stores the whole board with the adapter.
    ///
    /// # Errors
    ///
    /// [`SyncError::Persistence`].
    pub async fn snapshot(&self) -> Result<(), SyncError> {
        let board = self.board();
        self.adapter.snapshot(&self.room_id, &board).await?;
        Ok(())
    }

    /// Waits for the next inbound event and applies it.
    ///
    /// Returns `None` once the channel is gone.
    pub async fn process_next(&self) -> Option<SessionUpdate> {
        let event = self.events.lock().await.recv().await?;
        Some(self.handle(event))
    }

    /// Applies every event already queued, without waiting.
    pub async fn drain(&self) -> Vec<SessionUpdate> {
        let mut events = self.events.lock().await;
        let mut updates = Vec::new();
        while let Some(event) = events.try_recv() {
            updates.push(self.handle(event));
        }
        updates
    }

    fn handle(&self, event: ChannelEvent) -> SessionUpdate {
        match event {
            ChannelEvent::Server(ServerEvent::ActivityNew(entry)) => SessionUpdate::Activity {
                added: self.activity.lock().push(entry),
            },
            ChannelEvent::Server(
                event @ (ServerEvent::UserJoined(_) | ServerEvent::UserLeft(_) | ServerEvent::UserEditing(_)),
            ) => SessionUpdate::Presence {
                changed: self.presence.lock().apply(&event),
            },
            ChannelEvent::Server(event) => SessionUpdate::Board(self.engine.lock().apply_remote(&event)),
            ChannelEvent::Signal(signal) => {
                if matches!(
                    signal,
                    ChannelSignal::Reconnecting { .. }
                        | ChannelSignal::ConnectivityLost
                        | ChannelSignal::Disconnected
                ) {
                    self.presence.lock().clear();
                }
                SessionUpdate::Connection(signal)
            }
        }
    }

    /// Leaves the room. The channel stays up for other sessions.
    pub fn close(self) {
        self.channel.leave_room(&self.room_id);
        tracing::info!(room = %self.room_id, "session closed");
    }
}

async fn load_board<P: PersistenceAdapter>(adapter: &P, room_id: &str) -> Result<Board, SyncError> {
    let body = adapter.list(room_id).await?;
    Ok(schema::board_from_listing(body)?)
}
