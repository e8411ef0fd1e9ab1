//! Room-scoped realtime events exchanged with the board server.
//!
//! Every frame is a JSON object `{"event": "<name>", "data": {...}}` with
//! camelCase payload keys. [`ClientEvent`] covers what a participant emits,
//! [`ServerEvent`] what the server broadcasts into a room.

use serde::{Deserialize, Serialize};

use crate::task::{WireTask, WireTaskUpdate};

/// Payload naming a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRef {
    /// Room (project) identifier.
    #[serde(alias = "projectId")]
    pub room_id: String,
}

/// Outbound cross-column move notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveNotice {
    /// Task that moved.
    pub task_id: String,
    /// Destination status, wire vocabulary.
    pub new_status: String,
    /// Room the task belongs to.
    #[serde(alias = "projectId")]
    pub room_id: String,
}

/// Outbound editing indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditingNotice {
    /// Task being edited.
    pub task_id: String,
    /// `true` when editing starts, `false` when it stops.
    pub is_editing: bool,
    /// Room the task belongs to.
    #[serde(alias = "projectId")]
    pub room_id: String,
    /// Editing participant.
    pub user_id: String,
    /// Editing participant's display name.
    pub username: String,
}

/// Outbound notice of a task created without a broadcasting backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNotice {
    /// The stored task.
    pub task: WireTask,
    /// Room the task belongs to.
    #[serde(alias = "projectId")]
    pub room_id: String,
}

/// Outbound notice of changed task fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNotice {
    /// Task that changed.
    pub task_id: String,
    /// Changed fields, wire vocabulary.
    pub updates: WireTaskUpdate,
    /// Room the task belongs to.
    #[serde(alias = "projectId")]
    pub room_id: String,
}

/// Outbound notice of a deleted task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteNotice {
    /// Task that was deleted.
    pub task_id: String,
    /// Room the task belonged to.
    #[serde(alias = "projectId")]
    pub room_id: String,
}

/// Events a participant sends to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Enter a room.
    #[serde(rename = "room:join")]
    JoinRoom(RoomRef),
    /// Leave a room.
    #[serde(rename = "room:leave")]
    LeaveRoom(RoomRef),
    /// A task was created.
    #[serde(rename = "task:create")]
    CreateTask(CreateNotice),
    /// Some fields of a task changed.
    #[serde(rename = "task:update")]
    UpdateTask(UpdateNotice),
    /// A task changed column.
    #[serde(rename = "task:move")]
    MoveTask(MoveNotice),
    /// A task was deleted.
    #[serde(rename = "task:delete")]
    DeleteTask(DeleteNotice),
    /// Start/stop editing a task.
    #[serde(rename = "task:editing")]
    TaskEditing(EditingNotice),
}

impl ClientEvent {
    /// Wire name of the event.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::JoinRoom(_) => "room:join",
            Self::LeaveRoom(_) => "room:leave",
            Self::CreateTask(_) => "task:create",
            Self::UpdateTask(_) => "task:update",
            Self::MoveTask(_) => "task:move",
            Self::DeleteTask(_) => "task:delete",
            Self::TaskEditing(_) => "task:editing",
        }
    }
}

/// A task was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCreated {
    /// The new task.
    pub task: WireTask,
    /// Room the task belongs to.
    #[serde(alias = "projectId")]
    pub room_id: String,
    /// Participant whose action produced the event.
    #[serde(default, rename = "userId", skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
}

/// Some fields of a task changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdated {
    /// Task that changed.
    pub task_id: String,
    /// Changed fields.
    pub updates: WireTaskUpdate,
    /// Room the task belongs to.
    #[serde(alias = "projectId")]
    pub room_id: String,
    /// Participant whose action produced the event.
    #[serde(default, rename = "userId", skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
}

/// A task changed column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMoved {
    /// Task that moved.
    pub task_id: String,
    /// Previous status, wire vocabulary.
    pub old_status: String,
    /// New status, wire vocabulary.
    pub new_status: String,
    /// Room the task belongs to.
    #[serde(alias = "projectId")]
    pub room_id: String,
    /// Participant whose action produced the event.
    #[serde(default, rename = "userId", skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
}

/// A task was deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDeleted {
    /// Task that was deleted.
    pub task_id: String,
    /// Room the task belonged to.
    #[serde(alias = "projectId")]
    pub room_id: String,
    /// Participant whose action produced the event.
    #[serde(default, rename = "userId", skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
}

/// A participant entering or leaving the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    /// Participant id.
    pub user_id: String,
    /// Participant display name.
    pub username: String,
}

/// A participant's editing indicator changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEditing {
    /// Participant id.
    pub user_id: String,
    /// Task being edited.
    pub task_id: String,
    /// Whether the participant is editing now.
    pub is_editing: bool,
}

/// Actor reference inside an activity entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityActor {
    /// Participant id.
    #[serde(alias = "_id")]
    pub id: String,
    /// Participant display name.
    pub name: String,
}

/// Task reference inside an activity entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityTask {
    /// Task id.
    #[serde(alias = "_id")]
    pub id: String,
    /// Task title at the time of the activity.
    pub title: String,
}

/// What kind of change an activity entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    /// `task_created`
    TaskCreated,
    /// `task_updated`
    TaskUpdated,
    /// `task_moved`
    TaskMoved,
    /// `task_deleted`
    TaskDeleted,
    /// `task_assigned`
    TaskAssigned,
}

/// One entry of the project activity feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireActivity {
    /// Entry id.
    #[serde(alias = "_id")]
    pub id: String,
    /// Kind of change.
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    /// Who did it.
    pub user: ActivityActor,
    /// Which task it concerned.
    pub task: ActivityTask,
    /// Kind-specific details (`from`/`to`, `field`/`value`, `assignee`).
    #[serde(default)]
    pub details: serde_json::Map<String, serde_json::Value>,
    /// RFC 3339 timestamp.
    pub timestamp: String,
}

/// Events the server broadcasts into a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// `task:created`
    #[serde(rename = "task:created")]
    TaskCreated(TaskCreated),
    /// `task:updated`
    #[serde(rename = "task:updated")]
    TaskUpdated(TaskUpdated),
    /// `task:moved`
    #[serde(rename = "task:moved")]
    TaskMoved(TaskMoved),
    /// `task:deleted`
    #[serde(rename = "task:deleted")]
    TaskDeleted(TaskDeleted),
    /// `user:joined`
    #[serde(rename = "user:joined")]
    UserJoined(UserRef),
    /// `user:left`
    #[serde(rename = "user:left")]
    UserLeft(UserRef),
    /// `user:editing`
    #[serde(rename = "user:editing")]
    UserEditing(UserEditing),
    /// `activity:new`
    #[serde(rename = "activity:new")]
    ActivityNew(WireActivity),
}

/// Subscription key for inbound events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    /// `task:created`
    TaskCreated,
    /// `task:updated`
    TaskUpdated,
    /// `task:moved`
    TaskMoved,
    /// `task:deleted`
    TaskDeleted,
    /// `user:joined`
    UserJoined,
    /// `user:left`
    UserLeft,
    /// `user:editing`
    UserEditing,
    /// `activity:new`
    ActivityNew,
    /// Local connection lifecycle signals (never on the wire).
    Connection,
}

impl EventKind {
    /// The four task event kinds.
    pub const TASKS: [Self; 4] = [
        Self::TaskCreated,
        Self::TaskUpdated,
        Self::TaskMoved,
        Self::TaskDeleted,
    ];

    /// The three presence event kinds.
    pub const PRESENCE: [Self; 3] = [Self::UserJoined, Self::UserLeft, Self::UserEditing];

    /// Wire name of the event kind.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::TaskCreated => "task:created",
            Self::TaskUpdated => "task:updated",
            Self::TaskMoved => "task:moved",
            Self::TaskDeleted => "task:deleted",
            Self::UserJoined => "user:joined",
            Self::UserLeft => "user:left",
            Self::UserEditing => "user:editing",
            Self::ActivityNew => "activity:new",
            Self::Connection => "connection",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl ServerEvent {
    /// Subscription key of this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::TaskCreated(_) => EventKind::TaskCreated,
            Self::TaskUpdated(_) => EventKind::TaskUpdated,
            Self::TaskMoved(_) => EventKind::TaskMoved,
            Self::TaskDeleted(_) => EventKind::TaskDeleted,
            Self::UserJoined(_) => EventKind::UserJoined,
            Self::UserLeft(_) => EventKind::UserLeft,
            Self::UserEditing(_) => EventKind::UserEditing,
            Self::ActivityNew(_) => EventKind::ActivityNew,
        }
    }

    /// Room the event is scoped to, if the payload names one.
    ///
    /// Presence and activity payloads are scoped implicitly by the server's
    /// room membership and return `None`.
    #[must_use]
    pub fn room_id(&self) -> Option<&str> {
        match self {
            Self::TaskCreated(e) => Some(&e.room_id),
            Self::TaskUpdated(e) => Some(&e.room_id),
            Self::TaskMoved(e) => Some(&e.room_id),
            Self::TaskDeleted(e) => Some(&e.room_id),
            Self::UserJoined(_) | Self::UserLeft(_) | Self::UserEditing(_) | Self::ActivityNew(_) => {
                None
            }
        }
    }

    /// Originating participant of a task event, when the server reports it.
    #[must_use]
    pub fn actor_id(&self) -> Option<&str> {
        match self {
            Self::TaskCreated(e) => e.actor_id.as_deref(),
            Self::TaskUpdated(e) => e.actor_id.as_deref(),
            Self::TaskMoved(e) => e.actor_id.as_deref(),
            Self::TaskDeleted(e) => e.actor_id.as_deref(),
            _ => None,
        }
    }
}
