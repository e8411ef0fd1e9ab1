//! Who is in the room and what they are editing.
//!
//! Presence is transient: it is rebuilt from `user:*` events and wiped
//! whenever the channel loses its connection, since nothing received
//! before the drop can be trusted afterwards.

use collabflow_proto::event::ServerEvent;

/// What a participant is doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceStatus {
    /// In the room.
    Active,
    /// Editing the given task.
    Editing(String),
}

/// One participant in the room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    /// Participant id.
    pub user_id: String,
    /// Display name.
    pub display_name: String,
    /// Current activity.
    pub status: PresenceStatus,
}

/// Roster of one room, in join order.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    entries: Vec<Participant>,
}

impl PresenceTracker {
    /// Creates an empty roster.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Adds a participant unless already present. Returns whether the
    /// roster changed.
    pub fn on_join(&mut self, user_id: &str, display_name: &str) -> bool {
        if self.entries.iter().any(|p| p.user_id == user_id) {
            return false;
        }
        self.entries.push(Participant {
            user_id: user_id.to_string(),
            display_name: display_name.to_string(),
            status: PresenceStatus::Active,
        });
        true
    }

    /// Removes a participant. Leaving without having joined is a no-op.
    pub fn on_leave(&mut self, user_id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|p| p.user_id != user_id);
        self.entries.len() != before
    }

    /// Updates a joined participant's editing flag.
    ///
    /// Stopping only clears the flag if it names the same task, so a late
    /// "stopped editing A" cannot hide "editing B". Unknown participants
    /// are ignored.
    pub fn on_editing(&mut self, user_id: &str, task_id: &str, is_editing: bool) -> bool {
        let Some(entry) = self.entries.iter_mut().find(|p| p.user_id == user_id) else {
            return false;
        };
        let next = if is_editing {
            PresenceStatus::Editing(task_id.to_string())
        } else if entry.status == PresenceStatus::Editing(task_id.to_string()) {
            PresenceStatus::Active
        } else {
            return false;
        };
        if entry.status == next {
            return false;
        }
        entry.status = next;
        true
    }

    /// Forgets everyone.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Participants in join order.
    #[must_use]
    pub fn participants(&self) -> &[Participant] {
        &self.entries
    }

    /// Participants currently editing `task_id`.
    pub fn editors_of<'a>(&'a self, task_id: &'a str) -> impl Iterator<Item = &'a Participant> + 'a {
        self.entries
            .iter()
            .filter(move |p| matches!(&p.status, PresenceStatus::Editing(t) if t == task_id))
    }

    /// Applies a presence event. Other events are ignored.
    pub fn apply(&mut self, event: &ServerEvent) -> bool {
        match event {
            ServerEvent::UserJoined(u) => self.on_join(&u.user_id, &u.username),
            ServerEvent::UserLeft(u) => self.on_leave(&u.user_id),
            ServerEvent::UserEditing(e) => self.on_editing(&e.user_id, &e.task_id, e.is_editing),
            _ => false,
        }
    }
}
