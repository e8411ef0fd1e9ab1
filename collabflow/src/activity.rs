//! Bounded log of recent project activity.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use collabflow_proto::event::{ActivityKind, WireActivity};

/// Entries kept when no capacity is configured.
pub const DEFAULT_CAPACITY: usize = 50;

/// Newest-first activity log, deduplicated by entry id.
#[derive(Debug)]
pub struct ActivityFeed {
    entries: VecDeque<WireActivity>,
    capacity: usize,
}

impl Default for ActivityFeed {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ActivityFeed {
    /// Creates an empty feed holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Records an entry at the front. Returns `false` for a repeated id.
    pub fn push(&mut self, entry: WireActivity) -> bool {
        if self.entries.iter().any(|e| e.id == entry.id) {
            return false;
        }
        self.entries.push_front(entry);
        self.entries.truncate(self.capacity);
        true
    }

    /// Entries, newest first.
    pub fn entries(&self) -> impl Iterator<Item = &WireActivity> {
        self.entries.iter()
    }

    /// Number of entries held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the feed is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Human-readable line for an entry.
#[must_use]
pub fn describe(entry: &WireActivity) -> String {
    let who = &entry.user.name;
    let what = &entry.task.title;
    let detail = |key: &str| entry.details.get(key).and_then(|v| v.as_str());
    match entry.kind {
        ActivityKind::TaskCreated => format!("{who} created {what}"),
        ActivityKind::TaskDeleted => format!("{who} deleted {what}"),
        ActivityKind::TaskMoved => match (detail("from"), detail("to")) {
            (Some(from), Some(to)) => format!("{who} moved {what} from {from} to {to}"),
            (_, Some(to)) => format!("{who} moved {what} to {to}"),
            _ => format!("{who} moved {what}"),
        },
        ActivityKind::TaskUpdated => match detail("field") {
            Some(field) => format!("{who} updated {field} of {what}"),
            None => format!("{who} updated {what}"),
        },
        ActivityKind::TaskAssigned => match detail("assignee") {
            Some(assignee) => format!("{who} assigned {what} to {assignee}"),
            None => format!("{who} assigned {what}"),
        },
    }
}

/// `Just now`, `5m ago`, `3h ago` or `2d ago` relative to `now`.
///
/// Unparseable timestamps are returned unchanged.
#[must_use]
pub fn relative_time(timestamp: &str, now: DateTime<Utc>) -> String {
    let Ok(then) = DateTime::parse_from_rfc3339(timestamp) else {
        return timestamp.to_string();
    };
    let elapsed = now.signed_duration_since(then.with_timezone(&Utc));
    let minutes = elapsed.num_minutes();
    if minutes < 1 {
        "Just now".to_string()
    } else if minutes < 60 {
        format!("{minutes}m ago")
    } else if elapsed.num_hours() < 24 {
        format!("{}h ago", elapsed.num_hours())
    } else {
        format!("{}d ago", elapsed.num_days())
    }
}
