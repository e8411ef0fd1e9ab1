//! Typed fan-out of inbound events.
//!
//! Subscribers register for a set of [`EventKind`]s and get a
//! [`Subscription`] that yields matching events in delivery order. Dropping
//! the subscription releases every registration it made.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use collabflow_proto::event::{EventKind, ServerEvent};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::ChannelSignal;

/// Something delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// An event broadcast by the server.
    Server(ServerEvent),
    /// A local connection notice.
    Signal(ChannelSignal),
}

impl ChannelEvent {
    /// Subscription key of the event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Server(event) => event.kind(),
            Self::Signal(_) => EventKind::Connection,
        }
    }
}

#[derive(Debug, Default)]
struct Registry {
    next_id: u64,
    by_kind: HashMap<EventKind, Vec<(u64, mpsc::UnboundedSender<ChannelEvent>)>>,
}

impl Registry {
    fn release(&mut self, id: u64) {
        for senders in self.by_kind.values_mut() {
            senders.retain(|(sid, _)| *sid != id);
        }
        self.by_kind.retain(|_, senders| !senders.is_empty());
    }
}

/// Shared event bus. Cloning yields another handle to the same bus.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
}

impl EventBus {
    /// Creates a bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers for `kinds`.
    #[must_use]
    pub fn subscribe(&self, kinds: &[EventKind]) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut registry = self.registry.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        for kind in kinds {
            let senders = registry.by_kind.entry(*kind).or_default();
            if !senders.iter().any(|(sid, _)| *sid == id) {
                senders.push((id, tx.clone()));
            }
        }
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
            rx,
        }
    }

    /// Delivers `event` to every subscriber of its kind. Returns how many
    /// received it.
    pub fn publish(&self, event: &ChannelEvent) -> usize {
        let mut registry = self.registry.lock();
        let Some(senders) = registry.by_kind.get_mut(&event.kind()) else {
            return 0;
        };
        senders.retain(|(_, tx)| tx.send(event.clone()).is_ok());
        senders.len()
    }

    /// Number of live registrations for `kind`.
    #[must_use]
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.registry.lock().by_kind.get(&kind).map_or(0, Vec::len)
    }
}

/// A set of registrations on an [`EventBus`].
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
    rx: mpsc::UnboundedReceiver<ChannelEvent>,
}

impl Subscription {
    /// Waits for the next event. Returns `None` once the bus is gone and
    /// the backlog is drained.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        self.rx.recv().await
    }

    /// Takes the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<ChannelEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().release(self.id);
        }
    }
}
