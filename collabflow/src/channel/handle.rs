//! The [`SyncChannel`] handle and its connection supervisor.
//!
//! [`SyncChannel::connect`] dials once, then hands the live transport to a
//! background supervisor task that owns it from then on. The supervisor
//! multiplexes outbound commands and inbound frames, reconnects with the
//! same credential when the connection drops, and re-sends `room:join` for
//! the current room after every reconnect.

use std::sync::Arc;

use collabflow_proto::codec;
use collabflow_proto::event::{ClientEvent, EventKind, RoomRef, ServerEvent};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::bus::{ChannelEvent, EventBus, Subscription};
use super::{ChannelSignal, ChannelState, Connector, ReconnectPolicy, Transport, TransportError};
use crate::schema::ValidationError;
use crate::sync::SyncError;

/// Outbound command queue depth.
const COMMAND_CAPACITY: usize = 256;

enum Command {
    Emit(ClientEvent),
    Shutdown,
}

/// State shared between the handle and its supervisor.
struct Shared<C> {
    connector: Arc<C>,
    policy: ReconnectPolicy,
    bus: EventBus,
    state: watch::Sender<ChannelState>,
    room: Mutex<Option<String>>,
}

impl<C> Shared<C> {
    fn set_state(&self, state: ChannelState) {
        self.state.send_replace(state);
    }

    /// Moves `Disconnected` to `Connecting` in one step. Returns whether
    /// this caller owns the dial.
    fn claim_dial(&self) -> bool {
        self.state.send_if_modified(|state| {
            let idle = *state == ChannelState::Disconnected;
            if idle {
                *state = ChannelState::Connecting;
            }
            idle
        })
    }

    fn signal(&self, signal: ChannelSignal) {
        self.bus.publish(&ChannelEvent::Signal(signal));
    }

    fn current_room(&self) -> Option<String> {
        self.room.lock().clone()
    }
}

/// A realtime channel multiplexing room membership over one connection.
///
/// Share it between room views with `Arc`.
pub struct SyncChannel<C: Connector> {
    shared: Arc<Shared<C>>,
    commands: Mutex<Option<mpsc::Sender<Command>>>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl<C: Connector> SyncChannel<C> {
    /// Creates a disconnected channel.
    pub fn new(connector: C, policy: ReconnectPolicy) -> Self {
        let (state, _) = watch::channel(ChannelState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                connector: Arc::new(connector),
                policy,
                bus: EventBus::new(),
                state,
                room: Mutex::new(None),
            }),
            commands: Mutex::new(None),
            supervisor: Mutex::new(None),
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ChannelState {
        *self.shared.state.borrow()
    }

    /// Watches connection state changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.shared.state.subscribe()
    }

    /// Waits until the channel reaches `target`.
    pub async fn wait_for_state(&self, target: ChannelState) {
        let mut rx = self.shared.state.subscribe();
        let _ = rx.wait_for(|state| *state == target).await;
    }

    /// The event bus inbound events are published on.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.shared.bus
    }

    /// Registers for `kinds` on the channel's bus.
    #[must_use]
    pub fn subscribe(&self, kinds: &[EventKind]) -> Subscription {
        self.shared.bus.subscribe(kinds)
    }

    /// Room currently joined, if any.
    #[must_use]
    pub fn current_room(&self) -> Option<String> {
        self.shared.current_room()
    }

    /// Connects with a bearer credential and starts the supervisor.
    ///
    /// The credential is kept for reconnects. If a room was joined while
    /// disconnected, it is joined as soon as the connection is up. Calling
    /// this while already connected does nothing. While another dial or a
    /// reconnect is under way it waits for that outcome instead of dialing
    /// a second time, and dials itself only if that one failed.
    ///
    /// # Errors
    ///
    /// [`ValidationError::EmptyCredential`] for an empty token, or the
    /// [`TransportError`] of the failed dial.
    pub async fn connect(&self, token: &str) -> Result<(), SyncError> {
        if token.is_empty() {
            return Err(ValidationError::EmptyCredential.into());
        }
        let mut state = self.shared.state.subscribe();
        while !self.shared.claim_dial() {
            let settled = *state
                .wait_for(|s| *s != ChannelState::Connecting)
                .await
                .map_err(|_| TransportError::ConnectionClosed)?;
            if settled == ChannelState::Connected {
                return Ok(());
            }
        }

        let transport = match self.shared.connector.connect(token).await {
            Ok(transport) => transport,
            Err(e) => {
                tracing::warn!(err = %e, "channel connect failed");
                self.shared.set_state(ChannelState::Disconnected);
                return Err(e.into());
            }
        };
        rejoin(&transport, self.shared.current_room()).await;

        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
        *self.commands.lock() = Some(tx);
        self.shared.set_state(ChannelState::Connected);
        self.shared.signal(ChannelSignal::Connected);
        tracing::info!("channel connected");

        let handle = tokio::spawn(supervise(
            transport,
            Arc::clone(&self.shared),
            token.to_string(),
            rx,
        ));
        *self.supervisor.lock() = Some(handle);
        Ok(())
    }

    /// Stops the supervisor and closes the connection.
    pub async fn disconnect(&self) {
        let commands = self.commands.lock().take();
        let handle = self.supervisor.lock().take();
        if let Some(tx) = commands {
            let _ = tx.send(Command::Shutdown).await;
        }
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        if self.state() != ChannelState::Disconnected {
            self.shared.set_state(ChannelState::Disconnected);
        }
    }

    /// Sends an event, best-effort.
    ///
    /// Never fails. While the channel is not connected the event is
    /// dropped; durability is the persistence layer's concern.
    pub fn emit(&self, event: ClientEvent) {
        if self.state() != ChannelState::Connected {
            tracing::debug!(event = event.name(), "channel not connected, dropping emit");
            return;
        }
        let Some(tx) = self.commands.lock().clone() else {
            return;
        };
        match tx.try_send(Command::Emit(event)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(Command::Emit(event))) => {
                tracing::warn!(event = event.name(), "outbound queue full, dropping emit");
            }
            Err(_) => tracing::debug!("supervisor gone, dropping emit"),
        }
    }

    /// Joins `room_id`, leaving the current room first if it differs.
    ///
    /// Joining the current room again only re-sends the join.
    pub fn join_room(&self, room_id: &str) {
        let previous = self.shared.room.lock().replace(room_id.to_string());
        if let Some(previous) = previous
            && previous != room_id
        {
            self.emit(ClientEvent::LeaveRoom(RoomRef { room_id: previous }));
        }
        self.emit(ClientEvent::JoinRoom(RoomRef {
            room_id: room_id.to_string(),
        }));
    }

    /// Leaves `room_id`. Does nothing unless it is the current room.
    pub fn leave_room(&self, room_id: &str) {
        {
            let mut room = self.shared.room.lock();
            if room.as_deref() != Some(room_id) {
                return;
            }
            *room = None;
        }
        self.emit(ClientEvent::LeaveRoom(RoomRef {
            room_id: room_id.to_string(),
        }));
    }
}

impl<C: Connector> Drop for SyncChannel<C> {
    fn drop(&mut self) {
        if let Some(handle) = self.supervisor.lock().take() {
            handle.abort();
        }
    }
}

enum Step {
    Command(Option<Command>),
    Frame(Result<String, TransportError>),
}

enum Redial<T> {
    Restored(T),
    Exhausted,
    Shutdown,
}

async fn supervise<C: Connector>(
    mut transport: C::Conn,
    shared: Arc<Shared<C>>,
    token: String,
    mut commands: mpsc::Receiver<Command>,
) {
    loop {
        let step = tokio::select! {
            cmd = commands.recv() => Step::Command(cmd),
            frame = transport.recv() => Step::Frame(frame),
        };
        match step {
            Step::Command(Some(Command::Emit(event))) => {
                if let Err(e) = send_event(&transport, &event).await {
                    // The read side notices the drop and drives the reconnect.
                    tracing::warn!(event = event.name(), err = %e, "emit failed");
                }
            }
            Step::Command(Some(Command::Shutdown) | None) => break,
            Step::Frame(Ok(frame)) => dispatch(&shared, &frame),
            Step::Frame(Err(e)) => {
                tracing::warn!(err = %e, "channel connection lost");
                match redial(&shared, &token, &mut commands).await {
                    Redial::Restored(fresh) => {
                        transport = fresh;
                        rejoin(&transport, shared.current_room()).await;
                        shared.set_state(ChannelState::Connected);
                        shared.signal(ChannelSignal::Reconnected);
                        tracing::info!("channel reconnected");
                    }
                    Redial::Exhausted => {
                        tracing::warn!(
                            attempts = shared.policy.max_attempts,
                            "reconnect attempts exhausted"
                        );
                        shared.set_state(ChannelState::Disconnected);
                        shared.signal(ChannelSignal::ConnectivityLost);
                        return;
                    }
                    Redial::Shutdown => break,
                }
            }
        }
    }
    shared.set_state(ChannelState::Disconnected);
    shared.signal(ChannelSignal::Disconnected);
    tracing::info!("channel supervisor exiting");
}

async fn redial<C: Connector>(
    shared: &Shared<C>,
    token: &str,
    commands: &mut mpsc::Receiver<Command>,
) -> Redial<C::Conn> {
    shared.set_state(ChannelState::Connecting);
    let max_attempts = shared.policy.max_attempts;
    for attempt in 1..=max_attempts {
        shared.signal(ChannelSignal::Reconnecting {
            attempt,
            max_attempts,
        });
        tokio::time::sleep(shared.policy.delay).await;

        // Emits queued before the drop are not replayed.
        while let Ok(cmd) = commands.try_recv() {
            match cmd {
                Command::Emit(event) => {
                    tracing::debug!(event = event.name(), "dropping emit queued before drop");
                }
                Command::Shutdown => return Redial::Shutdown,
            }
        }

        match shared.connector.connect(token).await {
            Ok(transport) => return Redial::Restored(transport),
            Err(e) => tracing::warn!(attempt, max_attempts, err = %e, "reconnect attempt failed"),
        }
    }
    Redial::Exhausted
}

async fn rejoin<T: Transport>(transport: &T, room: Option<String>) {
    if let Some(room_id) = room {
        let join = ClientEvent::JoinRoom(RoomRef { room_id });
        if let Err(e) = send_event(transport, &join).await {
            tracing::warn!(err = %e, "room join failed");
        }
    }
}

async fn send_event<T: Transport>(transport: &T, event: &ClientEvent) -> Result<(), TransportError> {
    let frame = codec::encode(event).map_err(|e| TransportError::Io(std::io::Error::other(e)))?;
    transport.send(frame).await
}

fn dispatch<C>(shared: &Shared<C>, frame: &str) {
    let event: ServerEvent = match codec::decode(frame) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(err = %e, "malformed frame, skipping");
            return;
        }
    };
    if let Some(room) = event.room_id()
        && shared.current_room().as_deref() != Some(room)
    {
        tracing::debug!(event = %event.kind(), room, "event for another room, dropping");
        return;
    }
    shared.bus.publish(&ChannelEvent::Server(event));
}
