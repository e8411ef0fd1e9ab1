//! Realtime synchronization channel.
//!
//! A [`SyncChannel`] multiplexes room membership over one authenticated
//! connection. The connection itself sits behind two traits:
//!
//! - [`Connector`] dials the server with a bearer credential and yields a
//!   live [`Transport`];
//! - [`Transport`] carries JSON text frames in both directions.
//!
//! Implementations:
//! - [`loopback::LoopbackConnector`]: in-process channel pair for tests
//! - [`websocket::WsConnector`]: WebSocket over `tokio-tungstenite`
//!
//! Inbound events are fanned out through the [`bus::EventBus`].

pub mod bus;
pub mod handle;
pub mod loopback;
pub mod websocket;

pub use bus::{ChannelEvent, EventBus, Subscription};
pub use handle::SyncChannel;

use std::fmt;
use std::time::Duration;

/// Errors raised by a transport.
///
/// These drive reconnection inside the channel; they are not reported per
/// emitted event.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection has been closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// The operation timed out.
    #[error("transport operation timed out")]
    Timeout,

    /// The server could not be reached.
    #[error("server unreachable: {0}")]
    Unreachable(String),

    /// The server refused the connection (bad URL, credential or status).
    #[error("connection rejected: {0}")]
    Rejected(String),

    /// An underlying I/O error.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A live bidirectional text-frame connection.
pub trait Transport: Send + Sync {
    /// Sends one frame.
    fn send(
        &self,
        frame: String,
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;

    /// Waits for the next inbound frame.
    ///
    /// Must be cancel-safe: the channel races it against outbound commands.
    fn recv(&self) -> impl std::future::Future<Output = Result<String, TransportError>> + Send;

    /// Whether the connection is still believed to be up.
    fn is_connected(&self) -> bool;
}

/// Dials the server.
pub trait Connector: Send + Sync + 'static {
    /// Connection type produced.
    type Conn: Transport + 'static;

    /// Opens a connection authenticated with `token`.
    fn connect(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<Self::Conn, TransportError>> + Send;
}

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No connection and none being attempted.
    Disconnected,
    /// Dialing, first time or after a drop.
    Connecting,
    /// Connected; emits are sent.
    Connected,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// Local connection notices published on the bus under
/// [`EventKind::Connection`](collabflow_proto::event::EventKind::Connection).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelSignal {
    /// First connection established.
    Connected,
    /// The connection dropped; a reconnect attempt is about to start.
    Reconnecting {
        /// 1-based attempt number.
        attempt: u32,
        /// Attempts allowed by the policy.
        max_attempts: u32,
    },
    /// A reconnect succeeded and the room was rejoined.
    Reconnected,
    /// Every reconnect attempt failed; the channel is disconnected.
    ConnectivityLost,
    /// The channel was closed on request.
    Disconnected,
}

/// Bounded fixed-delay reconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Attempts before giving up.
    pub max_attempts: u32,
    /// Delay before each attempt.
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(1),
        }
    }
}
