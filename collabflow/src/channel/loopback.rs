//! In-process transport for tests and demos.
//!
//! [`LoopbackConnector::pair`] returns the client-side connector and a
//! [`LoopbackServer`] that receives one [`LoopbackPeer`] per successful
//! dial. The peer plays the server: it reads what the client emitted and
//! pushes events back. Dropping a peer closes that connection, which the
//! client sees as a drop and answers with a reconnect.

use std::sync::Arc;

use collabflow_proto::codec;
use collabflow_proto::event::{ClientEvent, ServerEvent};
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, mpsc};

use super::{Connector, Transport, TransportError};

/// Per-direction frame buffer.
const BUFFER: usize = 64;

#[derive(Debug, Default)]
struct Dialer {
    refuse_next: u32,
    refuse_all: bool,
    tokens: Vec<String>,
}

/// Client-side connector of a loopback pair.
#[derive(Debug, Clone)]
pub struct LoopbackConnector {
    dialer: Arc<Mutex<Dialer>>,
    accepted: mpsc::UnboundedSender<LoopbackPeer>,
}

/// Receives the server end of every loopback connection.
#[derive(Debug)]
pub struct LoopbackServer {
    incoming: mpsc::UnboundedReceiver<LoopbackPeer>,
}

impl LoopbackConnector {
    /// Creates a connector and the server that accepts its connections.
    #[must_use]
    pub fn pair() -> (Self, LoopbackServer) {
        let (accepted, incoming) = mpsc::unbounded_channel();
        (
            Self {
                dialer: Arc::new(Mutex::new(Dialer::default())),
                accepted,
            },
            LoopbackServer { incoming },
        )
    }

    /// Makes the next `n` dials fail.
    pub fn refuse_next(&self, n: u32) {
        self.dialer.lock().refuse_next = n;
    }

    /// Makes every dial fail until called with `false`.
    pub fn refuse_all(&self, refuse: bool) {
        self.dialer.lock().refuse_all = refuse;
    }

    /// Credentials presented so far, oldest first.
    #[must_use]
    pub fn tokens_seen(&self) -> Vec<String> {
        self.dialer.lock().tokens.clone()
    }
}

impl Connector for LoopbackConnector {
    type Conn = LoopbackTransport;

    async fn connect(&self, token: &str) -> Result<LoopbackTransport, TransportError> {
        {
            let mut dialer = self.dialer.lock();
            dialer.tokens.push(token.to_string());
            if dialer.refuse_all {
                return Err(TransportError::Unreachable("loopback".into()));
            }
            if dialer.refuse_next > 0 {
                dialer.refuse_next -= 1;
                return Err(TransportError::Unreachable("loopback".into()));
            }
        }
        // A real dial suspends at least once.
        tokio::task::yield_now().await;

        let (to_server, from_client) = mpsc::channel(BUFFER);
        let (to_client, from_server) = mpsc::channel(BUFFER);
        let peer = LoopbackPeer {
            token: token.to_string(),
            tx: to_client,
            rx: from_client,
        };
        self.accepted
            .send(peer)
            .map_err(|_| TransportError::Unreachable("loopback server dropped".into()))?;
        Ok(LoopbackTransport {
            tx: to_server,
            rx: AsyncMutex::new(from_server),
        })
    }
}

impl LoopbackServer {
    /// Waits for the next connection.
    pub async fn accept(&mut self) -> Option<LoopbackPeer> {
        self.incoming.recv().await
    }
}

/// Client end of a loopback connection.
#[derive(Debug)]
pub struct LoopbackTransport {
    tx: mpsc::Sender<String>,
    rx: AsyncMutex<mpsc::Receiver<String>>,
}

impl Transport for LoopbackTransport {
    async fn send(&self, frame: String) -> Result<(), TransportError> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    async fn recv(&self) -> Result<String, TransportError> {
        let mut rx = self.rx.lock().await;
        rx.recv().await.ok_or(TransportError::ConnectionClosed)
    }

    fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Server end of a loopback connection.
#[derive(Debug)]
pub struct LoopbackPeer {
    token: String,
    tx: mpsc::Sender<String>,
    rx: mpsc::Receiver<String>,
}

impl LoopbackPeer {
    /// Credential the client connected with.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Pushes an event to the client.
    ///
    /// # Errors
    ///
    /// [`TransportError::ConnectionClosed`] if the client end is gone.
    pub async fn send(&self, event: &ServerEvent) -> Result<(), TransportError> {
        let frame = codec::encode(event).map_err(|e| TransportError::Io(std::io::Error::other(e)))?;
        self.send_raw(frame).await
    }

    /// Pushes an arbitrary text frame to the client.
    ///
    /// # Errors
    ///
    /// [`TransportError::ConnectionClosed`] if the client end is gone.
    pub async fn send_raw(&self, frame: String) -> Result<(), TransportError> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// Waits for the next event the client emitted. `None` once the client
    /// end is closed. Undecodable frames are skipped.
    pub async fn recv(&mut self) -> Option<ClientEvent> {
        loop {
            let frame = self.rx.recv().await?;
            match codec::decode(&frame) {
                Ok(event) => return Some(event),
                Err(e) => tracing::warn!(err = %e, "loopback peer got malformed frame"),
            }
        }
    }
}
