//! WebSocket transport.
//!
//! Dials `ws://` or `wss://` with an `Authorization: Bearer <token>`
//! header, splits the stream, and runs a background reader that forwards
//! text frames. Binary frames are not part of the protocol and are skipped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, header};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use super::{Connector, Transport, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;
type WsSender = futures_util::stream::SplitSink<WsStream, Message>;
type WsReader = futures_util::stream::SplitStream<WsStream>;

/// Default time allowed for the WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Inbound frame buffer between the reader task and `recv`.
const INCOMING_BUFFER: usize = 256;

/// Dials a board server over WebSocket.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: Url,
    connect_timeout: Duration,
}

impl WsConnector {
    /// Creates a connector for `url`.
    ///
    /// # Errors
    ///
    /// [`TransportError::Rejected`] unless `url` parses as a `ws`/`wss` URL.
    pub fn new(url: &str) -> Result<Self, TransportError> {
        let url = Url::parse(url).map_err(|e| TransportError::Rejected(format!("{url}: {e}")))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(TransportError::Rejected(format!(
                "unsupported scheme {}",
                url.scheme()
            )));
        }
        Ok(Self {
            url,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        })
    }

    /// Overrides the handshake timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Server URL.
    #[must_use]
    pub fn url(&self) -> &str {
        self.url.as_str()
    }
}

impl Connector for WsConnector {
    type Conn = WsTransport;

    async fn connect(&self, token: &str) -> Result<WsTransport, TransportError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Rejected(e.to_string()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| TransportError::Rejected("credential is not a valid header value".into()))?;
        request.headers_mut().insert(header::AUTHORIZATION, bearer);

        let (stream, _response) = tokio::time::timeout(self.connect_timeout, connect_async(request))
            .await
            .map_err(|_| {
                tracing::warn!(url = %self.url, "WebSocket connect timed out");
                TransportError::Timeout
            })?
            .map_err(|e| {
                tracing::warn!(url = %self.url, err = %e, "WebSocket connect failed");
                map_connect_error(e)
            })?;

        let (sender, reader) = stream.split();
        let (tx, rx) = mpsc::channel(INCOMING_BUFFER);
        let connected = Arc::new(AtomicBool::new(true));
        let reader_handle = tokio::spawn(reader_loop(reader, tx, Arc::clone(&connected)));
        tracing::info!(url = %self.url, "WebSocket connected");

        Ok(WsTransport {
            sender: Mutex::new(sender),
            incoming: Mutex::new(rx),
            connected,
            reader_handle,
        })
    }
}

/// A live WebSocket connection.
pub struct WsTransport {
    sender: Mutex<WsSender>,
    incoming: Mutex<mpsc::Receiver<String>>,
    connected: Arc<AtomicBool>,
    reader_handle: tokio::task::JoinHandle<()>,
}

impl Transport for WsTransport {
    async fn send(&self, frame: String) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::Relaxed) {
            return Err(TransportError::ConnectionClosed);
        }
        let mut sender = self.sender.lock().await;
        sender.send(Message::text(frame)).await.map_err(|e| {
            tracing::warn!(err = %e, "WebSocket send failed");
            self.connected.store(false, Ordering::Relaxed);
            TransportError::ConnectionClosed
        })
    }

    async fn recv(&self) -> Result<String, TransportError> {
        let mut rx = self.incoming.lock().await;
        rx.recv().await.ok_or(TransportError::ConnectionClosed)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.reader_handle.abort();
    }
}

/// Forwards text frames until the socket closes or errors.
async fn reader_loop(mut reader: WsReader, tx: mpsc::Sender<String>, connected: Arc<AtomicBool>) {
    while let Some(message) = reader.next().await {
        match message {
            Ok(Message::Text(text)) => {
                if tx.send(text.as_str().to_owned()).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) => {
                tracing::info!("WebSocket closed by server");
                break;
            }
            Ok(Message::Binary(data)) => {
                tracing::debug!(len = data.len(), "ignoring binary frame");
            }
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
            Err(e) => {
                tracing::warn!(err = %e, "WebSocket read error");
                break;
            }
        }
    }
    connected.store(false, Ordering::Relaxed);
    tracing::debug!("WebSocket reader exiting");
}

fn map_connect_error(err: tokio_tungstenite::tungstenite::Error) -> TransportError {
    use tokio_tungstenite::tungstenite::Error as WsError;
    match err {
        WsError::Io(io) => match io.kind() {
            std::io::ErrorKind::ConnectionRefused | std::io::ErrorKind::AddrNotAvailable => {
                TransportError::Unreachable(io.to_string())
            }
            _ => TransportError::Io(io),
        },
        WsError::Http(response) => {
            TransportError::Rejected(format!("HTTP status {}", response.status()))
        }
        other => TransportError::Rejected(other.to_string()),
    }
}
