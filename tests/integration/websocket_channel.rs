// Integration tests use unwrap/expect freely.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_panics_doc,
    clippy::future_not_send
)]

//! The WebSocket transport against a local tokio-tungstenite server.

use std::time::Duration;

use collabflow::channel::websocket::WsConnector;
use collabflow::channel::{ChannelEvent, ChannelState, ReconnectPolicy, SyncChannel, TransportError};
use collabflow::sync::SyncError;
use collabflow_proto::codec;
use collabflow_proto::event::{ClientEvent, EventKind, RoomRef, ServerEvent, TaskMoved};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{StatusCode, header};

/// What the test server saw on one connection.
#[derive(Debug)]
enum Seen {
    Authorization(Option<String>),
    Frame(String),
}

/// Accepts connections whose bearer token equals `expected`. Each accepted
/// connection reports every text frame, and replies to the first one with
/// `reply`.
async fn serve(expected: &'static str, reply: Option<ServerEvent>) -> (String, mpsc::UnboundedReceiver<Seen>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/ws", listener.local_addr().unwrap());
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let seen = tx.clone();
            let reply = reply.clone();
            tokio::spawn(async move {
                let check = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
                    let auth = request
                        .headers()
                        .get(header::AUTHORIZATION)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    let ok = auth.as_deref() == Some(format!("Bearer {expected}").as_str());
                    let _ = seen.send(Seen::Authorization(auth));
                    if ok {
                        Ok(response)
                    } else {
                        let mut refusal = ErrorResponse::new(None);
                        *refusal.status_mut() = StatusCode::UNAUTHORIZED;
                        Err(refusal)
                    }
                };
                let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, check).await else {
                    return;
                };
                let (mut sink, mut source) = ws.split();
                let mut reply = reply;
                while let Some(Ok(message)) = source.next().await {
                    if let Message::Text(text) = message {
                        let _ = seen.send(Seen::Frame(text.as_str().to_string()));
                        if let Some(event) = reply.take() {
                            let frame = codec::encode(&event).unwrap();
                            sink.send(Message::text(frame)).await.unwrap();
                        }
                    }
                }
            });
        }
    });

    (url, rx)
}

async fn next_seen(rx: &mut mpsc::UnboundedReceiver<Seen>) -> Seen {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap()
}

fn moved() -> ServerEvent {
    ServerEvent::TaskMoved(TaskMoved {
        task_id: "t1".into(),
        old_status: "todo".into(),
        new_status: "in_progress".into(),
        room_id: "p1".into(),
        actor_id: Some("u2".into()),
    })
}

#[tokio::test]
async fn connects_with_bearer_joins_and_receives_events() {
    let (url, mut seen) = serve("secret", Some(moved())).await;
    let channel = SyncChannel::new(WsConnector::new(&url).unwrap(), ReconnectPolicy::default());
    let mut tasks = channel.subscribe(&EventKind::TASKS);

    channel.join_room("p1");
    channel.connect("secret").await.unwrap();
    assert_eq!(channel.state(), ChannelState::Connected);

    match next_seen(&mut seen).await {
        Seen::Authorization(auth) => assert_eq!(auth.as_deref(), Some("Bearer secret")),
        other => panic!("expected handshake, got {other:?}"),
    }
    match next_seen(&mut seen).await {
        Seen::Frame(frame) => {
            let event: ClientEvent = codec::decode(&frame).unwrap();
            assert_eq!(event, ClientEvent::JoinRoom(RoomRef { room_id: "p1".into() }));
            assert!(frame.contains(r#""event":"room:join""#));
        }
        other => panic!("expected join frame, got {other:?}"),
    }

    let event = tokio::time::timeout(Duration::from_secs(5), tasks.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event, ChannelEvent::Server(moved()));

    channel.disconnect().await;
    assert_eq!(channel.state(), ChannelState::Disconnected);
}

#[tokio::test]
async fn wrong_credential_is_rejected_at_handshake() {
    let (url, _seen) = serve("secret", None).await;
    let channel = SyncChannel::new(WsConnector::new(&url).unwrap(), ReconnectPolicy::default());

    let result = channel.connect("wrong").await;
    assert!(matches!(
        result,
        Err(SyncError::Transport(TransportError::Rejected(_)))
    ));
    assert_eq!(channel.state(), ChannelState::Disconnected);
}

#[tokio::test]
async fn emits_reach_the_server_as_json_frames() {
    let (url, mut seen) = serve("tok", None).await;
    let channel = SyncChannel::new(WsConnector::new(&url).unwrap(), ReconnectPolicy::default());
    channel.connect("tok").await.unwrap();
    next_seen(&mut seen).await;

    channel.join_room("p1");
    channel.emit(ClientEvent::LeaveRoom(RoomRef { room_id: "p1".into() }));

    let mut frames = Vec::new();
    for _ in 0..2 {
        if let Seen::Frame(frame) = next_seen(&mut seen).await {
            frames.push(codec::decode::<ClientEvent>(&frame).unwrap());
        }
    }
    assert_eq!(
        frames,
        [
            ClientEvent::JoinRoom(RoomRef { room_id: "p1".into() }),
            ClientEvent::LeaveRoom(RoomRef { room_id: "p1".into() }),
        ]
    );
}
