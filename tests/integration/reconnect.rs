// Integration tests use unwrap/expect freely.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_panics_doc,
    clippy::future_not_send
)]

//! Reconnection after a dropped connection.
//!
//! Dropping the server-side `LoopbackPeer` closes the connection the same
//! way a network drop would. The policy uses a 10 ms delay to keep the
//! tests fast.

use std::time::Duration;

use collabflow::channel::bus::Subscription;
use collabflow::channel::loopback::{LoopbackConnector, LoopbackServer};
use collabflow::channel::{
    ChannelEvent, ChannelSignal, ChannelState, ReconnectPolicy, SyncChannel,
};
use collabflow_proto::event::{ClientEvent, EventKind, RoomRef, ServerEvent, TaskDeleted};

const POLICY: ReconnectPolicy = ReconnectPolicy {
    max_attempts: 3,
    delay: Duration::from_millis(10),
};

fn setup() -> (SyncChannel<LoopbackConnector>, LoopbackConnector, LoopbackServer) {
    let (connector, server) = LoopbackConnector::pair();
    let dialer = connector.clone();
    (SyncChannel::new(connector, POLICY), dialer, server)
}

async fn next_signal(sub: &mut Subscription) -> ChannelSignal {
    let event = tokio::time::timeout(Duration::from_secs(5), sub.recv())
        .await
        .expect("timed out waiting for a signal")
        .expect("bus closed");
    match event {
        ChannelEvent::Signal(signal) => signal,
        other => panic!("expected a signal, got {other:?}"),
    }
}

#[tokio::test]
async fn reconnects_with_same_credential_and_rejoins() {
    let (channel, dialer, mut server) = setup();
    let mut signals = channel.subscribe(&[EventKind::Connection]);
    channel.join_room("p1");
    channel.connect("secret").await.unwrap();
    assert_eq!(next_signal(&mut signals).await, ChannelSignal::Connected);

    let mut first = server.accept().await.unwrap();
    assert_eq!(
        first.recv().await,
        Some(ClientEvent::JoinRoom(RoomRef { room_id: "p1".into() }))
    );
    drop(first);

    assert_eq!(
        next_signal(&mut signals).await,
        ChannelSignal::Reconnecting {
            attempt: 1,
            max_attempts: 3
        }
    );
    assert_eq!(next_signal(&mut signals).await, ChannelSignal::Reconnected);
    assert_eq!(channel.state(), ChannelState::Connected);

    let mut second = server.accept().await.unwrap();
    assert_eq!(second.token(), "secret");
    assert_eq!(
        second.recv().await,
        Some(ClientEvent::JoinRoom(RoomRef { room_id: "p1".into() }))
    );
    assert_eq!(dialer.tokens_seen(), ["secret", "secret"]);

    // The new connection carries events again.
    let mut tasks = channel.subscribe(&EventKind::TASKS);
    let deleted = ServerEvent::TaskDeleted(TaskDeleted {
        task_id: "t1".into(),
        room_id: "p1".into(),
        actor_id: None,
    });
    second.send(&deleted).await.unwrap();
    let event = tokio::time::timeout(Duration::from_secs(5), tasks.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event, ChannelEvent::Server(deleted));
}

#[tokio::test]
async fn recovers_after_failed_attempts() {
    let (channel, dialer, mut server) = setup();
    let mut signals = channel.subscribe(&[EventKind::Connection]);
    channel.connect("tok").await.unwrap();
    assert_eq!(next_signal(&mut signals).await, ChannelSignal::Connected);

    dialer.refuse_next(2);
    drop(server.accept().await.unwrap());

    for attempt in 1..=3 {
        assert_eq!(
            next_signal(&mut signals).await,
            ChannelSignal::Reconnecting {
                attempt,
                max_attempts: 3
            }
        );
    }
    assert_eq!(next_signal(&mut signals).await, ChannelSignal::Reconnected);
    assert!(server.accept().await.is_some());
}

#[tokio::test]
async fn gives_up_after_max_attempts() {
    let (channel, dialer, mut server) = setup();
    let mut signals = channel.subscribe(&[EventKind::Connection]);
    channel.connect("tok").await.unwrap();
    assert_eq!(next_signal(&mut signals).await, ChannelSignal::Connected);

    dialer.refuse_all(true);
    drop(server.accept().await.unwrap());

    for _ in 0..3 {
        assert!(matches!(
            next_signal(&mut signals).await,
            ChannelSignal::Reconnecting { .. }
        ));
    }
    assert_eq!(next_signal(&mut signals).await, ChannelSignal::ConnectivityLost);
    assert_eq!(channel.state(), ChannelState::Disconnected);
    assert_eq!(dialer.tokens_seen().len(), 4);

    // Emitting after giving up is silently dropped.
    channel.emit(ClientEvent::LeaveRoom(RoomRef { room_id: "p1".into() }));

    // A fresh connect works once the server is reachable again.
    dialer.refuse_all(false);
    channel.connect("tok").await.unwrap();
    assert_eq!(channel.state(), ChannelState::Connected);
    assert_eq!(next_signal(&mut signals).await, ChannelSignal::Connected);
}

#[tokio::test]
async fn disconnect_during_reconnect_stops_the_supervisor() {
    let (connector, mut server) = LoopbackConnector::pair();
    let dialer = connector.clone();
    let channel = SyncChannel::new(
        connector,
        ReconnectPolicy {
            max_attempts: 50,
            delay: Duration::from_millis(20),
        },
    );
    let mut signals = channel.subscribe(&[EventKind::Connection]);
    channel.connect("tok").await.unwrap();
    assert_eq!(next_signal(&mut signals).await, ChannelSignal::Connected);

    dialer.refuse_all(true);
    drop(server.accept().await.unwrap());
    assert!(matches!(
        next_signal(&mut signals).await,
        ChannelSignal::Reconnecting { attempt: 1, .. }
    ));

    tokio::time::timeout(Duration::from_secs(5), channel.disconnect())
        .await
        .unwrap();
    assert_eq!(channel.state(), ChannelState::Disconnected);
}

#[tokio::test]
async fn concurrent_connects_dial_once() {
    let (channel, dialer, mut server) = setup();
    let (first, second) = tokio::join!(channel.connect("secret"), channel.connect("secret"));
    first.unwrap();
    second.unwrap();
    assert_eq!(channel.state(), ChannelState::Connected);
    assert_eq!(dialer.tokens_seen(), ["secret"]);

    let _peer = server.accept().await.unwrap();
    let extra = tokio::time::timeout(Duration::from_millis(50), server.accept()).await;
    assert!(extra.is_err(), "a second connection was dialed");
}
