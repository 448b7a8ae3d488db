#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Integration tests for the connection manager.
//!
//! Uses the scripted `MockConnector` from `tests/common` to verify the
//! handshake, handle reuse, reconnection policy and event delivery.

mod common;

use std::time::Duration;

use party_realtime_client::{
    ChannelEvent, ClientMessage, ConnectionConfig, ConnectionManager, ConnectionStatus,
    RealtimeError, ServerMessage,
};
use serde_json::json;

use common::{authenticated_json, error_json, next_event, Attempt, MockConnector};

fn config() -> ConnectionConfig {
    ConnectionConfig::new("ws://party.test")
        .with_reconnection_attempts(3)
        .with_reconnection_delay(Duration::from_millis(250))
}

// ════════════════════════════════════════════════════════════════════
// Handshake and handle reuse
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn connect_twice_while_connected_returns_same_handle() {
    let (connector, probe) = MockConnector::new(vec![Attempt::Open(vec![Some(Ok(
        authenticated_json("chan-1", Some("p-1")),
    ))])]);
    let (mut manager, mut events) = ConnectionManager::new(connector, config());

    let first = manager.connect("alice", Some("p-1".into()));
    assert_eq!(next_event(&mut events).await, ChannelEvent::Connecting { attempt: 0 });
    assert_eq!(next_event(&mut events).await, ChannelEvent::Connected);
    let _ = next_event(&mut events).await; // Authenticated

    assert!(manager.is_connected());
    let second = manager.connect("alice", Some("p-1".into()));

    assert!(first.same_channel(&second));
    assert_eq!(second.channel_id().as_deref(), Some("chan-1"));
    assert_eq!(probe.connects(), 1);
    assert_eq!(probe.handshakes(), 1);

    manager.disconnect().await;
}

#[tokio::test]
async fn handshake_carries_username_and_player_id() {
    let (connector, probe) = MockConnector::new(vec![Attempt::Open(vec![])]);
    let (mut manager, mut events) = ConnectionManager::new(connector, config());

    manager.connect("bob", None);
    let _ = next_event(&mut events).await; // Connecting
    let _ = next_event(&mut events).await; // Connected

    assert_eq!(
        probe.sent_messages(),
        vec![ClientMessage::Authenticate {
            username: "bob".into(),
            player_id: None,
        }]
    );

    manager.disconnect().await;
}

#[tokio::test]
async fn connect_returns_before_transport_is_up() {
    let (connector, _probe) = MockConnector::new(vec![Attempt::Open(vec![])]);
    let (mut manager, mut events) = ConnectionManager::new(connector, config());

    let handle = manager.connect("alice", None);
    assert_eq!(handle.status(), ConnectionStatus::Connecting);
    assert!(!manager.is_connected());

    let mut status = handle.watch_status();
    let _ = next_event(&mut events).await; // Connecting
    let _ = next_event(&mut events).await; // Connected
    status
        .wait_for(|s| *s == ConnectionStatus::Connected)
        .await
        .unwrap();
    assert!(manager.is_connected());

    manager.disconnect().await;
}

// ════════════════════════════════════════════════════════════════════
// Commands and server messages
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn commands_queued_while_connecting_follow_the_handshake() {
    let (connector, probe) = MockConnector::new(vec![Attempt::Open(vec![])]);
    let (mut manager, mut events) = ConnectionManager::new(connector, config());

    let handle = manager.connect("alice", None);
    handle.join_room("ABCD").unwrap();
    handle.send_game_action(json!({"vote": 2})).unwrap();

    let _ = next_event(&mut events).await; // Connecting
    let _ = next_event(&mut events).await; // Connected
    handle.ping().unwrap();

    // Let the channel task drain the command queue.
    for _ in 0..50 {
        if probe.sent_messages().len() == 4 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let sent = probe.sent_messages();
    assert!(matches!(sent[0], ClientMessage::Authenticate { .. }));
    assert_eq!(
        sent[1],
        ClientMessage::JoinRoom {
            room_code: "ABCD".into()
        }
    );
    assert_eq!(
        sent[2],
        ClientMessage::GameAction {
            action: json!({"vote": 2})
        }
    );
    assert_eq!(sent[3], ClientMessage::Ping);

    manager.disconnect().await;
}

#[tokio::test]
async fn server_messages_arrive_in_order_and_malformed_ones_are_skipped() {
    let (connector, _probe) = MockConnector::new(vec![Attempt::Open(vec![
        Some(Ok(authenticated_json("chan-1", None))),
        Some(Ok("{not json".into())),
        Some(Ok(error_json("room is full"))),
        Some(Ok(r#"{"type":"pong"}"#.into())),
    ])]);
    let (mut manager, mut events) = ConnectionManager::new(connector, config());

    manager.connect("alice", None);
    let _ = next_event(&mut events).await; // Connecting
    let _ = next_event(&mut events).await; // Connected

    assert!(matches!(
        next_event(&mut events).await,
        ChannelEvent::Server(ServerMessage::Authenticated { .. })
    ));
    assert_eq!(
        next_event(&mut events).await,
        ChannelEvent::Server(ServerMessage::Error {
            message: "room is full".into(),
            code: None,
        })
    );
    assert_eq!(
        next_event(&mut events).await,
        ChannelEvent::Server(ServerMessage::Pong)
    );

    manager.disconnect().await;
}

// ════════════════════════════════════════════════════════════════════
// Reconnection policy
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn connect_errors_are_reported_not_returned() {
    let (connector, probe) = MockConnector::new(vec![]);
    let (mut manager, mut events) = ConnectionManager::new(connector, config());

    let handle = manager.connect("alice", None);

    let mut errors = 0;
    loop {
        match next_event(&mut events).await {
            ChannelEvent::ConnectError { message } => {
                assert!(message.contains("connection refused"));
                errors += 1;
            }
            ChannelEvent::ReconnectFailed => break,
            ChannelEvent::Connecting { .. } => {}
            other => panic!("unexpected event {other:?}"),
        }
    }

    assert_eq!(errors, 4);
    assert_eq!(probe.connects(), 4);
    assert_eq!(handle.status(), ConnectionStatus::Disconnected);
    assert!(matches!(
        handle.create_room(),
        Err(RealtimeError::NotConnected)
    ));
}

#[tokio::test(start_paused = true)]
async fn reconnects_after_transport_error() {
    let (connector, probe) = MockConnector::new(vec![
        Attempt::Open(vec![Some(Err(RealtimeError::TransportReceive(
            "reset by peer".into(),
        )))]),
        Attempt::Refuse,
        Attempt::Open(vec![Some(Ok(authenticated_json("chan-2", None)))]),
    ]);
    let (mut manager, mut events) = ConnectionManager::new(connector, config());

    let handle = manager.connect("alice", None);
    assert_eq!(next_event(&mut events).await, ChannelEvent::Connecting { attempt: 0 });
    assert_eq!(next_event(&mut events).await, ChannelEvent::Connected);
    assert!(matches!(
        next_event(&mut events).await,
        ChannelEvent::Disconnected { reason: Some(reason) } if reason.contains("reset by peer")
    ));
    assert_eq!(next_event(&mut events).await, ChannelEvent::Connecting { attempt: 1 });
    assert!(matches!(
        next_event(&mut events).await,
        ChannelEvent::ConnectError { .. }
    ));
    assert_eq!(next_event(&mut events).await, ChannelEvent::Connecting { attempt: 2 });
    assert_eq!(next_event(&mut events).await, ChannelEvent::Connected);
    let _ = next_event(&mut events).await; // Authenticated

    assert!(handle.is_connected());
    assert_eq!(handle.channel_id().as_deref(), Some("chan-2"));
    assert_eq!(probe.handshakes(), 2);

    manager.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn zero_attempts_disables_reconnection() {
    let (connector, probe) = MockConnector::new(vec![Attempt::Open(vec![None])]);
    let config = config().with_reconnection_attempts(0);
    let (mut manager, mut events) = ConnectionManager::new(connector, config);

    manager.connect("alice", None);
    let _ = next_event(&mut events).await; // Connecting
    let _ = next_event(&mut events).await; // Connected
    assert_eq!(
        next_event(&mut events).await,
        ChannelEvent::Disconnected { reason: None }
    );
    assert_eq!(next_event(&mut events).await, ChannelEvent::ReconnectFailed);
    assert_eq!(probe.connects(), 1);
    assert!(!manager.is_connected());
}

// ════════════════════════════════════════════════════════════════════
// Disconnect
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn disconnect_closes_transport_once() {
    let (connector, probe) = MockConnector::new(vec![Attempt::Open(vec![])]);
    let (mut manager, mut events) = ConnectionManager::new(connector, config());

    manager.connect("alice", None);
    let _ = next_event(&mut events).await; // Connecting
    let _ = next_event(&mut events).await; // Connected

    manager.disconnect().await;
    manager.disconnect().await;

    assert_eq!(probe.closes(), 1);
    assert!(manager.handle().is_none());
    assert!(matches!(
        next_event(&mut events).await,
        ChannelEvent::Disconnected { reason: Some(_) }
    ));
}

#[tokio::test]
async fn disconnect_without_handle_is_a_no_op() {
    let (connector, probe) = MockConnector::new(vec![]);
    let (mut manager, _events) = ConnectionManager::new(connector, config());

    manager.disconnect().await;
    assert!(manager.handle().is_none());
    assert_eq!(probe.connects(), 0);
}

#[tokio::test]
async fn connect_after_disconnect_opens_a_new_channel() {
    let (connector, probe) =
        MockConnector::new(vec![Attempt::Open(vec![]), Attempt::Open(vec![])]);
    let (mut manager, mut events) = ConnectionManager::new(connector, config());

    let first = manager.connect("alice", None);
    let _ = next_event(&mut events).await; // Connecting
    let _ = next_event(&mut events).await; // Connected
    manager.disconnect().await;
    let _ = next_event(&mut events).await; // Disconnected

    let second = manager.connect("alice", None);
    assert!(!first.same_channel(&second));
    let _ = next_event(&mut events).await; // Connecting
    let _ = next_event(&mut events).await; // Connected

    assert_eq!(probe.connects(), 2);
    assert_eq!(probe.handshakes(), 2);

    manager.disconnect().await;
}
