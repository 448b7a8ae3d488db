#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! End-to-end tests: channel events routed through the dispatcher into the
//! stores, with identity and notifications persisted to a [`FileStore`].

mod common;

use std::sync::Arc;
use std::time::Duration;

use party_realtime_client::identity::{PLAYER_ID_KEY, USERNAME_KEY};
use party_realtime_client::notification_store::NOTIFICATION_STORAGE_KEY;
use party_realtime_client::sync::RECONNECT_FAILED_MESSAGE;
use party_realtime_client::{
    bootstrap, ChannelEvent, ConnectionConfig, ConnectionManager, EventDispatcher, EventKind,
    FileStore, KeyValueStore, NewNotification, NotificationType, SessionSync,
};
use serde_json::json;
use tokio::sync::mpsc;

use common::{
    authenticated_json, game_started_json, next_event, notification_json, room_joined_json,
    room_left_json, Attempt, MockConnector,
};

/// Dispatch events until one of `kind` has been handled.
async fn pump_until(
    dispatcher: &mut EventDispatcher,
    events: &mut mpsc::Receiver<ChannelEvent>,
    kind: EventKind,
) {
    loop {
        let event = next_event(events).await;
        dispatcher.dispatch(&event);
        if event.kind() == kind {
            return;
        }
    }
}

#[tokio::test]
async fn session_events_are_mirrored_and_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(FileStore::open(dir.path()).unwrap());
    let stores = bootstrap(storage.clone());
    stores.game.set_username(Some("alice".into()));

    let mut dispatcher = EventDispatcher::new();
    SessionSync::new(&stores).install(&mut dispatcher);

    let (connector, probe) = MockConnector::new(vec![Attempt::Open(vec![
        Some(Ok(authenticated_json("chan-1", Some("p-7")))),
        Some(Ok(room_joined_json(json!({"code": "ABCD", "players": ["alice"]})))),
        Some(Ok(game_started_json(json!({"round": 1})))),
        Some(Ok(notification_json(
            NewNotification::new(NotificationType::Achievement, "First win", "Nice one")
                .with_data(json!({"badge": "rookie"})),
        ))),
    ])]);
    let (mut manager, mut events) =
        ConnectionManager::new(connector, ConnectionConfig::new("ws://party.test"));

    let identity = stores.game.snapshot();
    manager.connect(identity.username.unwrap_or_default(), identity.player_id);

    pump_until(&mut dispatcher, &mut events, EventKind::Notification).await;

    let state = stores.game.snapshot();
    assert!(state.is_connected);
    assert_eq!(state.player_id.as_deref(), Some("p-7"));
    assert_eq!(
        state.current_room.as_ref().and_then(|r| r.code()),
        Some("ABCD")
    );
    assert_eq!(
        state.current_game.as_ref().and_then(|g| g.field("round")),
        Some(&json!(1))
    );
    assert_eq!(stores.notifications.unread_count(), 1);

    // Identity and notifications reached disk.
    assert_eq!(storage.get(PLAYER_ID_KEY).unwrap().as_deref(), Some("p-7"));
    let persisted = storage.get(NOTIFICATION_STORAGE_KEY).unwrap().unwrap();
    assert!(persisted.contains("First win"));

    let sent = probe.sent_messages();
    assert!(matches!(
        &sent[0],
        party_realtime_client::ClientMessage::Authenticate { username, player_id: None }
            if username == "alice"
    ));

    manager.disconnect().await;
    pump_until(&mut dispatcher, &mut events, EventKind::Disconnected).await;
    assert!(!stores.game.snapshot().is_connected);
}

#[tokio::test]
async fn leaving_a_room_clears_room_and_game() {
    let stores = bootstrap(Arc::new(party_realtime_client::MemoryStore::new()));
    let mut dispatcher = EventDispatcher::new();
    SessionSync::new(&stores).install(&mut dispatcher);

    let (connector, _probe) = MockConnector::new(vec![Attempt::Open(vec![
        Some(Ok(room_joined_json(json!({"code": "ABCD"})))),
        Some(Ok(game_started_json(json!({"round": 2})))),
        Some(Ok(room_left_json())),
    ])]);
    let (mut manager, mut events) =
        ConnectionManager::new(connector, ConnectionConfig::new("ws://party.test"));
    manager.connect("alice", None);

    pump_until(&mut dispatcher, &mut events, EventKind::RoomLeft).await;

    let state = stores.game.snapshot();
    assert_eq!(state.current_room, None);
    assert_eq!(state.current_game, None);
    assert!(state.is_connected);

    manager.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn exhausted_reconnection_surfaces_an_error() {
    let stores = bootstrap(Arc::new(party_realtime_client::MemoryStore::new()));
    let mut dispatcher = EventDispatcher::new();
    SessionSync::new(&stores).install(&mut dispatcher);

    let (connector, probe) = MockConnector::new(vec![]);
    let config = ConnectionConfig::new("ws://party.test")
        .with_reconnection_attempts(2)
        .with_reconnection_delay(Duration::from_secs(1));
    let (mut manager, mut events) = ConnectionManager::new(connector, config);

    stores.game.set_loading(true);
    manager.connect("alice", None);
    pump_until(&mut dispatcher, &mut events, EventKind::ReconnectFailed).await;

    let state = stores.game.snapshot();
    assert!(!state.is_connected);
    assert!(!state.is_loading);
    assert_eq!(state.error.as_deref(), Some(RECONNECT_FAILED_MESSAGE));
    assert_eq!(probe.connects(), 3);
}

// ════════════════════════════════════════════════════════════════════
// Persistence across restarts
// ════════════════════════════════════════════════════════════════════

#[test]
fn restart_rehydrates_identity_and_notifications() {
    let dir = tempfile::tempdir().unwrap();

    let kept_id = {
        let stores = bootstrap(Arc::new(FileStore::open(dir.path()).unwrap()));
        stores.game.set_username(Some("alice".into()));
        stores.game.set_player_id(Some("p-1".into()));
        stores.game.set_current_room(Some(party_realtime_client::Room(
            json!({"code": "ABCD"}),
        )));

        let read = stores
            .notifications
            .add_notification(NewNotification::new(NotificationType::Message, "bob", "hey"));
        let kept = stores.notifications.add_notification(NewNotification::new(
            NotificationType::LevelUp,
            "Level 5",
            "You reached level 5",
        ));
        stores.notifications.mark_as_read(&read.id);
        kept.id
    };

    let stores = bootstrap(Arc::new(FileStore::open(dir.path()).unwrap()));
    let state = stores.game.snapshot();
    assert_eq!(state.username.as_deref(), Some("alice"));
    assert_eq!(state.player_id.as_deref(), Some("p-1"));
    // Room and game are session state and start empty.
    assert_eq!(state.current_room, None);
    assert!(!state.is_connected);

    let notifications = stores.notifications.snapshot();
    assert_eq!(notifications.notifications.len(), 2);
    assert_eq!(notifications.unread_count, 1);
    assert_eq!(notifications.notifications[0].id, kept_id);
    assert!(notifications.notifications[1].read);
}

#[test]
fn clearing_username_deletes_the_entry() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(FileStore::open(dir.path()).unwrap());
    let stores = bootstrap(storage.clone());

    stores.game.set_username(Some("alice".into()));
    assert!(dir.path().join(format!("{USERNAME_KEY}.json")).exists());

    stores.game.set_username(None);
    assert_eq!(stores.game.snapshot().username, None);
    assert_eq!(storage.get(USERNAME_KEY).unwrap(), None);
    assert!(!dir.path().join(format!("{USERNAME_KEY}.json")).exists());

    let stores = bootstrap(storage);
    assert_eq!(stores.game.snapshot().username, None);
}

#[test]
fn corrupt_notification_file_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(format!("{NOTIFICATION_STORAGE_KEY}.json")),
        "{\"state\": [truncated",
    )
    .unwrap();

    let stores = bootstrap(Arc::new(FileStore::open(dir.path()).unwrap()));
    let state = stores.notifications.snapshot();
    assert!(state.notifications.is_empty());
    assert_eq!(state.unread_count, 0);

    // The store is still usable and overwrites the bad file.
    stores
        .notifications
        .add_notification(NewNotification::new(NotificationType::System, "hi", "there"));
    let stores = bootstrap(Arc::new(FileStore::open(dir.path()).unwrap()));
    assert_eq!(stores.notifications.unread_count(), 1);
}
