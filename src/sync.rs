//! Translation of channel events into store mutations, and process bootstrap.
//!
//! ```rust,ignore
//! let stores = bootstrap(Arc::new(FileStore::open(data_dir)?));
//! let mut dispatcher = EventDispatcher::new();
//! SessionSync::new(&stores).install(&mut dispatcher);
//!
//! let (mut manager, events) = ConnectionManager::new(connector, config);
//! let identity = stores.game.snapshot();
//! manager.connect(identity.username.unwrap_or_default(), identity.player_id);
//! dispatcher.run(events).await;
//! ```

use std::sync::Arc;

use crate::dispatch::EventDispatcher;
use crate::event::{ChannelEvent, EventKind};
use crate::game_store::GameStore;
use crate::identity::IdentityCache;
use crate::notification_store::NotificationStore;
use crate::protocol::ServerMessage;
use crate::storage::KeyValueStore;

/// Error shown once automatic reconnection has given up.
pub const RECONNECT_FAILED_MESSAGE: &str = "unable to reach the game server";

/// Both client stores, rehydrated from one storage backend.
#[derive(Debug, Clone)]
pub struct ClientStores {
    pub game: Arc<GameStore>,
    pub notifications: Arc<NotificationStore>,
}

/// Build both stores from `storage`: identity from the identity cache,
/// notifications from the persisted queue.
pub fn bootstrap(storage: Arc<dyn KeyValueStore>) -> ClientStores {
    let game = GameStore::hydrate(IdentityCache::new(Arc::clone(&storage)));
    let notifications = NotificationStore::hydrate(storage);
    ClientStores {
        game: Arc::new(game),
        notifications: Arc::new(notifications),
    }
}

/// Registers the handlers that mirror server state into the stores.
#[derive(Debug, Clone)]
pub struct SessionSync {
    game: Arc<GameStore>,
    notifications: Arc<NotificationStore>,
}

impl SessionSync {
    pub fn new(stores: &ClientStores) -> Self {
        Self {
            game: Arc::clone(&stores.game),
            notifications: Arc::clone(&stores.notifications),
        }
    }

    /// Register one handler per event kind the stores care about.
    pub fn install(&self, dispatcher: &mut EventDispatcher) {
        let game = Arc::clone(&self.game);
        dispatcher.on(EventKind::Connected, move |_| {
            game.set_connected(true);
            game.set_error(None);
        });

        let game = Arc::clone(&self.game);
        dispatcher.on(EventKind::Disconnected, move |_| game.set_connected(false));

        let game = Arc::clone(&self.game);
        dispatcher.on(EventKind::ConnectError, move |event| {
            if let ChannelEvent::ConnectError { message } = event {
                game.set_error(Some(message.clone()));
            }
        });

        let game = Arc::clone(&self.game);
        dispatcher.on(EventKind::ReconnectFailed, move |_| {
            game.set_connected(false);
            game.set_loading(false);
            game.set_error(Some(RECONNECT_FAILED_MESSAGE.into()));
        });

        let game = Arc::clone(&self.game);
        dispatcher.on(EventKind::Authenticated, move |event| {
            if let ChannelEvent::Server(ServerMessage::Authenticated {
                player_id: Some(player_id),
                ..
            }) = event
            {
                game.set_player_id(Some(player_id.clone()));
            }
        });

        for kind in [EventKind::RoomJoined, EventKind::RoomUpdated] {
            let game = Arc::clone(&self.game);
            dispatcher.on(kind, move |event| {
                if let ChannelEvent::Server(
                    ServerMessage::RoomJoined { room } | ServerMessage::RoomUpdated { room },
                ) = event
                {
                    game.set_current_room(Some(room.clone()));
                    game.set_loading(false);
                }
            });
        }

        let game = Arc::clone(&self.game);
        dispatcher.on(EventKind::RoomLeft, move |_| {
            game.set_current_room(None);
            game.set_current_game(None);
        });

        for kind in [
            EventKind::GameStarted,
            EventKind::GameUpdated,
            EventKind::GameEnded,
        ] {
            let game = Arc::clone(&self.game);
            dispatcher.on(kind, move |event| {
                if let ChannelEvent::Server(
                    ServerMessage::GameStarted { game: state }
                    | ServerMessage::GameUpdated { game: state }
                    | ServerMessage::GameEnded { game: state },
                ) = event
                {
                    game.set_current_game(Some(state.clone()));
                }
            });
        }

        let notifications = Arc::clone(&self.notifications);
        dispatcher.on(EventKind::Notification, move |event| {
            if let ChannelEvent::Server(ServerMessage::Notification(payload)) = event {
                notifications.add_notification(payload.clone());
            }
        });

        let game = Arc::clone(&self.game);
        dispatcher.on(EventKind::ServerError, move |event| {
            if let ChannelEvent::Server(ServerMessage::Error { message, .. }) = event {
                game.set_error(Some(message.clone()));
                game.set_loading(false);
            }
        });
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::identity::PLAYER_ID_KEY;
    use crate::protocol::{GameState, NewNotification, NotificationType, Room};
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn setup() -> (ClientStores, EventDispatcher, Arc<MemoryStore>) {
        let backing = Arc::new(MemoryStore::new());
        let stores = bootstrap(backing.clone());
        let mut dispatcher = EventDispatcher::new();
        SessionSync::new(&stores).install(&mut dispatcher);
        (stores, dispatcher, backing)
    }

    fn server(msg: ServerMessage) -> ChannelEvent {
        ChannelEvent::Server(msg)
    }

    #[test]
    fn connection_lifecycle_drives_connected_flag() {
        let (stores, mut dispatcher, _) = setup();

        dispatcher.dispatch(&ChannelEvent::ConnectError {
            message: "refused".into(),
        });
        assert_eq!(stores.game.snapshot().error.as_deref(), Some("refused"));

        dispatcher.dispatch(&ChannelEvent::Connected);
        let state = stores.game.snapshot();
        assert!(state.is_connected);
        assert_eq!(state.error, None);

        dispatcher.dispatch(&ChannelEvent::Disconnected { reason: None });
        assert!(!stores.game.snapshot().is_connected);

        dispatcher.dispatch(&ChannelEvent::ReconnectFailed);
        assert_eq!(
            stores.game.snapshot().error.as_deref(),
            Some(RECONNECT_FAILED_MESSAGE)
        );
    }

    #[test]
    fn authenticated_player_id_is_written_through() {
        let (stores, mut dispatcher, backing) = setup();
        dispatcher.dispatch(&server(ServerMessage::Authenticated {
            channel_id: "c-1".into(),
            player_id: Some("p-9".into()),
        }));
        assert_eq!(stores.game.snapshot().player_id.as_deref(), Some("p-9"));
        assert_eq!(backing.get(PLAYER_ID_KEY).unwrap().as_deref(), Some("p-9"));
    }

    #[test]
    fn room_and_game_events_are_mirrored() {
        let (stores, mut dispatcher, _) = setup();
        stores.game.set_loading(true);

        let room = Room(json!({"code": "ABCD", "players": ["alice"]}));
        dispatcher.dispatch(&server(ServerMessage::RoomJoined { room: room.clone() }));
        let state = stores.game.snapshot();
        assert_eq!(state.current_room, Some(room));
        assert!(!state.is_loading);

        let updated = Room(json!({"code": "ABCD", "players": ["alice", "bob"]}));
        dispatcher.dispatch(&server(ServerMessage::RoomUpdated {
            room: updated.clone(),
        }));
        assert_eq!(stores.game.snapshot().current_room, Some(updated));

        let game = GameState(json!({"round": 1}));
        dispatcher.dispatch(&server(ServerMessage::GameStarted { game: game.clone() }));
        assert_eq!(stores.game.snapshot().current_game, Some(game));

        let finished = GameState(json!({"round": 3, "winner": "bob"}));
        dispatcher.dispatch(&server(ServerMessage::GameEnded {
            game: finished.clone(),
        }));
        assert_eq!(stores.game.snapshot().current_game, Some(finished));

        dispatcher.dispatch(&server(ServerMessage::RoomLeft));
        let state = stores.game.snapshot();
        assert_eq!(state.current_room, None);
        assert_eq!(state.current_game, None);
    }

    #[test]
    fn pushed_notifications_land_in_the_queue() {
        let (stores, mut dispatcher, _) = setup();
        dispatcher.dispatch(&server(ServerMessage::Notification(
            NewNotification::new(NotificationType::FriendRequest, "bob", "wants to be friends")
                .with_actionable(true),
        )));

        let state = stores.notifications.snapshot();
        assert_eq!(state.unread_count, 1);
        assert_eq!(state.notifications[0].kind, NotificationType::FriendRequest);
        assert_eq!(state.notifications[0].actionable, Some(true));
    }

    #[test]
    fn server_error_sets_error_and_clears_loading() {
        let (stores, mut dispatcher, _) = setup();
        stores.game.set_loading(true);
        dispatcher.dispatch(&server(ServerMessage::Error {
            message: "room is full".into(),
            code: Some("ROOM_FULL".into()),
        }));
        let state = stores.game.snapshot();
        assert_eq!(state.error.as_deref(), Some("room is full"));
        assert!(!state.is_loading);
    }

    #[test]
    fn bootstrap_rehydrates_both_stores() {
        let backing = Arc::new(MemoryStore::new());
        {
            let stores = bootstrap(backing.clone());
            stores.game.set_username(Some("alice".into()));
            stores
                .notifications
                .add_notification(NewNotification::new(NotificationType::System, "hi", "there"));
        }

        let stores = bootstrap(backing);
        assert_eq!(stores.game.snapshot().username.as_deref(), Some("alice"));
        assert_eq!(stores.notifications.unread_count(), 1);
    }
}
