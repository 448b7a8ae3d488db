//! Observable session and game state.
//!
//! [`GameStore`] is the single source of truth the UI renders from. Every
//! setter replaces one field and notifies subscribers; the two identity
//! setters additionally write through to the [`IdentityCache`] before they
//! return.

use tokio::sync::watch;

use crate::identity::IdentityCache;
use crate::protocol::{GameState, Room};

/// Snapshot of the game store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameStoreState {
    pub is_connected: bool,
    pub username: Option<String>,
    pub player_id: Option<String>,
    pub current_room: Option<Room>,
    pub current_game: Option<GameState>,
    pub is_loading: bool,
    pub error: Option<String>,
}

/// Observable store for connection, identity, room and game state.
///
/// Mutations never fail. Share the store behind an `Arc`; all methods take
/// `&self`.
#[derive(Debug)]
pub struct GameStore {
    state: watch::Sender<GameStoreState>,
    identity: IdentityCache,
}

impl GameStore {
    /// Create a store with default state, ignoring anything in the cache.
    pub fn new(identity: IdentityCache) -> Self {
        Self {
            state: watch::Sender::new(GameStoreState::default()),
            identity,
        }
    }

    /// Create a store whose identity fields are read from the cache.
    pub fn hydrate(identity: IdentityCache) -> Self {
        let cached = identity.load();
        tracing::debug!(
            has_username = cached.username.is_some(),
            has_player_id = cached.player_id.is_some(),
            "hydrated game store from identity cache"
        );
        Self {
            state: watch::Sender::new(GameStoreState {
                username: cached.username,
                player_id: cached.player_id,
                ..GameStoreState::default()
            }),
            identity,
        }
    }

    /// A copy of the current state.
    pub fn snapshot(&self) -> GameStoreState {
        self.state.borrow().clone()
    }

    /// Subscribe to state changes. The receiver starts out seeing the current
    /// state as already observed.
    pub fn subscribe(&self) -> watch::Receiver<GameStoreState> {
        self.state.subscribe()
    }

    pub fn set_connected(&self, connected: bool) {
        self.state.send_modify(|s| s.is_connected = connected);
    }

    pub fn set_current_room(&self, room: Option<Room>) {
        self.state.send_modify(|s| s.current_room = room);
    }

    pub fn set_current_game(&self, game: Option<GameState>) {
        self.state.send_modify(|s| s.current_game = game);
    }

    pub fn set_loading(&self, loading: bool) {
        self.state.send_modify(|s| s.is_loading = loading);
    }

    pub fn set_error(&self, error: Option<String>) {
        self.state.send_modify(|s| s.error = error);
    }

    /// Replace the display name and write it through to the identity cache.
    /// `None` or an empty name deletes the cached entry.
    pub fn set_username(&self, username: Option<String>) {
        if let Err(e) = self.identity.store_username(username.as_deref()) {
            tracing::warn!("failed to persist username: {e}");
        }
        self.state.send_modify(|s| s.username = username);
    }

    /// Replace the player identifier and write it through to the identity
    /// cache. `None` or an empty id deletes the cached entry.
    pub fn set_player_id(&self, player_id: Option<String>) {
        if let Err(e) = self.identity.store_player_id(player_id.as_deref()) {
            tracing::warn!("failed to persist player id: {e}");
        }
        self.state.send_modify(|s| s.player_id = player_id);
    }

    /// Clear room, game, loading and error. Identity and the connection flag
    /// are kept.
    pub fn reset(&self) {
        self.state.send_modify(|s| {
            s.current_room = None;
            s.current_game = None;
            s.is_loading = false;
            s.error = None;
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
    use crate::identity::{PLAYER_ID_KEY, USERNAME_KEY};
    use crate::storage::{KeyValueStore, MemoryStore};
    use serde_json::json;
    use std::sync::Arc;

    fn store_with_backing() -> (GameStore, Arc<MemoryStore>) {
        let backing = Arc::new(MemoryStore::new());
        let store = GameStore::hydrate(IdentityCache::new(backing.clone()));
        (store, backing)
    }

    #[test]
    fn starts_with_defaults() {
        let (store, _) = store_with_backing();
        assert_eq!(store.snapshot(), GameStoreState::default());
    }

    #[test]
    fn set_username_writes_through_before_returning() {
        let (store, backing) = store_with_backing();

        store.set_username(Some("alice".into()));
        assert_eq!(store.snapshot().username.as_deref(), Some("alice"));
        assert_eq!(backing.get(USERNAME_KEY).unwrap().as_deref(), Some("alice"));

        store.set_username(None);
        assert_eq!(store.snapshot().username, None);
        assert_eq!(backing.get(USERNAME_KEY).unwrap(), None);
    }

    #[test]
    fn set_player_id_writes_through() {
        let (store, backing) = store_with_backing();

        store.set_player_id(Some("p-7".into()));
        assert_eq!(backing.get(PLAYER_ID_KEY).unwrap().as_deref(), Some("p-7"));

        store.set_player_id(Some(String::new()));
        assert_eq!(backing.get(PLAYER_ID_KEY).unwrap(), None);
    }

    #[test]
    fn identity_survives_restart() {
        let backing = Arc::new(MemoryStore::new());
        {
            let store = GameStore::hydrate(IdentityCache::new(backing.clone()));
            store.set_username(Some("alice".into()));
            store.set_player_id(Some("p-1".into()));
        }

        let restarted = GameStore::hydrate(IdentityCache::new(backing));
        let state = restarted.snapshot();
        assert_eq!(state.username.as_deref(), Some("alice"));
        assert_eq!(state.player_id.as_deref(), Some("p-1"));
        assert!(!state.is_connected);
    }

    #[test]
    fn reset_keeps_identity_and_connection() {
        let (store, _) = store_with_backing();
        store.set_connected(true);
        store.set_username(Some("alice".into()));
        store.set_player_id(Some("p-1".into()));
        store.set_current_room(Some(Room(json!({"code": "ABCD"}))));
        store.set_current_game(Some(GameState(json!({"round": 2}))));
        store.set_loading(true);
        store.set_error(Some("boom".into()));

        store.reset();

        let state = store.snapshot();
        assert!(state.is_connected);
        assert_eq!(state.username.as_deref(), Some("alice"));
        assert_eq!(state.player_id.as_deref(), Some("p-1"));
        assert_eq!(state.current_room, None);
        assert_eq!(state.current_game, None);
        assert!(!state.is_loading);
        assert_eq!(state.error, None);
    }

    #[test]
    fn subscribers_see_changes() {
        let (store, _) = store_with_backing();
        let mut rx = store.subscribe();
        assert!(!rx.has_changed().unwrap());

        store.set_loading(true);
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_loading);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn cache_failure_does_not_block_state_update() {
        struct Broken;
        impl KeyValueStore for Broken {
            fn get(&self, _: &str) -> crate::Result<Option<String>> {
                Err(crate::RealtimeError::Storage("unavailable".into()))
            }
            fn set(&self, _: &str, _: &str) -> crate::Result<()> {
                Err(crate::RealtimeError::Storage("unavailable".into()))
            }
            fn remove(&self, _: &str) -> crate::Result<()> {
                Err(crate::RealtimeError::Storage("unavailable".into()))
            }
        }

        let store = GameStore::hydrate(IdentityCache::new(Arc::new(Broken)));
        store.set_username(Some("alice".into()));
        assert_eq!(store.snapshot().username.as_deref(), Some("alice"));
    }
}
