//! # Party Realtime Client
//!
//! Client-side real-time layer for a multiplayer party game.
//!
//! The crate keeps one bidirectional event channel to the game server and
//! mirrors what the server pushes into two observable stores:
//!
//! - [`ConnectionManager`]: opens, monitors and tears down the channel, with
//!   bounded automatic reconnection; delivers [`ChannelEvent`]s in arrival order
//! - [`GameStore`]: connection flag, identity, current room and game, loading
//!   and error state; identity writes through to the [`IdentityCache`]
//! - [`NotificationStore`]: persisted newest-first notification queue whose
//!   unread count is recomputed after every mutation
//! - [`EventDispatcher`] and [`SessionSync`]: route channel events into the
//!   stores through an explicit event-kind → handler table
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! let stores = bootstrap(Arc::new(FileStore::open("./data")?));
//! let mut dispatcher = EventDispatcher::new();
//! SessionSync::new(&stores).install(&mut dispatcher);
//!
//! let (mut manager, events) =
//!     ConnectionManager::new(WebSocketConnector::new(), ConnectionConfig::from_env());
//! let identity = stores.game.snapshot();
//! manager.connect(identity.username.unwrap_or_default(), identity.player_id);
//!
//! dispatcher.run(events).await;
//! ```

pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod game_store;
pub mod identity;
pub mod notification_store;
pub mod protocol;
pub mod storage;
pub mod sync;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use config::ConnectionConfig;
pub use connection::{ChannelHandle, ConnectionManager, ConnectionStatus};
pub use dispatch::EventDispatcher;
pub use error::{RealtimeError, Result};
pub use event::{ChannelEvent, EventKind};
pub use game_store::{GameStore, GameStoreState};
pub use identity::{CachedIdentity, IdentityCache};
pub use notification_store::{Notification, NotificationStore, NotificationStoreState};
pub use protocol::{
    ClientMessage, GameState, NewNotification, NotificationType, Room, ServerMessage,
};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use sync::{bootstrap, ClientStores, SessionSync};
pub use transport::{Connector, Transport};

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
