//! # Party Session Example
//!
//! Runs the full client stack against a live game server:
//!
//! 1. Rehydrate the game and notification stores from `./party-data`
//! 2. Open the event channel with the cached identity
//! 3. Create a room once the channel is up
//! 4. Mirror every server event into the stores and log the changes
//! 5. Shut down on Ctrl+C
//!
//! ## Running
//!
//! ```sh
//! # Start a game server on localhost:3001, then:
//! cargo run --example party_session -- alice
//!
//! # Override the server URL:
//! PARTY_SERVER_URL=ws://my-server:3001 cargo run --example party_session -- alice
//! ```

use std::sync::Arc;
use std::time::Duration;

use party_realtime_client::{
    bootstrap, ConnectionConfig, ConnectionManager, EventDispatcher, EventKind, FileStore,
    SessionSync, WebSocketConnector,
};

const DATA_DIR: &str = "./party-data";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Stores ──────────────────────────────────────────────────────
    let stores = bootstrap(Arc::new(FileStore::open(DATA_DIR)?));
    if let Some(name) = std::env::args().nth(1) {
        stores.game.set_username(Some(name));
    }
    let identity = stores.game.snapshot();
    let Some(username) = identity.username else {
        tracing::error!("no cached username; pass one as the first argument");
        return Ok(());
    };
    tracing::info!(
        "Loaded {} notification(s), {} unread",
        stores.notifications.snapshot().notifications.len(),
        stores.notifications.unread_count()
    );

    // ── Connect ─────────────────────────────────────────────────────
    let config = ConnectionConfig::from_env();
    tracing::info!("Connecting to {}", config.server_url);
    let connector = WebSocketConnector::new().with_handshake_timeout(Duration::from_secs(10));
    let (mut manager, mut events) = ConnectionManager::new(connector, config);
    let handle = manager.connect(username, identity.player_id);

    let mut dispatcher = EventDispatcher::new();
    SessionSync::new(&stores).install(&mut dispatcher);

    // Ask for a room the first time the channel comes up.
    let room_handle = handle.clone();
    let mut requested = false;
    dispatcher.on(EventKind::Connected, move |_| {
        if !requested {
            requested = true;
            if let Err(e) = room_handle.create_room() {
                tracing::warn!("create_room failed: {e}");
            }
        }
    });

    // ── Observe ─────────────────────────────────────────────────────
    let mut game_rx = stores.game.subscribe();
    let mut notif_rx = stores.notifications.subscribe();

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    tracing::info!("Event channel closed, exiting");
                    break;
                };
                tracing::debug!("Event: {event:?}");
                dispatcher.dispatch(&event);
                if event.kind() == EventKind::ReconnectFailed {
                    break;
                }
            }

            Ok(()) = game_rx.changed() => {
                let state = game_rx.borrow_and_update().clone();
                let room = state.current_room.as_ref().and_then(|r| r.code()).unwrap_or("-");
                tracing::info!(
                    "Game: connected={} room={room} in_game={} error={:?}",
                    state.is_connected,
                    state.current_game.is_some(),
                    state.error
                );
            }

            Ok(()) = notif_rx.changed() => {
                let unread = notif_rx.borrow_and_update().unread_count;
                tracing::info!("Notifications: {unread} unread");
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, shutting down…");
                break;
            }
        }
    }

    // ── Cleanup ─────────────────────────────────────────────────────
    manager.disconnect().await;
    tracing::info!("Disconnected. Goodbye!");
    Ok(())
}
