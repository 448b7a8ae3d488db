//! Wire types exchanged with the game server.
//!
//! Every message is a JSON object tagged as `{"type": "...", "data": {...}}`.
//! Variant names are `snake_case`, field names are `camelCase`. Rooms and
//! game states are owned by the server's game logic, so the client carries
//! them as opaque JSON documents.

use serde::{Deserialize, Serialize};

// ── Opaque server DTOs ──────────────────────────────────────────────

/// A room as described by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Room(pub serde_json::Value);

impl Room {
    /// Look up a top-level field of the room document.
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.0.get(name)
    }

    /// The room code, if the server included one under `code`.
    pub fn code(&self) -> Option<&str> {
        self.field("code").and_then(serde_json::Value::as_str)
    }
}

/// A game state snapshot as described by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameState(pub serde_json::Value);

impl GameState {
    /// Look up a top-level field of the game document.
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.0.get(name)
    }
}

// ── Notifications ───────────────────────────────────────────────────

/// Kind of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    FriendRequest,
    FriendAccepted,
    GameInvitation,
    Message,
    Achievement,
    LevelUp,
    System,
}

/// Payload for creating a notification, either locally or from a server push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNotification {
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actionable: Option<bool>,
}

impl NewNotification {
    pub fn new(
        kind: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            title: title.into(),
            message: message.into(),
            data: None,
            actionable: None,
        }
    }

    /// Attach an arbitrary payload for the UI (e.g. an invitation's room code).
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Mark the notification as one the user can act on (accept, decline, …).
    #[must_use]
    pub fn with_actionable(mut self, actionable: bool) -> Self {
        self.actionable = Some(actionable);
        self
    }
}

// ── Messages ────────────────────────────────────────────────────────

/// Message types sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    /// Auth handshake. Always the first message on a fresh transport.
    Authenticate {
        username: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player_id: Option<String>,
    },
    /// Ask the server to create a room and join it.
    CreateRoom,
    /// Join an existing room by code.
    JoinRoom { room_code: String },
    /// Leave the current room.
    LeaveRoom,
    /// Ask the server to start the game in the current room.
    StartGame,
    /// An in-game action; its shape is defined by the game rules.
    GameAction { action: serde_json::Value },
    /// Heartbeat.
    Ping,
}

/// Message types sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    /// Handshake accepted.
    Authenticated {
        /// Opaque identifier of this channel on the server.
        channel_id: String,
        /// Player identifier assigned (or confirmed) by the server.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player_id: Option<String>,
    },
    /// The client joined a room.
    RoomJoined { room: Room },
    /// Membership or settings of the current room changed.
    RoomUpdated { room: Room },
    /// The client is no longer in a room.
    RoomLeft,
    /// A game started in the current room.
    GameStarted { game: GameState },
    /// The current game advanced.
    GameUpdated { game: GameState },
    /// The current game finished; carries the final state.
    GameEnded { game: GameState },
    /// A notification pushed to this player.
    Notification(NewNotification),
    /// Application-level error reported by the server.
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
    /// Reply to [`ClientMessage::Ping`].
    Pong,
}

impl ServerMessage {
    /// The wire name of this message's `type` tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Authenticated { .. } => "authenticated",
            Self::RoomJoined { .. } => "room_joined",
            Self::RoomUpdated { .. } => "room_updated",
            Self::RoomLeft => "room_left",
            Self::GameStarted { .. } => "game_started",
            Self::GameUpdated { .. } => "game_updated",
            Self::GameEnded { .. } => "game_ended",
            Self::Notification(_) => "notification",
            Self::Error { .. } => "error",
            Self::Pong => "pong",
        }
    }
}
