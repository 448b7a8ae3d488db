//! Events delivered by the [`ConnectionManager`](crate::ConnectionManager).

use crate::protocol::ServerMessage;

/// Something that happened on the game channel.
///
/// Lifecycle variants are synthesized by the channel task; [`Server`](Self::Server)
/// wraps every message the server pushed, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// A connection attempt is starting. `attempt` is 0 for the first try
    /// and counts up through automatic reconnections.
    Connecting { attempt: u32 },
    /// A transport was opened and the auth handshake was sent.
    Connected,
    /// An established connection ended. `reason` is `None` when the server
    /// closed the channel cleanly.
    Disconnected { reason: Option<String> },
    /// A connection attempt failed.
    ConnectError { message: String },
    /// Every reconnection attempt failed; the channel stays down until the
    /// next explicit `connect`.
    ReconnectFailed,
    /// A message pushed by the server.
    Server(ServerMessage),
}

/// Discriminant of a [`ChannelEvent`], used as the key of an
/// [`EventDispatcher`](crate::EventDispatcher) table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connecting,
    Connected,
    Disconnected,
    ConnectError,
    ReconnectFailed,
    Authenticated,
    RoomJoined,
    RoomUpdated,
    RoomLeft,
    GameStarted,
    GameUpdated,
    GameEnded,
    Notification,
    ServerError,
    Pong,
}

impl ChannelEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Connecting { .. } => EventKind::Connecting,
            Self::Connected => EventKind::Connected,
            Self::Disconnected { .. } => EventKind::Disconnected,
            Self::ConnectError { .. } => EventKind::ConnectError,
            Self::ReconnectFailed => EventKind::ReconnectFailed,
            Self::Server(msg) => match msg {
                ServerMessage::Authenticated { .. } => EventKind::Authenticated,
                ServerMessage::RoomJoined { .. } => EventKind::RoomJoined,
                ServerMessage::RoomUpdated { .. } => EventKind::RoomUpdated,
                ServerMessage::RoomLeft => EventKind::RoomLeft,
                ServerMessage::GameStarted { .. } => EventKind::GameStarted,
                ServerMessage::GameUpdated { .. } => EventKind::GameUpdated,
                ServerMessage::GameEnded { .. } => EventKind::GameEnded,
                ServerMessage::Notification(_) => EventKind::Notification,
                ServerMessage::Error { .. } => EventKind::ServerError,
                ServerMessage::Pong => EventKind::Pong,
            },
        }
    }
}

impl From<ServerMessage> for ChannelEvent {
    fn from(msg: ServerMessage) -> Self {
        Self::Server(msg)
    }
}
