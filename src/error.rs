//! Error types for the party real-time client.

use thiserror::Error;

/// Errors that can occur at the transport and storage boundaries.
///
/// Store mutations and connection management never return these to their
/// callers; they are logged and surfaced as [`ChannelEvent`](crate::ChannelEvent)s
/// instead.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a protocol message or persisted value.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The channel task behind a handle has ended.
    #[error("not connected to server")]
    NotConnected,

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// The persistent key-value store rejected a read or write.
    #[error("storage error: {0}")]
    Storage(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for party client operations.
pub type Result<T> = std::result::Result<T, RealtimeError>;
