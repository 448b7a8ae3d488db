//! Transport abstraction for the game channel.
//!
//! The [`Transport`] trait is a connected, bidirectional text message channel
//! between the client and the game server. Every message is one complete JSON
//! document, so implementations handle framing internally (WebSocket frames,
//! length-prefixed TCP, …).
//!
//! Because the [`ConnectionManager`](crate::ConnectionManager) reconnects on
//! its own, it does not take a ready transport. It takes a [`Connector`] that
//! can open a fresh transport for a URL as many times as the reconnection
//! policy asks for.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use party_realtime_client::error::RealtimeError;
//! use party_realtime_client::transport::{Connector, Transport};
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), RealtimeError> {
//!         todo!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, RealtimeError>> {
//!         // Return None when the connection is closed cleanly
//!         todo!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), RealtimeError> {
//!         todo!()
//!     }
//! }
//!
//! struct MyConnector;
//!
//! #[async_trait]
//! impl Connector for MyConnector {
//!     type Transport = MyTransport;
//!
//!     async fn connect(&self, url: &str) -> Result<MyTransport, RealtimeError> {
//!         todo!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::RealtimeError;

/// A bidirectional text message transport.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe because the channel task
/// polls it inside `tokio::select!`. If `recv` is cancelled before completion,
/// calling it again must not lose data.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text message to the server.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::TransportSend`] if the message could not be sent.
    async fn send(&mut self, message: String) -> Result<(), RealtimeError>;

    /// Receive the next JSON text message from the server.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: a complete message was received
    /// - `Some(Err(e))`: a transport error occurred
    /// - `None`: the connection was closed cleanly by the server
    async fn recv(&mut self) -> Option<Result<String, RealtimeError>>;

    /// Close the transport connection gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the graceful shutdown fails. Implementations should
    /// still release resources even if the close handshake fails.
    async fn close(&mut self) -> Result<(), RealtimeError>;
}

/// Opens connected [`Transport`]s.
///
/// Called once for the initial connection and once per automatic
/// reconnection attempt.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The transport type produced by this connector.
    type Transport: Transport;

    /// Open a new transport to `url`.
    ///
    /// # Errors
    ///
    /// Any error is treated as a failed attempt and counted against the
    /// reconnection budget.
    async fn connect(&self, url: &str) -> Result<Self::Transport, RealtimeError>;
}
