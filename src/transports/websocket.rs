//! WebSocket transport built on `tokio-tungstenite`.
//!
//! Both `ws://` and `wss://` URLs are accepted; TLS is negotiated by
//! [`MaybeTlsStream`](tokio_tungstenite::MaybeTlsStream).

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::error::RealtimeError;
use crate::transport::{Connector, Transport};

/// The underlying WebSocket stream.
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`Transport`] over a WebSocket connection.
///
/// Only text frames carry protocol messages. Binary frames are skipped,
/// ping/pong is handled by tungstenite, and a close frame ends the stream.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Open a WebSocket connection to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Io`] if the URL is invalid or the handshake
    /// fails. The [`ErrorKind`](std::io::ErrorKind) of an underlying I/O error
    /// is preserved.
    pub async fn connect(url: &str) -> Result<Self, RealtimeError> {
        tracing::debug!(url = %url, "opening game channel");

        let (stream, _response) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
            let kind = match &e {
                tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
                _ => std::io::ErrorKind::Other,
            };
            RealtimeError::Io(std::io::Error::new(kind, e))
        })?;

        tracing::info!(url = %url, "game channel established");
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already-established stream (custom TLS, proxies, headers).
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), RealtimeError> {
        if self.closed {
            return Err(RealtimeError::TransportClosed);
        }
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| RealtimeError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, RealtimeError>> {
        loop {
            let msg = match self.stream.next().await? {
                Ok(msg) => msg,
                Err(e) => return Some(Err(RealtimeError::TransportReceive(e.to_string()))),
            };

            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(frame) => {
                    tracing::debug!(?frame, "server closed the game channel");
                    return None;
                }
                Message::Binary(_) => {
                    tracing::warn!("skipping unexpected binary frame");
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self) -> Result<(), RealtimeError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| RealtimeError::TransportSend(e.to_string()))
    }
}

/// A [`Connector`] that opens [`WebSocketTransport`]s.
///
/// An optional handshake timeout turns a hanging connect into a failed
/// attempt, so it counts against the reconnection budget instead of stalling
/// the channel.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    handshake_timeout: Option<Duration>,
}

impl WebSocketConnector {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    type Transport = WebSocketTransport;

    async fn connect(&self, url: &str) -> Result<WebSocketTransport, RealtimeError> {
        match self.handshake_timeout {
            Some(timeout) => tokio::time::timeout(timeout, WebSocketTransport::connect(url))
                .await
                .map_err(|_| RealtimeError::Timeout)?,
            None => WebSocketTransport::connect(url).await,
        }
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
    use tokio::net::TcpListener;

    /// Start a local WebSocket server that runs `handler` on the first
    /// accepted connection and return its URL.
    async fn start_mock_server<F, Fut>(handler: F) -> String
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });

        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn connect_fails_with_invalid_url() {
        let err = WebSocketTransport::connect("not-a-valid-url").await.unwrap_err();
        assert!(matches!(err, RealtimeError::Io(_)));
    }

    #[tokio::test]
    async fn connector_times_out_on_unroutable_host() {
        let connector =
            WebSocketConnector::new().with_handshake_timeout(Duration::from_millis(50));
        let err = connector.connect("ws://192.0.2.1:1").await.unwrap_err();
        assert!(matches!(err, RealtimeError::Timeout));
    }

    #[tokio::test]
    async fn text_frames_are_delivered_and_binary_skipped() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(Message::Binary(vec![0x01].into())).await.unwrap();
            ws.send(Message::Text(r#"{"type":"pong"}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketConnector::new().connect(&url).await.unwrap();
        let msg = transport.recv().await.unwrap().unwrap();
        assert_eq!(msg, r#"{"type":"pong"}"#);
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn echo_round_trip() {
        let url = start_mock_server(|mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                ws.send(Message::Text(text)).await.unwrap();
            }
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.send("hello".to_string()).await.unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), "hello");
    }

    #[tokio::test]
    async fn send_after_close_fails_and_close_is_idempotent() {
        let url =
            start_mock_server(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} })
                .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();

        let err = transport.send("late".to_string()).await.unwrap_err();
        assert!(matches!(err, RealtimeError::TransportClosed));
    }
}
