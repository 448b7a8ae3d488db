#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for the integration tests.
//!
//! Provides a scripted [`MockConnector`] that hands out [`MockTransport`]s,
//! and helpers for building server message JSON.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use party_realtime_client::protocol::{GameState, NewNotification, Room, ServerMessage};
use party_realtime_client::{ChannelEvent, ClientMessage, Connector, RealtimeError, Transport};
use tokio::sync::mpsc;

/// Scripted messages a transport yields from `recv()`. `None` is a clean
/// server-side close.
pub type Incoming = Vec<Option<Result<String, RealtimeError>>>;

// ── MockTransport ───────────────────────────────────────────────────

pub struct MockTransport {
    incoming: VecDeque<Option<Result<String, RealtimeError>>>,
    sent: Arc<StdMutex<Vec<String>>>,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), RealtimeError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, RealtimeError>> {
        if let Some(item) = self.incoming.pop_front() {
            item
        } else {
            // No more scripted messages, so hang and keep the session up
            // until disconnect.
            std::future::pending().await
        }
    }

    async fn close(&mut self) -> Result<(), RealtimeError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ── MockConnector ───────────────────────────────────────────────────

/// One scripted outcome per `connect` call.
pub enum Attempt {
    /// The connect call fails.
    Refuse,
    /// The connect call yields a transport replaying these messages.
    Open(Incoming),
}

/// Shared probes for inspecting what the connector and its transports saw.
#[derive(Clone, Default)]
pub struct Probe {
    pub sent: Arc<StdMutex<Vec<String>>>,
    pub connects: Arc<AtomicUsize>,
    pub closed: Arc<AtomicUsize>,
}

impl Probe {
    /// Every message the client sent, decoded.
    pub fn sent_messages(&self) -> Vec<ClientMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|raw| serde_json::from_str(raw).expect("client message JSON"))
            .collect()
    }

    /// Number of auth handshakes sent across all transports.
    pub fn handshakes(&self) -> usize {
        self.sent_messages()
            .iter()
            .filter(|m| matches!(m, ClientMessage::Authenticate { .. }))
            .count()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct MockConnector {
    attempts: StdMutex<VecDeque<Attempt>>,
    probe: Probe,
}

impl MockConnector {
    /// Attempts beyond the scripted ones are refused.
    pub fn new(attempts: Vec<Attempt>) -> (Self, Probe) {
        let probe = Probe::default();
        let connector = Self {
            attempts: StdMutex::new(VecDeque::from(attempts)),
            probe: probe.clone(),
        };
        (connector, probe)
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn connect(&self, _url: &str) -> Result<MockTransport, RealtimeError> {
        self.probe.connects.fetch_add(1, Ordering::SeqCst);
        let next = self.attempts.lock().unwrap().pop_front();
        match next {
            Some(Attempt::Open(incoming)) => Ok(MockTransport {
                incoming: VecDeque::from(incoming),
                sent: Arc::clone(&self.probe.sent),
                closed: Arc::clone(&self.probe.closed),
            }),
            Some(Attempt::Refuse) | None => Err(RealtimeError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            ))),
        }
    }
}

// ── Event helpers ───────────────────────────────────────────────────

/// Receive the next event or panic after five (possibly virtual) seconds.
pub async fn next_event(events: &mut mpsc::Receiver<ChannelEvent>) -> ChannelEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

// ── JSON helper functions ───────────────────────────────────────────

fn to_json(msg: &ServerMessage) -> String {
    serde_json::to_string(msg).expect("server message serialization")
}

pub fn authenticated_json(channel_id: &str, player_id: Option<&str>) -> String {
    to_json(&ServerMessage::Authenticated {
        channel_id: channel_id.into(),
        player_id: player_id.map(Into::into),
    })
}

pub fn room_joined_json(room: serde_json::Value) -> String {
    to_json(&ServerMessage::RoomJoined { room: Room(room) })
}

pub fn room_left_json() -> String {
    to_json(&ServerMessage::RoomLeft)
}

pub fn game_started_json(game: serde_json::Value) -> String {
    to_json(&ServerMessage::GameStarted {
        game: GameState(game),
    })
}

pub fn notification_json(payload: NewNotification) -> String {
    to_json(&ServerMessage::Notification(payload))
}

pub fn error_json(message: &str) -> String {
    to_json(&ServerMessage::Error {
        message: message.into(),
        code: None,
    })
}
