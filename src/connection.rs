//! Connection manager for the game channel.
//!
//! [`ConnectionManager`] owns at most one live channel. [`connect`](ConnectionManager::connect)
//! spawns a background channel task and returns a [`ChannelHandle`] right away;
//! the task opens a transport through the configured [`Connector`], sends the
//! auth handshake, relays server messages as [`ChannelEvent`]s and reconnects
//! with a bounded number of attempts separated by a fixed delay.
//!
//! # Example
//!
//! ```rust,ignore
//! let (mut manager, mut events) =
//!     ConnectionManager::new(WebSocketConnector::new(), ConnectionConfig::from_env());
//!
//! let handle = manager.connect("alice", None);
//! handle.join_room("ABCD")?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         ChannelEvent::Server(ServerMessage::RoomJoined { room }) => { /* … */ }
//!         ChannelEvent::ReconnectFailed => break,
//!         _ => {}
//!     }
//! }
//!
//! manager.disconnect().await;
//! ```

use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ConnectionConfig;
use crate::error::{RealtimeError, Result};
use crate::event::ChannelEvent;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::transport::{Connector, Transport};

/// Reason attached to the `Disconnected` event after an explicit disconnect.
const CLIENT_DISCONNECT_REASON: &str = "client disconnect";

/// Connection status of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

// ── Channel handle ──────────────────────────────────────────────────

/// State shared between a handle and its channel task.
struct HandleShared {
    status: watch::Sender<ConnectionStatus>,
    channel_id: Mutex<Option<String>>,
}

impl HandleShared {
    fn new() -> Self {
        Self {
            status: watch::Sender::new(ConnectionStatus::Connecting),
            channel_id: Mutex::new(None),
        }
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.status.send_if_modified(|current| {
            let changed = *current != status;
            *current = status;
            changed
        });
    }

    fn set_channel_id(&self, id: Option<String>) {
        if let Ok(mut guard) = self.channel_id.lock() {
            *guard = id;
        }
    }

    /// Mark the channel as permanently down.
    fn settle(&self) {
        self.set_channel_id(None);
        self.set_status(ConnectionStatus::Disconnected);
    }
}

/// Cheap, cloneable reference to one channel.
///
/// All clones observe the same status and feed the same channel task. The
/// transport itself never leaves the task.
#[derive(Clone)]
pub struct ChannelHandle {
    shared: Arc<HandleShared>,
    cmd_tx: mpsc::UnboundedSender<ClientMessage>,
}

impl ChannelHandle {
    pub fn status(&self) -> ConnectionStatus {
        *self.shared.status.borrow()
    }

    /// Subscribe to status changes.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Identifier the server assigned in its `authenticated` reply, if any.
    pub fn channel_id(&self) -> Option<String> {
        self.shared
            .channel_id
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
    }

    /// Returns `true` if both handles refer to the same channel.
    pub fn same_channel(&self, other: &ChannelHandle) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// A handle is live while its task is still connecting, connected or
    /// waiting to reconnect.
    fn is_live(&self) -> bool {
        self.status() != ConnectionStatus::Disconnected && !self.cmd_tx.is_closed()
    }

    /// Queue a message for the server.
    ///
    /// Messages queued while the channel is connecting are delivered once a
    /// transport is up.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::NotConnected`] if the channel task has ended.
    pub fn send(&self, msg: ClientMessage) -> Result<()> {
        self.cmd_tx
            .send(msg)
            .map_err(|_| RealtimeError::NotConnected)
    }

    /// # Errors
    ///
    /// Returns [`RealtimeError::NotConnected`] if the channel task has ended.
    pub fn create_room(&self) -> Result<()> {
        self.send(ClientMessage::CreateRoom)
    }

    /// # Errors
    ///
    /// Returns [`RealtimeError::NotConnected`] if the channel task has ended.
    pub fn join_room(&self, room_code: impl Into<String>) -> Result<()> {
        self.send(ClientMessage::JoinRoom {
            room_code: room_code.into(),
        })
    }

    /// # Errors
    ///
    /// Returns [`RealtimeError::NotConnected`] if the channel task has ended.
    pub fn leave_room(&self) -> Result<()> {
        self.send(ClientMessage::LeaveRoom)
    }

    /// # Errors
    ///
    /// Returns [`RealtimeError::NotConnected`] if the channel task has ended.
    pub fn start_game(&self) -> Result<()> {
        self.send(ClientMessage::StartGame)
    }

    /// # Errors
    ///
    /// Returns [`RealtimeError::NotConnected`] if the channel task has ended.
    pub fn send_game_action(&self, action: serde_json::Value) -> Result<()> {
        self.send(ClientMessage::GameAction { action })
    }

    /// # Errors
    ///
    /// Returns [`RealtimeError::NotConnected`] if the channel task has ended.
    pub fn ping(&self) -> Result<()> {
        self.send(ClientMessage::Ping)
    }
}

impl std::fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelHandle")
            .field("status", &self.status())
            .field("channel_id", &self.channel_id())
            .finish()
    }
}

// ── Manager ─────────────────────────────────────────────────────────

struct ActiveChannel {
    handle: ChannelHandle,
    task: JoinHandle<()>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

/// Owns at most one live game channel per instance.
///
/// Create one per process and pass it (or the [`ChannelHandle`]s it returns)
/// to whatever needs to talk to the server.
pub struct ConnectionManager<C: Connector> {
    connector: Arc<C>,
    config: ConnectionConfig,
    event_tx: mpsc::Sender<ChannelEvent>,
    active: Option<ActiveChannel>,
}

impl<C: Connector> ConnectionManager<C> {
    /// Create a manager and the receiver on which every channel it opens
    /// reports its events.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn new(connector: C, config: ConnectionConfig) -> (Self, mpsc::Receiver<ChannelEvent>) {
        // Clamp capacity to at least 1 (tokio panics on 0), plus one slot the
        // channel task keeps reserved for terminal events.
        let capacity = config.event_channel_capacity.max(1).saturating_add(1);
        let (event_tx, event_rx) = mpsc::channel(capacity);
        let manager = Self {
            connector: Arc::new(connector),
            config,
            event_tx,
            active: None,
        };
        (manager, event_rx)
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Open the game channel, or return the live one.
    ///
    /// If a channel is already connecting or connected its handle is returned
    /// unchanged and no second handshake is sent. Otherwise a channel task is
    /// spawned that authenticates with `{username, playerId}`. The call never
    /// waits for the transport; connection failures are reported as
    /// [`ChannelEvent::ConnectError`].
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect(
        &mut self,
        username: impl Into<String>,
        player_id: Option<String>,
    ) -> ChannelHandle {
        if let Some(active) = &self.active {
            if active.handle.is_live() {
                debug!("connect called with a live channel, reusing it");
                return active.handle.clone();
            }
        }

        if let Some(stale) = self.active.take() {
            debug!("replacing settled channel");
            stale.task.abort();
        }

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let shared = Arc::new(HandleShared::new());

        let task = ChannelTask {
            connector: Arc::clone(&self.connector),
            config: self.config.clone(),
            auth: ClientMessage::Authenticate {
                username: username.into(),
                player_id,
            },
            shared: Arc::clone(&shared),
            events: EventSink::new(self.event_tx.clone()),
            cmd_rx,
            shutdown_rx,
        };
        let task = tokio::spawn(channel_loop(task));

        let handle = ChannelHandle { shared, cmd_tx };
        self.active = Some(ActiveChannel {
            handle: handle.clone(),
            task,
            shutdown_tx: Some(shutdown_tx),
        });
        handle
    }

    /// Close the channel and discard its handle. Pending reconnection
    /// attempts are cancelled. Does nothing if there is no channel.
    pub async fn disconnect(&mut self) {
        let Some(mut active) = self.active.take() else {
            return;
        };
        debug!("disconnect requested");

        if let Some(tx) = active.shutdown_tx.take() {
            let _ = tx.send(());
        }

        match tokio::time::timeout(self.config.shutdown_timeout, &mut active.task).await {
            Ok(Ok(())) => {}
            Ok(Err(join_err)) => {
                warn!("channel task terminated with join error: {join_err}");
            }
            Err(_) => {
                warn!("channel task did not exit within timeout; aborting");
                active.task.abort();
                if let Err(join_err) = (&mut active.task).await {
                    debug!("channel task aborted: {join_err}");
                }
                // Still `Connected` means the task hung closing the transport
                // and never reported the disconnect. Its reserved slot was
                // released by the abort.
                if active.handle.is_connected() {
                    let event = ChannelEvent::Disconnected {
                        reason: Some(CLIENT_DISCONNECT_REASON.into()),
                    };
                    if let Err(e) = self.event_tx.try_send(event) {
                        warn!("disconnect event not delivered: {e}");
                    }
                }
            }
        }

        active.handle.shared.settle();
    }

    /// The current handle, if any. No side effects.
    pub fn handle(&self) -> Option<ChannelHandle> {
        self.active.as_ref().map(|active| active.handle.clone())
    }

    /// `true` iff a handle exists and its transport is connected.
    pub fn is_connected(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.handle.is_connected())
    }
}

impl<C: Connector> std::fmt::Debug for ConnectionManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("server_url", &self.config.server_url)
            .field("handle", &self.active.as_ref().map(|a| &a.handle))
            .finish()
    }
}

impl<C: Connector> Drop for ConnectionManager<C> {
    fn drop(&mut self) {
        // No executor to drive a graceful close from here.
        if let Some(active) = self.active.take() {
            active.task.abort();
            active.handle.shared.settle();
        }
    }
}

// ── Channel task ────────────────────────────────────────────────────

struct ChannelTask<C: Connector> {
    connector: Arc<C>,
    config: ConnectionConfig,
    auth: ClientMessage,
    shared: Arc<HandleShared>,
    events: EventSink,
    cmd_rx: mpsc::UnboundedReceiver<ClientMessage>,
    shutdown_rx: oneshot::Receiver<()>,
}

/// How a connected session ended.
enum SessionEnd {
    /// Explicit disconnect or every handle dropped.
    Shutdown,
    /// The transport failed or the server closed it.
    Lost(Option<String>),
}

/// Connect, run sessions and reconnect until shut down or out of attempts.
async fn channel_loop<C: Connector>(mut task: ChannelTask<C>) {
    debug!(url = %task.config.server_url, "channel task started");
    let mut attempt: u32 = 0;

    loop {
        if !rearm_or_shutdown(&mut task).await {
            return;
        }

        task.shared.set_status(ConnectionStatus::Connecting);
        task.events.emit(ChannelEvent::Connecting { attempt });

        let connected = tokio::select! {
            result = task.connector.connect(&task.config.server_url) => result,
            _ = &mut task.shutdown_rx => {
                debug!("disconnect requested while connecting");
                task.shared.settle();
                return;
            }
        };

        match connected {
            Ok(transport) => {
                attempt = 0;
                match run_session(transport, &mut task).await {
                    SessionEnd::Shutdown => {
                        task.shared.settle();
                        task.events.emit_terminal(ChannelEvent::Disconnected {
                            reason: Some(CLIENT_DISCONNECT_REASON.into()),
                        });
                        debug!("channel task exited");
                        return;
                    }
                    SessionEnd::Lost(reason) => {
                        task.shared.set_channel_id(None);
                        task.shared.set_status(ConnectionStatus::Connecting);
                        task.events
                            .emit_terminal(ChannelEvent::Disconnected { reason });
                        if !rearm_or_shutdown(&mut task).await {
                            return;
                        }
                    }
                }
            }
            Err(e) => {
                error!(attempt, "failed to open game channel: {e}");
                task.events.emit(ChannelEvent::ConnectError {
                    message: e.to_string(),
                });
            }
        }

        if attempt >= task.config.reconnection_attempts {
            warn!(
                attempts = task.config.reconnection_attempts,
                "reconnection attempts exhausted"
            );
            task.shared.settle();
            task.events.emit_terminal(ChannelEvent::ReconnectFailed);
            return;
        }
        attempt += 1;

        tokio::select! {
            () = tokio::time::sleep(task.config.reconnection_delay) => {}
            _ = &mut task.shutdown_rx => {
                debug!("disconnect requested while waiting to reconnect");
                task.shared.settle();
                return;
            }
        }
    }
}

/// Reserve the terminal slot again. Returns `false` if a disconnect arrived
/// first, in which case the handle has been settled.
async fn rearm_or_shutdown<C: Connector>(task: &mut ChannelTask<C>) -> bool {
    tokio::select! {
        () = task.events.rearm() => true,
        _ = &mut task.shutdown_rx => {
            debug!("disconnect requested while the event channel was full");
            task.shared.settle();
            false
        }
    }
}

/// Drive one connected transport: handshake, then multiplex outgoing
/// commands, the shutdown signal and incoming messages.
async fn run_session<C: Connector>(
    mut transport: C::Transport,
    task: &mut ChannelTask<C>,
) -> SessionEnd {
    let handshake = match serde_json::to_string(&task.auth) {
        Ok(json) => json,
        Err(e) => {
            error!("failed to serialize auth handshake: {e}");
            let _ = transport.close().await;
            return SessionEnd::Lost(Some(format!("handshake serialization error: {e}")));
        }
    };
    if let Err(e) = transport.send(handshake).await {
        error!("failed to send auth handshake: {e}");
        return SessionEnd::Lost(Some(format!("transport send error: {e}")));
    }

    task.shared.set_status(ConnectionStatus::Connected);
    info!(url = %task.config.server_url, "game channel connected");
    task.events.emit(ChannelEvent::Connected);

    loop {
        tokio::select! {
            cmd = task.cmd_rx.recv() => {
                let Some(msg) = cmd else {
                    debug!("all channel handles dropped, closing transport");
                    let _ = transport.close().await;
                    return SessionEnd::Shutdown;
                };
                match serde_json::to_string(&msg) {
                    Ok(json) => {
                        if let Err(e) = transport.send(json).await {
                            error!("transport send error: {e}");
                            return SessionEnd::Lost(Some(format!("transport send error: {e}")));
                        }
                    }
                    // Serialization errors are programming bugs; keep the session.
                    Err(e) => error!("failed to serialize client message: {e}"),
                }
            }

            _ = &mut task.shutdown_rx => {
                debug!("disconnect requested, closing transport");
                if let Err(e) = transport.close().await {
                    debug!("transport close failed: {e}");
                }
                return SessionEnd::Shutdown;
            }

            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(msg) => {
                            observe(&task.shared, &msg);
                            task.events.emit(ChannelEvent::Server(msg));
                        }
                        Err(e) => warn!("failed to deserialize server message: {e} (raw: {text})"),
                    },
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        return SessionEnd::Lost(Some(format!("transport receive error: {e}")));
                    }
                    None => {
                        debug!("game channel closed by server");
                        return SessionEnd::Lost(None);
                    }
                }
            }
        }
    }
}

/// Update handle state from a server message before it is forwarded.
fn observe(shared: &HandleShared, msg: &ServerMessage) {
    match msg {
        ServerMessage::Authenticated { channel_id, .. } => {
            debug!(channel_id = %channel_id, "handshake accepted");
            shared.set_channel_id(Some(channel_id.clone()));
        }
        ServerMessage::Error { message, code } => {
            warn!(code = ?code, "server error: {message}");
        }
        other => debug!(kind = other.kind(), "server message"),
    }
}

// ── Event sink ──────────────────────────────────────────────────────

/// Event sender that holds one buffer slot in reserve for terminal events
/// (`Disconnected`, `ReconnectFailed`), so they are delivered even when the
/// consumer has fallen behind.
struct EventSink {
    tx: mpsc::Sender<ChannelEvent>,
    reserved: Option<mpsc::OwnedPermit<ChannelEvent>>,
}

impl EventSink {
    fn new(tx: mpsc::Sender<ChannelEvent>) -> Self {
        Self { tx, reserved: None }
    }

    /// Wait until a slot is reserved. Returns at once if one already is or
    /// the receiver is gone.
    async fn rearm(&mut self) {
        if self.reserved.is_none() {
            self.reserved = self.tx.clone().reserve_owned().await.ok();
        }
    }

    /// Emit an event, dropping it with a warning if the consumer is behind.
    fn emit(&self, event: ChannelEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!("event channel full, dropping event: {:?}", dropped.kind());
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("event channel closed, receiver dropped");
            }
        }
    }

    /// Emit an event that must not be dropped, using the reserved slot.
    fn emit_terminal(&mut self, event: ChannelEvent) {
        match self.reserved.take() {
            Some(permit) => {
                permit.send(event);
            }
            None => {
                if let Err(e) = self.tx.try_send(event) {
                    warn!("terminal event not delivered: {e}");
                }
            }
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

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
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    // ── Mock transport ──────────────────────────────────────────────

    type Incoming = Vec<Option<std::result::Result<String, RealtimeError>>>;

    struct MockTransport {
        incoming: VecDeque<Option<std::result::Result<String, RealtimeError>>>,
        sent: Arc<StdMutex<Vec<String>>>,
        fail_send: bool,
        hang_close: bool,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, message: String) -> std::result::Result<(), RealtimeError> {
            if self.fail_send {
                return Err(RealtimeError::TransportSend("broken pipe".into()));
            }
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, RealtimeError>> {
            match self.incoming.pop_front() {
                Some(item) => item,
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> std::result::Result<(), RealtimeError> {
            if self.hang_close {
                std::future::pending::<()>().await;
            }
            Ok(())
        }
    }

    /// Hands out one scripted transport per `connect`; `None` scripts fail.
    struct MockConnector {
        scripts: StdMutex<VecDeque<Option<Incoming>>>,
        sent: Arc<StdMutex<Vec<String>>>,
        connects: Arc<AtomicUsize>,
        fail_send: bool,
        hang_close: bool,
    }

    impl MockConnector {
        fn new(
            scripts: Vec<Option<Incoming>>,
        ) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicUsize>) {
            let sent = Arc::new(StdMutex::new(Vec::new()));
            let connects = Arc::new(AtomicUsize::new(0));
            let connector = Self {
                scripts: StdMutex::new(VecDeque::from(scripts)),
                sent: Arc::clone(&sent),
                connects: Arc::clone(&connects),
                fail_send: false,
                hang_close: false,
            };
            (connector, sent, connects)
        }

        fn with_failing_send(mut self) -> Self {
            self.fail_send = true;
            self
        }

        fn with_hanging_close(mut self) -> Self {
            self.hang_close = true;
            self
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        type Transport = MockTransport;

        async fn connect(&self, _url: &str) -> std::result::Result<MockTransport, RealtimeError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            match self.scripts.lock().unwrap().pop_front().flatten() {
                Some(incoming) => Ok(MockTransport {
                    incoming: VecDeque::from(incoming),
                    sent: Arc::clone(&self.sent),
                    fail_send: self.fail_send,
                    hang_close: self.hang_close,
                }),
                None => Err(RealtimeError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "connection refused",
                ))),
            }
        }
    }

    fn authenticated_json(channel_id: &str) -> String {
        serde_json::to_string(&ServerMessage::Authenticated {
            channel_id: channel_id.into(),
            player_id: Some("p-1".into()),
        })
        .unwrap()
    }

    fn config() -> ConnectionConfig {
        ConnectionConfig::new("ws://test")
            .with_reconnection_attempts(2)
            .with_reconnection_delay(Duration::from_millis(100))
    }

    async fn next_event(events: &mut mpsc::Receiver<ChannelEvent>) -> ChannelEvent {
        tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn connect_sends_handshake_and_records_channel_id() {
        let (connector, sent, _connects) =
            MockConnector::new(vec![Some(vec![Some(Ok(authenticated_json("chan-1")))])]);
        let (mut manager, mut events) = ConnectionManager::new(connector, config());

        let handle = manager.connect("alice", Some("p-1".into()));
        assert_eq!(handle.channel_id(), None);

        assert_eq!(next_event(&mut events).await, ChannelEvent::Connecting { attempt: 0 });
        assert_eq!(next_event(&mut events).await, ChannelEvent::Connected);
        assert!(matches!(
            next_event(&mut events).await,
            ChannelEvent::Server(ServerMessage::Authenticated { .. })
        ));

        assert!(manager.is_connected());
        assert_eq!(handle.channel_id().as_deref(), Some("chan-1"));

        let first: ClientMessage = serde_json::from_str(&sent.lock().unwrap()[0]).unwrap();
        assert_eq!(
            first,
            ClientMessage::Authenticate {
                username: "alice".into(),
                player_id: Some("p-1".into()),
            }
        );

        manager.disconnect().await;
    }

    #[tokio::test]
    async fn second_connect_while_connecting_reuses_handle() {
        let (connector, sent, connects) = MockConnector::new(vec![Some(vec![])]);
        let (mut manager, mut events) = ConnectionManager::new(connector, config());

        let first = manager.connect("alice", None);
        let second = manager.connect("alice", None);
        assert!(first.same_channel(&second));

        let _ = next_event(&mut events).await; // Connecting
        let _ = next_event(&mut events).await; // Connected

        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert_eq!(sent.lock().unwrap().len(), 1);

        manager.disconnect().await;
    }

    #[tokio::test]
    async fn disconnect_discards_handle_and_is_idempotent() {
        let (connector, _sent, _connects) = MockConnector::new(vec![Some(vec![])]);
        let (mut manager, mut events) = ConnectionManager::new(connector, config());

        let handle = manager.connect("alice", None);
        let _ = next_event(&mut events).await; // Connecting
        let _ = next_event(&mut events).await; // Connected

        manager.disconnect().await;
        assert!(manager.handle().is_none());
        assert!(!manager.is_connected());
        assert_eq!(handle.status(), ConnectionStatus::Disconnected);
        assert!(matches!(handle.ping(), Err(RealtimeError::NotConnected)));
        assert_eq!(
            next_event(&mut events).await,
            ChannelEvent::Disconnected {
                reason: Some(CLIENT_DISCONNECT_REASON.into())
            }
        );

        manager.disconnect().await;
        assert!(manager.handle().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn reconnection_is_bounded() {
        let (connector, _sent, connects) = MockConnector::new(vec![None, None, None]);
        let (mut manager, mut events) = ConnectionManager::new(connector, config());

        let handle = manager.connect("alice", None);

        for attempt in 0..=2 {
            assert_eq!(next_event(&mut events).await, ChannelEvent::Connecting { attempt });
            assert!(matches!(
                next_event(&mut events).await,
                ChannelEvent::ConnectError { .. }
            ));
        }
        assert_eq!(next_event(&mut events).await, ChannelEvent::ReconnectFailed);

        assert_eq!(connects.load(Ordering::SeqCst), 3);
        assert_eq!(handle.status(), ConnectionStatus::Disconnected);
        assert!(!manager.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn connect_after_exhaustion_opens_new_channel() {
        let (connector, _sent, connects) = MockConnector::new(vec![None, Some(vec![])]);
        let config = config().with_reconnection_attempts(0);
        let (mut manager, mut events) = ConnectionManager::new(connector, config);

        let stale = manager.connect("alice", None);
        let _ = next_event(&mut events).await; // Connecting
        let _ = next_event(&mut events).await; // ConnectError
        assert_eq!(next_event(&mut events).await, ChannelEvent::ReconnectFailed);

        let fresh = manager.connect("alice", None);
        assert!(!fresh.same_channel(&stale));
        let _ = next_event(&mut events).await; // Connecting
        assert_eq!(next_event(&mut events).await, ChannelEvent::Connected);
        assert_eq!(connects.load(Ordering::SeqCst), 2);

        manager.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_connection_reconnects_and_resends_handshake() {
        let (connector, sent, _connects) = MockConnector::new(vec![
            Some(vec![None]), // server closes right away
            Some(vec![]),
        ]);
        let (mut manager, mut events) = ConnectionManager::new(connector, config());

        manager.connect("alice", None);
        assert_eq!(next_event(&mut events).await, ChannelEvent::Connecting { attempt: 0 });
        assert_eq!(next_event(&mut events).await, ChannelEvent::Connected);
        assert_eq!(
            next_event(&mut events).await,
            ChannelEvent::Disconnected { reason: None }
        );
        assert_eq!(next_event(&mut events).await, ChannelEvent::Connecting { attempt: 1 });
        assert_eq!(next_event(&mut events).await, ChannelEvent::Connected);

        assert_eq!(sent.lock().unwrap().len(), 2);
        manager.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_pending_reconnection() {
        let (connector, _sent, connects) = MockConnector::new(vec![None, None, None]);
        let config = config().with_reconnection_delay(Duration::from_secs(60));
        let (mut manager, mut events) = ConnectionManager::new(connector, config);

        manager.connect("alice", None);
        let _ = next_event(&mut events).await; // Connecting
        let _ = next_event(&mut events).await; // ConnectError

        manager.disconnect().await;
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(connects.load(Ordering::SeqCst), 1);
    }

    fn drain(events: &mut mpsc::Receiver<ChannelEvent>) -> Vec<ChannelEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = events.try_recv() {
            drained.push(event);
        }
        drained
    }

    #[tokio::test]
    async fn disconnect_is_delivered_when_nobody_is_reading() {
        let (connector, _sent, _connects) = MockConnector::new(vec![Some(vec![])]);
        let config = config()
            .with_event_channel_capacity(2)
            .with_shutdown_timeout(Duration::from_millis(200));
        let (mut manager, mut events) = ConnectionManager::new(connector, config);

        let handle = manager.connect("alice", None);
        handle
            .watch_status()
            .wait_for(|s| *s == ConnectionStatus::Connected)
            .await
            .unwrap();

        manager.disconnect().await;

        let drained = drain(&mut events);
        assert_eq!(
            drained.last(),
            Some(&ChannelEvent::Disconnected {
                reason: Some(CLIENT_DISCONNECT_REASON.into())
            }),
            "events after disconnect: {drained:?}"
        );
    }

    #[tokio::test]
    async fn disconnect_is_delivered_even_when_close_hangs() {
        let (connector, _sent, _connects) = MockConnector::new(vec![Some(vec![])]);
        let connector = connector.with_hanging_close();
        let config = config()
            .with_event_channel_capacity(2)
            .with_shutdown_timeout(Duration::from_millis(50));
        let (mut manager, mut events) = ConnectionManager::new(connector, config);

        let handle = manager.connect("alice", None);
        handle
            .watch_status()
            .wait_for(|s| *s == ConnectionStatus::Connected)
            .await
            .unwrap();

        manager.disconnect().await;

        assert_eq!(handle.status(), ConnectionStatus::Disconnected);
        let drained = drain(&mut events);
        assert_eq!(
            drained.last(),
            Some(&ChannelEvent::Disconnected {
                reason: Some(CLIENT_DISCONNECT_REASON.into())
            }),
            "events after disconnect: {drained:?}"
        );
    }

    #[tokio::test]
    async fn terminal_events_survive_a_full_buffer() {
        // The server closes straight away and reconnection is off, so the
        // task owes both `Disconnected` and `ReconnectFailed`.
        let (connector, _sent, _connects) = MockConnector::new(vec![Some(vec![None])]);
        let config = config()
            .with_event_channel_capacity(1)
            .with_reconnection_attempts(0);
        let (mut manager, mut events) = ConnectionManager::new(connector, config);

        manager.connect("alice", None);

        let mut seen = Vec::new();
        loop {
            let event = next_event(&mut events).await;
            let done = event == ChannelEvent::ReconnectFailed;
            seen.push(event);
            if done {
                break;
            }
        }

        let disconnected = seen
            .iter()
            .position(|e| *e == ChannelEvent::Disconnected { reason: None })
            .expect("Disconnected delivered");
        assert_eq!(disconnected, seen.len() - 2, "events: {seen:?}");
    }

    #[tokio::test]
    async fn failed_handshake_never_reports_connected() {
        let (connector, _sent, _connects) = MockConnector::new(vec![Some(vec![])]);
        let connector = connector.with_failing_send();
        let config = config().with_reconnection_attempts(0);
        let (mut manager, mut events) = ConnectionManager::new(connector, config);

        let handle = manager.connect("alice", None);
        let mut status = handle.watch_status();

        let mut seen = Vec::new();
        loop {
            let event = next_event(&mut events).await;
            let done = event == ChannelEvent::ReconnectFailed;
            seen.push(event);
            if done {
                break;
            }
        }

        assert!(!seen.contains(&ChannelEvent::Connected), "events: {seen:?}");
        assert!(seen.iter().any(|e| matches!(
            e,
            ChannelEvent::Disconnected { reason: Some(reason) } if reason.contains("broken pipe")
        )));
        assert_eq!(*status.borrow_and_update(), ConnectionStatus::Disconnected);
        assert!(!manager.is_connected());
    }
}
