//! Connection configuration.

use std::time::Duration;

/// Environment variable that overrides [`DEFAULT_SERVER_URL`].
pub const SERVER_URL_ENV: &str = "PARTY_SERVER_URL";

/// Server address used when no override is supplied.
pub const DEFAULT_SERVER_URL: &str = "ws://localhost:3001";

/// Default number of automatic reconnection attempts.
const DEFAULT_RECONNECTION_ATTEMPTS: u32 = 5;

/// Default fixed delay between reconnection attempts.
const DEFAULT_RECONNECTION_DELAY: Duration = Duration::from_secs(1);

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful disconnect.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Configuration for a [`ConnectionManager`](crate::ConnectionManager).
///
/// # Example
///
/// ```
/// use party_realtime_client::ConnectionConfig;
/// use std::time::Duration;
///
/// let config = ConnectionConfig::new("ws://game.example:3001")
///     .with_reconnection_attempts(3)
///     .with_reconnection_delay(Duration::from_millis(500));
/// assert_eq!(config.reconnection_attempts, 3);
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Address of the game server.
    pub server_url: String,
    /// Maximum number of automatic reconnection attempts after the initial
    /// attempt fails or an established connection drops. Zero disables
    /// automatic reconnection.
    ///
    /// Defaults to **5**.
    pub reconnection_attempts: u32,
    /// Fixed delay between reconnection attempts.
    ///
    /// Defaults to **1 second**.
    pub reconnection_delay: Duration,
    /// Capacity of the bounded event channel.
    ///
    /// When the consumer falls behind, events other than `Disconnected` and
    /// `ReconnectFailed` are dropped with a warning. Those two use one extra
    /// slot on top of this capacity. Defaults to **256**. Values below 1 are
    /// clamped to 1.
    pub event_channel_capacity: usize,
    /// How long [`disconnect`](crate::ConnectionManager::disconnect) waits for
    /// the channel task to close the transport before aborting it.
    ///
    /// Defaults to **1 second**.
    pub shutdown_timeout: Duration,
}

impl ConnectionConfig {
    /// Create a configuration for `server_url` with default policy values.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            reconnection_attempts: DEFAULT_RECONNECTION_ATTEMPTS,
            reconnection_delay: DEFAULT_RECONNECTION_DELAY,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Build a configuration from the `PARTY_SERVER_URL` environment variable,
    /// falling back to [`DEFAULT_SERVER_URL`].
    pub fn from_env() -> Self {
        let url = std::env::var(SERVER_URL_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());
        Self::new(url)
    }

    #[must_use]
    pub fn with_reconnection_attempts(mut self, attempts: u32) -> Self {
        self.reconnection_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_reconnection_delay(mut self, delay: Duration) -> Self {
        self.reconnection_delay = delay;
        self
    }

    /// Set the capacity of the bounded event channel. Values below 1 are
    /// clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SERVER_URL)
    }
}
