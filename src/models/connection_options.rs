use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection-level options for the notification channel.
///
/// These options control:
/// - Automatic reconnection on connection loss
/// - Reconnection timing (exponential backoff) and retry limits
/// - Application-level heartbeat frames
///
/// # Example
///
/// ```rust
/// use civic_link::ConnectionOptions;
///
/// let options = ConnectionOptions::default()
///     .with_auto_reconnect(true)
///     .with_reconnect_delay_ms(2000)
///     .with_max_reconnect_attempts(Some(10));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionOptions {
    /// Enable automatic reconnection after an unintentional close
    /// Default: true
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,

    /// Base delay in milliseconds for the exponential backoff
    /// Default: 1000ms (1 second)
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Cap on the backoff delay
    /// Default: 30000ms (30 seconds)
    #[serde(default = "default_max_reconnect_delay_ms")]
    pub max_reconnect_delay_ms: u64,

    /// Maximum number of consecutive reconnection attempts before giving up
    /// Default: None (infinite retries)
    #[serde(default)]
    pub max_reconnect_attempts: Option<u32>,

    /// Interval between client heartbeat frames while connected.
    ///
    /// Set to `0` to disable.  Default: `30_000` (30 seconds).
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Timeout for the WebSocket handshake.
    ///
    /// Set to `0` to rely on the transport's own timeout.  Default: `10_000`.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
}

fn default_auto_reconnect() -> bool {
    true
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

fn default_max_reconnect_delay_ms() -> u64 {
    30000
}

fn default_heartbeat_interval_ms() -> u64 {
    30000
}

fn default_connection_timeout_ms() -> u64 {
    10000
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            reconnect_delay_ms: 1000,
            max_reconnect_delay_ms: 30000,
            max_reconnect_attempts: None,
            heartbeat_interval_ms: 30000,
            connection_timeout_ms: 10000,
        }
    }
}

impl ConnectionOptions {
    /// Create new connection options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether to automatically reconnect on connection loss
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Set the base delay between reconnection attempts (in milliseconds)
    pub fn with_reconnect_delay_ms(mut self, delay_ms: u64) -> Self {
        self.reconnect_delay_ms = delay_ms;
        self
    }

    /// Set the maximum delay between reconnection attempts (in milliseconds)
    pub fn with_max_reconnect_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_reconnect_delay_ms = max_delay_ms;
        self
    }

    /// Set the maximum number of reconnection attempts
    /// Pass None for infinite retries
    pub fn with_max_reconnect_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_reconnect_attempts = max_attempts;
        self
    }

    /// Set the heartbeat interval in milliseconds. `0` disables heartbeats.
    pub fn with_heartbeat_interval_ms(mut self, ms: u64) -> Self {
        self.heartbeat_interval_ms = ms;
        self
    }

    /// Set the handshake timeout in milliseconds. `0` disables it.
    pub fn with_connection_timeout_ms(mut self, ms: u64) -> Self {
        self.connection_timeout_ms = ms;
        self
    }

    /// Backoff delay for a reconnect scheduled after `attempts` previous
    /// consecutive attempts: `min(base * 2^attempts, cap)`.
    pub fn backoff_delay(&self, attempts: u32) -> Duration {
        let delay = self
            .reconnect_delay_ms
            .saturating_mul(2u64.saturating_pow(attempts))
            .min(self.max_reconnect_delay_ms);
        Duration::from_millis(delay)
    }

    /// Heartbeat interval, or `None` when disabled.
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        (self.heartbeat_interval_ms > 0).then(|| Duration::from_millis(self.heartbeat_interval_ms))
    }

    /// Handshake timeout, or `None` when disabled.
    pub fn connection_timeout(&self) -> Option<Duration> {
        (self.connection_timeout_ms > 0).then(|| Duration::from_millis(self.connection_timeout_ms))
    }
}
