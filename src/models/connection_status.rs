use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of the notification channel.
///
/// Exactly one value holds at a time; every transition is broadcast to the
/// connection manager's status listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    /// No channel and nothing scheduled
    #[default]
    Disconnected,
    /// Handshake in progress
    Connecting,
    /// Channel open, heartbeat running
    Connected,
    /// Channel lost, reconnect scheduled
    Reconnecting,
    /// Channel failure reported
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "DISCONNECTED",
            ConnectionStatus::Connecting => "CONNECTING",
            ConnectionStatus::Connected => "CONNECTED",
            ConnectionStatus::Reconnecting => "RECONNECTING",
            ConnectionStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
