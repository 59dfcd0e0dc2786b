use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicU64, Ordering};

use super::notification::NotificationEnvelope;

/// Raw inbound frame as sent by the server.
///
/// The `type` field is a free-form string so unknown future types still parse
/// (and are then dropped by the dispatcher) instead of failing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub data: JsonValue,
    #[serde(default)]
    pub message_id: Option<String>,
    /// Numeric milliseconds; other shapes are ignored during normalization
    #[serde(default)]
    pub timestamp: Option<JsonValue>,
    #[serde(default)]
    pub target_users: Option<Vec<String>>,
    #[serde(default)]
    pub target_connections: Option<Vec<String>>,
}

impl ServerMessage {
    /// Parse a text frame. Anything that is not a JSON object with a string
    /// `type` is rejected.
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Fill in missing fields: `now_ms` for the timestamp, and an ID derived
    /// from `now_ms` for the message ID.
    pub fn normalize(self, now_ms: i64) -> NotificationEnvelope {
        let timestamp = self
            .timestamp
            .as_ref()
            .and_then(|t| t.as_i64().or_else(|| t.as_f64().map(|f| f as i64)))
            .unwrap_or(now_ms);
        let message_id = self.message_id.unwrap_or_else(|| generate_message_id(now_ms));

        NotificationEnvelope {
            message_type: self.message_type,
            data: self.data,
            message_id,
            timestamp,
            target_users: self.target_users,
            target_connections: self.target_connections,
        }
    }
}

static NEXT_MESSAGE_SEQ: AtomicU64 = AtomicU64::new(1);

/// `msg_<now_ms>_<seq>`; the sequence keeps IDs generated within the same
/// millisecond distinct.
fn generate_message_id(now_ms: i64) -> String {
    let seq = NEXT_MESSAGE_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("msg_{}_{}", now_ms, seq)
}
