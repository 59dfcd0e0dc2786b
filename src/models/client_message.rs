use serde::{Deserialize, Serialize};

/// Payload of a client heartbeat frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatData {
    /// Client wall-clock time in milliseconds since the Unix epoch
    pub client_time: i64,
}

/// Client-to-server frames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Liveness frame sent every heartbeat interval while connected.
    ///
    /// Keeps intermediary proxies from idling out the connection.
    Heartbeat { data: HeartbeatData },

    /// Application-defined frame forwarded as-is
    Custom {
        #[serde(default)]
        data: serde_json::Value,
    },
}

impl ClientMessage {
    pub fn heartbeat(client_time: i64) -> Self {
        ClientMessage::Heartbeat {
            data: HeartbeatData { client_time },
        }
    }
}
