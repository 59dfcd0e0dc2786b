use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// Message types forwarded to notification listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Notification,
    PostCreated,
    PostUpdated,
    PostDeleted,
    CommentCreated,
    AnalyticsUpdate,
    Custom,
}

impl NotificationKind {
    /// Every forwarded kind, in wire-name order.
    pub const ALL: [NotificationKind; 7] = [
        NotificationKind::Notification,
        NotificationKind::PostCreated,
        NotificationKind::PostUpdated,
        NotificationKind::PostDeleted,
        NotificationKind::CommentCreated,
        NotificationKind::AnalyticsUpdate,
        NotificationKind::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Notification => "notification",
            NotificationKind::PostCreated => "post_created",
            NotificationKind::PostUpdated => "post_updated",
            NotificationKind::PostDeleted => "post_deleted",
            NotificationKind::CommentCreated => "comment_created",
            NotificationKind::AnalyticsUpdate => "analytics_update",
            NotificationKind::Custom => "custom",
        }
    }

    pub fn from_wire(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol-internal message types: logged, never forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolKind {
    Heartbeat,
    AuthSuccess,
    UserJoined,
    UserLeft,
}

impl ProtocolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolKind::Heartbeat => "heartbeat",
            ProtocolKind::AuthSuccess => "auth_success",
            ProtocolKind::UserJoined => "user_joined",
            ProtocolKind::UserLeft => "user_left",
        }
    }

    pub fn from_wire(value: &str) -> Option<Self> {
        [
            ProtocolKind::Heartbeat,
            ProtocolKind::AuthSuccess,
            ProtocolKind::UserJoined,
            ProtocolKind::UserLeft,
        ]
        .into_iter()
        .find(|kind| kind.as_str() == value)
    }
}

/// Normalized form of every inbound frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEnvelope {
    /// Wire discriminator (`notification`, `post_created`, `heartbeat`, ...)
    #[serde(rename = "type")]
    pub message_type: String,
    /// Message body; `null` when the frame had none
    #[serde(default)]
    pub data: JsonValue,
    /// Server-assigned ID, or a locally generated `msg_<nanos>` one
    pub message_id: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_users: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_connections: Option<Vec<String>>,
}

/// How an envelope is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageClass {
    /// Forwarded to notification listeners
    UserFacing(NotificationKind),
    /// Logged and dropped
    Protocol(ProtocolKind),
    /// Unrecognized type, logged as unhandled and dropped
    Unknown,
}

impl NotificationEnvelope {
    pub fn classify(&self) -> MessageClass {
        if let Some(kind) = NotificationKind::from_wire(&self.message_type) {
            MessageClass::UserFacing(kind)
        } else if let Some(kind) = ProtocolKind::from_wire(&self.message_type) {
            MessageClass::Protocol(kind)
        } else {
            MessageClass::Unknown
        }
    }
}

/// User-facing subset of an envelope, delivered to notification listeners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub data: JsonValue,
    pub message_id: String,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_users: Option<Vec<String>>,
}

impl Notification {
    pub fn from_envelope(kind: NotificationKind, envelope: NotificationEnvelope) -> Self {
        Self {
            kind,
            data: envelope.data,
            message_id: envelope.message_id,
            timestamp: envelope.timestamp,
            target_users: envelope.target_users,
        }
    }
}
