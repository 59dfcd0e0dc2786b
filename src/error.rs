//! Error types for civic-link.

use thiserror::Error;

/// Errors surfaced by the session and connection managers.
///
/// Connection-level failures are normally reported through the
/// [`ConnectionManager`](crate::ConnectionManager) error listeners instead of
/// being returned; the variants here are what fallible calls hand back.
#[derive(Error, Debug)]
pub enum CivicLinkError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Timeout: {0}")]
    TimeoutError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Server error ({status_code}): {message}")]
    ServerError { status_code: u16, message: String },
}

impl CivicLinkError {
    /// `true` for credential problems the caller must fix (never retried).
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::AuthenticationError(_))
            || matches!(self, Self::ServerError { status_code: 401 | 403, .. })
    }
}

impl From<reqwest::Error> for CivicLinkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CivicLinkError::TimeoutError(err.to_string())
        } else if err.is_decode() {
            CivicLinkError::SerializationError(err.to_string())
        } else {
            CivicLinkError::NetworkError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for CivicLinkError {
    fn from(err: serde_json::Error) -> Self {
        CivicLinkError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for CivicLinkError {
    fn from(err: std::io::Error) -> Self {
        CivicLinkError::StorageError(err.to_string())
    }
}

impl From<toml::de::Error> for CivicLinkError {
    fn from(err: toml::de::Error) -> Self {
        CivicLinkError::ConfigurationError(format!("TOML parse error: {}", err))
    }
}

impl From<toml::ser::Error> for CivicLinkError {
    fn from(err: toml::ser::Error) -> Self {
        CivicLinkError::StorageError(format!("TOML serialize error: {}", err))
    }
}

/// Result type for civic-link operations
pub type Result<T> = std::result::Result<T, CivicLinkError>;
