//! Feature configuration
//!
//! Decides whether the realtime channel is used at all, where it connects,
//! and which polling fallback the application should run instead.
//!
//! # Configuration Format
//!
//! ```toml
//! [realtime]
//! enabled = true                         # Open the notification channel
//! ws_url = "wss://api.example.org/ws"    # Channel endpoint
//! channel = "notifications"              # Sent as connection_type
//!
//! [features]
//! notifications = true
//! search = false
//! analytics = false
//!
//! [polling]
//! enabled = true                         # Fallback when realtime is off
//! interval_ms = 30000
//! ```
//!
//! Environment overrides (applied by [`FeatureConfig::apply_env_overrides`]):
//! `CIVIC_LINK_REALTIME_ENABLED` and `CIVIC_LINK_WS_URL`.

use crate::error::{CivicLinkError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Env var overriding `realtime.enabled`.
pub const ENV_REALTIME_ENABLED: &str = "CIVIC_LINK_REALTIME_ENABLED";
/// Env var overriding `realtime.ws_url`.
pub const ENV_WS_URL: &str = "CIVIC_LINK_WS_URL";

/// Feature flags read by the connection manager and the embedding app.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Realtime channel settings
    #[serde(default)]
    pub realtime: RealtimeConfig,

    /// Realtime sub-features
    #[serde(default)]
    pub features: RealtimeFeatures,

    /// Polling fallback
    #[serde(default)]
    pub polling: PollingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Master switch; when false every connect is a silent no-op (default: false)
    #[serde(default)]
    pub enabled: bool,

    /// Channel endpoint, `ws://`/`wss://` (or `http(s)://`, rewritten on connect)
    #[serde(default = "default_ws_url")]
    pub ws_url: String,

    /// Logical channel name sent as the `connection_type` query parameter
    #[serde(default = "default_channel")]
    pub channel: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealtimeFeatures {
    #[serde(default = "default_true")]
    pub notifications: bool,

    #[serde(default)]
    pub search: bool,

    #[serde(default)]
    pub analytics: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Poll instead of streaming (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Poll period in milliseconds (default: 30000)
    #[serde(default = "default_polling_interval_ms")]
    pub interval_ms: u64,
}

fn default_ws_url() -> String {
    "ws://localhost:8080/ws".to_string()
}

fn default_channel() -> String {
    "notifications".to_string()
}

fn default_true() -> bool {
    true
}

fn default_polling_interval_ms() -> u64 {
    30000
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ws_url: default_ws_url(),
            channel: default_channel(),
        }
    }
}

impl Default for RealtimeFeatures {
    fn default() -> Self {
        Self {
            notifications: true,
            search: false,
            analytics: false,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: default_polling_interval_ms(),
        }
    }
}

impl FeatureConfig {
    /// Realtime enabled against `ws_url`, everything else default.
    pub fn realtime(ws_url: impl Into<String>) -> Self {
        let mut config = Self::default();
        config.realtime.enabled = true;
        config.realtime.ws_url = ws_url.into();
        config
    }

    /// Parse a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Load configuration from file
    ///
    /// Returns the default configuration if the file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!(
                "[civic-link] No feature config at {}, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            CivicLinkError::ConfigurationError(format!("Failed to read config file: {}", e))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Apply `CIVIC_LINK_*` environment overrides from the process environment.
    pub fn apply_env_overrides(self) -> Result<Self> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (used by tests).
    pub fn apply_overrides_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        if let Some(raw) = lookup(ENV_REALTIME_ENABLED) {
            self.realtime.enabled = parse_bool(&raw).ok_or_else(|| {
                CivicLinkError::ConfigurationError(format!(
                    "{} must be a boolean, got '{}'",
                    ENV_REALTIME_ENABLED, raw
                ))
            })?;
        }
        if let Some(url) = lookup(ENV_WS_URL) {
            if !url.trim().is_empty() {
                self.realtime.ws_url = url.trim().to_string();
            }
        }
        Ok(self)
    }

    /// Whether the notification channel should be opened.
    pub fn realtime_enabled(&self) -> bool {
        self.realtime.enabled
    }

    /// Polling period, or `None` when the realtime channel replaces polling
    /// or polling is switched off.
    pub fn polling_interval(&self) -> Option<Duration> {
        (!self.realtime.enabled && self.polling.enabled && self.polling.interval_ms > 0)
            .then(|| Duration::from_millis(self.polling.interval_ms))
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_disable_realtime() {
        let config = FeatureConfig::default();
        assert!(!config.realtime_enabled());
        assert_eq!(config.realtime.channel, "notifications");
        assert!(config.features.notifications);
        assert_eq!(config.polling_interval(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_partial_toml() {
        let config = FeatureConfig::from_toml_str(
            r#"
            [realtime]
            enabled = true
            ws_url = "wss://civic.example/ws"

            [features]
            analytics = true
            "#,
        )
        .unwrap();

        assert!(config.realtime_enabled());
        assert_eq!(config.realtime.ws_url, "wss://civic.example/ws");
        assert_eq!(config.realtime.channel, "notifications");
        assert!(config.features.notifications);
        assert!(config.features.analytics);
        assert_eq!(config.polling_interval(), None);
    }

    #[test]
    fn test_invalid_toml_is_configuration_error() {
        let err = FeatureConfig::from_toml_str("[realtime\nenabled = 1").unwrap_err();
        assert!(matches!(err, CivicLinkError::ConfigurationError(_)));
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let dir = TempDir::new().unwrap();
        let config = FeatureConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, FeatureConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("features.toml");
        std::fs::write(&path, "[polling]\nenabled = false\n").unwrap();

        let config = FeatureConfig::load(&path).unwrap();
        assert!(!config.polling.enabled);
        assert_eq!(config.polling_interval(), None);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_REALTIME_ENABLED, "yes"),
            (ENV_WS_URL, " wss://override/ws "),
        ]
        .into_iter()
        .collect();

        let config = FeatureConfig::default()
            .apply_overrides_from(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert!(config.realtime_enabled());
        assert_eq!(config.realtime.ws_url, "wss://override/ws");
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let err = FeatureConfig::default()
            .apply_overrides_from(|k| (k == ENV_REALTIME_ENABLED).then(|| "maybe".to_string()))
            .unwrap_err();
        assert!(matches!(err, CivicLinkError::ConfigurationError(_)));
    }
}
