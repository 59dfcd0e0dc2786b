//! # civic-link
//!
//! Client-side session and realtime connection management for the civic app.
//!
//! - [`SessionManager`] owns the token pair and cached profile: login,
//!   registration, logout, proactive refresh with bounded retries and
//!   cross-context logout detection.
//! - [`ConnectionManager`] keeps one notification channel open with
//!   heartbeats, exponential-backoff reconnection and typed dispatch.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use civic_link::{
//!     ConnectionManager, FeatureConfig, HttpAuthApi, LoginCredentials, SessionManager,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> civic_link::Result<()> {
//! let api = HttpAuthApi::builder().base_url("https://civic.example/api").build()?;
//! let session = SessionManager::builder(Arc::new(api)).build();
//!
//! let realtime = ConnectionManager::builder(FeatureConfig::realtime("wss://civic.example/ws"))
//!     .build()?;
//! let _binding = realtime.bind_session(&session);
//! let _feed = realtime.on_notification(|n| println!("{}: {}", n.kind, n.data));
//!
//! session.login(LoginCredentials::new("ada@example.org", "hunter2")).await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod clock;
pub mod config;
pub mod connection;
pub mod error;
pub mod event_handlers;
pub mod models;
pub mod session;
pub mod storage;
pub mod timings;
pub mod token;

pub use auth::{ArcAuthApi, ArcTokenSource, AuthApi, HttpAuthApi, HttpAuthApiBuilder, StaticToken, TokenSource};
pub use clock::{ArcClock, Clock, ManualClock, SystemClock};
pub use config::{FeatureConfig, PollingConfig, RealtimeConfig, RealtimeFeatures};
pub use connection::{
    Channel, ChannelEvent, ConnectionManager, ConnectionManagerBuilder, OutboundFrame, Transport,
    WebSocketTransport,
};
pub use error::{CivicLinkError, Result};
pub use event_handlers::{ConnectionError, ConnectionEvents, Listeners, Subscription};
pub use models::{
    ApiResponse, AuthPayload, ClientMessage, ConnectionOptions, ConnectionStatus,
    LoginCredentials, MessageClass, Notification, NotificationEnvelope, NotificationKind,
    ProtocolKind, RefreshPayload, RegistrationRequest, ServerMessage, TokenPair, UserProfile,
};
pub use session::{AuthEventKind, AuthStateChange, SessionManager, SessionManagerBuilder};
pub use storage::{FileTokenStore, MemoryTokenStore, StorageChange, TokenStore};
pub use timings::{SessionTimings, SessionTimingsBuilder};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
