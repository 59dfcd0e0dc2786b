//! Realtime notification channel.
//!
//! One background task (the actor) owns the channel and every timer.  The
//! public [`ConnectionManager`] handle only sends it commands, so status
//! transitions are serialized and there is never more than one live channel.
//!
//! ```text
//! Disconnected ──connect──► Connecting ──open──► Connected
//!      ▲                       │  ▲                 │ close != 1000 / error
//!      │ disconnect / 1000     │  └──backoff timer──┤
//!      └───────────────────────┴──► Error ─────────►▼
//!                                              Reconnecting
//! ```

pub mod transport;

pub use transport::{
    build_channel_url, Channel, ChannelEvent, OutboundFrame, Transport, WebSocketTransport,
    ABNORMAL_CLOSURE, NORMAL_CLOSURE,
};

use crate::auth::ArcTokenSource;
use crate::clock::{ArcClock, SystemClock};
use crate::config::FeatureConfig;
use crate::error::{CivicLinkError, Result};
use crate::event_handlers::{ConnectionError, ConnectionEvents, Subscription};
use crate::models::{
    ClientMessage, ConnectionOptions, ConnectionStatus, MessageClass, Notification, ServerMessage,
};
use crate::session::{AuthEventKind, AuthStateChange, SessionManager};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant as TokioInstant;

/// Far enough in the future to act as "never" for an unarmed deadline.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

// ── Commands ────────────────────────────────────────────────────────────────

/// Commands sent from the public API to the background connection task.
enum ConnCmd {
    Connect {
        token: String,
        ack: oneshot::Sender<()>,
    },
    Disconnect {
        ack: Option<oneshot::Sender<()>>,
    },
    Send {
        text: String,
        result_tx: oneshot::Sender<Result<()>>,
    },
}

// ── Shared state ────────────────────────────────────────────────────────────

/// State readable from the handle, written only by the actor.
struct SharedState {
    status: Mutex<ConnectionStatus>,
    reconnect_attempts: AtomicU32,
    last_reconnect_delay: Mutex<Option<Duration>>,
    events: ConnectionEvents,
}

impl SharedState {
    fn status(&self) -> ConnectionStatus {
        *lock(&self.status)
    }

    /// Update the status, broadcasting only actual changes.
    fn set_status(&self, status: ConnectionStatus) {
        let previous = std::mem::replace(&mut *lock(&self.status), status);
        if previous != status {
            log::debug!("[civic-link] Connection status {} -> {}", previous, status);
            self.events.emit_status(status);
        }
    }
}

struct ConnectionInner {
    cmd_tx: mpsc::UnboundedSender<ConnCmd>,
    shared: Arc<SharedState>,
    config: FeatureConfig,
    token_source: Arc<RwLock<Option<ArcTokenSource>>>,
}

/// Handle to the realtime notification channel.
///
/// Cheap to clone.  The background task stops, closing any open channel,
/// when the last handle is dropped.
///
/// # Example
///
/// ```rust,no_run
/// use civic_link::{ConnectionManager, FeatureConfig, NotificationKind};
///
/// # async fn example() -> civic_link::Result<()> {
/// let manager = ConnectionManager::builder(FeatureConfig::realtime("wss://civic.example/ws"))
///     .build()?;
///
/// let _sub = manager.on_notification(|n| {
///     if n.kind == NotificationKind::PostCreated {
///         println!("new post: {}", n.data);
///     }
/// });
/// manager.connect(Some("eyJhbGciOi...".to_string())).await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ConnectionInner>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("status", &self.status())
            .field("reconnect_attempts", &self.reconnect_attempts())
            .field("realtime_enabled", &self.inner.config.realtime_enabled())
            .finish()
    }
}

/// Builder for [`ConnectionManager`].
pub struct ConnectionManagerBuilder {
    config: FeatureConfig,
    options: ConnectionOptions,
    transport: Arc<dyn Transport>,
    token_source: Option<ArcTokenSource>,
    clock: ArcClock,
}

impl ConnectionManagerBuilder {
    pub fn options(mut self, options: ConnectionOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the WebSocket transport.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// Where tokens come from when `connect` is called without one and on
    /// every reconnect.
    pub fn token_source(mut self, source: ArcTokenSource) -> Self {
        self.token_source = Some(source);
        self
    }

    /// Clock used for heartbeat payloads and message timestamps.
    pub fn clock(mut self, clock: ArcClock) -> Self {
        self.clock = clock;
        self
    }

    /// Spawn the background task. Must be called within a tokio runtime.
    pub fn build(self) -> Result<ConnectionManager> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            CivicLinkError::InternalError("ConnectionManager requires a tokio runtime".into())
        })?;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(SharedState {
            status: Mutex::new(ConnectionStatus::Disconnected),
            reconnect_attempts: AtomicU32::new(0),
            last_reconnect_delay: Mutex::new(None),
            events: ConnectionEvents::new(),
        });
        let token_source = Arc::new(RwLock::new(self.token_source));

        let actor = ConnectionActor {
            cmd_rx,
            shared: shared.clone(),
            options: self.options,
            ws_url: self.config.realtime.ws_url.clone(),
            channel_name: self.config.realtime.channel.clone(),
            transport: self.transport,
            token_source: token_source.clone(),
            clock: self.clock,
            channel: None,
            token: None,
            heartbeat_at: None,
            reconnect_at: None,
        };
        runtime.spawn(actor.run());

        Ok(ConnectionManager {
            inner: Arc::new(ConnectionInner {
                cmd_tx,
                shared,
                config: self.config,
                token_source,
            }),
        })
    }
}

impl ConnectionManager {
    pub fn builder(config: FeatureConfig) -> ConnectionManagerBuilder {
        ConnectionManagerBuilder {
            config,
            options: ConnectionOptions::default(),
            transport: Arc::new(WebSocketTransport),
            token_source: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Open the channel.
    ///
    /// Without an explicit token the configured [`TokenSource`](crate::TokenSource)
    /// is asked for one.  Silently does nothing when realtime is disabled, when
    /// no token is available, or when already connected with the same token.
    /// Failures are reported through status and error listeners, never
    /// returned.
    pub async fn connect(&self, token: Option<String>) {
        if !self.inner.config.realtime_enabled() {
            log::debug!("[civic-link] Realtime disabled, not connecting");
            return;
        }

        let token = match token.filter(|t| !t.is_empty()) {
            Some(token) => Some(token),
            None => {
                let source = read_lock(&self.inner.token_source).clone();
                match source {
                    Some(source) => source.fresh_token().await,
                    None => None,
                }
            },
        };
        let Some(token) = token else {
            log::debug!("[civic-link] No token available, not connecting");
            return;
        };

        let (ack, done) = oneshot::channel();
        if self.inner.cmd_tx.send(ConnCmd::Connect { token, ack }).is_ok() {
            let _ = done.await;
        }
    }

    /// Close the channel and cancel heartbeat and pending reconnects.
    ///
    /// Idempotent; returns once the manager is `Disconnected`.
    pub async fn disconnect(&self) {
        let (ack, done) = oneshot::channel();
        if self
            .inner
            .cmd_tx
            .send(ConnCmd::Disconnect { ack: Some(ack) })
            .is_ok()
        {
            let _ = done.await;
        }
    }

    /// Fire-and-forget variant of [`disconnect`](Self::disconnect) for
    /// synchronous callers.
    pub fn request_disconnect(&self) {
        self.inner.request_disconnect();
    }

    /// Send a client frame over the open channel.
    pub async fn send(&self, message: &ClientMessage) -> Result<()> {
        let text = serde_json::to_string(message)?;
        let (result_tx, result_rx) = oneshot::channel();
        self.inner
            .cmd_tx
            .send(ConnCmd::Send { text, result_tx })
            .map_err(|_| CivicLinkError::InternalError("Connection task stopped".into()))?;
        result_rx
            .await
            .map_err(|_| CivicLinkError::InternalError("Connection task stopped".into()))?
    }

    /// Follow a session: connect on login, disconnect on logout.
    ///
    /// The session also becomes the token source for reconnects.  The
    /// binding lasts while the returned [`Subscription`] is held.
    pub fn bind_session(&self, session: &SessionManager) -> Subscription {
        *write_lock(&self.inner.token_source) = Some(Arc::new(session.clone()));

        let weak: Weak<ConnectionInner> = Arc::downgrade(&self.inner);
        session.on_auth_change(move |change: &AuthStateChange| {
            let Some(inner) = weak.upgrade() else { return };
            match change.kind {
                AuthEventKind::Login => {
                    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
                        log::warn!("[civic-link] No tokio runtime, cannot connect after login");
                        return;
                    };
                    let manager = ConnectionManager { inner };
                    runtime.spawn(async move { manager.connect(None).await });
                },
                AuthEventKind::Logout => inner.request_disconnect(),
            }
        })
    }

    // ── Introspection ───────────────────────────────────────────────────────

    pub fn status(&self) -> ConnectionStatus {
        self.inner.shared.status()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Consecutive reconnects scheduled since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.shared.reconnect_attempts.load(Ordering::SeqCst)
    }

    /// Delay used for the most recently scheduled reconnect.
    pub fn last_reconnect_delay(&self) -> Option<Duration> {
        *lock(&self.inner.shared.last_reconnect_delay)
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.inner.config
    }

    // ── Events ──────────────────────────────────────────────────────────────

    pub fn on_notification(
        &self,
        f: impl Fn(&Notification) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.shared.events.notification.subscribe(f)
    }

    pub fn on_status_change(
        &self,
        f: impl Fn(&ConnectionStatus) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.shared.events.status.subscribe(f)
    }

    pub fn on_error(&self, f: impl Fn(&ConnectionError) + Send + Sync + 'static) -> Subscription {
        self.inner.shared.events.error.subscribe(f)
    }
}

impl ConnectionInner {
    fn request_disconnect(&self) {
        let _ = self.cmd_tx.send(ConnCmd::Disconnect { ack: None });
    }
}

// ── Actor ───────────────────────────────────────────────────────────────────

enum Step {
    Command(Option<ConnCmd>),
    Channel(Option<ChannelEvent>),
    Heartbeat,
    Reconnect,
}

struct ConnectionActor {
    cmd_rx: mpsc::UnboundedReceiver<ConnCmd>,
    shared: Arc<SharedState>,
    options: ConnectionOptions,
    ws_url: String,
    channel_name: String,
    transport: Arc<dyn Transport>,
    token_source: Arc<RwLock<Option<ArcTokenSource>>>,
    clock: ArcClock,
    channel: Option<Channel>,
    token: Option<String>,
    heartbeat_at: Option<TokioInstant>,
    reconnect_at: Option<TokioInstant>,
}

impl ConnectionActor {
    async fn run(mut self) {
        loop {
            let now = TokioInstant::now();
            let heartbeat_sleep = tokio::time::sleep_until(self.heartbeat_at.unwrap_or(now + FAR_FUTURE));
            tokio::pin!(heartbeat_sleep);
            let reconnect_sleep = tokio::time::sleep_until(self.reconnect_at.unwrap_or(now + FAR_FUTURE));
            tokio::pin!(reconnect_sleep);
            let heartbeat_armed = self.heartbeat_at.is_some();
            let reconnect_armed = self.reconnect_at.is_some();

            let step = tokio::select! {
                biased;

                cmd = self.cmd_rx.recv() => Step::Command(cmd),
                event = next_event(&mut self.channel) => Step::Channel(event),
                _ = &mut heartbeat_sleep, if heartbeat_armed => Step::Heartbeat,
                _ = &mut reconnect_sleep, if reconnect_armed => Step::Reconnect,
            };

            match step {
                Step::Command(Some(ConnCmd::Connect { token, ack })) => {
                    self.handle_connect(token).await;
                    let _ = ack.send(());
                },
                Step::Command(Some(ConnCmd::Disconnect { ack })) => {
                    self.handle_disconnect();
                    if let Some(ack) = ack {
                        let _ = ack.send(());
                    }
                },
                Step::Command(Some(ConnCmd::Send { text, result_tx })) => {
                    let _ = result_tx.send(self.send_text(text));
                },
                Step::Command(None) => {
                    log::debug!("[civic-link] Connection manager dropped, shutting down");
                    self.close_channel("client shutdown");
                    return;
                },
                Step::Channel(Some(event)) => self.handle_channel_event(event),
                Step::Channel(None) => self.handle_closed(None, "channel dropped"),
                Step::Heartbeat => self.send_heartbeat(),
                Step::Reconnect => {
                    self.reconnect_at = None;
                    self.reconnect().await;
                },
            }
        }
    }

    async fn handle_connect(&mut self, token: String) {
        if self.channel.is_some()
            && self.shared.status() == ConnectionStatus::Connected
            && self.token.as_deref() == Some(token.as_str())
        {
            log::debug!("[civic-link] Already connected with this token");
            return;
        }

        self.close_channel("reconnecting with new credentials");
        self.reconnect_at = None;
        self.token = Some(token);
        self.open().await;
    }

    fn handle_disconnect(&mut self) {
        self.reconnect_at = None;
        self.close_channel("client disconnect");
        self.token = None;
        self.shared.reconnect_attempts.store(0, Ordering::SeqCst);
        self.shared.set_status(ConnectionStatus::Disconnected);
    }

    /// Close the current channel (if any) with code 1000 and stop its heartbeat.
    fn close_channel(&mut self, reason: &str) {
        self.heartbeat_at = None;
        if let Some(channel) = self.channel.take() {
            log::debug!("[civic-link] Closing channel: {}", reason);
            let _ = channel.outbound.send(OutboundFrame::Close {
                code: NORMAL_CLOSURE,
                reason: reason.to_string(),
            });
            // Inbound receiver dropped here; late events from it are ignored.
        }
    }

    async fn open(&mut self) {
        let Some(token) = self.token.clone() else {
            return;
        };
        self.shared.set_status(ConnectionStatus::Connecting);

        let url = match build_channel_url(&self.ws_url, &token, &self.channel_name) {
            Ok(url) => url,
            Err(e) => {
                log::warn!("[civic-link] {}", e);
                self.shared.events.emit_error(ConnectionError::new(e.to_string(), false));
                self.shared.set_status(ConnectionStatus::Error);
                return;
            },
        };

        log::debug!("[civic-link] Opening notification channel to {}", self.ws_url);
        let opened = match self.options.connection_timeout() {
            Some(limit) => tokio::time::timeout(limit, self.transport.open(&url))
                .await
                .unwrap_or_else(|_| {
                    Err(CivicLinkError::TimeoutError(format!(
                        "WebSocket handshake exceeded {:?}",
                        limit
                    )))
                }),
            None => self.transport.open(&url).await,
        };

        match opened {
            Ok(channel) => {
                self.channel = Some(channel);
                self.shared.reconnect_attempts.store(0, Ordering::SeqCst);
                self.heartbeat_at = self
                    .options
                    .heartbeat_interval()
                    .map(|interval| TokioInstant::now() + interval);
                log::info!("[civic-link] Notification channel connected");
                self.shared.set_status(ConnectionStatus::Connected);
            },
            Err(e) => {
                log::warn!("[civic-link] Failed to open notification channel: {}", e);
                self.shared.events.emit_error(ConnectionError::new(e.to_string(), true));
                self.shared.set_status(ConnectionStatus::Error);
                self.schedule_reconnect();
            },
        }
    }

    async fn reconnect(&mut self) {
        let source = read_lock(&self.token_source).clone();
        if let Some(source) = source {
            match source.fresh_token().await {
                Some(token) => self.token = Some(token),
                None => {
                    log::info!("[civic-link] Session gone, abandoning reconnect");
                    self.handle_disconnect();
                    return;
                },
            }
        }
        log::debug!(
            "[civic-link] Reconnect attempt {}",
            self.shared.reconnect_attempts.load(Ordering::SeqCst)
        );
        self.open().await;
    }

    /// Arm the backoff timer. At most one reconnect is ever pending.
    fn schedule_reconnect(&mut self) {
        if self.reconnect_at.is_some() {
            return;
        }
        if self.token.is_none() {
            log::debug!("[civic-link] No token, not scheduling reconnect");
            return;
        }
        if !self.options.auto_reconnect {
            log::info!("[civic-link] Auto-reconnect disabled");
            self.shared.set_status(ConnectionStatus::Error);
            return;
        }

        let attempts = self.shared.reconnect_attempts.load(Ordering::SeqCst);
        if let Some(max) = self.options.max_reconnect_attempts {
            if attempts >= max {
                log::warn!("[civic-link] Max reconnection attempts ({}) reached", max);
                self.shared.events.emit_error(ConnectionError::new(
                    format!("Max reconnection attempts ({}) reached", max),
                    false,
                ));
                self.shared.set_status(ConnectionStatus::Error);
                return;
            }
        }

        let delay = self.options.backoff_delay(attempts);
        self.shared.reconnect_attempts.store(attempts + 1, Ordering::SeqCst);
        *lock(&self.shared.last_reconnect_delay) = Some(delay);
        self.reconnect_at = Some(TokioInstant::now() + delay);
        log::info!(
            "[civic-link] Reconnecting in {:?} (attempt {})",
            delay,
            attempts + 1
        );
        self.shared.set_status(ConnectionStatus::Reconnecting);
    }

    fn handle_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Text(text) => self.dispatch(&text),
            ChannelEvent::Binary(data) => {
                log::warn!("[civic-link] Ignoring binary frame ({} bytes)", data.len());
                self.shared.events.emit_error(ConnectionError::new(
                    "Unsupported binary frame",
                    true,
                ));
            },
            ChannelEvent::Error(message) => {
                log::warn!("[civic-link] Channel error: {}", message);
                // The channel is unusable once it reports an error; a `Closed`
                // still queued on it is dropped with the receiver.
                self.close_channel("channel error");
                self.shared.events.emit_error(ConnectionError::new(message, true));
                self.shared.set_status(ConnectionStatus::Error);
                self.schedule_reconnect();
            },
            ChannelEvent::Closed { code, reason } => self.handle_closed(code, &reason),
        }
    }

    fn handle_closed(&mut self, code: Option<u16>, reason: &str) {
        self.channel = None;
        self.heartbeat_at = None;

        if code == Some(NORMAL_CLOSURE) {
            log::info!("[civic-link] Channel closed normally: {}", reason);
            self.shared.reconnect_attempts.store(0, Ordering::SeqCst);
            self.shared.set_status(ConnectionStatus::Disconnected);
        } else {
            log::warn!(
                "[civic-link] Channel closed unexpectedly (code {}): {}",
                code.unwrap_or(ABNORMAL_CLOSURE),
                reason
            );
            self.schedule_reconnect();
        }
    }

    fn dispatch(&self, text: &str) {
        let message = match ServerMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                log::warn!("[civic-link] Failed to parse message: {}", e);
                self.shared.events.emit_error(ConnectionError::new(
                    format!("Malformed message: {}", e),
                    true,
                ));
                return;
            },
        };

        let envelope = message.normalize(self.clock.now_ms());
        match envelope.classify() {
            MessageClass::UserFacing(kind) => {
                log::debug!(
                    "[civic-link] {} message {} received",
                    kind,
                    envelope.message_id
                );
                self.shared
                    .events
                    .emit_notification(&Notification::from_envelope(kind, envelope));
            },
            MessageClass::Protocol(kind) => {
                log::debug!("[civic-link] {} message received", kind.as_str());
            },
            MessageClass::Unknown => {
                log::debug!(
                    "[civic-link] Unhandled message type '{}'",
                    envelope.message_type
                );
            },
        }
    }

    fn send_heartbeat(&mut self) {
        self.heartbeat_at = self
            .options
            .heartbeat_interval()
            .filter(|_| self.channel.is_some())
            .map(|interval| TokioInstant::now() + interval);

        let frame = ClientMessage::heartbeat(self.clock.now_ms());
        match serde_json::to_string(&frame) {
            Ok(text) => {
                if let Err(e) = self.send_text(text) {
                    log::debug!("[civic-link] Heartbeat not sent: {}", e);
                }
            },
            Err(e) => log::warn!("[civic-link] Failed to encode heartbeat: {}", e),
        }
    }

    fn send_text(&self, text: String) -> Result<()> {
        let channel = self
            .channel
            .as_ref()
            .ok_or_else(|| CivicLinkError::WebSocketError("Not connected".into()))?;
        channel
            .outbound
            .send(OutboundFrame::Text(text))
            .map_err(|_| CivicLinkError::WebSocketError("Channel closed".into()))
    }
}

/// Next event from the channel, or pending forever when there is none.
async fn next_event(channel: &mut Option<Channel>) -> Option<ChannelEvent> {
    match channel {
        Some(channel) => channel.inbound.recv().await,
        None => std::future::pending().await,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}
