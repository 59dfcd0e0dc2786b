#![allow(dead_code)]

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use civic_link::{
    AuthApi, AuthPayload, Channel, ChannelEvent, CivicLinkError, Clock, LoginCredentials,
    ManualClock, OutboundFrame, RefreshPayload, RegistrationRequest, Result, TokenPair, Transport,
    UserProfile,
};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant as TokioInstant;

/// Fixed wall-clock origin for tests (2024-01-01T00:00:00Z).
pub const T0: i64 = 1_704_067_200;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Unsigned JWT with the given `exp`; `jti` keeps tokens distinct.
pub fn jwt(exp: i64, jti: usize) -> String {
    format!(
        "{}.{}.sig",
        URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#),
        URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"u1","exp":{},"jti":{}}}"#, exp, jti))
    )
}

pub fn profile(id: &str) -> UserProfile {
    UserProfile {
        id: id.to_string(),
        email: format!("{}@civic.example", id),
        username: id.to_string(),
        display_name: format!("User {}", id),
        bio: None,
        avatar_url: None,
        is_active: true,
        created_at: "2024-01-01T00:00:00Z".to_string(),
        updated_at: "2024-01-01T00:00:00Z".to_string(),
        role: Some("citizen".to_string()),
    }
}

/// Let spawned tasks run without advancing (paused) time.
pub async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

/// Collects every value a listener sees.
pub struct Recorder<T> {
    seen: Arc<Mutex<Vec<T>>>,
}

impl<T: Clone + Send + 'static> Recorder<T> {
    pub fn new() -> Self {
        Self {
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn callback(&self) -> impl Fn(&T) + Send + Sync + 'static {
        let seen = self.seen.clone();
        move |value: &T| seen.lock().unwrap().push(value.clone())
    }

    pub fn values(&self) -> Vec<T> {
        self.seen.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn clear(&self) {
        self.seen.lock().unwrap().clear();
    }
}

// ── Fake auth API ───────────────────────────────────────────────────────────

/// In-memory auth server issuing tokens relative to a [`ManualClock`].
pub struct FakeAuthApi {
    pub clock: Arc<ManualClock>,
    pub user: UserProfile,
    pub login_ok: AtomicBool,
    pub refresh_ok: AtomicBool,
    pub logout_ok: AtomicBool,
    pub profile_ok: AtomicBool,
    pub access_ttl_secs: AtomicI64,
    pub refresh_ttl_secs: AtomicI64,
    pub refresh_delay: Mutex<Duration>,
    pub login_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub profile_calls: AtomicUsize,
    issued: AtomicUsize,
}

impl FakeAuthApi {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            user: profile("u1"),
            login_ok: AtomicBool::new(true),
            refresh_ok: AtomicBool::new(true),
            logout_ok: AtomicBool::new(true),
            profile_ok: AtomicBool::new(true),
            access_ttl_secs: AtomicI64::new(3600),
            refresh_ttl_secs: AtomicI64::new(7 * 24 * 3600),
            refresh_delay: Mutex::new(Duration::ZERO),
            login_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            profile_calls: AtomicUsize::new(0),
            issued: AtomicUsize::new(0),
        }
    }

    pub fn issue(&self) -> TokenPair {
        let now = self.clock.now_secs();
        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        TokenPair::new(
            jwt(now + self.access_ttl_secs.load(Ordering::SeqCst), 2 * n),
            jwt(now + self.refresh_ttl_secs.load(Ordering::SeqCst), 2 * n + 1),
        )
    }

    pub fn set_access_ttl(&self, secs: i64) {
        self.access_ttl_secs.store(secs, Ordering::SeqCst);
    }

    pub fn set_refresh_ttl(&self, secs: i64) {
        self.refresh_ttl_secs.store(secs, Ordering::SeqCst);
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl AuthApi for FakeAuthApi {
    async fn login(&self, credentials: &LoginCredentials) -> Result<AuthPayload> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        if !self.login_ok.load(Ordering::SeqCst) || credentials.password != "correct horse" {
            return Err(CivicLinkError::AuthenticationError(
                "LOGIN failed (401 Unauthorized): Invalid credentials".into(),
            ));
        }
        Ok(AuthPayload {
            tokens: self.issue(),
            user: self.user.clone(),
        })
    }

    async fn register(&self, request: &RegistrationRequest) -> Result<AuthPayload> {
        let mut user = self.user.clone();
        user.username = request.username.clone();
        user.display_name = request.display_name.clone();
        Ok(AuthPayload {
            tokens: self.issue(),
            user,
        })
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<RefreshPayload> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.refresh_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if !self.refresh_ok.load(Ordering::SeqCst) {
            return Err(CivicLinkError::NetworkError("connection refused".into()));
        }
        Ok(RefreshPayload {
            tokens: self.issue(),
            user: None,
        })
    }

    async fn logout(&self, _refresh_token: &str) -> Result<()> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        if self.logout_ok.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CivicLinkError::ServerError {
                status_code: 503,
                message: "unavailable".into(),
            })
        }
    }

    async fn fetch_profile(&self, _access_token: &str) -> Result<UserProfile> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        if self.profile_ok.load(Ordering::SeqCst) {
            Ok(self.user.clone())
        } else {
            Err(CivicLinkError::NetworkError("offline".into()))
        }
    }
}

// ── Fake transport ──────────────────────────────────────────────────────────

/// Server side of one fake channel.
pub struct ServerEnd {
    pub url: String,
    pub opened_at: TokioInstant,
    to_client: mpsc::UnboundedSender<ChannelEvent>,
    from_client: Mutex<mpsc::UnboundedReceiver<OutboundFrame>>,
    received: Mutex<Vec<OutboundFrame>>,
}

impl ServerEnd {
    pub fn push(&self, event: ChannelEvent) {
        let _ = self.to_client.send(event);
    }

    pub fn push_text(&self, text: &str) {
        self.push(ChannelEvent::Text(text.to_string()));
    }

    pub fn close(&self, code: u16) {
        self.push(ChannelEvent::Closed {
            code: Some(code),
            reason: format!("closed with {}", code),
        });
    }

    /// Every frame the client has written so far.
    pub fn frames(&self) -> Vec<OutboundFrame> {
        let mut rx = self.from_client.lock().unwrap();
        let mut received = self.received.lock().unwrap();
        while let Ok(frame) = rx.try_recv() {
            received.push(frame);
        }
        received.clone()
    }

    pub fn closed_by_client(&self) -> bool {
        self.frames()
            .iter()
            .any(|f| matches!(f, OutboundFrame::Close { code: 1000, .. }))
    }
}

/// Transport handing out in-memory channels.
#[derive(Default)]
pub struct FakeTransport {
    pub fail_opens: AtomicBool,
    attempts: Mutex<Vec<TokioInstant>>,
    servers: Mutex<Vec<Arc<ServerEnd>>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let transport = Self::default();
        transport.fail_opens.store(true, Ordering::SeqCst);
        Arc::new(transport)
    }

    pub fn open_attempts(&self) -> Vec<TokioInstant> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn opened(&self) -> usize {
        self.servers.lock().unwrap().len()
    }

    pub fn server(&self, index: usize) -> Arc<ServerEnd> {
        self.servers.lock().unwrap()[index].clone()
    }

    pub fn last_server(&self) -> Arc<ServerEnd> {
        self.servers
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no channel opened")
    }
}

#[async_trait::async_trait]
impl Transport for FakeTransport {
    async fn open(&self, url: &str) -> Result<Channel> {
        self.attempts.lock().unwrap().push(TokioInstant::now());
        if self.fail_opens.load(Ordering::SeqCst) {
            return Err(CivicLinkError::WebSocketError("Connection failed: refused".into()));
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        self.servers.lock().unwrap().push(Arc::new(ServerEnd {
            url: url.to_string(),
            opened_at: TokioInstant::now(),
            to_client: inbound_tx,
            from_client: Mutex::new(outbound_rx),
            received: Mutex::new(Vec::new()),
        }));

        Ok(Channel {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
