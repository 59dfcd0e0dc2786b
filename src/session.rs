//! Session manager: token pair ownership and the refresh lifecycle.
//!
//! A [`SessionManager`] stores the access token, refresh token and cached
//! user profile in a [`TokenStore`], keeps the access token fresh with a
//! recurring timer, and broadcasts [`AuthStateChange`] events on login and
//! logout.
//!
//! ```text
//!  login/register ──► store pair + profile ──► start timer ──► emit Login
//!        timer tick ──► should_refresh? ──► refresh (single-flight)
//!                                             ├─ ok   ──► store pair, reset retries
//!                                             └─ fail ──► retries += 1 ─► forced logout at max
//!  logout / forced / other context ──► clear, stop timer ──► emit Logout
//! ```
//!
//! Tokens are never cached in memory; every read goes through the store so a
//! logout written by another context is seen immediately.

use crate::auth::{bearer, ArcAuthApi, TokenSource};
use crate::clock::{ArcClock, SystemClock};
use crate::error::{CivicLinkError, Result};
use crate::event_handlers::{Listeners, Subscription};
use crate::models::{AuthPayload, LoginCredentials, RegistrationRequest, TokenPair, UserProfile};
use crate::storage::{MemoryTokenStore, StorageChange, TokenStore};
use crate::timings::SessionTimings;
use crate::token;
use futures_util::future::{self, BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Storage key of the access token.
pub const ACCESS_TOKEN_KEY: &str = "civic_link.access_token";
/// Storage key of the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "civic_link.refresh_token";
/// Storage key of the JSON-serialized [`UserProfile`].
pub const USER_KEY: &str = "civic_link.user";

const SESSION_KEYS: [&str; 3] = [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY];

/// Kind of auth-state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthEventKind {
    Login,
    Logout,
}

/// Payload of the auth-state broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthStateChange {
    pub kind: AuthEventKind,
    /// The signed-in user for `Login`, `None` for `Logout`
    pub user: Option<UserProfile>,
}

impl AuthStateChange {
    fn login(user: UserProfile) -> Self {
        Self {
            kind: AuthEventKind::Login,
            user: Some(user),
        }
    }

    fn logout() -> Self {
        Self {
            kind: AuthEventKind::Logout,
            user: None,
        }
    }
}

type RefreshFuture = Shared<BoxFuture<'static, Option<String>>>;

/// A refresh request and the refresh token it was started with.
struct InFlightRefresh {
    refresh_token: String,
    future: RefreshFuture,
}

struct SessionInner {
    api: ArcAuthApi,
    store: Arc<dyn TokenStore>,
    clock: ArcClock,
    timings: SessionTimings,
    /// Consecutive failed refreshes
    retry_count: AtomicU32,
    /// Whether this context currently considers the session live
    active: AtomicBool,
    events: Listeners<AuthStateChange>,
    refresh_timer: Mutex<Option<JoinHandle<()>>>,
    in_flight: Mutex<Option<InFlightRefresh>>,
    storage_watch: Mutex<Option<Subscription>>,
}

/// Owner of the authenticated session.
///
/// Cheap to clone; clones share the same state.
///
/// # Example
///
/// ```rust,no_run
/// use civic_link::{HttpAuthApi, LoginCredentials, SessionManager};
/// use std::sync::Arc;
///
/// # async fn example() -> civic_link::Result<()> {
/// let api = HttpAuthApi::builder().base_url("https://civic.example/api").build()?;
/// let session = SessionManager::builder(Arc::new(api)).build();
///
/// let user = session
///     .login(LoginCredentials::new("ada@example.org", "hunter2"))
///     .await?;
/// println!("welcome {}", user.display_name);
/// assert!(session.is_authenticated());
///
/// session.logout().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("active", &self.inner.active.load(Ordering::SeqCst))
            .field("retry_count", &self.inner.retry_count.load(Ordering::SeqCst))
            .field("timings", &self.inner.timings)
            .finish()
    }
}

/// Builder for [`SessionManager`].
pub struct SessionManagerBuilder {
    api: ArcAuthApi,
    store: Option<Arc<dyn TokenStore>>,
    clock: ArcClock,
    timings: SessionTimings,
}

impl SessionManagerBuilder {
    /// Token storage backend (default: a fresh [`MemoryTokenStore`]).
    pub fn store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Clock used for expiry decisions (default: [`SystemClock`]).
    pub fn clock(mut self, clock: ArcClock) -> Self {
        self.clock = clock;
        self
    }

    /// Refresh policy.
    pub fn timings(mut self, timings: SessionTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Build the manager.
    ///
    /// Does not start the refresh timer; call [`SessionManager::restore`] to
    /// resume a stored session.
    pub fn build(self) -> SessionManager {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryTokenStore::new()));
        let has_session = matches!(store.get(ACCESS_TOKEN_KEY), Ok(Some(_)));

        let inner = Arc::new(SessionInner {
            api: self.api,
            store,
            clock: self.clock,
            timings: self.timings,
            retry_count: AtomicU32::new(0),
            active: AtomicBool::new(has_session),
            events: Listeners::new(),
            refresh_timer: Mutex::new(None),
            in_flight: Mutex::new(None),
            storage_watch: Mutex::new(None),
        });

        if let Some(changes) = inner.store.changes() {
            let weak: Weak<SessionInner> = Arc::downgrade(&inner);
            let subscription = changes.subscribe(move |change: &StorageChange| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_storage_change(change);
                }
            });
            *lock(&inner.storage_watch) = Some(subscription);
        }

        SessionManager { inner }
    }
}

impl SessionManager {
    /// Start building a manager around `api`.
    pub fn builder(api: ArcAuthApi) -> SessionManagerBuilder {
        SessionManagerBuilder {
            api,
            store: None,
            clock: Arc::new(SystemClock),
            timings: SessionTimings::default(),
        }
    }

    // ── Auth operations ─────────────────────────────────────────────────────

    /// Authenticate with credentials.
    ///
    /// Invalid credentials surface as [`CivicLinkError::AuthenticationError`]
    /// and are never retried.
    pub async fn login(&self, credentials: LoginCredentials) -> Result<UserProfile> {
        let payload = self.inner.api.login(&credentials).await?;
        self.inner.establish(payload)
    }

    /// Create an account and sign in with it.
    pub async fn register(&self, request: RegistrationRequest) -> Result<UserProfile> {
        let payload = self.inner.api.register(&request).await?;
        self.inner.establish(payload)
    }

    /// End the session.
    ///
    /// The server is notified on a best-effort basis; local state is always
    /// cleared and a single `Logout` is emitted even when that call fails.
    pub async fn logout(&self) {
        if let Some(refresh_token) = self.inner.read(REFRESH_TOKEN_KEY) {
            if let Err(e) = self.inner.api.logout(&refresh_token).await {
                log::warn!(
                    "[civic-link] Server logout failed, clearing local session anyway: {}",
                    e
                );
            }
        }
        self.inner.clear_local("logout");
    }

    /// Exchange the refresh token for a new pair.
    ///
    /// Returns the new access token, or `None` when no refresh was possible.
    /// Concurrent callers share one in-flight request.
    pub async fn refresh_access_token(&self) -> Option<String> {
        SessionInner::refresh(&self.inner).await
    }

    /// Resume a persisted session at startup.
    ///
    /// Clears storage holding only part of a session, refreshes an expired
    /// access token while the refresh token is still valid, re-reads the
    /// profile from the server and starts the refresh timer.  Returns the
    /// signed-in user, or `None` when there is no usable session.
    pub async fn restore(&self) -> Result<Option<UserProfile>> {
        let inner = &self.inner;
        let access = inner.read(ACCESS_TOKEN_KEY);
        let refresh = inner.read(REFRESH_TOKEN_KEY);
        let cached_user = self.stored_user();

        let user = match (access, refresh, cached_user) {
            (None, None, None) => {
                inner.active.store(false, Ordering::SeqCst);
                return Ok(None);
            },
            (Some(_), Some(_), Some(user)) => user,
            _ => {
                log::warn!("[civic-link] Stored session is incomplete, clearing it");
                inner.active.store(false, Ordering::SeqCst);
                inner.store.remove_many(&SESSION_KEYS)?;
                return Ok(None);
            },
        };

        if self.is_refresh_token_expired() {
            log::info!("[civic-link] Stored refresh token has expired, clearing session");
            inner.active.store(false, Ordering::SeqCst);
            inner.store.remove_many(&SESSION_KEYS)?;
            return Ok(None);
        }
        inner.active.store(true, Ordering::SeqCst);
        if !self.is_authenticated() {
            log::debug!("[civic-link] Stored access token expired, refreshing");
            self.refresh_access_token().await;
            if !inner.active.load(Ordering::SeqCst) {
                return Ok(None);
            }
        }

        let user = match self.access_token() {
            Some(access) if self.is_authenticated() => {
                match inner.api.fetch_profile(&access).await {
                    Ok(profile) => {
                        let json = serde_json::to_string(&profile)?;
                        inner.store.set_many(&[(USER_KEY, json.as_str())])?;
                        profile
                    },
                    Err(e) if e.is_authentication() => {
                        log::warn!("[civic-link] Stored session rejected by server: {}", e);
                        inner.clear_local("session rejected");
                        return Ok(None);
                    },
                    Err(e) => {
                        log::debug!("[civic-link] Profile re-fetch failed, using cached: {}", e);
                        user
                    },
                }
            },
            _ => user,
        };

        SessionInner::start_refresh_timer(inner);
        log::info!("[civic-link] Session restored for user id={}", user.id);
        inner.events.emit(&AuthStateChange::login(user.clone()));
        Ok(Some(user))
    }

    /// Refresh right away if the token is close to expiry. Call when the app
    /// or window regains focus, since timers may have been suspended.
    pub async fn on_focus_regained(&self) {
        if self.is_authenticated() && self.should_refresh_token() {
            log::debug!("[civic-link] Focus regained near token expiry, refreshing");
            self.refresh_access_token().await;
        }
    }

    /// Re-check storage for a logout performed by another context.
    ///
    /// Backends with change notifications trigger this automatically; call it
    /// manually for stores shared with other processes.
    pub fn handle_external_invalidation(&self) {
        if self.inner.active.load(Ordering::SeqCst) && self.inner.read(ACCESS_TOKEN_KEY).is_none() {
            self.inner.end_from_elsewhere();
        }
    }

    /// Attach `Authorization: Bearer <access token>`, refreshing first if the
    /// token is close to expiry.
    pub async fn authorized_request(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder> {
        let token = self
            .fresh_token()
            .await
            .ok_or_else(|| CivicLinkError::AuthenticationError("Not authenticated".into()))?;
        Ok(bearer(request, &token))
    }

    // ── Predicates ──────────────────────────────────────────────────────────

    /// Access token present and not yet expired.
    pub fn is_authenticated(&self) -> bool {
        self.access_token()
            .map(|t| !self.is_token_expired(&t))
            .unwrap_or(false)
    }

    /// `now >= exp`. Tokens without a readable `exp` are expired.
    pub fn is_token_expired(&self, token: &str) -> bool {
        token::is_expired_at(token, self.inner.clock.now_secs())
    }

    /// The access token expires within the refresh threshold.
    ///
    /// `false` when there is no access token at all.
    pub fn should_refresh_token(&self) -> bool {
        self.inner.should_refresh()
    }

    /// The refresh token is missing or expired.
    pub fn is_refresh_token_expired(&self) -> bool {
        self.refresh_token()
            .map(|t| self.is_token_expired(&t))
            .unwrap_or(true)
    }

    // ── Accessors ───────────────────────────────────────────────────────────

    /// Cached profile of the signed-in user.
    pub fn stored_user(&self) -> Option<UserProfile> {
        let raw = self.inner.read(USER_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                log::warn!("[civic-link] Ignoring unreadable stored profile: {}", e);
                None
            },
        }
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner.read(ACCESS_TOKEN_KEY)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.inner.read(REFRESH_TOKEN_KEY)
    }

    /// Consecutive refresh failures since the last success.
    pub fn refresh_retry_count(&self) -> u32 {
        self.inner.retry_count.load(Ordering::SeqCst)
    }

    /// Whether the proactive refresh timer is scheduled.
    pub fn is_refresh_timer_running(&self) -> bool {
        lock(&self.inner.refresh_timer)
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    pub fn timings(&self) -> &SessionTimings {
        &self.inner.timings
    }

    // ── Events ──────────────────────────────────────────────────────────────

    /// Register for login/logout broadcasts.
    pub fn on_auth_change(
        &self,
        f: impl Fn(&AuthStateChange) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.events.subscribe(f)
    }

    /// The auth-state listener registry.
    pub fn auth_events(&self) -> Listeners<AuthStateChange> {
        self.inner.events.clone()
    }
}

#[async_trait::async_trait]
impl TokenSource for SessionManager {
    fn current_token(&self) -> Option<String> {
        self.access_token().filter(|t| !self.is_token_expired(t))
    }

    async fn fresh_token(&self) -> Option<String> {
        if self.should_refresh_token() {
            if let Some(token) = self.refresh_access_token().await {
                return Some(token);
            }
        }
        self.current_token()
    }
}

impl SessionInner {
    fn read(&self, key: &str) -> Option<String> {
        match self.store.get(key) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                log::warn!("[civic-link] Failed to read '{}' from token store: {}", key, e);
                None
            },
        }
    }

    fn should_refresh(&self) -> bool {
        let Some(access) = self.read(ACCESS_TOKEN_KEY) else {
            return false;
        };
        let threshold = self.timings.refresh_threshold.as_secs() as i64;
        match token::remaining_secs(&access, self.clock.now_secs()) {
            Some(remaining) => remaining < threshold,
            None => true,
        }
    }

    /// Store a fresh login/register result and announce it.
    fn establish(self: &Arc<Self>, payload: AuthPayload) -> Result<UserProfile> {
        let AuthPayload { tokens, user } = payload;
        let user_json = serde_json::to_string(&user)?;

        self.store.set_many(&[
            (ACCESS_TOKEN_KEY, tokens.access_token.as_str()),
            (REFRESH_TOKEN_KEY, tokens.refresh_token.as_str()),
            (USER_KEY, user_json.as_str()),
        ])?;
        lock(&self.in_flight).take();
        self.active.store(true, Ordering::SeqCst);
        self.retry_count.store(0, Ordering::SeqCst);
        Self::start_refresh_timer(self);

        log::info!("[civic-link] Signed in as user id={}", user.id);
        self.events.emit(&AuthStateChange::login(user.clone()));
        Ok(user)
    }

    /// Join the in-flight refresh for the stored refresh token or start a new one.
    ///
    /// A request started with a different refresh token (an earlier session)
    /// is never joined.
    fn refresh(self: &Arc<Self>) -> RefreshFuture {
        let Some(refresh_token) = self.read(REFRESH_TOKEN_KEY) else {
            log::debug!("[civic-link] No refresh token, skipping refresh");
            return future::ready(None).boxed().shared();
        };

        let mut slot = lock(&self.in_flight);
        if let Some(existing) = slot.as_ref() {
            if existing.refresh_token == refresh_token {
                log::debug!("[civic-link] Joining in-flight token refresh");
                return existing.future.clone();
            }
            log::debug!("[civic-link] Dropping refresh started by an earlier session");
        }

        let weak = Arc::downgrade(self);
        let started_with = refresh_token.clone();
        let request = async move {
            let inner = weak.upgrade()?;
            let result = inner.perform_refresh(&started_with).await;
            let mut slot = lock(&inner.in_flight);
            if slot
                .as_ref()
                .is_some_and(|entry| entry.refresh_token == started_with)
            {
                slot.take();
            }
            result
        }
        .boxed()
        .shared();
        *slot = Some(InFlightRefresh {
            refresh_token,
            future: request.clone(),
        });
        request
    }

    /// The session this refresh was started for is still the live one.
    fn is_current(&self, refresh_token: &str) -> bool {
        self.active.load(Ordering::SeqCst)
            && self.read(REFRESH_TOKEN_KEY).as_deref() == Some(refresh_token)
    }

    async fn perform_refresh(self: &Arc<Self>, refresh_token: &str) -> Option<String> {
        if token::is_expired_at(refresh_token, self.clock.now_secs()) {
            log::warn!("[civic-link] Refresh token expired, ending session");
            self.force_logout("refresh token expired");
            return None;
        }

        let result = self.api.refresh(refresh_token).await;
        if !self.is_current(refresh_token) {
            log::debug!("[civic-link] Session ended during refresh, discarding result");
            return None;
        }
        match result {
            Ok(payload) => {
                match self.store_refreshed(&payload.tokens, payload.user.as_ref()) {
                    Ok(()) => {
                        self.retry_count.store(0, Ordering::SeqCst);
                        Self::start_refresh_timer(self);
                        log::info!("[civic-link] Access token refreshed");
                        Some(payload.tokens.access_token)
                    },
                    Err(e) => {
                        self.record_refresh_failure(&e);
                        None
                    },
                }
            },
            Err(e) => {
                self.record_refresh_failure(&e);
                None
            },
        }
    }

    fn store_refreshed(&self, tokens: &TokenPair, user: Option<&UserProfile>) -> Result<()> {
        let user_json = user.map(serde_json::to_string).transpose()?;
        let mut entries: Vec<(&str, &str)> = vec![(ACCESS_TOKEN_KEY, tokens.access_token.as_str())];
        // Servers that don't rotate refresh tokens send an empty one.
        if !tokens.refresh_token.is_empty() {
            entries.push((REFRESH_TOKEN_KEY, tokens.refresh_token.as_str()));
        }
        if let Some(json) = user_json.as_deref() {
            entries.push((USER_KEY, json));
        }
        self.store.set_many(&entries)
    }

    fn record_refresh_failure(&self, error: &CivicLinkError) {
        let failures = self.retry_count.fetch_add(1, Ordering::SeqCst) + 1;
        let max = self.timings.max_refresh_retries;
        log::warn!(
            "[civic-link] Token refresh failed ({}/{}): {}",
            failures,
            max,
            error
        );
        if failures >= max {
            self.force_logout("token refresh kept failing");
        }
    }

    /// Logout not requested by the user. Local state is cleared synchronously;
    /// the server is told on a detached task.
    fn force_logout(&self, reason: &str) {
        let refresh_token = self.read(REFRESH_TOKEN_KEY);
        self.clear_local(reason);

        let (Some(refresh_token), Ok(runtime)) =
            (refresh_token, tokio::runtime::Handle::try_current())
        else {
            return;
        };
        let api = self.api.clone();
        runtime.spawn(async move {
            if let Err(e) = api.logout(&refresh_token).await {
                log::debug!("[civic-link] Server logout after forced logout failed: {}", e);
            }
        });
    }

    /// Clear storage, stop the timer and emit `Logout` if the session was live.
    fn clear_local(&self, reason: &str) {
        let was_active = self.active.swap(false, Ordering::SeqCst);
        self.stop_refresh_timer();
        lock(&self.in_flight).take();
        self.retry_count.store(0, Ordering::SeqCst);
        if let Err(e) = self.store.remove_many(&SESSION_KEYS) {
            log::warn!("[civic-link] Failed to clear token store: {}", e);
        }
        if was_active {
            log::info!("[civic-link] Signed out ({})", reason);
            self.events.emit(&AuthStateChange::logout());
        }
    }

    /// Another context cleared the session; follow without touching storage.
    fn end_from_elsewhere(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            self.stop_refresh_timer();
            self.retry_count.store(0, Ordering::SeqCst);
            log::info!("[civic-link] Session ended in another context");
            self.events.emit(&AuthStateChange::logout());
        }
    }

    fn on_storage_change(&self, change: &StorageChange) {
        if change.key == ACCESS_TOKEN_KEY && change.new_value.is_none() {
            self.end_from_elsewhere();
        }
    }

    fn start_refresh_timer(self: &Arc<Self>) {
        let period = self.timings.refresh_interval;
        let mut slot = lock(&self.refresh_timer);
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        if period.is_zero() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log::warn!("[civic-link] No tokio runtime, proactive token refresh disabled");
            return;
        };

        let weak = Arc::downgrade(self);
        *slot = Some(runtime.spawn(async move {
            let mut interval =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                if !inner.active.load(Ordering::SeqCst) {
                    break;
                }
                if inner.should_refresh() {
                    log::debug!("[civic-link] Proactive token refresh");
                    let refresh = Self::refresh(&inner);
                    drop(inner);
                    refresh.await;
                }
            }
        }));
    }

    fn stop_refresh_timer(&self) {
        if let Some(handle) = lock(&self.refresh_timer).take() {
            handle.abort();
        }
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.stop_refresh_timer();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine as _;

    struct NoApi;

    #[async_trait::async_trait]
    impl crate::auth::AuthApi for NoApi {
        async fn login(&self, _: &LoginCredentials) -> Result<AuthPayload> {
            Err(CivicLinkError::AuthenticationError("Invalid credentials".into()))
        }
        async fn register(&self, _: &RegistrationRequest) -> Result<AuthPayload> {
            Err(CivicLinkError::NetworkError("offline".into()))
        }
        async fn refresh(&self, _: &str) -> Result<crate::models::RefreshPayload> {
            Err(CivicLinkError::NetworkError("offline".into()))
        }
        async fn logout(&self, _: &str) -> Result<()> {
            Ok(())
        }
        async fn fetch_profile(&self, _: &str) -> Result<UserProfile> {
            Err(CivicLinkError::NetworkError("offline".into()))
        }
    }

    fn jwt(exp: i64) -> String {
        format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256"}"#),
            URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"u1","exp":{}}}"#, exp))
        )
    }

    fn manager(clock: Arc<ManualClock>) -> (SessionManager, Arc<MemoryTokenStore>) {
        let store = Arc::new(MemoryTokenStore::new());
        let session = SessionManager::builder(Arc::new(NoApi))
            .store(store.clone())
            .clock(clock)
            .build();
        (session, store)
    }

    #[test]
    fn test_predicates_without_session() {
        let (session, _) = manager(Arc::new(ManualClock::at_secs(1_000)));
        assert!(!session.is_authenticated());
        assert!(!session.should_refresh_token());
        assert!(session.is_refresh_token_expired());
        assert!(session.stored_user().is_none());
    }

    #[test]
    fn test_authenticated_until_exp() {
        let clock = Arc::new(ManualClock::at_secs(1_000));
        let (session, store) = manager(clock.clone());
        store
            .set_many(&[
                (ACCESS_TOKEN_KEY, jwt(2_000).as_str()),
                (REFRESH_TOKEN_KEY, jwt(90_000).as_str()),
            ])
            .unwrap();

        assert!(session.is_authenticated());
        clock.set_secs(1_999);
        assert!(session.is_authenticated());
        clock.set_secs(2_000);
        assert!(!session.is_authenticated());
        assert!(!session.is_refresh_token_expired());
    }

    #[test]
    fn test_should_refresh_threshold() {
        let clock = Arc::new(ManualClock::at_secs(0));
        let (session, store) = manager(clock.clone());
        store
            .set_many(&[(ACCESS_TOKEN_KEY, jwt(3_600).as_str())])
            .unwrap();

        clock.set_secs(3_600 - 601);
        assert!(!session.should_refresh_token());
        clock.set_secs(3_600 - 599);
        assert!(session.should_refresh_token());
    }

    #[test]
    fn test_unreadable_profile_is_ignored() {
        let (session, store) = manager(Arc::new(ManualClock::at_secs(0)));
        store.set_many(&[(USER_KEY, "{not json")]).unwrap();
        assert!(session.stored_user().is_none());
    }

    #[tokio::test]
    async fn test_login_error_surfaces_and_stores_nothing() {
        let (session, store) = manager(Arc::new(ManualClock::at_secs(0)));
        let err = session
            .login(LoginCredentials::new("a@b.c", "wrong"))
            .await
            .unwrap_err();
        assert!(err.is_authentication());
        assert!(!store.contains(ACCESS_TOKEN_KEY).unwrap());
        assert!(!session.is_refresh_timer_running());
    }

    #[tokio::test]
    async fn test_refresh_without_token_is_noop() {
        let (session, _) = manager(Arc::new(ManualClock::at_secs(0)));
        assert_eq!(session.refresh_access_token().await, None);
        assert_eq!(session.refresh_retry_count(), 0);
    }
}
