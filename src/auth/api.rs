use crate::error::{CivicLinkError, Result};
use crate::models::{
    ApiResponse, AuthPayload, LoginCredentials, RefreshPayload, RefreshRequest,
    RegistrationRequest, UserProfile,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Server-side auth operations used by the session manager.
#[async_trait::async_trait]
pub trait AuthApi: Send + Sync + 'static {
    /// `POST /auth/login`
    async fn login(&self, credentials: &LoginCredentials) -> Result<AuthPayload>;

    /// `POST /auth/register`
    async fn register(&self, request: &RegistrationRequest) -> Result<AuthPayload>;

    /// `POST /auth/refresh`
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshPayload>;

    /// `POST /auth/logout`
    async fn logout(&self, refresh_token: &str) -> Result<()>;

    /// `GET /users/profile`
    async fn fetch_profile(&self, access_token: &str) -> Result<UserProfile>;
}

/// A boxed, reference-counted [`AuthApi`].
pub type ArcAuthApi = Arc<dyn AuthApi>;

/// reqwest-backed [`AuthApi`].
///
/// Use [`HttpAuthApi::builder`] to construct instances.
///
/// # Examples
///
/// ```rust,no_run
/// use civic_link::HttpAuthApi;
/// use std::time::Duration;
///
/// # fn example() -> civic_link::Result<()> {
/// let api = HttpAuthApi::builder()
///     .base_url("https://civic.example/api")
///     .timeout(Duration::from_secs(15))
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct HttpAuthApi {
    base_url: String,
    http_client: reqwest::Client,
}

impl HttpAuthApi {
    /// Create a new builder
    pub fn builder() -> HttpAuthApiBuilder {
        HttpAuthApiBuilder::new()
    }

    /// Base URL requests are issued against
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The underlying HTTP client, for application requests that should share
    /// its connection pool.
    pub fn http_client(&self) -> &reqwest::Client {
        &self.http_client
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send `request`, mapping non-2xx statuses to errors.
    async fn execute(
        &self,
        label: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response> {
        let start = Instant::now();
        let response = request.send().await?;
        let status = response.status();
        log::debug!(
            "[civic-link] [{}] HTTP response received in {:?}, status={}",
            label,
            start.elapsed(),
            status
        );

        if status.is_success() {
            return Ok(response);
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        let message = envelope_message(&error_text).unwrap_or(error_text);
        log::debug!("[civic-link] [{}] Request failed: {}", label, message);

        Err(match status.as_u16() {
            401 | 403 => CivicLinkError::AuthenticationError(format!(
                "{} failed ({}): {}",
                label, status, message
            )),
            code => CivicLinkError::ServerError {
                status_code: code,
                message,
            },
        })
    }

    /// Send `request` and unwrap the `{success, data, message}` envelope.
    async fn send<T: DeserializeOwned>(
        &self,
        label: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        let response = self.execute(label, request).await?;
        let status = response.status();
        let envelope = response.json::<ApiResponse<T>>().await?;
        envelope.into_data().map_err(|message| CivicLinkError::ServerError {
            status_code: status.as_u16(),
            message,
        })
    }
}

/// On the credential routes a 2xx envelope with `success: false` rejects the
/// submitted credentials.
fn credential_rejection(label: &str, error: CivicLinkError) -> CivicLinkError {
    match error {
        CivicLinkError::ServerError {
            status_code,
            message,
        } if (200..300).contains(&status_code) => CivicLinkError::AuthenticationError(format!(
            "{} failed ({}): {}",
            label, status_code, message
        )),
        other => other,
    }
}

fn envelope_message(body: &str) -> Option<String> {
    serde_json::from_str::<ApiResponse<serde_json::Value>>(body)
        .ok()
        .and_then(|r| r.message)
}

#[async_trait::async_trait]
impl AuthApi for HttpAuthApi {
    async fn login(&self, credentials: &LoginCredentials) -> Result<AuthPayload> {
        let url = self.url("/auth/login");
        log::debug!(
            "[civic-link] [LOGIN] Authenticating '{}' at url={}",
            credentials.email,
            url
        );
        let payload: AuthPayload = self
            .send("LOGIN", self.http_client.post(&url).json(credentials))
            .await
            .map_err(|e| credential_rejection("LOGIN", e))?;
        log::debug!(
            "[civic-link] [LOGIN] Authenticated user id={}",
            payload.user.id
        );
        Ok(payload)
    }

    async fn register(&self, request: &RegistrationRequest) -> Result<AuthPayload> {
        let url = self.url("/auth/register");
        log::debug!(
            "[civic-link] [REGISTER] Registering '{}' at url={}",
            request.username,
            url
        );
        self.send("REGISTER", self.http_client.post(&url).json(request))
            .await
            .map_err(|e| credential_rejection("REGISTER", e))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshPayload> {
        let body = RefreshRequest {
            refresh_token: refresh_token.to_string(),
        };
        self.send(
            "REFRESH",
            self.http_client.post(self.url("/auth/refresh")).json(&body),
        )
        .await
    }

    async fn logout(&self, refresh_token: &str) -> Result<()> {
        let body = RefreshRequest {
            refresh_token: refresh_token.to_string(),
        };
        // Body ignored; any 2xx counts.
        self.execute(
            "LOGOUT",
            self.http_client.post(self.url("/auth/logout")).json(&body),
        )
        .await?;
        Ok(())
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<UserProfile> {
        self.send(
            "PROFILE",
            super::bearer(self.http_client.get(self.url("/users/profile")), access_token),
        )
        .await
    }
}

/// Builder for configuring [`HttpAuthApi`] instances.
#[derive(Debug)]
pub struct HttpAuthApiBuilder {
    base_url: Option<String>,
    timeout: Duration,
    connect_timeout: Duration,
}

impl HttpAuthApiBuilder {
    fn new() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Set the API base URL, e.g. `https://civic.example/api`
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set TCP/TLS connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Take the request timeout from session timings.
    pub fn timings(self, timings: &crate::SessionTimings) -> Self {
        self.timeout(timings.request_timeout)
    }

    /// Build the client
    pub fn build(self) -> Result<HttpAuthApi> {
        let base_url = self
            .base_url
            .ok_or_else(|| CivicLinkError::ConfigurationError("base_url is required".into()))?;
        let base_url = base_url.trim_end_matches('/').to_string();
        reqwest::Url::parse(&base_url).map_err(|e| {
            CivicLinkError::ConfigurationError(format!("Invalid base_url '{}': {}", base_url, e))
        })?;

        let http_client = reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| CivicLinkError::ConfigurationError(e.to_string()))?;

        Ok(HttpAuthApi {
            base_url,
            http_client,
        })
    }
}
