//! Token sources consulted by the connection manager.
//!
//! ## Dynamic token source
//!
//! [`TokenSource::fresh_token`] is called on every connect or reconnect.  The
//! [`SessionManager`](crate::SessionManager) implements it by refreshing the
//! access token first when it is close to expiry.
//!
//! ```rust,no_run
//! use civic_link::TokenSource;
//!
//! struct Keychain { /* ... */ }
//!
//! #[async_trait::async_trait]
//! impl TokenSource for Keychain {
//!     fn current_token(&self) -> Option<String> {
//!         None
//!     }
//!
//!     async fn fresh_token(&self) -> Option<String> {
//!         // fetch / refresh token here
//!         Some("fresh-token".into())
//!     }
//! }
//! ```

use std::sync::Arc;

/// Async credential source for the notification channel.
#[async_trait::async_trait]
pub trait TokenSource: Send + Sync + 'static {
    /// The token as currently stored, without any network activity.
    fn current_token(&self) -> Option<String>;

    /// A token fit for a new connection, refreshing first if needed.
    ///
    /// `None` means there is no usable session; callers must not connect.
    async fn fresh_token(&self) -> Option<String> {
        self.current_token()
    }
}

/// A boxed, reference-counted [`TokenSource`].
pub type ArcTokenSource = Arc<dyn TokenSource>;

/// Fixed token, for tests and service accounts.
#[derive(Clone)]
pub struct StaticToken(pub String);

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StaticToken(<redacted>)")
    }
}

#[async_trait::async_trait]
impl TokenSource for StaticToken {
    fn current_token(&self) -> Option<String> {
        (!self.0.is_empty()).then(|| self.0.clone())
    }
}

/// Attach `Authorization: Bearer <token>` to an HTTP request builder.
pub fn bearer(request: reqwest::RequestBuilder, token: &str) -> reqwest::RequestBuilder {
    request.bearer_auth(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_token_source() {
        let source = StaticToken("abc".into());
        assert_eq!(source.current_token(), Some("abc".into()));
        assert_eq!(source.fresh_token().await, Some("abc".into()));

        let empty = StaticToken(String::new());
        assert_eq!(empty.fresh_token().await, None);
    }

    #[test]
    fn test_bearer_header() {
        let client = reqwest::Client::new();
        let request = bearer(client.get("http://localhost:8080/feed"), "tok")
            .build()
            .unwrap();
        assert_eq!(
            request.headers().get("authorization").unwrap(),
            "Bearer tok"
        );
    }

    #[test]
    fn test_static_token_debug_redacts() {
        assert!(!format!("{:?}", StaticToken("secret".into())).contains("secret"));
    }
}
