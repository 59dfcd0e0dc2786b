use serde::{Deserialize, Serialize};

/// Access/refresh token pair issued by the auth endpoints.
///
/// Both tokens are JWT bearer tokens carrying an `exp` claim.  The access token
/// is short-lived (tens of minutes), the refresh token long-lived (hours+).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    /// Short-lived bearer token for the `Authorization` header
    pub access_token: String,
    /// Long-lived token exchanged for a new pair
    pub refresh_token: String,
    /// Token type, normally "bearer"
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl TokenPair {
    /// Create a bearer token pair
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            token_type: default_token_type(),
        }
    }
}

// Tokens are credentials; keep them out of logs.
impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .finish()
    }
}
