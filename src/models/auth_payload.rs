use serde::{Deserialize, Serialize};

use super::token_pair::TokenPair;
use super::user_profile::UserProfile;

/// `data` of a successful login or register response: the token pair plus
/// the user profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthPayload {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub user: UserProfile,
}

/// `data` of a successful refresh response.
///
/// Some deployments return the refreshed profile alongside the tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshPayload {
    #[serde(flatten)]
    pub tokens: TokenPair,
    #[serde(default)]
    pub user: Option<UserProfile>,
}
