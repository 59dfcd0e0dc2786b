use serde::{Deserialize, Serialize};

/// Profile of the authenticated user, cached next to the token pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// User ID
    pub id: String,
    /// Email address
    pub email: String,
    /// Unique handle
    pub username: String,
    /// Name shown in the UI
    pub display_name: String,
    /// Free-form biography
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    /// Avatar image URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// Whether the account is active
    #[serde(default = "default_is_active")]
    pub is_active: bool,
    /// Account creation time in RFC3339 format
    pub created_at: String,
    /// Account update time in RFC3339 format
    pub updated_at: String,
    /// Role (citizen, representative, admin, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

fn default_is_active() -> bool {
    true
}
