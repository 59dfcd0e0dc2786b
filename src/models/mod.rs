//! Data models for civic-link.
//!
//! Defines the auth endpoint request/response shapes, the persisted token and
//! profile types, and the notification channel wire messages.

pub mod api_response;
pub mod auth_payload;
pub mod client_message;
pub mod connection_options;
pub mod connection_status;
pub mod login_request;
pub mod notification;
pub mod server_message;
pub mod token_pair;
pub mod user_profile;

#[cfg(test)]
mod tests;

pub use api_response::ApiResponse;
pub use auth_payload::{AuthPayload, RefreshPayload};
pub use client_message::{ClientMessage, HeartbeatData};
pub use connection_options::ConnectionOptions;
pub use connection_status::ConnectionStatus;
pub use login_request::{LoginCredentials, RefreshRequest, RegistrationRequest};
pub use notification::{
    MessageClass, Notification, NotificationEnvelope, NotificationKind, ProtocolKind,
};
pub use server_message::ServerMessage;
pub use token_pair::TokenPair;
pub use user_profile::UserProfile;
