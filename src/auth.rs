//! Authentication for civic-link.
//!
//! [`AuthApi`] is the seam to the server's auth endpoints; [`HttpAuthApi`] is
//! the reqwest implementation.  [`TokenSource`] is how the connection manager
//! obtains a credential on every connect or reconnect without knowing anything
//! about JWT claims.

mod api;
mod provider;

pub use api::{ArcAuthApi, AuthApi, HttpAuthApi, HttpAuthApiBuilder};
pub use provider::{bearer, ArcTokenSource, StaticToken, TokenSource};
