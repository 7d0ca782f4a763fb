//! Authentication types.
//!
//! Tokens, credentials, and the session events the client broadcasts to
//! the session layer.

mod credentials;
mod tokens;

pub use credentials::{Credentials, Registration};
pub use tokens::{AccessToken, RefreshToken, TokenPair};

/// Session lifecycle events emitted by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// The session ended: a refresh episode failed, a replayed request was
    /// still rejected, or the caller logged out. Fired once per episode.
    Logout,
    /// A refresh succeeded. Fired once per refresh.
    TokenRefreshed(AccessToken),
}
