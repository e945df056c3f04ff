//! Token access and connection request construction.
//!
//! The realtime core never stores credentials. It reads the current bearer
//! token through the injected [`TokenProvider`] at the moment of each
//! connection attempt, so a token refreshed between reconnects is picked up
//! automatically.

use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;

use crate::error::RealtimeError;

/// Synchronous read access to the current bearer token.
///
/// Absence is a valid, expected state (unauthenticated); a `None` return
/// makes the surrounding `connect()` call a logged no-op rather than an
/// error.
pub trait TokenProvider: Send + Sync {
    /// Returns the current bearer token, if any.
    fn token(&self) -> Option<String>;
}

/// Builds the WebSocket client request for one connection attempt.
///
/// Appends the token as a `token` query parameter and validates the result
/// through [`IntoClientRequest`]. A URL that cannot be turned into a client
/// request is a fatal construction failure for this attempt.
///
/// # Errors
///
/// Returns [`RealtimeError::InvalidUrl`] when the composed URL is not a
/// valid WebSocket client request target.
pub fn connect_request(base_url: &str, token: &str) -> Result<Request, RealtimeError> {
    let separator = if base_url.contains('?') { '&' } else { '?' };
    let url = format!("{base_url}{separator}token={token}");

    url.into_client_request()
        .map_err(|e| RealtimeError::InvalidUrl(e.to_string()))
}
