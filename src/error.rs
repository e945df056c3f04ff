//! Realtime client error types.
//!
//! [`RealtimeError`] is the central error type for the realtime core. Nothing
//! here crosses the public contract boundary: `connect()`, `disconnect()`,
//! and `send()` absorb every failure into a log line, a state transition, or
//! a user-facing notification. The enum exists for the internal fallible
//! helpers (request construction, serialization) and for tests.

/// Client-side error enum covering the realtime failure taxonomy.
///
/// # Categories
///
/// | Category      | Variants                       | Recovery                  |
/// |---------------|--------------------------------|---------------------------|
/// | Construction  | `MissingToken`, `InvalidUrl`   | none; next `connect()`    |
/// | Transport     | `Transport`, `Timeout`         | reconnection policy       |
/// | Local         | `Serialization`                | drop the single frame     |
#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    /// No bearer token is available from the token provider.
    #[error("no auth token available")]
    MissingToken,

    /// The connection URL could not be turned into a client request.
    #[error("invalid connection url: {0}")]
    InvalidUrl(String),

    /// The WebSocket handshake did not complete within the configured bound.
    #[error("connection timed out after {0} ms")]
    Timeout(u64),

    /// Transport-level failure reported by the WebSocket stack.
    #[error("transport error: {0}")]
    Transport(String),

    /// A payload could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RealtimeError {
    /// Returns `true` for per-attempt construction failures.
    ///
    /// Construction failures are terminal for a single `connect()` call: they
    /// are logged and no automatic retry is scheduled. Every other variant
    /// feeds the ordinary close-handling path.
    #[must_use]
    pub const fn is_construction(&self) -> bool {
        matches!(self, Self::MissingToken | Self::InvalidUrl(_))
    }
}
