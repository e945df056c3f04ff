//! Close-code policy: numeric constants and classification.
//!
//! The server signals why a connection ended through the WebSocket close
//! code (and sometimes only through the close reason text). Classification
//! decides between stopping, ending the session, and feeding the
//! reconnection policy. Getting this table wrong either strands the user
//! on a dead session or hammers the server after an intentional shutdown.

/// Intentional client/server shutdown.
pub const NORMAL: u16 = 1000;

/// Connection lost without a close handshake.
pub const ABNORMAL: u16 = 1006;

/// Server-reported policy violation.
pub const POLICY_VIOLATION: u16 = 1008;

/// Server-side failure.
pub const INTERNAL_ERROR: u16 = 1011;

/// Invalid or expired token (application-defined).
pub const UNAUTHORIZED: u16 = 4001;

/// Access denied (application-defined).
pub const FORBIDDEN: u16 = 4003;

/// Account no longer valid (application-defined).
pub const USER_NOT_FOUND: u16 = 4004;

/// Substring of a close reason that marks an authorization failure
/// regardless of the close code. Matched case-insensitively.
const AUTH_FAILURE_KEYWORD: &str = "unauthorized";

/// What the connection manager should do after a close event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAction {
    /// Intentional closure: stop, no reconnect.
    Stop,
    /// Authorization failure: end the session, no reconnect.
    Logout,
    /// Transient failure: hand over to the reconnection policy.
    Reconnect,
}

/// Classifies a close event into the action the manager must take.
///
/// The reason text overrides the code: a close whose reason mentions an
/// authorization failure ends the session even when the code alone would
/// have allowed a reconnect.
#[must_use]
pub fn classify(code: u16, reason: &str) -> CloseAction {
    if reason.to_ascii_lowercase().contains(AUTH_FAILURE_KEYWORD) {
        return CloseAction::Logout;
    }

    match code {
        NORMAL => CloseAction::Stop,
        UNAUTHORIZED | FORBIDDEN | USER_NOT_FOUND => CloseAction::Logout,
        _ => CloseAction::Reconnect,
    }
}
