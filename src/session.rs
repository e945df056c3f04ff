//! Session control capability.
//!
//! Both the connection manager (on authorization close codes) and the
//! message router (on `unauthorized`/`error` message types) need to end the
//! authenticated session. The capability is injected at construction so the
//! realtime core stays unit-testable in isolation, with no ambient logout
//! hook.

/// Ends the authenticated session.
///
/// Implementations typically clear stored credentials and redirect to a
/// login surface. Calls are fire-and-forget from the realtime core's
/// perspective; implementations that need async work should spawn it.
pub trait SessionControl: Send + Sync {
    /// Terminates the current session.
    fn logout(&self);
}
