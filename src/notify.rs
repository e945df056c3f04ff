//! User-facing notification capability.
//!
//! The router surfaces task completion, membership changes, and push
//! notifications through this seam. The realtime core never renders
//! anything itself; implementations bridge to the application's toast or
//! banner system.

use serde::Serialize;

/// Severity of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Neutral information (e.g. a task started).
    Info,
    /// Successful completion.
    Success,
    /// Failure the user should see.
    Error,
}

/// Displays notifications to the user.
///
/// Calls are fire-and-forget; implementations that need async work should
/// spawn it.
pub trait Notifier: Send + Sync {
    /// Shows a toast of the given kind.
    fn notify(&self, kind: NotificationKind, text: &str);

    /// Shows a push-style banner for an incoming real-time event.
    fn notify_incoming(&self, text: &str);
}
