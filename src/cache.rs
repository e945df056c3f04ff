//! Cache invalidation keys and the invalidation capability.
//!
//! Push messages carry the identity of server-side state that changed; the
//! router translates them into [`CacheKey`]s and asks the application's
//! query cache to discard the matching entries. Invalidation is
//! fire-and-forget: no handler depends on it completing.

use std::fmt;

/// Logical identifier for a cached resource or query.
///
/// The rendered form (via [`fmt::Display`]) is the stable contract with the
/// application cache layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// The notification feed.
    Notifications,
    /// A single project, addressed by its opaque id.
    Project(String),
    /// The project list.
    Projects,
    /// The user list.
    Users,
    /// A user-search result set, addressed by its query string.
    ///
    /// The empty query names the default (unfiltered) search results.
    UserSearch(String),
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Notifications => write!(f, "notifications"),
            Self::Project(id) => write!(f, "project:{id}"),
            Self::Projects => write!(f, "projects"),
            Self::Users => write!(f, "users"),
            Self::UserSearch(query) => write!(f, "search-users:{query}"),
        }
    }
}

/// Discards cached state for a [`CacheKey`].
///
/// Implementations bridge to the application's query cache. Invalidation
/// may itself be asynchronous; implementations that need async work should
/// spawn it, since the router never awaits completion.
pub trait CacheInvalidator: Send + Sync {
    /// Marks the entry (or entries) named by `key` as stale.
    fn invalidate(&self, key: CacheKey);
}
