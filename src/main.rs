//! scribe-realtime console entry point.
//!
//! Connects to the realtime endpoint with the token from the environment
//! and logs everything the connection delivers: connectivity changes, push
//! notifications, cache invalidations. Useful for probing a backend
//! without booting the full application.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use scribe_realtime::auth::TokenProvider;
use scribe_realtime::cache::{CacheInvalidator, CacheKey};
use scribe_realtime::config::RealtimeConfig;
use scribe_realtime::notify::{NotificationKind, Notifier};
use scribe_realtime::session::SessionControl;
use scribe_realtime::translate::NoTranslations;
use scribe_realtime::ws::connection::ConnectionManager;
use scribe_realtime::ws::router::MessageRouter;

/// Reads the bearer token from `REALTIME_TOKEN` on every attempt.
struct EnvToken;

impl TokenProvider for EnvToken {
    fn token(&self) -> Option<String> {
        std::env::var("REALTIME_TOKEN").ok().filter(|t| !t.is_empty())
    }
}

/// Prints notifications to the log instead of a UI surface.
struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, kind: NotificationKind, text: &str) {
        tracing::info!(?kind, text, "toast");
    }

    fn notify_incoming(&self, text: &str) {
        tracing::info!(text, "incoming");
    }
}

/// Logs the keys the application cache would invalidate.
struct ConsoleCache;

impl CacheInvalidator for ConsoleCache {
    fn invalidate(&self, key: CacheKey) {
        tracing::info!(key = %key, "cache invalidated");
    }
}

/// Logs the logout the application session layer would perform.
struct ConsoleSession;

impl SessionControl for ConsoleSession {
    fn logout(&self) {
        tracing::error!("session logout requested by realtime core");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = RealtimeConfig::from_env();
    tracing::info!(url = %config.ws_url, "starting scribe-realtime console");

    // Build the router over console collaborators
    let session = Arc::new(ConsoleSession);
    let router = Arc::new(MessageRouter::new(
        Arc::new(ConsoleCache),
        Arc::new(ConsoleNotifier),
        Arc::new(NoTranslations),
        Arc::clone(&session) as Arc<dyn SessionControl>,
    ));

    // Build the connection manager and connect
    let manager = ConnectionManager::new(
        config,
        Arc::new(EnvToken),
        session as Arc<dyn SessionControl>,
        router,
    );
    manager.connect();

    // Run until interrupted
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    manager.force_disconnect();

    Ok(())
}
