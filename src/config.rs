//! Realtime client configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Every timing constant of the
//! reconnection policy is tunable here rather than hardcoded in the
//! connection logic.

use std::time::Duration;

/// Top-level realtime client configuration.
///
/// Loaded once at startup via [`RealtimeConfig::from_env`], or constructed
/// directly when embedding the client in an application that has its own
/// settings layer.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// WebSocket endpoint to connect to (e.g. `ws://localhost:8080/realtime`).
    ///
    /// The bearer token is appended as a `token` query parameter at connect
    /// time; do not include one here.
    pub ws_url: String,

    /// Maximum number of automatic reconnection attempts before giving up.
    ///
    /// Bounds *consecutive* failed attempts; the counter resets to zero on
    /// every successful open.
    pub max_reconnect_attempts: u32,

    /// Delay between a non-normal close and the next connection attempt.
    pub reconnect_interval: Duration,

    /// Hard bound on WebSocket handshake completion.
    ///
    /// An attempt still connecting when this expires is force-closed with a
    /// non-normal code and handed to the ordinary close-handling path.
    pub connection_timeout: Duration,

    /// Delay after a successful open before the single keep-alive ping.
    pub keepalive_delay: Duration,
}

impl RealtimeConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to sensible defaults when a variable is not set or fails
    /// to parse. Calls `dotenvy::dotenv().ok()` to optionally load a `.env`
    /// file.
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let ws_url = std::env::var("REALTIME_WS_URL")
            .unwrap_or_else(|_| "ws://localhost:8080/realtime".to_string());

        let max_reconnect_attempts = parse_env("REALTIME_MAX_RECONNECT_ATTEMPTS", 5);
        let reconnect_interval_ms = parse_env("REALTIME_RECONNECT_INTERVAL_MS", 2_000);
        let connection_timeout_ms = parse_env("REALTIME_CONNECTION_TIMEOUT_MS", 10_000);
        let keepalive_delay_ms = parse_env("REALTIME_KEEPALIVE_DELAY_MS", 2_000);

        Self {
            ws_url,
            max_reconnect_attempts,
            reconnect_interval: Duration::from_millis(reconnect_interval_ms),
            connection_timeout: Duration::from_millis(connection_timeout_ms),
            keepalive_delay: Duration::from_millis(keepalive_delay_ms),
        }
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://localhost:8080/realtime".to_string(),
            max_reconnect_attempts: 5,
            reconnect_interval: Duration::from_millis(2_000),
            connection_timeout: Duration::from_millis(10_000),
            keepalive_delay: Duration::from_millis(2_000),
        }
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
