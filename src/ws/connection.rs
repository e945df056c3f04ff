//! WebSocket connection state machine.
//!
//! [`ConnectionManager`] owns the socket lifecycle: establishing, timing
//! out, closing, and reconnecting the single persistent realtime
//! connection. No other component holds or mutates socket state; the
//! message router only receives the frames the read loop hands it.
//!
//! States: `Idle → Connecting → Open → closed`, where a close is either
//! terminal (normal closure, authorization failure, logging out, attempts
//! exhausted) or transient (drives another `Connecting` per the
//! reconnection policy).

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::close_code::{self, CloseAction};
use super::messages::ping_frame;
use super::router::MessageRouter;
use crate::auth::{TokenProvider, connect_request};
use crate::config::RealtimeConfig;
use crate::error::RealtimeError;
use crate::session::SessionControl;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Guaranteed minimum number of retries after immediate closes.
///
/// A server that accepts and then instantly drops connections (e.g. while
/// restarting) must not exhaust the session on the first drop.
const IMMEDIATE_RETRY_FLOOR: u32 = 3;

/// Instructions for the task driving the live socket.
enum Command {
    /// Transmit a serialized text frame.
    Send(String),
    /// Close the socket with a normal-closure frame.
    Close,
}

/// Connection lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Connecting,
    Open,
}

/// The single owned mutable state record for the connection.
///
/// Every flag and counter of the reconnection policy lives here, behind one
/// lock, instead of being scattered across the module.
struct ConnState {
    phase: Phase,
    /// Sender into the live socket task; `None` whenever no socket exists.
    outbound: Option<mpsc::UnboundedSender<Command>>,
    /// Task running the current connection attempt.
    attempt_task: Option<JoinHandle<()>>,
    /// Pending reconnect timer; at most one outstanding at a time.
    reconnect_timer: Option<JoinHandle<()>>,
    /// Consecutive failed attempts; resets to zero on every successful open.
    reconnect_attempts: u32,
    /// Closes that happened after the attempt reached `Open`.
    immediate_close_attempts: u32,
    has_connected_once: bool,
    /// Set when the current attempt reaches `Open`; taken on close.
    opened_at: Option<Instant>,
    /// Set by `force_disconnect()`; suppresses reconnection until the next
    /// explicit `connect()`.
    logging_out: bool,
}

impl ConnState {
    const fn new() -> Self {
        Self {
            phase: Phase::Idle,
            outbound: None,
            attempt_task: None,
            reconnect_timer: None,
            reconnect_attempts: 0,
            immediate_close_attempts: 0,
            has_connected_once: false,
            opened_at: None,
            logging_out: false,
        }
    }

    fn reset_counters(&mut self) {
        self.reconnect_attempts = 0;
        self.immediate_close_attempts = 0;
    }
}

struct Inner {
    config: RealtimeConfig,
    tokens: Arc<dyn TokenProvider>,
    session: Arc<dyn SessionControl>,
    router: Arc<MessageRouter>,
    connected: AtomicBool,
    state: Mutex<ConnState>,
}

impl Inner {
    /// Locks the state record, recovering from a poisoned lock.
    fn state(&self) -> MutexGuard<'_, ConnState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owns and recovers the single persistent realtime connection.
///
/// Cheap to clone; all clones share the same connection. Must be used from
/// within a Tokio runtime: `connect()` spawns the background tasks that
/// drive the socket.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Creates a manager over the injected collaborators.
    ///
    /// The router is shared: the read loop hands it every inbound text
    /// frame of every connection this manager establishes.
    #[must_use]
    pub fn new(
        config: RealtimeConfig,
        tokens: Arc<dyn TokenProvider>,
        session: Arc<dyn SessionControl>,
        router: Arc<MessageRouter>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                tokens,
                session,
                router,
                connected: AtomicBool::new(false),
                state: Mutex::new(ConnState::new()),
            }),
        }
    }

    /// Starts a connection attempt.
    ///
    /// No-op while an attempt is in flight or a socket is open, so
    /// concurrent calls cannot create two sockets. Reads the current token
    /// synchronously; a missing token or malformed URL makes this call a
    /// logged no-op with no retry scheduled.
    pub fn connect(&self) {
        connect(&self.inner);
    }

    /// Soft disconnect request.
    ///
    /// Only tears the socket down when `force_disconnect()` has marked the
    /// session as logging out; otherwise the persistent connection survives
    /// (component teardown and navigation must not kill the session). When
    /// active: cancels any pending reconnect timer, closes the socket with
    /// a normal-closure frame, and resets the reconnection counters.
    pub fn disconnect(&self) {
        let mut st = self.inner.state();
        if !st.logging_out {
            tracing::debug!("disconnect ignored: session is persistent unless logging out");
            return;
        }

        if let Some(timer) = st.reconnect_timer.take() {
            timer.abort();
        }
        if let Some(outbound) = st.outbound.take() {
            let _ = outbound.send(Command::Close);
        }
        if st.phase == Phase::Connecting {
            // The attempt never produced a socket; kill it mid-handshake.
            if let Some(task) = st.attempt_task.take() {
                task.abort();
            }
            st.phase = Phase::Idle;
            st.opened_at = None;
            self.inner.connected.store(false, Ordering::Relaxed);
        }
        st.reset_counters();
        tracing::info!("realtime connection shut down");
    }

    /// Marks the session as logging out, then disconnects.
    ///
    /// The only path that guarantees teardown and stops all future
    /// automatic reconnection. Idempotent: repeated calls close the socket
    /// at most once.
    pub fn force_disconnect(&self) {
        self.inner.state().logging_out = true;
        self.disconnect();
    }

    /// Sends a serializable payload as a JSON text frame.
    ///
    /// Dropped with a log line when the socket is not open or the payload
    /// fails to serialize; the caller is never informed synchronously and
    /// nothing is queued.
    pub fn send<M: Serialize>(&self, message: &M) {
        let payload = match serde_json::to_string(message) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %RealtimeError::from(e), "dropping unserializable outbound message");
                return;
            }
        };

        let st = self.inner.state();
        match (&st.outbound, st.phase) {
            (Some(outbound), Phase::Open) => {
                if outbound.send(Command::Send(payload)).is_err() {
                    tracing::warn!("dropping outbound message: socket task gone");
                }
            }
            _ => {
                tracing::warn!("dropping outbound message: connection not open");
            }
        }
    }

    /// Whether the socket is currently open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Relaxed)
    }

    /// Current consecutive-failure count of the reconnection policy.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.state().reconnect_attempts
    }

    /// Whether this manager has ever reached the open state.
    #[must_use]
    pub fn has_connected_once(&self) -> bool {
        self.inner.state().has_connected_once
    }
}

/// Guarded entry point for both manual and scheduled connection attempts.
fn connect(inner: &Arc<Inner>) {
    {
        let mut st = inner.state();
        if st.phase != Phase::Idle {
            tracing::debug!(phase = ?st.phase, "connect ignored: attempt already in flight");
            return;
        }
        st.phase = Phase::Connecting;
        // An explicit connect supersedes a prior logout.
        st.logging_out = false;
    }

    let request = inner
        .tokens
        .token()
        .ok_or(RealtimeError::MissingToken)
        .and_then(|token| connect_request(&inner.config.ws_url, &token));
    let request = match request {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(error = %e, "cannot connect");
            inner.state().phase = Phase::Idle;
            return;
        }
    };

    let mut st = inner.state();
    if st.phase != Phase::Connecting {
        // Torn down between the guard and here.
        return;
    }
    let task_inner = Arc::clone(inner);
    st.attempt_task = Some(tokio::spawn(async move {
        run_attempt(task_inner, request).await;
    }));
}

/// Drives one connection attempt from handshake to close.
async fn run_attempt(inner: Arc<Inner>, request: Request) {
    let timeout_ms = inner.config.connection_timeout.as_millis() as u64;
    let ws = match tokio::time::timeout(inner.config.connection_timeout, connect_async(request))
        .await
    {
        Ok(Ok((ws, _response))) => ws,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "websocket connect failed");
            handle_close(&inner, close_code::ABNORMAL, &e.to_string());
            return;
        }
        Err(_) => {
            tracing::warn!(error = %RealtimeError::Timeout(timeout_ms), "forcing close");
            handle_close(&inner, close_code::ABNORMAL, "connection timeout");
            return;
        }
    };

    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel();

    let torn_down = {
        let mut st = inner.state();
        if st.phase != Phase::Connecting || st.logging_out {
            // Torn down while handshaking; discard the fresh socket.
            true
        } else {
            st.phase = Phase::Open;
            st.outbound = Some(cmd_tx.clone());
            st.reconnect_attempts = 0;
            st.opened_at = Some(Instant::now());
            inner.connected.store(true, Ordering::Relaxed);
            if st.has_connected_once {
                tracing::info!("realtime connection re-established");
            } else {
                st.has_connected_once = true;
                tracing::info!("realtime connection established");
            }
            false
        }
    };
    if torn_down {
        let mut ws = ws;
        let _ = ws
            .close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "client shutdown".into(),
            }))
            .await;
        return;
    }

    // One keep-alive ping shortly after open.
    let keepalive = {
        let delay = inner.config.keepalive_delay;
        let ping_tx = cmd_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = ping_tx.send(Command::Send(ping_frame()));
        })
    };

    let (code, reason) = drive_socket(&inner, ws, &mut cmd_rx).await;
    keepalive.abort();
    handle_close(&inner, code, &reason);
}

/// Runs the read/write loop for an open socket.
///
/// Returns the close code and reason once the socket is gone. Inbound text
/// frames go straight to the router; outbound commands are drained from the
/// channel owned by the manager.
async fn drive_socket(
    inner: &Arc<Inner>,
    ws: WsStream,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
) -> (u16, String) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let mut close_seen: Option<(u16, String)> = None;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(Command::Send(text)) => {
                        if let Err(e) = ws_tx.send(Message::text(text)).await {
                            tracing::warn!(error = %e, "websocket send failed");
                            return close_seen
                                .unwrap_or_else(|| (close_code::ABNORMAL, e.to_string()));
                        }
                    }
                    Some(Command::Close) => {
                        let frame = CloseFrame {
                            code: CloseCode::Normal,
                            reason: "client logout".into(),
                        };
                        if ws_tx.send(Message::Close(Some(frame))).await.is_err() {
                            return (close_code::NORMAL, "client logout".to_string());
                        }
                        // Keep reading so the close handshake can complete.
                    }
                    None => {
                        let frame = CloseFrame {
                            code: CloseCode::Normal,
                            reason: "client shutdown".into(),
                        };
                        let _ = ws_tx.send(Message::Close(Some(frame))).await;
                        return (close_code::NORMAL, "client shutdown".to_string());
                    }
                }
            }
            frame = ws_rx.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => inner.router.handle_frame(text.as_str()),
                    Some(Ok(Message::Close(frame))) => {
                        close_seen = Some(frame.map_or(
                            (close_code::ABNORMAL, String::new()),
                            |f| (u16::from(f.code), f.reason.to_string()),
                        ));
                    }
                    // Binary, ping, pong: transport-level, not part of the wire protocol.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        return close_seen.unwrap_or_else(|| (close_code::ABNORMAL, e.to_string()));
                    }
                    None => {
                        return close_seen
                            .unwrap_or_else(|| (close_code::ABNORMAL, "connection lost".to_string()));
                    }
                }
            }
        }
    }
}

/// Applies the close-code policy once a socket is gone.
fn handle_close(inner: &Arc<Inner>, code: u16, reason: &str) {
    let action = close_code::classify(code, reason);

    let mut st = inner.state();
    inner.connected.store(false, Ordering::Relaxed);
    st.phase = Phase::Idle;
    st.outbound = None;
    st.attempt_task = None;
    let opened_at = st.opened_at.take();
    let opened = opened_at.is_some();
    if let Some(at) = opened_at {
        tracing::debug!(uptime_ms = at.elapsed().as_millis() as u64, code, "socket closed");
    }

    if st.logging_out {
        tracing::info!(code, "connection closed during logout");
        st.reset_counters();
        return;
    }

    match action {
        CloseAction::Stop => {
            tracing::info!(code, reason, "connection closed normally");
            st.reset_counters();
        }
        CloseAction::Logout => {
            tracing::error!(code, reason, "authorization failure on close; ending session");
            st.reset_counters();
            drop(st);
            inner.session.logout();
        }
        CloseAction::Reconnect => {
            match code {
                close_code::ABNORMAL => tracing::warn!(reason, "connection lost unexpectedly"),
                close_code::POLICY_VIOLATION => tracing::warn!(reason, "server policy violation"),
                close_code::INTERNAL_ERROR => tracing::warn!(reason, "server-side failure"),
                _ => tracing::warn!(code, reason, "connection closed"),
            }
            schedule_reconnect(inner, &mut st, opened);
        }
    }
}

/// Decides whether another attempt is allowed and arms the timer.
///
/// Immediate closes (the attempt reached `Open`) are granted a floor of
/// [`IMMEDIATE_RETRY_FLOOR`] retries on their own counter before the
/// ordinary bound applies; closes that never reached `Open` are bounded by
/// `max_reconnect_attempts` alone.
fn schedule_reconnect(inner: &Arc<Inner>, st: &mut ConnState, opened: bool) {
    if opened {
        st.immediate_close_attempts += 1;
        if st.immediate_close_attempts <= IMMEDIATE_RETRY_FLOOR {
            tracing::warn!(
                attempt = st.immediate_close_attempts,
                "connection dropped right after opening; retry floor active"
            );
            arm_reconnect_timer(inner, st);
            return;
        }
    }

    if st.reconnect_attempts < inner.config.max_reconnect_attempts {
        arm_reconnect_timer(inner, st);
    } else {
        tracing::error!(
            attempts = st.reconnect_attempts,
            "reconnect attempts exhausted; giving up"
        );
    }
}

/// Arms the single reconnect timer, cancelling any previous one.
fn arm_reconnect_timer(inner: &Arc<Inner>, st: &mut ConnState) {
    if let Some(timer) = st.reconnect_timer.take() {
        timer.abort();
    }
    st.reconnect_attempts += 1;
    let attempt = st.reconnect_attempts;
    let delay = inner.config.reconnect_interval;
    let timer_inner = Arc::clone(inner);
    st.reconnect_timer = Some(tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        tracing::info!(attempt, "attempting to reconnect");
        connect(&timer_inner);
    }));
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use tokio_test::assert_ok;

    use super::*;
    use crate::cache::{CacheInvalidator, CacheKey};
    use crate::notify::{NotificationKind, Notifier};
    use crate::translate::NoTranslations;

    struct StaticToken(Option<&'static str>);

    impl TokenProvider for StaticToken {
        fn token(&self) -> Option<String> {
            self.0.map(str::to_string)
        }
    }

    struct NullCache;

    impl CacheInvalidator for NullCache {
        fn invalidate(&self, _key: CacheKey) {}
    }

    struct NullNotifier;

    impl Notifier for NullNotifier {
        fn notify(&self, _kind: NotificationKind, _text: &str) {}
        fn notify_incoming(&self, _text: &str) {}
    }

    #[derive(Default)]
    struct CountingSession {
        logouts: AtomicUsize,
    }

    impl SessionControl for CountingSession {
        fn logout(&self) {
            self.logouts.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// What the in-process server does with each accepted connection.
    #[derive(Clone, Copy)]
    enum ServerScript {
        /// Complete the handshake and hold the connection open.
        HoldOpen,
        /// Complete the handshake, send one frame, then hold open.
        SendThenHold(&'static str),
        /// Complete the handshake and immediately close with the code.
        CloseImmediately(u16),
        /// Accept TCP but never answer the WebSocket upgrade.
        StallHandshake,
    }

    struct TestServer {
        url: String,
        accepted: Arc<AtomicUsize>,
        frames: Arc<StdMutex<Vec<String>>>,
    }

    impl TestServer {
        fn accepted(&self) -> usize {
            self.accepted.load(Ordering::SeqCst)
        }

        fn frames(&self) -> Vec<String> {
            self.frames.lock().map(|f| f.clone()).unwrap_or_default()
        }
    }

    async fn spawn_server(script: ServerScript) -> TestServer {
        let listener = assert_ok!(tokio::net::TcpListener::bind("127.0.0.1:0").await);
        let addr = assert_ok!(listener.local_addr());
        let accepted = Arc::new(AtomicUsize::new(0));
        let frames = Arc::new(StdMutex::new(Vec::new()));

        let accepted_counter = Arc::clone(&accepted);
        let frames_sink = Arc::clone(&frames);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                accepted_counter.fetch_add(1, Ordering::SeqCst);
                let frames_sink = Arc::clone(&frames_sink);
                tokio::spawn(async move {
                    match script {
                        ServerScript::StallHandshake => {
                            let _stream = stream;
                            tokio::time::sleep(Duration::from_secs(60)).await;
                        }
                        ServerScript::HoldOpen | ServerScript::SendThenHold(_) => {
                            let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                                return;
                            };
                            if let ServerScript::SendThenHold(frame) = script {
                                let _ = ws.send(Message::text(frame)).await;
                            }
                            while let Some(Ok(msg)) = ws.next().await {
                                if let Message::Text(text) = msg {
                                    if let Ok(mut frames) = frames_sink.lock() {
                                        frames.push(text.to_string());
                                    }
                                }
                            }
                        }
                        ServerScript::CloseImmediately(code) => {
                            let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                                return;
                            };
                            let frame = CloseFrame {
                                code: CloseCode::from(code),
                                reason: "".into(),
                            };
                            let _ = ws.close(Some(frame)).await;
                            while let Some(Ok(_)) = ws.next().await {}
                        }
                    }
                });
            }
        });

        TestServer {
            url: format!("ws://{addr}/realtime"),
            accepted,
            frames,
        }
    }

    fn test_config(url: &str) -> RealtimeConfig {
        RealtimeConfig {
            ws_url: url.to_string(),
            max_reconnect_attempts: 5,
            reconnect_interval: Duration::from_millis(40),
            connection_timeout: Duration::from_millis(300),
            keepalive_delay: Duration::from_millis(10_000),
        }
    }

    fn test_manager(config: RealtimeConfig, session: &Arc<CountingSession>) -> ConnectionManager {
        let router = Arc::new(MessageRouter::new(
            Arc::new(NullCache),
            Arc::new(NullNotifier),
            Arc::new(NoTranslations),
            Arc::clone(session) as Arc<dyn SessionControl>,
        ));
        ConnectionManager::new(
            config,
            Arc::new(StaticToken(Some("tok-1"))),
            Arc::clone(session) as Arc<dyn SessionControl>,
            router,
        )
    }

    async fn wait_until<F: Fn() -> bool>(timeout_ms: u64, condition: F) -> bool {
        let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
        while tokio::time::Instant::now() < deadline {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        condition()
    }

    #[tokio::test]
    async fn connect_is_idempotent_while_in_flight_or_open() {
        let server = spawn_server(ServerScript::HoldOpen).await;
        let session = Arc::new(CountingSession::default());
        let manager = test_manager(test_config(&server.url), &session);

        manager.connect();
        manager.connect();
        assert!(wait_until(2_000, || manager.is_connected()).await);

        manager.connect();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(server.accepted(), 1);
        assert!(manager.is_connected());
    }

    #[tokio::test]
    async fn normal_closure_suppresses_reconnection() {
        let server = spawn_server(ServerScript::CloseImmediately(close_code::NORMAL)).await;
        let session = Arc::new(CountingSession::default());
        let manager = test_manager(test_config(&server.url), &session);

        manager.connect();
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(server.accepted(), 1);
        assert!(!manager.is_connected());
        assert_eq!(manager.reconnect_attempts(), 0);
    }

    #[tokio::test]
    async fn retries_are_bounded_when_the_handshake_never_completes() {
        let server = spawn_server(ServerScript::StallHandshake).await;
        let session = Arc::new(CountingSession::default());
        let mut config = test_config(&server.url);
        config.max_reconnect_attempts = 2;
        config.connection_timeout = Duration::from_millis(100);
        let manager = test_manager(config, &session);

        manager.connect();
        assert!(wait_until(3_000, || manager.reconnect_attempts() == 2).await);
        tokio::time::sleep(Duration::from_millis(500)).await;

        // Initial attempt plus exactly two automatic retries.
        assert_eq!(server.accepted(), 3);
        assert_eq!(manager.reconnect_attempts(), 2);
        assert!(!manager.is_connected());
    }

    #[tokio::test]
    async fn refused_connections_also_feed_the_retry_policy() {
        let listener = assert_ok!(tokio::net::TcpListener::bind("127.0.0.1:0").await);
        let addr = assert_ok!(listener.local_addr());
        drop(listener);

        let session = Arc::new(CountingSession::default());
        let mut config = test_config(&format!("ws://{addr}/realtime"));
        config.max_reconnect_attempts = 1;
        let manager = test_manager(config, &session);

        manager.connect();
        assert!(wait_until(2_000, || manager.reconnect_attempts() == 1).await);
        assert!(!manager.is_connected());
    }

    #[tokio::test]
    async fn immediate_closes_get_the_retry_floor() {
        let server = spawn_server(ServerScript::CloseImmediately(close_code::INTERNAL_ERROR)).await;
        let session = Arc::new(CountingSession::default());
        let mut config = test_config(&server.url);
        // With no ordinary attempts allowed, only the floor can retry.
        config.max_reconnect_attempts = 0;
        config.reconnect_interval = Duration::from_millis(30);
        let manager = test_manager(config, &session);

        manager.connect();
        assert!(wait_until(4_000, || server.accepted() == 1 + IMMEDIATE_RETRY_FLOOR as usize).await);
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(server.accepted(), 1 + IMMEDIATE_RETRY_FLOOR as usize);
        assert!(!manager.is_connected());
    }

    #[tokio::test]
    async fn authorization_close_logs_out_and_stops() {
        let server = spawn_server(ServerScript::CloseImmediately(close_code::UNAUTHORIZED)).await;
        let session = Arc::new(CountingSession::default());
        let manager = test_manager(test_config(&server.url), &session);

        manager.connect();
        assert!(wait_until(2_000, || session.logouts.load(Ordering::SeqCst) == 1).await);
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(session.logouts.load(Ordering::SeqCst), 1);
        assert_eq!(server.accepted(), 1);
        assert!(!manager.is_connected());
    }

    #[tokio::test]
    async fn force_disconnect_is_idempotent_and_allows_a_fresh_connect() {
        let server = spawn_server(ServerScript::HoldOpen).await;
        let session = Arc::new(CountingSession::default());
        let manager = test_manager(test_config(&server.url), &session);

        manager.connect();
        assert!(wait_until(2_000, || manager.is_connected()).await);

        manager.force_disconnect();
        manager.force_disconnect();
        assert!(wait_until(2_000, || !manager.is_connected()).await);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(manager.reconnect_attempts(), 0);
        assert_eq!(server.accepted(), 1);

        manager.connect();
        assert!(wait_until(2_000, || manager.is_connected()).await);
        assert_eq!(server.accepted(), 2);
    }

    #[tokio::test]
    async fn plain_disconnect_preserves_the_session() {
        let server = spawn_server(ServerScript::HoldOpen).await;
        let session = Arc::new(CountingSession::default());
        let manager = test_manager(test_config(&server.url), &session);

        manager.connect();
        assert!(wait_until(2_000, || manager.is_connected()).await);

        manager.disconnect();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(manager.is_connected());
        assert_eq!(server.accepted(), 1);
    }

    #[tokio::test]
    async fn keepalive_ping_is_sent_after_open() {
        let server = spawn_server(ServerScript::HoldOpen).await;
        let session = Arc::new(CountingSession::default());
        let mut config = test_config(&server.url);
        config.keepalive_delay = Duration::from_millis(40);
        let manager = test_manager(config, &session);

        manager.connect();
        assert!(
            wait_until(2_000, || {
                server.frames().iter().any(|f| f == &ping_frame())
            })
            .await
        );
    }

    #[tokio::test]
    async fn send_transmits_when_open() {
        let server = spawn_server(ServerScript::HoldOpen).await;
        let session = Arc::new(CountingSession::default());
        let manager = test_manager(test_config(&server.url), &session);

        manager.connect();
        assert!(wait_until(2_000, || manager.is_connected()).await);

        manager.send(&serde_json::json!({ "type": "focus_project", "data": { "id": "p1" } }));
        assert!(
            wait_until(2_000, || {
                server.frames().iter().any(|f| f.contains("focus_project"))
            })
            .await
        );
    }

    #[tokio::test]
    async fn send_while_closed_drops_silently() {
        let session = Arc::new(CountingSession::default());
        let manager = test_manager(test_config("ws://127.0.0.1:1/realtime"), &session);

        manager.send(&serde_json::json!({ "type": "focus_project" }));

        assert!(!manager.is_connected());
    }

    #[tokio::test]
    async fn missing_token_makes_connect_a_noop() {
        let server = spawn_server(ServerScript::HoldOpen).await;
        let session = Arc::new(CountingSession::default());
        let router = Arc::new(MessageRouter::new(
            Arc::new(NullCache),
            Arc::new(NullNotifier),
            Arc::new(NoTranslations),
            Arc::clone(&session) as Arc<dyn SessionControl>,
        ));
        let manager = ConnectionManager::new(
            test_config(&server.url),
            Arc::new(StaticToken(None)),
            Arc::clone(&session) as Arc<dyn SessionControl>,
            router,
        );

        manager.connect();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(server.accepted(), 0);
        assert!(!manager.is_connected());
        assert_eq!(manager.reconnect_attempts(), 0);
    }

    #[tokio::test]
    async fn malformed_url_is_terminal_for_the_attempt() {
        let session = Arc::new(CountingSession::default());
        let manager = test_manager(test_config("not a websocket url"), &session);

        manager.connect();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(!manager.is_connected());
        assert_eq!(manager.reconnect_attempts(), 0);
    }

    #[tokio::test]
    async fn inbound_frames_reach_the_router() {
        let server = spawn_server(ServerScript::SendThenHold(
            r#"{"type":"task_progress","data":{"status":"completed","task_type":"transcription"}}"#,
        ))
        .await;
        let session = Arc::new(CountingSession::default());
        let router = Arc::new(MessageRouter::new(
            Arc::new(NullCache),
            Arc::new(NullNotifier),
            Arc::new(NoTranslations),
            Arc::clone(&session) as Arc<dyn SessionControl>,
        ));
        let manager = ConnectionManager::new(
            test_config(&server.url),
            Arc::new(StaticToken(Some("tok-1"))),
            Arc::clone(&session) as Arc<dyn SessionControl>,
            Arc::clone(&router),
        );

        manager.connect();
        assert!(
            wait_until(2_000, || {
                router
                    .last_message()
                    .is_some_and(|m| m.msg_type == "task_progress")
            })
            .await
        );
    }
}
