//! Feed Connection
//!
//! One socket to one data channel, driven by a single task that owns the
//! reconnect state machine:
//!
//! ```text
//! Disconnected ──connect()──▶ Connecting ──open ok──▶ Open
//!      ▲                          │                     │
//!      │                  open failed / drop    clean close (1000)
//!      │                          ▼                     │
//!      └──budget spent── backoff delay ◀────────────────┘ (no retry)
//! ```
//!
//! After each open the full subscription set is replayed once the settle
//! delay elapses. Subscription changes made before the replay are folded
//! into it.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::codec::JsonCodec;
use super::messages::ControlFrame;
use super::reconnect::{ReconnectConfig, ReconnectError, ReconnectPolicy};
use crate::application::ports::{
    EventSink, FrameSink, InboundFrame, Transport, TransportError, TransportSession,
};
use crate::domain::market::{DataChannel, Symbol};
use crate::domain::streaming::{FeedError, FeedEvent};
use crate::domain::subscription::SubscriptionRegistry;
use crate::infrastructure::metrics;

/// How long a clean close may take during `disconnect()`.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

// =============================================================================
// Configuration & State
// =============================================================================

/// Configuration for one channel connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Socket URL.
    pub url: String,
    /// Channel this socket serves.
    pub channel: DataChannel,
    /// Pause between open and subscription replay.
    pub settle_delay: Duration,
    /// Backoff schedule.
    pub reconnect: ReconnectConfig,
}

impl ConnectionConfig {
    /// Configuration with default settle delay and backoff.
    #[must_use]
    pub fn new(url: impl Into<String>, channel: DataChannel) -> Self {
        Self {
            url: url.into(),
            channel,
            settle_delay: Duration::from_millis(100),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Lifecycle status of a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No socket; no retry pending, or waiting out a backoff delay.
    /// `connect()` during a backoff delay retries at once.
    #[default]
    Disconnected,
    /// Opening a socket.
    Connecting,
    /// Socket open.
    Open,
    /// `disconnect()` in progress.
    Closing,
}

impl ConnectionStatus {
    /// Lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
        }
    }
}

/// Snapshot of a connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionState {
    /// Lifecycle status.
    pub status: ConnectionStatus,
    /// Registered symbols, in insertion order.
    pub subscribed_symbols: Vec<Symbol>,
    /// Reconnect attempts since the last successful open.
    pub reconnect_attempt: u32,
}

// =============================================================================
// Connection
// =============================================================================

#[derive(Debug)]
enum Command {
    Subscribe(Vec<Symbol>),
    Unsubscribe(Vec<Symbol>),
}

#[derive(Debug, Default)]
struct Inner {
    status: ConnectionStatus,
    registry: SubscriptionRegistry,
    reconnect_attempt: u32,
    /// Whether the current session has replayed the registry.
    replayed: bool,
    /// Command queue of the running driver.
    commands: Option<mpsc::UnboundedSender<Command>>,
    /// Present while the driver waits out a backoff delay; firing it
    /// skips the rest of the delay.
    retry_now: Option<oneshot::Sender<()>>,
    /// Bumped each time `connect()` starts a driver.
    generation: u64,
}

struct Shared {
    config: ConnectionConfig,
    transport: Arc<dyn Transport>,
    sink: Arc<dyn EventSink>,
    codec: JsonCodec,
    inner: Mutex<Inner>,
}

struct Driver {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

/// Managed socket to one data channel.
pub struct Connection {
    shared: Arc<Shared>,
    driver: Mutex<Option<Driver>>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("url", &self.shared.config.url)
            .field("channel", &self.shared.config.channel)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Create a disconnected connection.
    #[must_use]
    pub fn new(
        config: ConnectionConfig,
        transport: Arc<dyn Transport>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                transport,
                sink,
                codec: JsonCodec::new(),
                inner: Mutex::new(Inner::default()),
            }),
            driver: Mutex::new(None),
        }
    }

    /// Channel this connection serves.
    #[must_use]
    pub fn channel(&self) -> DataChannel {
        self.shared.config.channel
    }

    /// Socket URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.shared.config.url
    }

    /// Start the driver task.
    ///
    /// No-op while connecting or open. While a driver waits out a backoff
    /// delay the delay is cut short and the next attempt starts now. Must be
    /// called from within a tokio runtime.
    pub fn connect(&self) {
        let mut driver = self.driver.lock();
        if driver.as_ref().is_some_and(|d| !d.handle.is_finished()) {
            let retry_now = self.shared.inner.lock().retry_now.take();
            if let Some(retry_now) = retry_now {
                tracing::info!(channel = %self.channel(), "connect() during backoff, retrying now");
                let _ = retry_now.send(());
            } else {
                tracing::debug!(channel = %self.channel(), "connect() ignored, driver already running");
            }
            return;
        }

        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut inner = self.shared.inner.lock();
            inner.status = ConnectionStatus::Connecting;
            inner.commands = Some(tx);
            inner.retry_now = None;
            inner.generation += 1;
        }
        metrics::set_connection_status(self.channel(), ConnectionStatus::Connecting);
        let handle = tokio::spawn(drive(Arc::clone(&self.shared), cancel.clone(), rx));

        *driver = Some(Driver { handle, cancel });
    }

    /// Close the socket, cancel any pending retry, and clear the registry.
    ///
    /// When this returns the driver task has exited and no further events
    /// will be delivered. If `connect()` starts a new driver while the old
    /// one is shutting down, the new session is left untouched.
    pub async fn disconnect(&self) {
        let (driver, generation) = {
            let mut slot = self.driver.lock();
            let generation = self.shared.inner.lock().generation;
            (slot.take(), generation)
        };
        if let Some(driver) = driver {
            self.shared.set_status(ConnectionStatus::Closing);
            driver.cancel.cancel();
            if let Err(e) = driver.handle.await {
                tracing::warn!(channel = %self.channel(), error = %e, "Feed driver task failed");
            }
        }

        let mut inner = self.shared.inner.lock();
        if inner.generation != generation {
            tracing::debug!(channel = %self.channel(), "Reconnected during disconnect, keeping new session");
            return;
        }
        inner.registry.clear();
        inner.reconnect_attempt = 0;
        inner.replayed = false;
        inner.commands = None;
        inner.retry_now = None;
        inner.status = ConnectionStatus::Disconnected;
        drop(inner);
        metrics::set_connection_status(self.channel(), ConnectionStatus::Disconnected);
        tracing::info!(channel = %self.channel(), "Feed disconnected");
    }

    /// Register symbols, sending a subscribe frame for the new ones if the
    /// socket is open and already replayed.
    ///
    /// Returns the symbols that were newly registered.
    pub fn subscribe<S: AsRef<str>>(&self, symbols: &[S]) -> Vec<Symbol> {
        let mut inner = self.shared.inner.lock();
        let added = inner.registry.add(symbols);
        if !added.is_empty() {
            inner.send_if_live(Command::Subscribe(added.clone()));
        }
        added
    }

    /// Unregister symbols, sending an unsubscribe frame if the socket is
    /// open and already replayed.
    ///
    /// Returns the symbols that were registered.
    pub fn unsubscribe<S: AsRef<str>>(&self, symbols: &[S]) -> Vec<Symbol> {
        let mut inner = self.shared.inner.lock();
        let removed = inner.registry.remove(symbols);
        if !removed.is_empty() {
            inner.send_if_live(Command::Unsubscribe(removed.clone()));
        }
        removed
    }

    /// Whether the socket is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.inner.lock().status == ConnectionStatus::Open
    }

    /// Current lifecycle status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.shared.inner.lock().status
    }

    /// Snapshot of status, symbols and reconnect attempt.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        let inner = self.shared.inner.lock();
        ConnectionState {
            status: inner.status,
            subscribed_symbols: inner.registry.symbols().to_vec(),
            reconnect_attempt: inner.reconnect_attempt,
        }
    }
}

impl Inner {
    /// Queue a command for the driver if the session has already replayed.
    ///
    /// Before the replay the registry change is picked up by the replay
    /// itself; while disconnected it waits for the next open.
    fn send_if_live(&self, command: Command) {
        if self.status != ConnectionStatus::Open || !self.replayed {
            return;
        }
        if let Some(commands) = &self.commands {
            // A closed queue means the driver already exited; the next
            // connect() replays the registry anyway.
            let _ = commands.send(command);
        }
    }
}

// =============================================================================
// Driver
// =============================================================================

/// How a session ended.
enum SessionEnd {
    Cancelled,
    CleanClose,
    Failed(TransportError),
}

impl Shared {
    fn set_status(&self, status: ConnectionStatus) {
        self.inner.lock().status = status;
        metrics::set_connection_status(self.config.channel, status);
    }

    fn set_attempt(&self, attempt: u32) {
        self.inner.lock().reconnect_attempt = attempt;
    }

    /// Arm the early-retry signal for one backoff delay.
    fn arm_retry(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.inner.lock().retry_now = Some(tx);
        rx
    }

    fn disarm_retry(&self) {
        self.inner.lock().retry_now = None;
    }

    fn emit(&self, event: FeedEvent) {
        self.sink.on_event(event);
    }

    /// Mark the session open. Commands queued before this point are stale.
    fn mark_open(&self) {
        let mut inner = self.inner.lock();
        inner.status = ConnectionStatus::Open;
        inner.reconnect_attempt = 0;
        inner.replayed = false;
        drop(inner);
        metrics::set_connection_status(self.config.channel, ConnectionStatus::Open);
    }

    /// Snapshot the registry for replay and mark the session replayed.
    fn begin_replay(&self) -> Vec<Symbol> {
        let mut inner = self.inner.lock();
        inner.replayed = true;
        inner.registry.symbols().to_vec()
    }

    async fn send_control(&self, sink: &mut FrameSink, frame: ControlFrame) -> Result<(), TransportError> {
        let text = self
            .codec
            .encode_control(&frame)
            .map_err(|e| TransportError::Send {
                message: e.to_string(),
            })?;
        tracing::debug!(action = ?frame.action, symbols = ?frame.symbols, "Sending control frame");
        sink.send(text).await
    }

    fn handle_text(&self, text: &str) {
        let channel = self.config.channel;
        match self.codec.decode(text) {
            Ok(decoded) => {
                for e in &decoded.rejected {
                    metrics::record_decode_error(channel, e.reason());
                    tracing::warn!(channel = %channel, error = %e, "Dropping undecodable batch entry");
                }
                for event in decoded.events {
                    metrics::record_frame_received(channel, event.kind());
                    self.emit(event);
                }
            }
            Err(e) => {
                metrics::record_decode_error(channel, e.reason());
                tracing::warn!(channel = %channel, error = %e, "Dropping undecodable frame");
            }
        }
    }

    async fn run_session(
        &self,
        session: TransportSession,
        cancel: &CancellationToken,
        commands: &mut mpsc::UnboundedReceiver<Command>,
    ) -> SessionEnd {
        let TransportSession {
            mut sink,
            mut stream,
        } = session;

        self.mark_open();
        while commands.try_recv().is_ok() {}
        tracing::info!("Feed connected");

        let settle = tokio::time::sleep(self.config.settle_delay);
        tokio::pin!(settle);
        let mut settled = false;

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    if tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await.is_err() {
                        tracing::debug!("Close handshake timed out");
                    }
                    return SessionEnd::Cancelled;
                }
                () = &mut settle, if !settled => {
                    settled = true;
                    let symbols = self.begin_replay();
                    if !symbols.is_empty() {
                        tracing::info!(count = symbols.len(), "Replaying subscriptions");
                        if let Err(e) = self.send_control(&mut sink, ControlFrame::subscribe(symbols)).await {
                            return SessionEnd::Failed(e);
                        }
                    }
                }
                Some(command) = commands.recv(), if settled => {
                    let frame = match command {
                        Command::Subscribe(symbols) => ControlFrame::subscribe(symbols),
                        Command::Unsubscribe(symbols) => ControlFrame::unsubscribe(symbols),
                    };
                    if let Err(e) = self.send_control(&mut sink, frame).await {
                        return SessionEnd::Failed(e);
                    }
                }
                frame = stream.next() => match frame {
                    Some(Ok(InboundFrame::Text(text))) => self.handle_text(&text),
                    Some(Ok(close)) if close.is_clean_close() => {
                        tracing::info!("Server closed the feed normally");
                        return SessionEnd::CleanClose;
                    }
                    Some(Ok(InboundFrame::Close { code, reason })) => {
                        return SessionEnd::Failed(TransportError::Closed { code, reason });
                    }
                    Some(Err(e)) => return SessionEnd::Failed(e),
                    None => return SessionEnd::Failed(TransportError::StreamEnded),
                },
            }
        }
    }
}

async fn drive(
    shared: Arc<Shared>,
    cancel: CancellationToken,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let channel = shared.config.channel;
    let mut policy = ReconnectPolicy::new(shared.config.reconnect.clone());

    loop {
        shared.set_status(ConnectionStatus::Connecting);
        tracing::info!(channel = %channel, url = %shared.config.url, "Connecting to feed");

        let opened = tokio::select! {
            () = cancel.cancelled() => return,
            opened = shared.transport.open(&shared.config.url) => opened,
        };

        let end = match opened {
            Ok(session) => {
                policy.reset();
                let session_id = uuid::Uuid::new_v4();
                let span = tracing::info_span!("feed_session", channel = %channel, session_id = %session_id);
                shared
                    .run_session(session, &cancel, &mut commands)
                    .instrument(span)
                    .await
            }
            Err(e) => SessionEnd::Failed(e),
        };

        match end {
            SessionEnd::Cancelled => return,
            SessionEnd::CleanClose => {
                shared.set_status(ConnectionStatus::Disconnected);
                return;
            }
            SessionEnd::Failed(e) => {
                shared.set_status(ConnectionStatus::Disconnected);
                tracing::warn!(channel = %channel, error = %e, "Feed connection error");
                shared.emit(FeedEvent::Error(FeedError::transport(e.to_string())));

                let Some(delay) = policy.next_delay() else {
                    let err = ReconnectError::MaxAttemptsExceeded(policy.max_attempts());
                    tracing::error!(channel = %channel, error = %err, "Giving up on feed");
                    shared.emit(FeedEvent::Error(FeedError::terminal(err.to_string())));
                    return;
                };

                let attempt = policy.attempt_count();
                shared.set_attempt(attempt);
                metrics::record_reconnect_attempt(channel);
                tracing::info!(
                    channel = %channel,
                    attempt,
                    delay_ms = delay.as_millis(),
                    "Reconnecting to feed"
                );

                let retry_now = shared.arm_retry();
                tokio::select! {
                    () = cancel.cancelled() => return,
                    () = tokio::time::sleep(delay) => {}
                    Ok(()) = retry_now => {
                        tracing::debug!(channel = %channel, attempt, "Backoff cut short");
                    }
                }
                shared.disarm_retry();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use async_trait::async_trait;
    use futures::Sink;

    use super::*;
    use crate::application::ports::NoOpEventSink;

    struct RefusingTransport {
        opens: Mutex<u32>,
    }

    #[async_trait]
    impl Transport for RefusingTransport {
        async fn open(&self, _url: &str) -> Result<TransportSession, TransportError> {
            *self.opens.lock() += 1;
            Err(TransportError::ConnectFailed {
                message: "refused".to_string(),
            })
        }
    }

    #[derive(Default)]
    struct Collect(Mutex<Vec<FeedEvent>>);

    impl EventSink for Collect {
        fn on_event(&self, event: FeedEvent) {
            self.0.lock().push(event);
        }
    }

    /// Sink that accepts frames but never finishes a close handshake.
    struct StallingSink;

    impl Sink<String> for StallingSink {
        type Error = TransportError;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn start_send(self: Pin<&mut Self>, _item: String) -> Result<(), Self::Error> {
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Pending
        }
    }

    /// Accepts every open with a silent session whose close stalls.
    #[derive(Default)]
    struct StallingCloseTransport {
        opens: Mutex<u32>,
    }

    #[async_trait]
    impl Transport for StallingCloseTransport {
        async fn open(&self, _url: &str) -> Result<TransportSession, TransportError> {
            *self.opens.lock() += 1;
            Ok(TransportSession {
                sink: Box::pin(StallingSink),
                stream: Box::pin(futures::stream::pending::<Result<InboundFrame, TransportError>>()),
            })
        }
    }

    fn refusing() -> Arc<RefusingTransport> {
        Arc::new(RefusingTransport {
            opens: Mutex::new(0),
        })
    }

    #[test]
    fn default_config() {
        let config = ConnectionConfig::new("ws://localhost:8000/ws/alpaca/crypto", DataChannel::Crypto);
        assert_eq!(config.settle_delay, Duration::from_millis(100));
        assert_eq!(config.reconnect.max_attempts, 5);
    }

    #[test]
    fn subscriptions_are_kept_while_disconnected() {
        let connection = Connection::new(
            ConnectionConfig::new("ws://test", DataChannel::Stocks),
            refusing(),
            Arc::new(NoOpEventSink),
        );

        assert_eq!(connection.subscribe(&["AAPL", "MSFT"]), vec!["AAPL", "MSFT"]);
        assert_eq!(connection.unsubscribe(&["MSFT"]), vec!["MSFT"]);

        let state = connection.state();
        assert_eq!(state.status, ConnectionStatus::Disconnected);
        assert_eq!(state.subscribed_symbols, vec!["AAPL"]);
        assert!(!connection.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn budget_exhaustion_emits_one_terminal_error() {
        let transport = refusing();
        let sink = Arc::new(Collect::default());
        let connection = Connection::new(
            ConnectionConfig::new("ws://test", DataChannel::Crypto),
            transport.clone(),
            sink.clone(),
        );

        connection.connect();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(*transport.opens.lock(), 6);
        let events = sink.0.lock();
        let fatal = events.iter().filter(|e| e.is_fatal_error()).count();
        let transport_errors = events.len() - fatal;
        assert_eq!(fatal, 1);
        assert_eq!(transport_errors, 6);
        assert!(events.last().is_some_and(FeedEvent::is_fatal_error));
        drop(events);
        assert_eq!(connection.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn linear_backoff_schedule() {
        let transport = refusing();
        let connection = Connection::new(
            ConnectionConfig::new("ws://test", DataChannel::Crypto),
            transport.clone(),
            Arc::new(NoOpEventSink),
        );

        connection.connect();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(*transport.opens.lock(), 1);
        assert_eq!(connection.state().reconnect_attempt, 1);

        // 1 s, then 2 s
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(*transport.opens.lock(), 2);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(*transport.opens.lock(), 2);
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(*transport.opens.lock(), 3);

        connection.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_pending_retry() {
        let transport = refusing();
        let connection = Connection::new(
            ConnectionConfig::new("ws://test", DataChannel::Crypto),
            transport.clone(),
            Arc::new(NoOpEventSink),
        );
        connection.subscribe(&["BTC"]);

        connection.connect();
        tokio::time::sleep(Duration::from_millis(10)).await;
        connection.disconnect().await;
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(*transport.opens.lock(), 1);
        let state = connection.state();
        assert_eq!(state.status, ConnectionStatus::Disconnected);
        assert!(state.subscribed_symbols.is_empty());
        assert_eq!(state.reconnect_attempt, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_during_backoff_retries_at_once() {
        let transport = refusing();
        let connection = Connection::new(
            ConnectionConfig::new("ws://test", DataChannel::Crypto),
            transport.clone(),
            Arc::new(NoOpEventSink),
        );

        connection.connect();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(connection.status(), ConnectionStatus::Disconnected);
        assert_eq!(*transport.opens.lock(), 1);

        connection.connect();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(*transport.opens.lock(), 2);
        assert_eq!(connection.state().reconnect_attempt, 2);

        // The next delay is a full one again: 2 s after the second failure.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(*transport.opens.lock(), 2);

        connection.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn connect_while_disconnecting_keeps_new_session() {
        let transport = Arc::new(StallingCloseTransport::default());
        let connection = Arc::new(Connection::new(
            ConnectionConfig::new("ws://test", DataChannel::Crypto),
            transport.clone(),
            Arc::new(NoOpEventSink),
        ));
        connection.subscribe(&["BTC"]);
        connection.connect();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(connection.is_connected());

        let closing = {
            let connection = Arc::clone(&connection);
            tokio::spawn(async move { connection.disconnect().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(connection.status(), ConnectionStatus::Closing);

        connection.connect();
        closing.await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(*transport.opens.lock(), 2);
        let state = connection.state();
        assert_eq!(state.status, ConnectionStatus::Open);
        assert_eq!(state.subscribed_symbols, vec!["BTC"]);
    }
}
