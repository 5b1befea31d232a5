//! Reconnecting message channel.
//!
//! State machine:
//!
//! ```text
//!  Disconnected ──connect()──▶ Connecting ──handshake──▶ Open
//!       ▲                          │                       │
//!       │◀──────dial failed────────┘                       │
//!       │◀──────remote close / error───────────────────────┘
//!       │◀──Closing◀──disconnect()─────────────────────────┘
//!       └──(fixed delay, unless stopped)──▶ Connecting
//! ```
//!
//! Invariants:
//! - at most one live connection, installed together with `Open`
//! - at most one pending reconnect timer (cancel-then-schedule)
//! - a dial that completes after `disconnect()` is closed and discarded; a
//!   dial that fails after it is ignored
//! - `connect()` waits for a released connection to finish closing, and every
//!   connection that reached `Open` reports `on_disconnect` exactly once
//! - dropping the channel stops the reconnect loop and closes the connection

use std::{
    fmt,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    rag_studio_protocol::{ChannelMessage, OutboundFrame},
    tokio::{
        sync::{mpsc, watch},
        task::JoinHandle,
    },
    tracing::{debug, info, trace, warn},
    url::Url,
};

use crate::{
    connector::{Connection, Connector, WsConnector},
    error::ChannelError,
};

/// Delay between reconnect attempts unless configured otherwise.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(3000);

/// Upper bound on closing a released connection.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub url: String,
    /// Reconnect automatically after an unexpected close.
    pub reconnect: bool,
    pub reconnect_interval: Duration,
}

impl ChannelConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: true,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_reconnect(mut self, reconnect: bool) -> Self {
        self.reconnect = reconnect;
        self
    }

    #[must_use]
    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }
}

type MessageHandler = Arc<dyn Fn(ChannelMessage) + Send + Sync>;
type LifecycleHandler = Arc<dyn Fn() + Send + Sync>;
type ErrorHandler = Arc<dyn Fn(&ChannelError) + Send + Sync>;

#[derive(Default)]
struct Handlers {
    on_message: Option<MessageHandler>,
    on_connect: Option<LifecycleHandler>,
    on_disconnect: Option<LifecycleHandler>,
    on_error: Option<ErrorHandler>,
}

impl Handlers {
    fn connected(&self) {
        if let Some(f) = &self.on_connect {
            f();
        }
    }

    fn disconnected(&self) {
        if let Some(f) = &self.on_disconnect {
            f();
        }
    }

    fn error(&self, err: &ChannelError) {
        if let Some(f) = &self.on_error {
            f(err);
        }
    }

    fn message(&self, msg: ChannelMessage) {
        if let Some(f) = &self.on_message {
            f(msg);
        }
    }
}

/// Builder for [`MessageChannel`]; every callback is optional.
pub struct ChannelBuilder {
    config: ChannelConfig,
    handlers: Handlers,
    connector: Option<Arc<dyn Connector>>,
}

impl ChannelBuilder {
    /// The single message listener. Use [`crate::FanOut`] for more.
    #[must_use]
    pub fn on_message(mut self, f: impl Fn(ChannelMessage) + Send + Sync + 'static) -> Self {
        self.handlers.on_message = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn on_connect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.handlers.on_connect = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn on_disconnect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.handlers.on_disconnect = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn on_error(mut self, f: impl Fn(&ChannelError) + Send + Sync + 'static) -> Self {
        self.handlers.on_error = Some(Arc::new(f));
        self
    }

    /// Replace the default [`WsConnector`].
    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn build(self) -> MessageChannel {
        let (state, _) = watch::channel(ChannelState::Disconnected);
        let reconnect = self.config.reconnect;
        MessageChannel {
            inner: Arc::new(Inner {
                config: self.config,
                connector: self
                    .connector
                    .unwrap_or_else(|| Arc::new(WsConnector::new())),
                handlers: self.handlers,
                state,
                auto_reconnect: AtomicBool::new(reconnect),
                epoch: AtomicU64::new(0),
                next_conn_id: AtomicU64::new(1),
                live: Mutex::new(None),
                timer: Mutex::new(None),
                next_timer_id: AtomicU64::new(1),
            }),
        }
    }
}

/// A single logical connection that survives unexpected closes.
///
/// Nothing here returns an error: failures are logged and reported through
/// `on_error` / `on_disconnect`.
pub struct MessageChannel {
    inner: Arc<Inner>,
}

impl MessageChannel {
    pub fn builder(config: ChannelConfig) -> ChannelBuilder {
        ChannelBuilder {
            config,
            handlers: Handlers::default(),
            connector: None,
        }
    }

    /// Open the connection unless one is already open or being dialed.
    ///
    /// Re-arms automatic reconnection after an earlier [`disconnect`]. If the
    /// connection released by that call is still closing, waits for the close
    /// to finish first.
    ///
    /// [`disconnect`]: Self::disconnect
    pub async fn connect(&self) {
        self.inner
            .auto_reconnect
            .store(self.inner.config.reconnect, Ordering::SeqCst);
        self.inner.connect().await;
    }

    /// Stop for good: no further automatic reconnects, pending timer
    /// cancelled, live connection closed. Idempotent.
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }

    /// Hand one frame to the live connection.
    ///
    /// When the channel is not open the frame is dropped with a warning; it
    /// is never queued for a later connection. Returns whether the frame was
    /// handed over.
    pub fn send(&self, frame: impl Into<OutboundFrame>) -> bool {
        self.inner.send(frame.into())
    }

    pub fn state(&self) -> ChannelState {
        *self.inner.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ChannelState::Open
    }

    pub fn url(&self) -> &str {
        &self.inner.config.url
    }

    /// Watch every state transition.
    pub fn subscribe_state(&self) -> watch::Receiver<ChannelState> {
        self.inner.state.subscribe()
    }

    /// Resolve once the channel reaches `target`.
    pub async fn wait_for_state(&self, target: ChannelState) {
        let mut rx = self.inner.state.subscribe();
        // The sender lives in `inner`, which we hold, so this cannot fail.
        let _ = rx.wait_for(|state| *state == target).await;
    }
}

impl Drop for MessageChannel {
    fn drop(&mut self) {
        self.inner.disconnect();
    }
}

impl fmt::Debug for MessageChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageChannel")
            .field("url", &self.inner.config.url)
            .field("state", &self.state())
            .finish()
    }
}

struct LiveConnection {
    id: u64,
    /// Dropping this sender tells the connection task to close.
    frames: mpsc::UnboundedSender<String>,
}

struct ReconnectTimer {
    id: u64,
    handle: JoinHandle<()>,
}

enum Exit {
    /// The channel released the connection (disconnect or drop).
    Released,
    RemoteClosed,
    Failed(ChannelError),
}

struct Inner {
    config: ChannelConfig,
    connector: Arc<dyn Connector>,
    handlers: Handlers,
    state: watch::Sender<ChannelState>,
    auto_reconnect: AtomicBool,
    /// Bumped by `disconnect()` while holding `live`.
    epoch: AtomicU64,
    next_conn_id: AtomicU64,
    live: Mutex<Option<LiveConnection>>,
    timer: Mutex<Option<ReconnectTimer>>,
    next_timer_id: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Inner {
    async fn connect(self: &Arc<Self>) {
        let mut states = self.state.subscribe();
        // The sender lives in `self`, so this cannot fail.
        let _ = states
            .wait_for(|state| *state != ChannelState::Closing)
            .await;

        // Read together with the `Connecting` transition, under the lock
        // `disconnect()` bumps the epoch with: a disconnect either precedes
        // this attempt or resolves its `Connecting` state.
        let epoch = {
            let _live = lock(&self.live);
            let started = self.state.send_if_modified(|state| {
                if *state == ChannelState::Disconnected {
                    *state = ChannelState::Connecting;
                    true
                } else {
                    false
                }
            });
            if !started {
                debug!(url = %self.config.url, state = %*self.state.borrow(), "connect ignored");
                return;
            }
            self.epoch.load(Ordering::SeqCst)
        };
        self.cancel_timer();

        if let Err(reason) = Url::parse(&self.config.url) {
            self.dial_failed(epoch, ChannelError::InvalidUrl {
                url: self.config.url.clone(),
                reason: reason.to_string(),
            });
            return;
        }

        debug!(url = %self.config.url, "connecting");
        match self.connector.connect(&self.config.url).await {
            Ok(conn) => self.open(epoch, conn).await,
            Err(e) => self.dial_failed(epoch, e),
        }
    }

    async fn open(self: &Arc<Self>, epoch: u64, mut conn: Box<dyn Connection>) {
        let id = self.next_conn_id.fetch_add(1, Ordering::SeqCst);
        let (frames, rx) = mpsc::unbounded_channel();
        let installed = {
            let mut live = lock(&self.live);
            // A stale epoch means `disconnect()` already moved this attempt's
            // `Connecting` on; any `Connecting` now belongs to a newer dial.
            if self.epoch.load(Ordering::SeqCst) == epoch && live.is_none() {
                *live = Some(LiveConnection { id, frames });
                self.state.send_replace(ChannelState::Open);
                true
            } else {
                false
            }
        };

        if !installed {
            debug!(url = %self.config.url, "disconnected while dialing, discarding connection");
            if let Err(e) = conn.close().await {
                debug!(error = %e, "error closing discarded connection");
            }
            return;
        }

        info!(url = %self.config.url, "channel connected");
        self.handlers.connected();
        // Spawned after `on_connect` so a fast remote close cannot report
        // the disconnect first.
        tokio::spawn(Arc::clone(self).run_connection(id, conn, rx));
    }

    fn dial_failed(self: &Arc<Self>, epoch: u64, err: ChannelError) {
        let current = {
            let _live = lock(&self.live);
            self.epoch.load(Ordering::SeqCst) == epoch
                && self.state.send_if_modified(|state| {
                    if *state == ChannelState::Connecting {
                        *state = ChannelState::Disconnected;
                        true
                    } else {
                        false
                    }
                })
        };
        if !current {
            debug!(url = %self.config.url, error = %err, "ignoring failure of abandoned dial");
            return;
        }

        warn!(url = %self.config.url, error = %err, "channel connection failed");
        self.handlers.error(&err);
        if err.is_retryable() && self.auto_reconnect.load(Ordering::SeqCst) {
            self.schedule_reconnect();
        }
    }

    async fn run_connection(
        self: Arc<Self>,
        id: u64,
        mut conn: Box<dyn Connection>,
        mut frames: mpsc::UnboundedReceiver<String>,
    ) {
        let exit = loop {
            tokio::select! {
                outbound = frames.recv() => match outbound {
                    Some(frame) => {
                        trace!(len = frame.len(), "sending frame");
                        if let Err(e) = conn.send(frame).await {
                            break Exit::Failed(e);
                        }
                    },
                    None => break Exit::Released,
                },
                inbound = conn.recv() => match inbound {
                    Some(Ok(text)) => self.dispatch(&text),
                    Some(Err(e)) => break Exit::Failed(e),
                    None => break Exit::RemoteClosed,
                },
            }
        };

        match exit {
            Exit::Released => {
                match tokio::time::timeout(CLOSE_TIMEOUT, conn.close()).await {
                    Ok(Ok(())) => {},
                    Ok(Err(e)) => debug!(error = %e, "error closing connection"),
                    Err(_) => debug!(conn = id, "timed out closing connection"),
                }
                self.finish_close(id);
            },
            Exit::RemoteClosed => self.connection_lost(id, None),
            Exit::Failed(e) => self.connection_lost(id, Some(e)),
        }
    }

    fn dispatch(&self, frame: &str) {
        match ChannelMessage::decode(frame) {
            Ok(msg) => {
                trace!(kind = %msg.kind, "frame received");
                self.handlers.message(msg);
            },
            Err(e) => warn!(error = %e, "dropping malformed frame"),
        }
    }

    fn connection_lost(self: &Arc<Self>, id: u64, err: Option<ChannelError>) {
        let current = {
            let mut live = lock(&self.live);
            if live.as_ref().is_some_and(|conn| conn.id == id) {
                *live = None;
                self.state.send_replace(ChannelState::Disconnected);
                true
            } else {
                false
            }
        };
        if !current {
            // Released concurrently; finish the close `disconnect()` began.
            self.finish_close(id);
            return;
        }

        match &err {
            Some(e) => warn!(url = %self.config.url, error = %e, "channel connection lost"),
            None => info!(url = %self.config.url, "channel disconnected"),
        }
        if let Some(e) = &err {
            self.handlers.error(e);
        }
        self.handlers.disconnected();

        if self.auto_reconnect.load(Ordering::SeqCst) {
            self.schedule_reconnect();
        }
    }

    /// Connection `id`, released by `disconnect()`, is closed: report it,
    /// then move `Closing → Disconnected` so a waiting `connect()` proceeds.
    fn finish_close(&self, id: u64) {
        info!(url = %self.config.url, conn = id, "channel disconnected");
        self.handlers.disconnected();

        let live = lock(&self.live);
        if live.is_none() {
            self.state.send_if_modified(|state| {
                if *state == ChannelState::Closing {
                    *state = ChannelState::Disconnected;
                    true
                } else {
                    false
                }
            });
        }
    }

    fn disconnect(&self) {
        self.auto_reconnect.store(false, Ordering::SeqCst);
        self.cancel_timer();

        let released = {
            let mut live = lock(&self.live);
            self.epoch.fetch_add(1, Ordering::SeqCst);
            let released = live.take();
            if released.is_some() {
                self.state.send_replace(ChannelState::Closing);
            } else {
                // A dial may be in flight; its result is discarded by epoch.
                self.state.send_if_modified(|state| {
                    if *state == ChannelState::Connecting {
                        *state = ChannelState::Disconnected;
                        true
                    } else {
                        false
                    }
                });
            }
            released
        };

        if let Some(conn) = released {
            debug!(url = %self.config.url, conn = conn.id, "closing channel");
            drop(conn);
        }
    }

    fn send(&self, frame: OutboundFrame) -> bool {
        let wire = match frame.into_wire() {
            Ok(wire) => wire,
            Err(e) => {
                warn!(error = %e, "failed to encode outbound frame");
                return false;
            },
        };

        let live = lock(&self.live);
        match live.as_ref() {
            Some(conn) => conn.frames.send(wire).is_ok(),
            None => {
                warn!(url = %self.config.url, "channel is not connected, dropping outbound frame");
                false
            },
        }
    }

    fn schedule_reconnect(self: &Arc<Self>) {
        let delay = self.config.reconnect_interval;
        let id = self.next_timer_id.fetch_add(1, Ordering::SeqCst);
        let mut slot = lock(&self.timer);
        if let Some(previous) = slot.take() {
            previous.handle.abort();
        }

        debug!(url = %self.config.url, delay_ms = delay.as_millis() as u64, "scheduling reconnect");
        let inner = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !inner.release_timer(id) || !inner.auto_reconnect.load(Ordering::SeqCst) {
                return;
            }
            debug!(url = %inner.config.url, "attempting to reconnect");
            inner.connect().await;
        });
        *slot = Some(ReconnectTimer { id, handle });
    }

    /// Clear the timer slot if it still holds timer `id`, so that a failed
    /// attempt can schedule the next one without aborting the running task.
    fn release_timer(&self, id: u64) -> bool {
        let mut slot = lock(&self.timer);
        if slot.as_ref().is_some_and(|timer| timer.id == id) {
            *slot = None;
            true
        } else {
            false
        }
    }

    fn cancel_timer(&self) {
        if let Some(timer) = lock(&self.timer).take() {
            timer.handle.abort();
        }
    }
}
