//! Tick stream ingestor
//!
//! Owns the single live upstream session. State transitions:
//!
//! ```text
//! Idle -> Connecting -> Connected -> Reconnecting{attempt} -> Connected
//!                                                          -> Disconnected
//! ```
//!
//! `connect` tears down any existing session first, so at most one session
//! task runs at a time. When a session drops without an explicit
//! `disconnect`, the session task retries with a fixed delay up to the
//! configured attempt budget, re-reading the active channel's instruments on
//! every attempt. Exhausting the budget leaves `Disconnected` until the next
//! explicit `connect`.

use crate::cache::TickCache;
use crate::config::ReconnectConfig;
use crate::registry::ChannelStore;
use crate::shutdown_requested;
use common::{MarketWatchError, Result, Ts};
use feeds::{BrokerMessage, FeedError, TickerEvent, TickerSession, TickerTransport};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Connection state of the ingestor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IngestState {
    /// Never connected, or explicitly disconnected
    Idle,
    /// Explicit connect in progress
    Connecting,
    /// Streaming
    Connected,
    /// Waiting for, or running, reconnect attempt `attempt`
    Reconnecting {
        /// 1-based attempt number
        attempt: u32,
    },
    /// Connect failed or the reconnect budget ran out
    Disconnected,
}

/// Bounded fixed-delay reconnect policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Attempts before giving up
    pub max_attempts: u32,
    /// Delay before each attempt
    pub delay: Duration,
}

impl From<ReconnectConfig> for ReconnectPolicy {
    fn from(config: ReconnectConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            delay: config.delay(),
        }
    }
}

/// Ingest counters since process start
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    /// Ticks merged into the cache
    pub ticks_merged: u64,
    /// Ticks or packets dropped as malformed
    pub malformed_ticks: u64,
    /// Tick batches received
    pub batches: u64,
    /// Reconnect attempts made
    pub reconnect_attempts: u64,
}

#[derive(Debug, Default)]
struct Counters {
    ticks_merged: AtomicU64,
    malformed_ticks: AtomicU64,
    batches: AtomicU64,
    reconnect_attempts: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> IngestStats {
        IngestStats {
            ticks_merged: self.ticks_merged.load(Ordering::Relaxed),
            malformed_ticks: self.malformed_ticks.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
        }
    }
}

/// State shared between the ingestor handle and its session task
struct Shared {
    transport: Arc<dyn TickerTransport>,
    channels: Arc<ChannelStore>,
    cache: Arc<RwLock<TickCache>>,
    policy: ReconnectPolicy,
    state: watch::Sender<IngestState>,
    counters: Counters,
}

/// Why a session stopped pumping events
enum SessionEnd {
    Shutdown,
    Lost(String),
}

struct ActiveSession {
    channel: String,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Owns the upstream feed connection and merges what it receives
pub struct TickIngestor {
    shared: Arc<Shared>,
    session: Mutex<Option<ActiveSession>>,
}

impl std::fmt::Debug for TickIngestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickIngestor")
            .field("state", &*self.shared.state.borrow())
            .field("policy", &self.shared.policy)
            .finish_non_exhaustive()
    }
}

impl TickIngestor {
    /// Ingestor feeding `cache` from `transport`
    pub fn new(
        transport: Arc<dyn TickerTransport>,
        channels: Arc<ChannelStore>,
        cache: Arc<RwLock<TickCache>>,
        policy: ReconnectPolicy,
    ) -> Self {
        let (state, _) = watch::channel(IngestState::Idle);
        Self {
            shared: Arc::new(Shared {
                transport,
                channels,
                cache,
                policy,
                state,
                counters: Counters::default(),
            }),
            session: Mutex::new(None),
        }
    }

    /// Current state
    pub fn state(&self) -> IngestState {
        *self.shared.state.borrow()
    }

    /// Observe state changes
    pub fn watch_state(&self) -> watch::Receiver<IngestState> {
        self.shared.state.subscribe()
    }

    /// True while streaming
    pub fn is_connected(&self) -> bool {
        self.state() == IngestState::Connected
    }

    /// Counters since start
    pub fn stats(&self) -> IngestStats {
        self.shared.counters.snapshot()
    }

    /// Channel named in the most recent `connect`
    pub async fn active_channel(&self) -> Option<String> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|session| session.channel.clone())
    }

    /// Open a session streaming `channel` in full mode, replacing any
    /// existing session.
    pub async fn connect(&self, channel: &str) -> Result<()> {
        // An unknown channel leaves the current session untouched
        self.shared.channels.ensure_slot(channel)?;

        let mut slot = self.session.lock().await;
        if let Some(previous) = slot.take() {
            info!(channel = %previous.channel, "Replacing existing session");
            stop_session(previous).await;
        }

        self.shared.state.send_replace(IngestState::Connecting);
        info!(channel, "Connecting ticker");

        let session = match self.shared.establish(channel).await {
            Ok(session) => session,
            Err(e) => {
                error!(channel, "Ticker connect failed: {}", e);
                self.shared.state.send_replace(IngestState::Disconnected);
                return Err(e);
            }
        };

        self.shared.state.send_replace(IngestState::Connected);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(Arc::clone(&self.shared).run(
            session,
            channel.to_string(),
            shutdown_rx,
        ));

        *slot = Some(ActiveSession {
            channel: channel.to_string(),
            shutdown,
            task,
        });
        Ok(())
    }

    /// Stop the session and any pending reconnect. Safe to call repeatedly.
    pub async fn disconnect(&self) {
        let mut slot = self.session.lock().await;
        if let Some(session) = slot.take() {
            info!(channel = %session.channel, "Disconnecting ticker");
            stop_session(session).await;
        }
        self.shared.state.send_replace(IngestState::Idle);
    }
}

async fn stop_session(session: ActiveSession) {
    // The task may already have finished after exhausting its reconnects
    let _ = session.shutdown.send(true);
    if let Err(e) = session.task.await {
        warn!("Session task ended abnormally: {}", e);
    }
}

impl Shared {
    /// Connect and subscribe to the current instruments of `channel`
    async fn establish(&self, channel: &str) -> Result<Box<dyn TickerSession>> {
        let mut session = self
            .transport
            .connect()
            .await
            .map_err(connection_error)?;

        let tokens = match self.channels.tokens(channel).await {
            Ok(tokens) => tokens,
            Err(e) => {
                close_quietly(session.as_mut()).await;
                return Err(e);
            }
        };

        if let Err(e) = session.subscribe_full(&tokens).await {
            close_quietly(session.as_mut()).await;
            return Err(connection_error(e));
        }

        info!(channel, instruments = tokens.len(), "Ticker subscribed");
        Ok(session)
    }

    /// Session task: pump events, reconnect on loss, stop on shutdown
    async fn run(
        self: Arc<Self>,
        mut session: Box<dyn TickerSession>,
        channel: String,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            match self.pump(session.as_mut(), &mut shutdown).await {
                SessionEnd::Shutdown => {
                    close_quietly(session.as_mut()).await;
                    return;
                }
                SessionEnd::Lost(reason) => {
                    warn!(channel = %channel, reason = %reason, "Ticker connection lost");
                }
            }

            match self.reconnect(&channel, &mut shutdown).await {
                Some(next) => session = next,
                None => return,
            }
        }
    }

    async fn pump(
        &self,
        session: &mut dyn TickerSession,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        loop {
            let event = tokio::select! {
                _ = shutdown_requested(shutdown) => return SessionEnd::Shutdown,
                event = session.next_event() => event,
            };

            match event {
                Ok(TickerEvent::Ticks { ticks, malformed }) => {
                    let outcome = self
                        .cache
                        .write()
                        .await
                        .merge_batch(&ticks, Ts::now().as_secs());

                    let dropped = (malformed + outcome.malformed) as u64;
                    self.counters.batches.fetch_add(1, Ordering::Relaxed);
                    self.counters
                        .ticks_merged
                        .fetch_add(outcome.merged as u64, Ordering::Relaxed);
                    if dropped > 0 {
                        self.counters
                            .malformed_ticks
                            .fetch_add(dropped, Ordering::Relaxed);
                        debug!(dropped, "Dropped malformed ticks");
                    }
                }
                Ok(TickerEvent::Heartbeat) => debug!("Heartbeat"),
                Ok(TickerEvent::Message(message)) => log_broker_message(&message),
                Ok(TickerEvent::Closed { reason }) => {
                    return SessionEnd::Lost(reason.unwrap_or_else(|| "closed".to_string()));
                }
                Err(e) => return SessionEnd::Lost(e.to_string()),
            }
        }
    }

    /// Try up to `max_attempts` times; `None` on shutdown or exhaustion
    async fn reconnect(
        &self,
        channel: &str,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Option<Box<dyn TickerSession>> {
        for attempt in 1..=self.policy.max_attempts {
            self.state.send_replace(IngestState::Reconnecting { attempt });
            self.counters
                .reconnect_attempts
                .fetch_add(1, Ordering::Relaxed);

            tokio::select! {
                _ = shutdown_requested(shutdown) => return None,
                () = tokio::time::sleep(self.policy.delay) => {}
            }

            info!(
                channel,
                attempt,
                max_attempts = self.policy.max_attempts,
                "Reconnecting ticker"
            );
            let result = tokio::select! {
                _ = shutdown_requested(shutdown) => return None,
                result = self.establish(channel) => result,
            };

            match result {
                Ok(session) => {
                    info!(channel, attempt, "Ticker reconnected");
                    self.state.send_replace(IngestState::Connected);
                    return Some(session);
                }
                Err(e) => warn!(channel, attempt, "Reconnect attempt failed: {}", e),
            }
        }

        error!(
            channel,
            attempts = self.policy.max_attempts,
            "Reconnect attempts exhausted, ticker disconnected"
        );
        self.state.send_replace(IngestState::Disconnected);
        None
    }
}

async fn close_quietly(session: &mut dyn TickerSession) {
    if let Err(e) = session.close().await {
        debug!("Error closing ticker session: {}", e);
    }
}

fn connection_error(err: FeedError) -> MarketWatchError {
    MarketWatchError::Connection(err.to_string())
}

fn log_broker_message(message: &BrokerMessage) {
    match message.kind.as_str() {
        "error" => error!(data = %message.data, "Broker error"),
        "message" => info!(data = %message.data, "Broker message"),
        "order" => info!(data = %message.data, "Order update"),
        other => debug!(kind = other, "Unhandled broker message"),
    }
}
