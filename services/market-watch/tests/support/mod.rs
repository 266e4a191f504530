//! Shared fixtures: a scripted in-memory ticker transport and service setup

#![allow(dead_code)]

use async_trait::async_trait;
use common::{Instrument, Tick};
use feeds::{FeedError, FeedResult, TickerEvent, TickerSession, TickerTransport};
use market_watch::{MarketWatchService, ServiceConfig};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// 2024-01-01T00:00:00Z, aligned to both window periods
pub const T0: u64 = 1_704_067_200;

/// What a session does once its scripted events run out
#[derive(Debug, Clone, Copy)]
pub enum Then {
    /// Report the upstream closing
    Close,
    /// Stay open forever
    Hang,
}

/// Outcome of one `connect` call
#[derive(Debug, Clone)]
pub enum Script {
    /// Refuse the connection
    Refuse,
    /// Open a session that plays `events`, then does `then`
    Session { events: Vec<TickerEvent>, then: Then },
}

impl Script {
    pub fn hang() -> Self {
        Script::Session {
            events: Vec::new(),
            then: Then::Hang,
        }
    }

    pub fn close() -> Self {
        Script::Session {
            events: Vec::new(),
            then: Then::Close,
        }
    }
}

/// Transport replaying queued scripts; refuses once the queue is empty
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    connects: AtomicUsize,
    subscriptions: Arc<Mutex<Vec<Vec<u32>>>>,
}

impl ScriptedTransport {
    pub fn new(scripts: impl IntoIterator<Item = Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
            ..Self::default()
        })
    }

    pub fn push(&self, script: Script) {
        self.scripts.lock().unwrap().push_back(script);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Token lists passed to `subscribe_full`, in call order
    pub fn subscriptions(&self) -> Vec<Vec<u32>> {
        self.subscriptions.lock().unwrap().clone()
    }
}

#[async_trait]
impl TickerTransport for ScriptedTransport {
    async fn connect(&self) -> FeedResult<Box<dyn TickerSession>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let script = self.scripts.lock().unwrap().pop_front();
        match script {
            Some(Script::Session { events, then }) => Ok(Box::new(ScriptedSession {
                events: events.into(),
                then,
                subscriptions: Arc::clone(&self.subscriptions),
            })),
            Some(Script::Refuse) | None => Err(FeedError::Connect("connection refused".to_string())),
        }
    }
}

struct ScriptedSession {
    events: VecDeque<TickerEvent>,
    then: Then,
    subscriptions: Arc<Mutex<Vec<Vec<u32>>>>,
}

#[async_trait]
impl TickerSession for ScriptedSession {
    async fn subscribe_full(&mut self, tokens: &[u32]) -> FeedResult<()> {
        self.subscriptions.lock().unwrap().push(tokens.to_vec());
        Ok(())
    }

    async fn next_event(&mut self) -> FeedResult<TickerEvent> {
        if let Some(event) = self.events.pop_front() {
            return Ok(event);
        }
        match self.then {
            Then::Close => Ok(TickerEvent::Closed {
                reason: Some("script finished".to_string()),
            }),
            Then::Hang => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> FeedResult<()> {
        Ok(())
    }
}

/// Config rooted in `dir` with the default channel slots and policy
pub fn test_config(dir: &TempDir) -> ServiceConfig {
    ServiceConfig {
        data_dir: dir.path().to_path_buf(),
        ..ServiceConfig::default()
    }
}

pub async fn open_service(dir: &TempDir, transport: Arc<ScriptedTransport>) -> MarketWatchService {
    MarketWatchService::open(test_config(dir), transport)
        .await
        .expect("service opens")
}

/// Instrument whose exchange token equals its instrument token
pub fn instrument(token: u32, symbol: &str) -> Instrument {
    Instrument::new(token, token, symbol, "NSE")
}

pub fn ticks_event(ticks: Vec<Tick>, malformed: usize) -> TickerEvent {
    TickerEvent::Ticks { ticks, malformed }
}

/// Poll `condition` until it holds; panics after a few seconds
pub async fn eventually(condition: impl Fn() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}
