//! Market watch service facade
//!
//! Wires the cache, registries, subscription merger, ingestor and snapshot
//! store together and exposes the operations collaborators call.

use crate::analytics::{self, AnalyticsResult};
use crate::cache::{TickCache, TickCacheEntry};
use crate::config::ServiceConfig;
use crate::ingestor::{IngestState, IngestStats, TickIngestor};
use crate::registry::{ChannelStore, GroupRegistry, InstrumentGroup};
use crate::snapshot::SnapshotStore;
use crate::subscription::{SubscriptionMerger, SubscriptionSummary};
use common::{Instrument, Result, Tick, Ts};
use feeds::TickerTransport;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::sync::Arc;
use storage::CollectionRegistry;
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tracing::info;

/// One line of the live market watch view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketWatchRow {
    /// Instrument token
    pub instrument_token: u32,
    /// Trading symbol, when the instrument is on a channel
    pub trading_symbol: Option<String>,
    /// Exchange, when the instrument is on a channel
    pub exchange: Option<String>,
    /// Merged quote
    pub quote: Tick,
    /// Derived metrics
    pub analytics: AnalyticsResult,
    /// Time of the last merge
    pub updated_at: Ts,
}

impl MarketWatchRow {
    fn new(entry: &TickCacheEntry, instrument: Option<&Instrument>) -> Self {
        Self {
            instrument_token: entry.quote.instrument_token,
            trading_symbol: instrument.map(|i| i.trading_symbol.clone()),
            exchange: instrument.map(|i| i.exchange.clone()),
            quote: entry.quote.clone(),
            analytics: analytics::compute(entry),
            updated_at: entry.updated_at,
        }
    }
}

/// Entry point for collaborators
#[derive(Debug)]
pub struct MarketWatchService {
    config: ServiceConfig,
    cache: Arc<RwLock<TickCache>>,
    groups: Arc<GroupRegistry>,
    channels: Arc<ChannelStore>,
    merger: SubscriptionMerger,
    ingestor: TickIngestor,
    snapshots: Arc<SnapshotStore>,
}

impl MarketWatchService {
    /// Open the stores under `config.data_dir` with an empty cache
    pub async fn open(config: ServiceConfig, transport: Arc<dyn TickerTransport>) -> Result<Self> {
        let cache = Arc::new(RwLock::new(TickCache::new()));
        let instruments = Arc::new(CollectionRegistry::new(config.collections_dir()));

        let groups = Arc::new(
            GroupRegistry::open(&config.collections_dir(), Arc::clone(&instruments)).await?,
        );
        let channels = Arc::new(ChannelStore::new(config.channels.clone(), instruments));
        let merger = SubscriptionMerger::new(
            Arc::clone(&groups),
            Arc::clone(&channels),
            Arc::clone(&cache),
        );
        let ingestor = TickIngestor::new(
            transport,
            Arc::clone(&channels),
            Arc::clone(&cache),
            config.reconnect.into(),
        );
        let snapshots = Arc::new(SnapshotStore::new(config.snapshot_path(), Arc::clone(&cache)));

        info!(data_dir = %config.data_dir.display(), "Market watch service opened");

        Ok(Self {
            config,
            cache,
            groups,
            channels,
            merger,
            ingestor,
            snapshots,
        })
    }

    /// Service configuration
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Shared cache handle
    pub fn cache(&self) -> Arc<RwLock<TickCache>> {
        Arc::clone(&self.cache)
    }

    // Connection

    /// Connect the ingestor to `channel`
    pub async fn connect(&self, channel: &str) -> Result<()> {
        self.ingestor.connect(channel).await
    }

    /// Stop streaming; idempotent
    pub async fn disconnect(&self) {
        self.ingestor.disconnect().await;
    }

    /// Whether the feed is streaming
    pub fn is_connected(&self) -> bool {
        self.ingestor.is_connected()
    }

    /// Ingestor state
    pub fn ingest_state(&self) -> IngestState {
        self.ingestor.state()
    }

    /// Observe ingestor state changes
    pub fn watch_ingest_state(&self) -> watch::Receiver<IngestState> {
        self.ingestor.watch_state()
    }

    /// Ingest counters
    pub fn ingest_stats(&self) -> IngestStats {
        self.ingestor.stats()
    }

    // Market watch view

    /// Every cached instrument with its analytics, ordered by token
    pub async fn market_watch(&self) -> Vec<MarketWatchRow> {
        let mut known: FxHashMap<u32, Instrument> = FxHashMap::default();
        for channel in self.channels.channels() {
            if let Ok(instruments) = self.channels.instruments(channel).await {
                known.extend(instruments.into_iter().map(|i| (i.instrument_token, i)));
            }
        }

        let mut rows: Vec<MarketWatchRow> = {
            let cache = self.cache.read().await;
            cache
                .entries()
                .map(|(token, entry)| MarketWatchRow::new(entry, known.get(token)))
                .collect()
        };
        rows.sort_by_key(|row| row.instrument_token);
        rows
    }

    // Subscriptions

    /// Merge `group` into `channel`
    pub async fn subscribe(&self, group: &str, channel: &str) -> Result<SubscriptionSummary> {
        self.merger.subscribe(group, channel).await
    }

    /// Instrument count of `channel`
    pub async fn ticker_info(&self, channel: &str) -> Result<usize> {
        self.merger.count(channel).await
    }

    /// Empty `channel` and evict its instruments from the cache
    pub async fn flush_channel(&self, channel: &str) -> Result<String> {
        self.merger.flush(channel).await
    }

    /// Flush `channel` from a process that is not streaming.
    ///
    /// Loads the persisted snapshot first and writes it back afterwards, so
    /// the evicted entries are not restored by the next run.
    pub async fn flush_persisted(&self, channel: &str) -> Result<String> {
        self.snapshots.restore().await;
        let ack = self.merger.flush(channel).await?;
        self.snapshots.save().await?;
        Ok(ack)
    }

    // Snapshots

    /// Load the last snapshot into the cache
    pub async fn restore_snapshot(&self) -> usize {
        self.snapshots.restore().await
    }

    /// Write a snapshot now
    pub async fn snapshot_now(&self) -> Result<usize> {
        self.snapshots.save().await
    }

    /// Delete the snapshot and empty the cache
    pub async fn clear_snapshot(&self) -> Result<String> {
        self.snapshots.clear().await
    }

    /// Start the snapshot timer; it writes a final snapshot on shutdown
    pub fn spawn_snapshots(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        Arc::clone(&self.snapshots).spawn(self.config.snapshot_interval(), shutdown)
    }

    // Instrument groups

    /// Create `name` unless it exists
    pub async fn create_group(&self, name: &str) -> Result<InstrumentGroup> {
        self.groups.create_group(name).await
    }

    /// Every group
    pub async fn list_groups(&self) -> Vec<InstrumentGroup> {
        self.groups.list_groups().await
    }

    /// Group `name`
    pub async fn group(&self, name: &str) -> Result<InstrumentGroup> {
        self.groups.group(name).await
    }

    /// Mark `app` active on `group`
    pub async fn activate(&self, group: &str, app: &str) -> Result<InstrumentGroup> {
        self.groups.activate(group, app).await
    }

    /// Mark `app` inactive on `group`
    pub async fn deactivate(&self, group: &str, app: &str) -> Result<InstrumentGroup> {
        self.groups.deactivate(group, app).await
    }

    /// Add instruments to `group`, returning how many were new
    pub async fn add_instruments(&self, group: &str, instruments: Vec<Instrument>) -> Result<usize> {
        self.groups.add_instruments(group, instruments).await
    }

    /// Remove one instrument from `group`
    pub async fn remove_instrument(&self, group: &str, instrument_token: u32) -> Result<bool> {
        self.groups.remove_instrument(group, instrument_token).await
    }

    /// Members of `group`
    pub async fn group_instruments(&self, group: &str) -> Result<Vec<Instrument>> {
        self.groups.instruments(group).await
    }
}
