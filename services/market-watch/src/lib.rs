//! Market Watch Service
//!
//! Real-time tick cache for a trading dashboard:
//! - Ingests Kite Ticker full-mode ticks for the active ticker channel
//! - Merges them field by field into a per-instrument quote table
//! - Keeps 3 and 10 minute rolling price windows for spike metrics
//! - Manages instrument groups and deduplicated channel subscriptions
//! - Snapshots the table on a timer and restores it at startup

#![warn(clippy::all)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod analytics;
pub mod cache;
pub mod config;
pub mod ingestor;
pub mod registry;
pub mod service;
pub mod snapshot;
pub mod subscription;

pub use analytics::AnalyticsResult;
pub use cache::{CacheSnapshot, RollingWindow, TickCache, TickCacheEntry, WindowView};
pub use config::ServiceConfig;
pub use ingestor::{IngestState, IngestStats, ReconnectPolicy, TickIngestor};
pub use registry::{AppEntry, ChannelStore, GroupRegistry, InstrumentGroup};
pub use service::{MarketWatchRow, MarketWatchService};
pub use snapshot::SnapshotStore;
pub use subscription::{SubscriptionMerger, SubscriptionSummary};

use tokio::sync::watch;

/// Resolves once `shutdown` flips to true or its sender is dropped
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    // Err means the sender is gone, which ends the loop just the same
    let _ = shutdown.wait_for(|stop| *stop).await;
}
