//! Periodic tick cache snapshots
//!
//! The timer clones the cache under the read lock, releases it, and only
//! then encodes and writes, so merges never wait on disk I/O. Write failures
//! are logged and the next tick tries again. Saves and clears are serialized
//! so a clear is never undone by a save that copied the cache before it.

use crate::cache::{CacheSnapshot, TickCache};
use crate::shutdown_requested;
use common::{MarketWatchError, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use storage::SnapshotFile;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Persists and restores the tick cache
#[derive(Debug)]
pub struct SnapshotStore {
    file: SnapshotFile,
    cache: Arc<RwLock<TickCache>>,
    // Held from cache copy to file write, and across a clear
    write_gate: Mutex<()>,
}

impl SnapshotStore {
    /// Store writing `cache` to `path`
    pub fn new(path: impl Into<PathBuf>, cache: Arc<RwLock<TickCache>>) -> Self {
        Self {
            file: SnapshotFile::new(path),
            cache,
            write_gate: Mutex::new(()),
        }
    }

    /// Write the current cache, returning the encoded size
    pub async fn save(&self) -> Result<usize> {
        let _gate = self.write_gate.lock().await;
        let snapshot = self.cache.read().await.to_snapshot();
        self.file
            .save(&snapshot)
            .await
            .map_err(MarketWatchError::persistence)
    }

    /// Load the last snapshot into the cache, returning how many entries
    /// were restored. A missing or unreadable snapshot leaves the cache as
    /// it is.
    pub async fn restore(&self) -> usize {
        match self.file.load::<CacheSnapshot>().await {
            Ok(Some(snapshot)) => {
                let restored = snapshot.entries.len();
                info!(
                    entries = restored,
                    taken_at = %snapshot.taken_at,
                    "Restored tick cache snapshot"
                );
                self.cache.write().await.restore(snapshot);
                restored
            }
            Ok(None) => {
                info!(path = %self.file.path().display(), "No tick cache snapshot found");
                0
            }
            Err(e) => {
                warn!("Ignoring unreadable tick cache snapshot: {:#}", e);
                0
            }
        }
    }

    /// Delete the snapshot and empty the cache
    pub async fn clear(&self) -> Result<String> {
        let _gate = self.write_gate.lock().await;
        self.cache.write().await.clear();
        let removed = self
            .file
            .remove()
            .await
            .map_err(MarketWatchError::persistence)?;
        info!(removed, "Cleared tick cache snapshot");
        Ok("snapshot cleared".to_string())
    }

    /// Save every `interval` until `shutdown` flips, then save once more
    pub fn spawn(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.save().await {
                            Ok(bytes) => debug!(bytes, "Snapshot written"),
                            Err(e) => error!("Snapshot write failed: {}", e),
                        }
                    }
                    () = shutdown_requested(&mut shutdown) => break,
                }
            }

            match self.save().await {
                Ok(bytes) => info!(bytes, "Final snapshot written"),
                Err(e) => error!("Final snapshot failed: {}", e),
            }
        })
    }
}
