//! Tick merge cache
//!
//! One entry per instrument token holding the merged quote and two rolling
//! windows of recent prices:
//!
//! - `window_10min`: 60 slots of 10 s, indexed by `(secs % 600) / 10`
//! - `window_3min`: 60 slots of 3 s, indexed by `(secs % 180) / 3`
//!
//! Slots are overwritten in place, never appended, so a slot holds the last
//! price written during its bucket of the most recent cycle that touched it.

use common::constants::window::{
    TEN_MIN_BUCKET_SECS, TEN_MIN_PERIOD_SECS, THREE_MIN_BUCKET_SECS, THREE_MIN_PERIOD_SECS,
    WINDOW_SLOTS,
};
use common::{MarketWatchError, Result, Tick, Ts};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Fixed-length circular price buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Option<f64>>", into = "Vec<Option<f64>>")]
pub struct RollingWindow {
    slots: [Option<f64>; WINDOW_SLOTS],
}

impl Default for RollingWindow {
    fn default() -> Self {
        Self {
            slots: [None; WINDOW_SLOTS],
        }
    }
}

impl RollingWindow {
    /// Write `price` into slot `bucket`
    pub fn set(&mut self, bucket: usize, price: f64) {
        self.slots[bucket % WINDOW_SLOTS] = Some(price);
    }

    /// Price in slot `bucket`, if ever written
    pub fn get(&self, bucket: usize) -> Option<f64> {
        self.slots.get(bucket).copied().flatten()
    }

    /// All slots in index order
    pub fn slots(&self) -> &[Option<f64>] {
        &self.slots
    }

    /// Written prices in slot order
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.slots.iter().flatten().copied()
    }

    /// Highest written price
    pub fn max(&self) -> Option<f64> {
        self.values().reduce(f64::max)
    }

    /// Lowest written price
    pub fn min(&self) -> Option<f64> {
        self.values().reduce(f64::min)
    }

    /// True until the first write
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}

impl TryFrom<Vec<Option<f64>>> for RollingWindow {
    type Error = String;

    fn try_from(slots: Vec<Option<f64>>) -> std::result::Result<Self, Self::Error> {
        let len = slots.len();
        let slots = <[Option<f64>; WINDOW_SLOTS]>::try_from(slots)
            .map_err(|_| format!("rolling window needs {WINDOW_SLOTS} slots, got {len}"))?;
        Ok(Self { slots })
    }
}

impl From<RollingWindow> for Vec<Option<f64>> {
    fn from(window: RollingWindow) -> Self {
        window.slots.to_vec()
    }
}

/// Long-window slot for a unix time
pub fn bucket_10min(unix_secs: u64) -> usize {
    ((unix_secs % TEN_MIN_PERIOD_SECS) / TEN_MIN_BUCKET_SECS) as usize
}

/// Short-window slot for a unix time
pub fn bucket_3min(unix_secs: u64) -> usize {
    ((unix_secs % THREE_MIN_PERIOD_SECS) / THREE_MIN_BUCKET_SECS) as usize
}

/// Merged quote plus rolling windows for one instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickCacheEntry {
    /// Field-wise merge of every tick received
    pub quote: Tick,
    /// 10 minute window of 10 s slots
    pub window_10min: RollingWindow,
    /// 3 minute window of 3 s slots
    pub window_3min: RollingWindow,
    /// Time of the last merge
    pub updated_at: Ts,
}

impl TickCacheEntry {
    fn new(tick: &Tick, unix_secs: u64) -> Self {
        let mut entry = Self {
            quote: tick.clone(),
            window_10min: RollingWindow::default(),
            window_3min: RollingWindow::default(),
            updated_at: Ts::from_secs(unix_secs),
        };
        entry.record_price(unix_secs);
        entry
    }

    fn merge(&mut self, tick: &Tick, unix_secs: u64) {
        self.quote.merge_from(tick);
        self.updated_at = Ts::from_secs(unix_secs);
        self.record_price(unix_secs);
    }

    fn record_price(&mut self, unix_secs: u64) {
        let price = self.quote.last_price;
        self.window_10min.set(bucket_10min(unix_secs), price);
        self.window_3min.set(bucket_3min(unix_secs), price);
    }
}

/// Read-only view of an instrument's rolling windows
#[derive(Debug, Clone, Copy)]
pub struct WindowView<'a> {
    /// 10 minute window
    pub window_10min: &'a RollingWindow,
    /// 3 minute window
    pub window_3min: &'a RollingWindow,
}

/// Outcome of merging one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Ticks merged into the cache
    pub merged: usize,
    /// Ticks dropped for lacking an instrument token
    pub malformed: usize,
}

/// Point-in-time copy of the cache for the snapshot store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    /// When the copy was taken
    pub taken_at: Ts,
    /// Entries keyed by instrument token
    pub entries: FxHashMap<u32, TickCacheEntry>,
}

/// In-memory quote table keyed by instrument token
#[derive(Debug, Default)]
pub struct TickCache {
    entries: FxHashMap<u32, TickCacheEntry>,
}

impl TickCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `tick` at the current wall-clock time
    pub fn merge(&mut self, tick: &Tick) -> Result<()> {
        self.merge_at(tick, Ts::now().as_secs())
    }

    /// Merge `tick` as if received at `unix_secs`
    pub fn merge_at(&mut self, tick: &Tick, unix_secs: u64) -> Result<()> {
        if tick.instrument_token == 0 {
            return Err(MarketWatchError::MalformedTick(
                "missing instrument token".to_string(),
            ));
        }

        match self.entries.get_mut(&tick.instrument_token) {
            Some(entry) => entry.merge(tick, unix_secs),
            None => {
                self.entries
                    .insert(tick.instrument_token, TickCacheEntry::new(tick, unix_secs));
            }
        }
        Ok(())
    }

    /// Merge a batch in delivery order; malformed ticks are skipped and counted
    pub fn merge_batch(&mut self, ticks: &[Tick], unix_secs: u64) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for tick in ticks {
            match self.merge_at(tick, unix_secs) {
                Ok(()) => outcome.merged += 1,
                Err(e) => {
                    debug!("Dropping tick: {}", e);
                    outcome.malformed += 1;
                }
            }
        }
        outcome
    }

    /// Entry for `token`
    pub fn get(&self, token: u32) -> Option<&TickCacheEntry> {
        self.entries.get(&token)
    }

    /// Both rolling windows of `token`
    pub fn get_window(&self, token: u32) -> Result<WindowView<'_>> {
        self.entries
            .get(&token)
            .map(|entry| WindowView {
                window_10min: &entry.window_10min,
                window_3min: &entry.window_3min,
            })
            .ok_or_else(|| MarketWatchError::not_found("instrument", token))
    }

    /// Number of instruments held
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no instrument is held
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop the entries of `tokens`, returning how many existed
    pub fn remove(&mut self, tokens: impl IntoIterator<Item = u32>) -> usize {
        tokens
            .into_iter()
            .filter(|token| self.entries.remove(token).is_some())
            .count()
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterate over all entries
    pub fn entries(&self) -> impl Iterator<Item = (&u32, &TickCacheEntry)> {
        self.entries.iter()
    }

    /// Copy the table for persistence
    pub fn to_snapshot(&self) -> CacheSnapshot {
        CacheSnapshot {
            taken_at: Ts::now(),
            entries: self.entries.clone(),
        }
    }

    /// Replace the table with a persisted copy
    pub fn restore(&mut self, snapshot: CacheSnapshot) {
        self.entries = snapshot.entries;
    }
}
