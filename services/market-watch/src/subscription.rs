//! Group to channel subscription merging

use crate::cache::TickCache;
use crate::registry::{ChannelStore, GroupRegistry};
use common::{Instrument, MarketWatchError, Result};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Counts reported by a subscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSummary {
    /// Group instruments appended to the channel
    pub new_instruments_counter: usize,
    /// Group instruments the channel already had
    pub existing_instrument_counter: usize,
    /// Size of the group's instrument list
    pub total_instruments: usize,
}

/// Copies group instruments into ticker channels
#[derive(Debug)]
pub struct SubscriptionMerger {
    groups: Arc<GroupRegistry>,
    channels: Arc<ChannelStore>,
    cache: Arc<RwLock<TickCache>>,
}

impl SubscriptionMerger {
    /// Merger over the given stores
    pub fn new(
        groups: Arc<GroupRegistry>,
        channels: Arc<ChannelStore>,
        cache: Arc<RwLock<TickCache>>,
    ) -> Self {
        Self {
            groups,
            channels,
            cache,
        }
    }

    /// Append the instruments of `group` that `channel` lacks, matched by
    /// exchange token, in one write.
    pub async fn subscribe(&self, group: &str, channel: &str) -> Result<SubscriptionSummary> {
        let target = self.channels.collection(channel).await?;
        let wanted = self.groups.instruments(group).await?;
        let total_instruments = wanted.len();

        let (new_instruments_counter, existing_instrument_counter) = target
            .update(|current| merge_instruments(current, wanted))
            .await
            .map_err(MarketWatchError::persistence)?;

        info!(
            group,
            channel,
            new = new_instruments_counter,
            existing = existing_instrument_counter,
            "Subscribed group to channel"
        );

        Ok(SubscriptionSummary {
            new_instruments_counter,
            existing_instrument_counter,
            total_instruments,
        })
    }

    /// Empty `channel` and drop its instruments from the cache
    pub async fn flush(&self, channel: &str) -> Result<String> {
        let removed = self.channels.clear(channel).await?;
        let evicted = self
            .cache
            .write()
            .await
            .remove(removed.iter().map(|inst| inst.instrument_token));

        info!(channel, instruments = removed.len(), evicted, "Flushed channel");
        Ok(format!("{channel} flushed"))
    }

    /// Instruments subscribed on `channel`
    pub async fn count(&self, channel: &str) -> Result<usize> {
        self.channels.count(channel).await
    }
}

/// Append `wanted` to `current` by exchange token, returning `(new, existing)`.
///
/// `existing` counts only tokens the channel held before the merge; a token
/// repeated inside `wanted` is appended once and not counted again.
fn merge_instruments(current: &mut Vec<Instrument>, wanted: Vec<Instrument>) -> (usize, usize) {
    let held: FxHashSet<u32> = current.iter().map(|inst| inst.exchange_token).collect();
    let mut added: FxHashSet<u32> = FxHashSet::default();
    let mut existing = 0;

    for instrument in wanted {
        if held.contains(&instrument.exchange_token) {
            existing += 1;
        } else if added.insert(instrument.exchange_token) {
            current.push(instrument);
        } else {
            debug!(
                exchange_token = instrument.exchange_token,
                "Duplicate instrument in group"
            );
        }
    }
    (added.len(), existing)
}
