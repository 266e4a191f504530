//! Instrument groups and ticker channels
//!
//! Both are backed by named instrument collections from one shared
//! [`CollectionRegistry`]: a group `g` keeps its members in `g_instruments`,
//! a channel `c` keeps its subscription list in `c_ticker`. Group documents
//! themselves (name plus consumer applications) live in `marketwatches`.

use common::{Instrument, MarketWatchError, Result};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use storage::{Collection, CollectionRegistry};
use tracing::{debug, info};

const GROUPS_COLLECTION: &str = "marketwatches";

/// Consumer application attached to a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppEntry {
    /// Application name
    pub app_name: String,
    /// Whether the application currently uses the group
    pub active: bool,
}

/// Named instrument group ("marketwatch")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentGroup {
    /// Group name
    pub name: String,
    /// Consumer applications, each at most once
    pub apps: Vec<AppEntry>,
}

impl InstrumentGroup {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            apps: Vec::new(),
        }
    }

    /// Insert or update `app_name` with `active`
    fn upsert_app(&mut self, app_name: &str, active: bool) {
        match self.apps.iter_mut().find(|app| app.app_name == app_name) {
            Some(app) => app.active = active,
            None => self.apps.push(AppEntry {
                app_name: app_name.to_string(),
                active,
            }),
        }
    }
}

/// Collection name of a group's instrument list
pub fn group_collection(group: &str) -> String {
    format!("{group}_instruments")
}

/// Collection name of a channel's instrument list
pub fn channel_collection(channel: &str) -> String {
    format!("{channel}_ticker")
}

/// Durable store of instrument groups
#[derive(Debug)]
pub struct GroupRegistry {
    groups: Collection<InstrumentGroup>,
    instruments: Arc<CollectionRegistry<Instrument>>,
}

impl GroupRegistry {
    /// Open the group store under `dir`
    pub async fn open(dir: &Path, instruments: Arc<CollectionRegistry<Instrument>>) -> Result<Self> {
        let groups = Collection::open(dir, GROUPS_COLLECTION)
            .await
            .map_err(MarketWatchError::persistence)?;
        let count = groups.count().await;
        debug!(groups = count, "Opened group registry");
        Ok(Self {
            groups,
            instruments,
        })
    }

    /// Create `name` unless it already exists
    pub async fn create_group(&self, name: &str) -> Result<InstrumentGroup> {
        self.upsert(name, |_| {}).await
    }

    /// Every group in creation order
    pub async fn list_groups(&self) -> Vec<InstrumentGroup> {
        self.groups.find_all().await
    }

    /// Group `name`
    pub async fn group(&self, name: &str) -> Result<InstrumentGroup> {
        self.groups
            .find_all()
            .await
            .into_iter()
            .find(|group| group.name == name)
            .ok_or_else(|| MarketWatchError::not_found("group", name))
    }

    /// Mark `app` active on `group`, creating the group on first use
    pub async fn activate(&self, group: &str, app: &str) -> Result<InstrumentGroup> {
        let updated = self.upsert(group, |g| g.upsert_app(app, true)).await?;
        info!(group, app, "Activated group");
        Ok(updated)
    }

    /// Mark `app` inactive on `group`
    pub async fn deactivate(&self, group: &str, app: &str) -> Result<InstrumentGroup> {
        self.group(group).await?;
        let updated = self.upsert(group, |g| g.upsert_app(app, false)).await?;
        info!(group, app, "Deactivated group");
        Ok(updated)
    }

    /// Add instruments not yet in the group, returning how many were added
    pub async fn add_instruments(&self, group: &str, instruments: Vec<Instrument>) -> Result<usize> {
        self.create_group(group).await?;
        let members = self.members(group).await?;

        let added = members
            .update(|current| {
                let mut seen: FxHashSet<u32> =
                    current.iter().map(|inst| inst.exchange_token).collect();
                let before = current.len();
                current.extend(
                    instruments
                        .into_iter()
                        .filter(|inst| seen.insert(inst.exchange_token)),
                );
                current.len() - before
            })
            .await
            .map_err(MarketWatchError::persistence)?;

        info!(group, added, "Added instruments to group");
        Ok(added)
    }

    /// Remove the member with `instrument_token`, returning whether it existed
    pub async fn remove_instrument(&self, group: &str, instrument_token: u32) -> Result<bool> {
        self.group(group).await?;
        let members = self.members(group).await?;

        members
            .update(|current| {
                let before = current.len();
                current.retain(|inst| inst.instrument_token != instrument_token);
                current.len() != before
            })
            .await
            .map_err(MarketWatchError::persistence)
    }

    /// Members of `group`
    pub async fn instruments(&self, group: &str) -> Result<Vec<Instrument>> {
        self.group(group).await?;
        Ok(self.members(group).await?.find_all().await)
    }

    async fn members(&self, group: &str) -> Result<Arc<Collection<Instrument>>> {
        self.instruments
            .collection(&group_collection(group))
            .await
            .map_err(MarketWatchError::persistence)
    }

    async fn upsert<F>(&self, name: &str, f: F) -> Result<InstrumentGroup>
    where
        F: FnOnce(&mut InstrumentGroup),
    {
        self.groups
            .update(|groups| {
                let index = match groups.iter().position(|g| g.name == name) {
                    Some(index) => index,
                    None => {
                        groups.push(InstrumentGroup::new(name));
                        groups.len() - 1
                    }
                };
                f(&mut groups[index]);
                groups[index].clone()
            })
            .await
            .map_err(MarketWatchError::persistence)
    }
}

/// Durable store of the configured ticker channel slots
#[derive(Debug)]
pub struct ChannelStore {
    channels: Vec<String>,
    instruments: Arc<CollectionRegistry<Instrument>>,
}

impl ChannelStore {
    /// Store for the given channel slots
    pub fn new(channels: Vec<String>, instruments: Arc<CollectionRegistry<Instrument>>) -> Self {
        Self {
            channels,
            instruments,
        }
    }

    /// Configured channel names
    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    /// `NotFound` unless `channel` is a configured slot
    pub fn ensure_slot(&self, channel: &str) -> Result<()> {
        if self.channels.iter().any(|c| c == channel) {
            Ok(())
        } else {
            Err(MarketWatchError::not_found("channel", channel))
        }
    }

    /// Backing collection of `channel`
    pub async fn collection(&self, channel: &str) -> Result<Arc<Collection<Instrument>>> {
        self.ensure_slot(channel)?;
        self.instruments
            .collection(&channel_collection(channel))
            .await
            .map_err(MarketWatchError::persistence)
    }

    /// Instruments subscribed on `channel`
    pub async fn instruments(&self, channel: &str) -> Result<Vec<Instrument>> {
        Ok(self.collection(channel).await?.find_all().await)
    }

    /// Instrument tokens to stream for `channel`
    pub async fn tokens(&self, channel: &str) -> Result<Vec<u32>> {
        Ok(self
            .instruments(channel)
            .await?
            .iter()
            .map(|inst| inst.instrument_token)
            .collect())
    }

    /// Number of instruments on `channel`
    pub async fn count(&self, channel: &str) -> Result<usize> {
        Ok(self.collection(channel).await?.count().await)
    }

    /// Empty `channel`, returning what it held
    pub async fn clear(&self, channel: &str) -> Result<Vec<Instrument>> {
        self.collection(channel)
            .await?
            .update(std::mem::take)
            .await
            .map_err(MarketWatchError::persistence)
    }
}
