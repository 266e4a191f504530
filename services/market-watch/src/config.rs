//! Market watch service configuration

use anyhow::{Context, Result, bail};
use common::constants::ingest::{
    DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_DELAY_SECS, DEFAULT_SNAPSHOT_INTERVAL_MS,
    DEFAULT_TICKER_WS_URL,
};
use feeds::KiteTickerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable carrying the Kite API key
pub const ENV_API_KEY: &str = "KITE_API_KEY";
/// Environment variable carrying the Kite access token
pub const ENV_ACCESS_TOKEN: &str = "KITE_ACCESS_TOKEN";

const COLLECTIONS_DIR: &str = "collections";
const SNAPSHOT_DIR: &str = "snapshot";
const SNAPSHOT_FILE: &str = "tick_cache.bin";

/// Service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Root directory for collections and the snapshot
    pub data_dir: PathBuf,

    /// Snapshot timer period in milliseconds
    pub snapshot_interval_ms: u64,

    /// Reconnect policy
    pub reconnect: ReconnectConfig,

    /// Upstream ticker
    pub ticker: TickerConfig,

    /// Ticker channel slots
    pub channels: Vec<String>,

    /// Channel the service connects to at startup
    pub default_channel: String,
}

/// Bounded fixed-delay reconnect settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Attempts before giving up
    pub max_attempts: u32,

    /// Delay before each attempt in seconds
    pub delay_secs: u64,
}

/// Upstream ticker settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickerConfig {
    /// WebSocket endpoint
    pub ws_url: String,

    /// Kite Connect API key
    pub api_key: String,

    /// Session access token
    pub access_token: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/market-watch"),
            snapshot_interval_ms: DEFAULT_SNAPSHOT_INTERVAL_MS,
            reconnect: ReconnectConfig::default(),
            ticker: TickerConfig::default(),
            channels: (1..=4).map(|n| format!("ticker{n}")).collect(),
            default_channel: "ticker1".to_string(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            delay_secs: DEFAULT_RECONNECT_DELAY_SECS,
        }
    }
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_TICKER_WS_URL.to_string(),
            api_key: String::new(),
            access_token: String::new(),
        }
    }
}

impl ReconnectConfig {
    /// Delay before each attempt
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

impl ServiceConfig {
    /// Load from an optional JSON file, then overlay the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("Failed to parse config {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Overlay credentials from an environment lookup
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(api_key) = lookup(ENV_API_KEY).filter(|v| !v.is_empty()) {
            self.ticker.api_key = api_key;
        }
        if let Some(token) = lookup(ENV_ACCESS_TOKEN).filter(|v| !v.is_empty()) {
            self.ticker.access_token = token;
        }
    }

    /// Reject configurations the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.snapshot_interval_ms == 0 {
            bail!("snapshot_interval_ms must be positive");
        }
        if self.channels.is_empty() {
            bail!("at least one ticker channel is required");
        }
        if !self.channels.contains(&self.default_channel) {
            bail!(
                "default channel {} is not one of {:?}",
                self.default_channel,
                self.channels
            );
        }
        Ok(())
    }

    /// Snapshot timer period
    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_millis(self.snapshot_interval_ms)
    }

    /// Directory holding the document collections
    pub fn collections_dir(&self) -> PathBuf {
        self.data_dir.join(COLLECTIONS_DIR)
    }

    /// Location of the tick cache snapshot
    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(SNAPSHOT_DIR).join(SNAPSHOT_FILE)
    }

    /// Connection settings for the Kite ticker
    pub fn kite_ticker(&self) -> KiteTickerConfig {
        KiteTickerConfig {
            ws_url: self.ticker.ws_url.clone(),
            api_key: self.ticker.api_key.clone(),
            access_token: self.ticker.access_token.clone(),
        }
    }
}
