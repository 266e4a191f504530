//! Error taxonomy surfaced to collaborators

use thiserror::Error;

/// Market watch error types
#[derive(Debug, Error)]
pub enum MarketWatchError {
    /// Upstream feed unreachable or subscribe rejected
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Unknown instrument, group or channel
    #[error("{kind} not found: {name}")]
    NotFound {
        /// What was looked up ("instrument", "group", "channel")
        kind: &'static str,
        /// The key that missed
        name: String,
    },

    /// Snapshot or collection read/write failure
    #[error("Persistence failed: {0}")]
    Persistence(String),

    /// Tick without a usable instrument identifier
    #[error("Malformed tick: {0}")]
    MalformedTick(String),
}

impl MarketWatchError {
    /// Build a `NotFound` error
    pub fn not_found(kind: &'static str, name: impl ToString) -> Self {
        Self::NotFound {
            kind,
            name: name.to_string(),
        }
    }

    /// Wrap an internal storage error, keeping its context chain
    pub fn persistence(err: anyhow::Error) -> Self {
        Self::Persistence(format!("{err:#}"))
    }

    /// Wrap a transport error, keeping its context chain
    pub fn connection(err: anyhow::Error) -> Self {
        Self::Connection(format!("{err:#}"))
    }
}

/// Result alias for market watch operations
pub type Result<T> = std::result::Result<T, MarketWatchError>;
