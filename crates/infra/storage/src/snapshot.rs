//! Whole-value snapshot files
//!
//! A snapshot is a single bincode-encoded value replaced atomically on every
//! save. Loading distinguishes "no snapshot yet" (`Ok(None)`) from a file
//! that exists but cannot be decoded (`Err`).

use anyhow::{Context, Result};
use serde::{Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Handle to a snapshot file on disk
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    /// Snapshot stored at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the snapshot
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Encode `value` and replace the snapshot, returning the bytes written
    pub async fn save<T: Serialize>(&self, value: &T) -> Result<usize> {
        let bytes = bincode::serialize(value).context("Failed to encode snapshot")?;
        crate::write_atomic(&self.path, &bytes).await?;
        debug!(path = %self.path.display(), bytes = bytes.len(), "Snapshot saved");
        Ok(bytes.len())
    }

    /// Decode the snapshot if one exists
    pub async fn load<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read snapshot {}", self.path.display()));
            }
        };

        let value = bincode::deserialize(&bytes)
            .with_context(|| format!("Failed to decode snapshot {}", self.path.display()))?;
        Ok(Some(value))
    }

    /// Delete the snapshot, returning whether a file was removed
    pub async fn remove(&self) -> Result<bool> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!(path = %self.path.display(), "Snapshot removed");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to remove snapshot {}", self.path.display()))
            }
        }
    }
}
