//! Durable storage for market watch
//!
//! - `collection`: named JSON document collections with a name-keyed registry
//! - `snapshot`: whole-value bincode snapshots replaced atomically

#![warn(clippy::all)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod collection;
pub mod snapshot;

pub use collection::{Collection, CollectionRegistry};
pub use snapshot::SnapshotFile;

use anyhow::{Context, Result};
use std::path::Path;

/// Write `bytes` to `path` through a sibling temp file and a rename, so a
/// reader never observes a half-written file.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    tokio::fs::write(&tmp, bytes)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to move {} into place", path.display()))?;
    Ok(())
}
