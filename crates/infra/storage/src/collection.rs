//! Named document collections
//!
//! A collection is an ordered list of documents persisted as one JSON array
//! file (`{dir}/{name}.json`). Every mutation is applied to a copy, written
//! through, and only then swapped into memory, so a failed write leaves both
//! the file and the in-memory view unchanged.

use anyhow::{Context, Result, bail};
use rustc_hash::FxHashMap;
use serde::{Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

const COLLECTION_EXTENSION: &str = "json";

/// A persisted, typed list of documents
#[derive(Debug)]
pub struct Collection<T> {
    name: String,
    path: PathBuf,
    docs: RwLock<Vec<T>>,
}

impl<T> Collection<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    /// Open the collection `name` under `dir`, loading existing documents
    pub async fn open(dir: &Path, name: &str) -> Result<Self> {
        validate_name(name)?;
        let path = collection_path(dir, name);

        let docs = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Vec<T>>(&bytes)
                .with_context(|| format!("Failed to decode collection {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };

        debug!(collection = name, documents = docs.len(), "Opened collection");

        Ok(Self {
            name: name.to_string(),
            path,
            docs: RwLock::new(docs),
        })
    }

    /// Collection name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All documents in insertion order
    pub async fn find_all(&self) -> Vec<T> {
        self.docs.read().await.clone()
    }

    /// Number of documents
    pub async fn count(&self) -> usize {
        self.docs.read().await.len()
    }

    /// Append documents in one write
    pub async fn insert_many(&self, new_docs: Vec<T>) -> Result<usize> {
        let inserted = new_docs.len();
        if inserted == 0 {
            return Ok(0);
        }
        self.update(|docs| docs.extend(new_docs)).await?;
        Ok(inserted)
    }

    /// Replace the whole collection
    pub async fn replace_all(&self, new_docs: Vec<T>) -> Result<()> {
        self.update(|docs| *docs = new_docs).await
    }

    /// Remove every document, returning how many were removed
    pub async fn delete_all(&self) -> Result<usize> {
        let removed = self.update(|docs| std::mem::take(docs).len()).await?;
        info!(collection = %self.name, removed, "Emptied collection");
        Ok(removed)
    }

    /// Apply `f` to the documents and persist the result
    pub async fn update<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Vec<T>) -> R,
    {
        let mut guard = self.docs.write().await;
        let mut next = guard.clone();
        let out = f(&mut next);

        let bytes = serde_json::to_vec_pretty(&next)
            .with_context(|| format!("Failed to encode collection {}", self.name))?;
        crate::write_atomic(&self.path, &bytes).await?;

        *guard = next;
        Ok(out)
    }
}

/// Lazily opened collections of one document type, keyed by name.
///
/// Each name is opened once and the handle is reused afterwards.
#[derive(Debug)]
pub struct CollectionRegistry<T> {
    dir: PathBuf,
    handles: RwLock<FxHashMap<String, Arc<Collection<T>>>>,
}

impl<T> CollectionRegistry<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    /// Registry rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            handles: RwLock::new(FxHashMap::default()),
        }
    }

    /// Directory holding the collection files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Get the handle for `name`, opening it on first use
    pub async fn collection(&self, name: &str) -> Result<Arc<Collection<T>>> {
        if let Some(handle) = self.handles.read().await.get(name) {
            return Ok(Arc::clone(handle));
        }

        let mut handles = self.handles.write().await;
        // Another task may have opened it while we waited for the write lock
        if let Some(handle) = handles.get(name) {
            return Ok(Arc::clone(handle));
        }

        let handle = Arc::new(Collection::open(&self.dir, name).await?);
        handles.insert(name.to_string(), Arc::clone(&handle));
        Ok(handle)
    }

    /// Whether `name` has been opened or exists on disk
    pub async fn exists(&self, name: &str) -> bool {
        if self.handles.read().await.contains_key(name) {
            return true;
        }
        validate_name(name).is_ok()
            && tokio::fs::try_exists(collection_path(&self.dir, name))
                .await
                .unwrap_or(false)
    }
}

fn collection_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.{COLLECTION_EXTENSION}"))
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("Collection name must not be empty");
    }
    if name.contains(['/', '\\']) || name.starts_with('.') {
        bail!("Invalid collection name: {name}");
    }
    Ok(())
}
