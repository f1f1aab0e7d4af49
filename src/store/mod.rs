//! File-backed document store.
//!
//! Every collection is one pretty-printed JSON file under the data root:
//!
//! ```text
//! data/
//! ├── feeds.json
//! ├── categories.json
//! ├── read-states.json
//! ├── settings.json
//! ├── ai-summaries.json
//! ├── calendar-events.json
//! └── articles-<feedId>.json
//! ```
//!
//! Reads of a collection that was never written yield its default value.
//! Writes to the same collection are serialized through a per-key lock and
//! land atomically (temp file + rename); writes to different collections run
//! in parallel. After each committed write the registered [`WriteHook`] is
//! told about it, without waiting on whatever the hook does.

mod collection;
mod repository;

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{AppError, Result};

pub use collection::{CollectionKey, SCHEMA_MARKER_FILE};

/// Receives a notification after every committed collection write.
pub trait WriteHook: Send + Sync {
    fn collection_written(&self, key: &CollectionKey);
}

#[derive(Clone)]
pub struct DocumentStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    root: PathBuf,
    write_locks: Mutex<HashMap<CollectionKey, Arc<Mutex<()>>>>,
    hook: RwLock<Option<Arc<dyn WriteHook>>>,
}

impl DocumentStore {
    /// Opens (and creates if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self {
            inner: Arc::new(StoreInner {
                root,
                write_locks: Mutex::new(HashMap::new()),
                hook: RwLock::new(None),
            }),
        })
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    pub fn path_of(&self, key: &CollectionKey) -> PathBuf {
        self.inner.root.join(key.filename())
    }

    pub fn set_write_hook(&self, hook: Arc<dyn WriteHook>) {
        *self
            .inner
            .hook
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(hook);
    }

    pub fn clear_write_hook(&self) {
        self.inner
            .hook
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub async fn read(&self, key: &CollectionKey) -> Result<Value> {
        let path = self.path_of(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(key.default_value()),
            Err(e) => {
                tracing::debug!("Failed to read {}: {}", path.display(), e);
                Err(e.into())
            }
        }
    }

    pub async fn read_as<T: DeserializeOwned>(&self, key: &CollectionKey) -> Result<T> {
        let value = self.read(key).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Replaces the collection's contents.
    pub async fn write(&self, key: &CollectionKey, value: Value) -> Result<()> {
        let _guard = self.lock(key).await;
        self.persist(key, value).await?;
        self.notify(key);
        Ok(())
    }

    pub async fn write_as<T: Serialize>(&self, key: &CollectionKey, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.write(key, value).await
    }

    /// Read-modify-write under the collection's lock. Returns the stored value.
    pub async fn update<F>(&self, key: &CollectionKey, f: F) -> Result<Value>
    where
        F: FnOnce(Value) -> Result<Value>,
    {
        let _guard = self.lock(key).await;
        let current = self.read(key).await?;
        let next = f(current)?;
        let stored = self.persist(key, next).await?;
        self.notify(key);
        Ok(stored)
    }

    /// Typed read-modify-write. The closure's return value is passed through.
    pub async fn update_as<T, R, F>(&self, key: &CollectionKey, f: F) -> Result<R>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut T) -> Result<R>,
    {
        let _guard = self.lock(key).await;
        let mut current: T = serde_json::from_value(self.read(key).await?)?;
        let out = f(&mut current)?;
        self.persist(key, serde_json::to_value(&current)?).await?;
        self.notify(key);
        Ok(out)
    }

    /// All collections currently present on disk, sorted by filename.
    pub async fn list_collections(&self) -> Result<Vec<CollectionKey>> {
        let mut keys = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.inner.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Ok(key) = CollectionKey::from_filename(name) {
                keys.push(key);
            }
        }
        keys.sort_by_key(|k| k.filename());
        Ok(keys)
    }

    pub async fn list_article_feed_ids(&self) -> Result<Vec<String>> {
        Ok(self
            .list_collections()
            .await?
            .into_iter()
            .filter_map(|key| key.feed_id().map(str::to_string))
            .collect())
    }

    async fn lock(&self, key: &CollectionKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.inner.write_locks.lock().await;
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        lock.lock_owned().await
    }

    /// Serializes fully before touching disk so a bad value never clobbers
    /// the previous file. Caller must hold the key's lock.
    async fn persist(&self, key: &CollectionKey, value: Value) -> Result<Value> {
        let value = prepare(key, value)?;
        let bytes = serde_json::to_vec_pretty(&value)?;

        let path = self.path_of(key);
        let tmp_path = self.inner.root.join(format!("{}.tmp", key.filename()));
        tokio::fs::write(&tmp_path, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        Ok(value)
    }

    fn notify(&self, key: &CollectionKey) {
        let hook = self
            .inner
            .hook
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(hook) = hook {
            hook.collection_written(key);
        }
    }
}

/// Per-collection shape rules applied to every write.
fn prepare(key: &CollectionKey, value: Value) -> Result<Value> {
    match key {
        CollectionKey::Articles(feed_id) => {
            let Value::Object(mut map) = value else {
                return Err(AppError::InvalidPayload {
                    collection: key.filename(),
                    reason: "article set must be a JSON object".to_string(),
                });
            };
            // The key is authoritative for which feed the set belongs to.
            map.insert("feedId".to_string(), Value::String(feed_id.clone()));
            Ok(Value::Object(map))
        }
        _ => Ok(value),
    }
}
