//! Mirror sync engine.
//!
//! Keeps a secondary copy of the whole store in a user-chosen directory. A
//! pass is always a full re-render; nothing is diffed against the previous
//! pass. Whether a pass runs at all, where it writes and in which mode are read
//! from the settings document at the start of every pass.
//!
//! Two modes:
//! - raw: every collection file copied verbatim, flat, same filenames;
//! - markdown: one document per item, see [`markdown`].
//!
//! Every pass records the paths it wrote in a manifest at the mirror root.
//! Orphan pruning only ever removes paths listed there, so files the user
//! keeps in the mirror directory are left alone.
//!
//! Background passes are driven by [`SyncHandle`], the store's write hook.
//! Triggers are coalesced: while one pass is pending, further triggers are
//! absorbed by it.

mod html;
pub mod markdown;
mod naming;

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::error::{AppError, Result};
use crate::models::{MirrorMode, FLAG_DATA_MIRROR};
use crate::store::{CollectionKey, DocumentStore, WriteHook};

pub use html::html_to_text;
pub use naming::{sanitize_filename, UniqueNames};

use markdown::StoreSnapshot;

/// Lists, relative to the mirror root, every file the last pass owned.
pub const MANIFEST_FILE: &str = ".rss-util-mirror.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The `dataMirror` feature flag is off.
    Disabled,
    /// No mirror directory is configured.
    NoDirectory,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Disabled => write!(f, "data mirror is disabled"),
            SkipReason::NoDirectory => write!(f, "no mirror directory configured"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub root: PathBuf,
    pub mode: MirrorMode,
    pub written: usize,
    pub failed: usize,
    pub removed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Skipped(SkipReason),
    Completed(SyncReport),
}

#[derive(Clone)]
pub struct MirrorEngine {
    store: DocumentStore,
    prune_orphans: bool,
    // One pass at a time, so pruning never races another pass's writes.
    pass_lock: Arc<Mutex<()>>,
}

impl MirrorEngine {
    pub fn new(store: DocumentStore, prune_orphans: bool) -> Self {
        Self {
            store,
            prune_orphans,
            pass_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Runs one full pass. Per-item failures are logged and counted; only a
    /// failure to read the settings/collection list or to prepare the mirror
    /// root fails the pass as a whole.
    pub async fn sync(&self) -> Result<SyncOutcome> {
        let _pass = self.pass_lock.lock().await;

        let settings = self.store.read_settings().await?;
        if !settings.is_enabled(FLAG_DATA_MIRROR) {
            return Ok(SyncOutcome::Skipped(SkipReason::Disabled));
        }
        let Some(dir) = settings.mirror_directory() else {
            return Ok(SyncOutcome::Skipped(SkipReason::NoDirectory));
        };
        let root = self.prepare_root(Path::new(&dir)).await?;

        let mode = settings.mirror_mode();
        let mut report = SyncReport {
            root: root.clone(),
            mode,
            written: 0,
            failed: 0,
            removed: 0,
        };
        let previous = load_manifest(&root).await;
        let mut owned = match mode {
            MirrorMode::Raw => self.sync_raw(&root, &mut report).await?,
            MirrorMode::Markdown => self.sync_markdown(&root, &mut report).await?,
        };

        let stale: Vec<String> = previous
            .into_iter()
            .filter(|rel| !owned.contains(rel))
            .collect();
        if self.prune_orphans && report.failed == 0 {
            for rel in stale {
                match remove_orphan(&root, &rel).await {
                    Ok(true) => report.removed += 1,
                    Ok(false) => {}
                    Err(e) => {
                        tracing::warn!("Failed to remove stale mirror file {}: {}", rel, e);
                        owned.insert(rel);
                    }
                }
            }
        } else {
            // Not pruned this pass; keep them owned so a later pass can.
            for rel in stale {
                if tokio::fs::try_exists(root.join(&rel)).await.unwrap_or(false) {
                    owned.insert(rel);
                }
            }
        }

        if let Err(e) = save_manifest(&root, &owned).await {
            tracing::warn!("Failed to write mirror manifest in {}: {}", root.display(), e);
            report.failed += 1;
        }

        tracing::info!(
            "Mirror sync to {} finished: {} written, {} failed, {} removed",
            root.display(),
            report.written,
            report.failed,
            report.removed
        );
        Ok(SyncOutcome::Completed(report))
    }

    async fn prepare_root(&self, dir: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dir).await.map_err(|e| {
            AppError::Mirror(format!("cannot create {}: {}", dir.display(), e))
        })?;
        let root = tokio::fs::canonicalize(dir).await?;
        let data_root = tokio::fs::canonicalize(self.store.root()).await?;
        if root == data_root {
            return Err(AppError::Mirror(
                "mirror directory must differ from the data directory".to_string(),
            ));
        }
        Ok(root)
    }

    async fn sync_raw(&self, root: &Path, report: &mut SyncReport) -> Result<BTreeSet<String>> {
        let mut written = BTreeSet::new();
        for key in self.store.list_collections().await? {
            let filename = key.filename();
            match copy_file(&self.store.path_of(&key), &root.join(&filename)).await {
                Ok(()) => {
                    report.written += 1;
                    written.insert(filename);
                }
                Err(e) => {
                    tracing::warn!("Failed to mirror {}: {}", key, e);
                    report.failed += 1;
                }
            }
        }
        Ok(written)
    }

    async fn sync_markdown(
        &self,
        root: &Path,
        report: &mut SyncReport,
    ) -> Result<BTreeSet<String>> {
        let snapshot = self.snapshot(report).await?;

        let mut written = BTreeSet::new();
        for doc in markdown::render_all(&snapshot) {
            let dest = root.join(&doc.path);
            match write_document(&dest, &doc.contents).await {
                Ok(()) => {
                    report.written += 1;
                    written.insert(manifest_entry(&doc.path));
                }
                Err(e) => {
                    tracing::warn!("Failed to write mirror document {}: {}", dest.display(), e);
                    report.failed += 1;
                }
            }
        }
        Ok(written)
    }

    /// Reads every rendered collection. An unreadable collection counts as a
    /// failed item and is rendered as empty.
    async fn snapshot(&self, report: &mut SyncReport) -> Result<StoreSnapshot> {
        let mut snapshot = StoreSnapshot::default();

        match self.store.read_feeds().await {
            Ok(feeds) => snapshot.feeds = feeds,
            Err(e) => skip_collection(&CollectionKey::Feeds, e, report),
        }
        match self.store.read_categories().await {
            Ok(categories) => snapshot.categories = categories,
            Err(e) => skip_collection(&CollectionKey::Categories, e, report),
        }
        for feed_id in self.store.list_article_feed_ids().await? {
            match self.store.read_articles(&feed_id).await {
                Ok(set) => snapshot.article_sets.push(set),
                Err(e) => skip_collection(&CollectionKey::articles(feed_id), e, report),
            }
        }
        match self.store.read_calendar_events().await {
            Ok(calendar) => snapshot.calendar = calendar,
            Err(e) => skip_collection(&CollectionKey::CalendarEvents, e, report),
        }
        Ok(snapshot)
    }
}

fn skip_collection(key: &CollectionKey, error: AppError, report: &mut SyncReport) {
    tracing::warn!("Skipping {} in mirror: {}", key, error);
    report.failed += 1;
}

async fn copy_file(src: &Path, dest: &Path) -> Result<()> {
    let bytes = tokio::fs::read(src).await?;
    write_if_changed(dest, &bytes).await
}

async fn write_document(dest: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    write_if_changed(dest, contents.as_bytes()).await
}

/// Leaves unchanged files untouched so file watchers on the mirror stay quiet.
async fn write_if_changed(dest: &Path, bytes: &[u8]) -> Result<()> {
    if let Ok(existing) = tokio::fs::read(dest).await {
        if existing == bytes {
            return Ok(());
        }
    }
    let mut tmp = dest.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp, dest).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

/// Forward-slash form of a path relative to the mirror root.
fn manifest_entry(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Only plain relative paths; anything else in the manifest is ignored.
fn is_safe_entry(rel: &str) -> bool {
    !rel.is_empty()
        && rel != MANIFEST_FILE
        && Path::new(rel)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

/// The previous pass's manifest. Missing or unreadable means nothing is owned.
async fn load_manifest(root: &Path) -> BTreeSet<String> {
    let path = root.join(MANIFEST_FILE);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeSet::new(),
        Err(e) => {
            tracing::warn!("Cannot read mirror manifest {}: {}", path.display(), e);
            return BTreeSet::new();
        }
    };
    match serde_json::from_slice::<Vec<String>>(&bytes) {
        Ok(entries) => entries.into_iter().filter(|e| is_safe_entry(e)).collect(),
        Err(e) => {
            tracing::warn!("Ignoring malformed mirror manifest {}: {}", path.display(), e);
            BTreeSet::new()
        }
    }
}

async fn save_manifest(root: &Path, owned: &BTreeSet<String>) -> Result<()> {
    let json = serde_json::to_vec_pretty(owned)?;
    write_if_changed(&root.join(MANIFEST_FILE), &json).await
}

/// Removes one previously mirrored file, then any parent directories it left
/// empty. `Ok(false)` when the file was already gone.
async fn remove_orphan(root: &Path, rel: &str) -> std::io::Result<bool> {
    let path = root.join(rel);
    match tokio::fs::remove_file(&path).await {
        Ok(()) => tracing::debug!("Removed stale mirror file {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    }

    let mut dir = path.parent();
    while let Some(d) = dir {
        if d == root || tokio::fs::remove_dir(d).await.is_err() {
            break;
        }
        dir = d.parent();
    }
    Ok(true)
}

/// Store write hook that schedules background passes.
#[derive(Clone)]
pub struct SyncHandle {
    tx: mpsc::Sender<()>,
}

impl SyncHandle {
    fn channel() -> (Self, mpsc::Receiver<()>) {
        // Capacity 1: at most one pass pending behind the running one.
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, rx)
    }

    /// Requests a pass without waiting for it.
    pub fn trigger(&self) {
        match self.tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Closed(())) => {
                tracing::debug!("Mirror worker stopped, trigger dropped");
            }
        }
    }
}

impl WriteHook for SyncHandle {
    fn collection_written(&self, _key: &CollectionKey) {
        self.trigger();
    }
}

/// Spawns the background worker. It runs until every [`SyncHandle`] clone is
/// dropped and the pending trigger, if any, has been served.
pub fn spawn_worker(engine: MirrorEngine) -> (SyncHandle, JoinHandle<()>) {
    let (handle, mut rx) = SyncHandle::channel();
    let task = tokio::spawn(async move {
        while rx.recv().await.is_some() {
            match engine.sync().await {
                Ok(SyncOutcome::Skipped(reason)) => {
                    tracing::debug!("Mirror sync skipped: {}", reason);
                }
                Ok(SyncOutcome::Completed(_)) => {}
                Err(e) => tracing::error!("Mirror sync failed: {}", e),
            }
        }
        tracing::debug!("Mirror worker stopped");
    });
    (handle, task)
}
