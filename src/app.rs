use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::feed::{refresh_all, FeedSource, HttpFeedSource, RefreshSummary};
use crate::migrations::{MigrationReport, MigrationRunner};
use crate::mirror::{spawn_worker, MirrorEngine, SyncHandle, SyncOutcome};
use crate::store::DocumentStore;
use crate::vault::{fresh_install_salt, load_or_create_install_salt, SecretVault};

/// Version the data directory is migrated to at startup.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct App {
    config: Config,
    store: DocumentStore,
    vault: SecretVault,
    mirror: MirrorEngine,
    feed_source: Arc<dyn FeedSource>,
    migration: MigrationReport,

    // Background mirror worker
    sync_handle: SyncHandle,
    mirror_worker: JoinHandle<()>,
}

impl App {
    /// Startup sequence: data dir, installation salt, migrations, vault,
    /// mirror worker. Migration failures are logged and startup continues.
    pub async fn new(config: &Config) -> Result<Self> {
        let feed_source: Arc<dyn FeedSource> = Arc::new(HttpFeedSource::new()?);
        Self::with_feed_source(config, feed_source).await
    }

    pub async fn with_feed_source(config: &Config, feed_source: Arc<dyn FeedSource>) -> Result<Self> {
        config.validate()?;
        let data_dir = config.data_path();
        let store = DocumentStore::open(&data_dir).await?;

        let migration = MigrationRunner::new(store.clone()).run(APP_VERSION).await;
        if let Some(failure) = &migration.failed {
            tracing::warn!(
                "Continuing with partially migrated data (step {} failed: {})",
                failure.version,
                failure.reason
            );
        }

        let vault = open_vault(data_dir).await?;

        let mirror = MirrorEngine::new(store.clone(), config.prune_mirror_orphans);
        let (sync_handle, mirror_worker) = spawn_worker(mirror.clone());
        store.set_write_hook(Arc::new(sync_handle.clone()));

        Ok(Self {
            config: config.clone(),
            store,
            vault,
            mirror,
            feed_source,
            migration,
            sync_handle,
            mirror_worker,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub fn vault(&self) -> &SecretVault {
        &self.vault
    }

    pub fn feed_source(&self) -> &dyn FeedSource {
        self.feed_source.as_ref()
    }

    pub fn migration_report(&self) -> &MigrationReport {
        &self.migration
    }

    // Secret operations

    /// The decrypted API key. `None` when unset or no longer decryptable.
    pub async fn api_key(&self) -> Result<Option<String>> {
        let settings = self.store.read_settings().await?;
        Ok(settings
            .encrypted_api_key()
            .and_then(|sealed| self.vault.decrypt(sealed)))
    }

    /// Seals and stores `key`; an empty key clears it.
    pub async fn set_api_key(&self, key: &str) -> Result<()> {
        let sealed = if key.is_empty() {
            None
        } else {
            Some(
                self.vault
                    .encrypt(key)
                    .ok_or_else(|| AppError::Vault("failed to encrypt API key".to_string()))?,
            )
        };
        self.store
            .update_settings(|settings| {
                settings.set_encrypted_api_key(sealed);
                Ok(())
            })
            .await
    }

    // Mirror operations

    /// Runs a pass now and waits for it.
    pub async fn sync_to_mirror(&self) -> Result<SyncOutcome> {
        self.mirror.sync().await
    }

    // Feed operations

    pub async fn refresh_feeds(&self) -> Result<RefreshSummary> {
        refresh_all(
            &self.store,
            self.feed_source.as_ref(),
            self.config.fetch_concurrency,
        )
        .await
    }

    /// Detaches the mirror worker and waits for any pending pass to finish.
    pub async fn shutdown(self) {
        self.store.clear_write_hook();
        drop(self.sync_handle);
        if let Err(e) = self.mirror_worker.await {
            tracing::error!("Mirror worker panicked: {}", e);
        }
    }
}

/// Derives the vault key on the blocking pool. Without a usable salt file the
/// vault runs on a throwaway salt and stored secrets read as unset.
async fn open_vault(data_dir: PathBuf) -> Result<SecretVault> {
    let salt = match load_or_create_install_salt(&data_dir).await {
        Ok(salt) => salt,
        Err(e) => {
            tracing::warn!("Installation salt unavailable, secrets will not persist: {}", e);
            fresh_install_salt()
        }
    };
    tokio::task::spawn_blocking(move || SecretVault::new(&data_dir, &salt))
        .await
        .map_err(|e| AppError::Other(anyhow::anyhow!("key derivation task failed: {}", e)))?
        .map_err(|e| AppError::Vault(e.to_string()))
}
