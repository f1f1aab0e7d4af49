//! Schema migrations for the data directory.
//!
//! The data root carries a `schema-version.json` marker holding the version
//! of the application that last migrated it. At startup every registered step
//! newer than the marker and not newer than the running version is applied in
//! ascending order, then the marker is advanced.
//!
//! A failing step stops the run; the marker is left at the last version that
//! was fully reached so the failed step is retried on the next start. The
//! runner never returns an error: the caller gets a [`MigrationReport`] and
//! carries on with whatever shape the data is in.

mod steps;
mod version;

use std::io::ErrorKind;
use std::path::PathBuf;

use futures::future::BoxFuture;

use crate::error::{AppError, Result};
use crate::store::{DocumentStore, SCHEMA_MARKER_FILE};

pub use steps::builtin_migrations;
pub use version::SchemaVersion;

pub type MigrationFn = for<'a> fn(&'a DocumentStore) -> BoxFuture<'a, Result<()>>;

/// One schema step. `apply` must tolerate being re-run on already migrated data.
#[derive(Clone)]
pub struct Migration {
    pub version: SchemaVersion,
    pub description: &'static str,
    pub apply: MigrationFn,
}

impl std::fmt::Debug for Migration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration")
            .field("version", &self.version)
            .field("description", &self.description)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFailure {
    pub version: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MigrationReport {
    /// Marker found before the run, `None` for a fresh or unmarked directory.
    pub from: Option<String>,
    /// Marker after the run.
    pub to: String,
    pub applied: Vec<String>,
    pub failed: Option<MigrationFailure>,
}

impl MigrationReport {
    pub fn succeeded(&self) -> bool {
        self.failed.is_none()
    }
}

pub struct MigrationRunner {
    store: DocumentStore,
    migrations: Vec<Migration>,
}

impl MigrationRunner {
    pub fn new(store: DocumentStore) -> Self {
        Self::with_migrations(store, builtin_migrations())
    }

    pub fn with_migrations(store: DocumentStore, mut migrations: Vec<Migration>) -> Self {
        migrations.sort_by_key(|m| m.version);
        Self { store, migrations }
    }

    fn marker_path(&self) -> PathBuf {
        self.store.root().join(SCHEMA_MARKER_FILE)
    }

    /// The stored marker, `None` if absent or unreadable.
    pub async fn stored_version(&self) -> Option<SchemaVersion> {
        let path = self.marker_path();
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("Failed to read schema marker {}: {}", path.display(), e);
                return None;
            }
        };
        let parsed = serde_json::from_str::<String>(&content)
            .map_err(AppError::from)
            .and_then(|raw| raw.parse::<SchemaVersion>());
        match parsed {
            Ok(version) => Some(version),
            Err(e) => {
                tracing::warn!("Ignoring malformed schema marker {}: {}", path.display(), e);
                None
            }
        }
    }

    async fn write_marker(&self, version: SchemaVersion) -> Result<()> {
        let path = self.marker_path();
        let tmp_path = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec(&version.to_string())?;
        tokio::fs::write(&tmp_path, bytes).await?;
        tokio::fs::rename(&tmp_path, &path).await?;
        Ok(())
    }

    /// Brings the data directory up to `target` (normally the running
    /// application version).
    pub async fn run(&self, target: &str) -> MigrationReport {
        let stored = self.stored_version().await;
        let mut report = MigrationReport {
            from: stored.map(|v| v.to_string()),
            to: stored.map(|v| v.to_string()).unwrap_or_default(),
            ..Default::default()
        };

        let target = match target.parse::<SchemaVersion>() {
            Ok(target) => target,
            Err(e) => {
                tracing::error!("Cannot migrate to {:?}: {}", target, e);
                report.failed = Some(MigrationFailure {
                    version: target.to_string(),
                    reason: e.to_string(),
                });
                return report;
            }
        };

        let start = stored.unwrap_or_default();
        if stored.is_some() && start >= target {
            tracing::debug!("Schema at {}, nothing to migrate (target {})", start, target);
            return report;
        }

        let mut reached = start;
        for migration in self
            .migrations
            .iter()
            .filter(|m| m.version > start && m.version <= target)
        {
            tracing::info!(
                "Applying migration {}: {}",
                migration.version,
                migration.description
            );
            match (migration.apply)(&self.store).await {
                Ok(()) => {
                    reached = migration.version;
                    report.applied.push(migration.version.to_string());
                }
                Err(e) => {
                    let error = AppError::Migration {
                        version: migration.version.to_string(),
                        reason: e.to_string(),
                    };
                    tracing::error!("{}", error);
                    report.failed = Some(MigrationFailure {
                        version: migration.version.to_string(),
                        reason: e.to_string(),
                    });
                    break;
                }
            }
        }

        if report.failed.is_none() {
            reached = target;
        }
        if stored.is_none() || reached > start {
            match self.write_marker(reached).await {
                Ok(()) => report.to = reached.to_string(),
                Err(e) => {
                    tracing::error!("Failed to write schema marker: {}", e);
                    report.failed.get_or_insert(MigrationFailure {
                        version: reached.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if report.succeeded() {
            tracing::info!(
                "Schema migrated from {} to {} ({} step(s))",
                report.from.as_deref().unwrap_or("none"),
                report.to,
                report.applied.len()
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::CollectionKey;
    use futures::FutureExt;
    use serde_json::json;
    use tempfile::tempdir;

    fn add_marker_note(store: &DocumentStore) -> BoxFuture<'_, Result<()>> {
        async move {
            store
                .update(&CollectionKey::Custom("notes".into()), |v| {
                    let mut list = v.as_array().cloned().unwrap_or_default();
                    list.push(json!("ran"));
                    Ok(json!(list))
                })
                .await
                .map(|_| ())
        }
        .boxed()
    }

    fn always_fails(_store: &DocumentStore) -> BoxFuture<'_, Result<()>> {
        async move { Err(AppError::Mirror("boom".to_string())) }.boxed()
    }

    fn step(version: &str, apply: MigrationFn) -> Migration {
        Migration {
            version: version.parse().unwrap(),
            description: "test step",
            apply,
        }
    }

    #[tokio::test]
    async fn test_fresh_directory_runs_everything_up_to_target() {
        let dir = tempdir().unwrap();
        let store = DocumentStore::open(dir.path()).await.unwrap();
        let runner = MigrationRunner::with_migrations(
            store.clone(),
            vec![
                step("1.2.0", add_marker_note),
                step("1.1.0", add_marker_note),
                step("9.0.0", add_marker_note),
            ],
        );

        let report = runner.run("1.3.0").await;

        assert!(report.succeeded());
        assert_eq!(report.from, None);
        assert_eq!(report.applied, vec!["1.1.0", "1.2.0"]);
        assert_eq!(report.to, "1.3.0");
        assert_eq!(
            runner.stored_version().await,
            Some(SchemaVersion::new(1, 3, 0))
        );
    }

    #[tokio::test]
    async fn test_current_marker_is_a_no_op() {
        let dir = tempdir().unwrap();
        let store = DocumentStore::open(dir.path()).await.unwrap();
        let runner =
            MigrationRunner::with_migrations(store, vec![step("1.1.0", add_marker_note)]);

        runner.run("1.1.0").await;
        let before = std::fs::read(dir.path().join("notes.json")).unwrap();
        let report = runner.run("1.1.0").await;

        assert!(report.succeeded());
        assert!(report.applied.is_empty());
        assert_eq!(std::fs::read(dir.path().join("notes.json")).unwrap(), before);
    }

    #[tokio::test]
    async fn test_newer_marker_is_never_downgraded() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(SCHEMA_MARKER_FILE), "\"2.0.0\"").unwrap();
        let store = DocumentStore::open(dir.path()).await.unwrap();
        let runner = MigrationRunner::with_migrations(store, vec![]);

        let report = runner.run("1.0.0").await;

        assert_eq!(report.to, "2.0.0");
        assert_eq!(
            runner.stored_version().await,
            Some(SchemaVersion::new(2, 0, 0))
        );
    }

    #[tokio::test]
    async fn test_failure_stops_and_keeps_last_reached_version() {
        let dir = tempdir().unwrap();
        let store = DocumentStore::open(dir.path()).await.unwrap();
        let runner = MigrationRunner::with_migrations(
            store,
            vec![
                step("1.1.0", add_marker_note),
                step("1.2.0", always_fails),
                step("1.3.0", add_marker_note),
            ],
        );

        let report = runner.run("1.3.0").await;

        assert!(!report.succeeded());
        assert_eq!(report.applied, vec!["1.1.0"]);
        assert_eq!(report.failed.as_ref().unwrap().version, "1.2.0");
        assert_eq!(report.to, "1.1.0");
    }

    #[tokio::test]
    async fn test_invalid_target_reports_failure() {
        let dir = tempdir().unwrap();
        let store = DocumentStore::open(dir.path()).await.unwrap();
        let report = MigrationRunner::with_migrations(store, vec![]).run("latest").await;
        assert!(!report.succeeded());
        assert!(!dir.path().join(SCHEMA_MARKER_FILE).exists());
    }
}
