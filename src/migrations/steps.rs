use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{json, Map, Value};

use crate::error::{AppError, Result};
use crate::store::{CollectionKey, DocumentStore};

use super::{Migration, SchemaVersion};

/// Every step shipped with the application, oldest first.
pub fn builtin_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: SchemaVersion::new(1, 1, 0),
            description: "normalize feed status/category and boolean read states",
            apply: normalize_feeds_and_read_states,
        },
        Migration {
            version: SchemaVersion::new(1, 2, 0),
            description: "fold legacy settings toggles into featureFlags",
            apply: fold_legacy_feature_toggles,
        },
        Migration {
            version: SchemaVersion::new(1, 3, 0),
            description: "stamp feedId into every article set",
            apply: stamp_article_set_feed_ids,
        },
    ]
}

/// Rewrites a collection only if it already exists on disk.
async fn rewrite_if_present<F>(store: &DocumentStore, key: &CollectionKey, f: F) -> Result<()>
where
    F: FnOnce(Value) -> Result<Value>,
{
    if !tokio::fs::try_exists(store.path_of(key)).await? {
        return Ok(());
    }
    store.update(key, f).await.map(|_| ())
}

fn shape_error(key: &CollectionKey, expected: &str) -> AppError {
    AppError::InvalidPayload {
        collection: key.filename(),
        reason: format!("expected {expected}"),
    }
}

fn normalize_feeds_and_read_states(store: &DocumentStore) -> BoxFuture<'_, Result<()>> {
    async move {
        rewrite_if_present(store, &CollectionKey::Feeds, |value| {
            let Value::Array(mut feeds) = value else {
                return Err(shape_error(&CollectionKey::Feeds, "an array of feeds"));
            };
            for feed in feeds.iter_mut().filter_map(Value::as_object_mut) {
                let status_ok = matches!(
                    feed.get("status").and_then(Value::as_str),
                    Some("healthy") | Some("error")
                );
                if !status_ok {
                    feed.insert("status".to_string(), json!("healthy"));
                }
                feed.entry("category").or_insert(Value::Null);
            }
            Ok(Value::Array(feeds))
        })
        .await?;

        rewrite_if_present(store, &CollectionKey::ReadStates, |value| {
            let Value::Object(mut states) = value else {
                return Err(shape_error(&CollectionKey::ReadStates, "a map of read states"));
            };
            for state in states.values_mut() {
                if let Value::Bool(read) = *state {
                    *state = json!({ "read": read, "readAt": null });
                }
            }
            Ok(Value::Object(states))
        })
        .await
    }
    .boxed()
}

const LEGACY_TOGGLES: &[(&str, &str)] = &[
    ("aiSummaryEnabled", "aiArticleSummary"),
    ("dataMirrorEnabled", "dataMirror"),
];

fn fold_legacy_feature_toggles(store: &DocumentStore) -> BoxFuture<'_, Result<()>> {
    async move {
        rewrite_if_present(store, &CollectionKey::Settings, |value| {
            let Value::Object(mut settings) = value else {
                return Err(shape_error(&CollectionKey::Settings, "a settings object"));
            };

            let mut flags = match settings.remove("featureFlags") {
                Some(Value::Object(flags)) => flags,
                _ => Map::new(),
            };
            for (legacy, flag) in LEGACY_TOGGLES {
                if let Some(old) = settings.remove(*legacy) {
                    // An explicit flag wins over the legacy toggle.
                    if !flags.contains_key(*flag) {
                        flags.insert(flag.to_string(), json!(old.as_bool().unwrap_or(false)));
                    }
                }
            }
            settings.insert("featureFlags".to_string(), Value::Object(flags));
            Ok(Value::Object(settings))
        })
        .await
    }
    .boxed()
}

fn stamp_article_set_feed_ids(store: &DocumentStore) -> BoxFuture<'_, Result<()>> {
    async move {
        for feed_id in store.list_article_feed_ids().await? {
            let key = CollectionKey::articles(feed_id);
            // The store stamps feedId on write; this only fixes the shape.
            store
                .update(&key, |value| {
                    let set = match value {
                        Value::Object(mut map) => {
                            if !map.get("articles").is_some_and(Value::is_array) {
                                map.insert("articles".to_string(), json!([]));
                            }
                            map.entry("lastFetched").or_insert(Value::Null);
                            Value::Object(map)
                        }
                        Value::Array(articles) => {
                            json!({ "lastFetched": null, "articles": articles })
                        }
                        _ => json!({ "lastFetched": null, "articles": [] }),
                    };
                    Ok(set)
                })
                .await?;
        }
        Ok(())
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::MigrationRunner;
    use tempfile::tempdir;

    async fn seeded_store(dir: &std::path::Path) -> DocumentStore {
        std::fs::write(
            dir.join("feeds.json"),
            r#"[{"id":"f1","title":"One","url":"http://one"},{"id":"f2","title":"Two","url":"http://two","status":"error","category":"tech"}]"#,
        )
        .unwrap();
        std::fs::write(dir.join("read-states.json"), r#"{"a1":true,"a2":{"read":true,"readAt":null}}"#).unwrap();
        std::fs::write(
            dir.join("settings.json"),
            r#"{"dataMirrorEnabled":true,"aiSummaryEnabled":true,"featureFlags":{"aiArticleSummary":false},"theme":"dark"}"#,
        )
        .unwrap();
        std::fs::write(dir.join("articles-f1.json"), r#"[{"id":"a1","title":"Hi"}]"#).unwrap();
        std::fs::write(dir.join("articles-f2.json"), r#"{"feedId":"wrong","articles":[]}"#).unwrap();
        DocumentStore::open(dir).await.unwrap()
    }

    #[tokio::test]
    async fn test_builtin_steps_migrate_legacy_data() {
        let dir = tempdir().unwrap();
        let store = seeded_store(dir.path()).await;

        let report = MigrationRunner::new(store.clone()).run("1.3.0").await;
        assert!(report.succeeded(), "{report:?}");
        assert_eq!(report.applied, vec!["1.1.0", "1.2.0", "1.3.0"]);

        let feeds = store.read(&CollectionKey::Feeds).await.unwrap();
        assert_eq!(feeds[0]["status"], "healthy");
        assert!(feeds[0]["category"].is_null());
        assert_eq!(feeds[1]["status"], "error");
        assert_eq!(feeds[1]["category"], "tech");

        let states = store.read(&CollectionKey::ReadStates).await.unwrap();
        assert_eq!(states["a1"], json!({"read": true, "readAt": null}));

        let settings = store.read(&CollectionKey::Settings).await.unwrap();
        assert_eq!(settings["featureFlags"]["dataMirror"], true);
        assert_eq!(settings["featureFlags"]["aiArticleSummary"], false);
        assert!(settings.get("dataMirrorEnabled").is_none());
        assert_eq!(settings["theme"], "dark");

        let f1 = store.read_articles("f1").await.unwrap();
        assert_eq!(f1.feed_id, "f1");
        assert_eq!(f1.articles[0].id, "a1");
        assert_eq!(store.read_articles("f2").await.unwrap().feed_id, "f2");
    }

    #[tokio::test]
    async fn test_steps_are_idempotent() {
        let dir = tempdir().unwrap();
        let store = seeded_store(dir.path()).await;
        for migration in builtin_migrations() {
            (migration.apply)(&store).await.unwrap();
        }
        let snapshot = |name: &str| std::fs::read(dir.path().join(name)).unwrap();
        let before: Vec<_> = ["feeds.json", "read-states.json", "settings.json", "articles-f1.json"]
            .iter()
            .map(|n| snapshot(n))
            .collect();

        for migration in builtin_migrations() {
            (migration.apply)(&store).await.unwrap();
        }

        let after: Vec<_> = ["feeds.json", "read-states.json", "settings.json", "articles-f1.json"]
            .iter()
            .map(|n| snapshot(n))
            .collect();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_absent_collections_are_not_created() {
        let dir = tempdir().unwrap();
        let store = DocumentStore::open(dir.path()).await.unwrap();

        let report = MigrationRunner::new(store).run("1.3.0").await;

        assert!(report.succeeded());
        assert!(!dir.path().join("feeds.json").exists());
        assert!(!dir.path().join("settings.json").exists());
    }

    #[tokio::test]
    async fn test_malformed_feeds_fail_the_step() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("feeds.json"), r#"{"oops":true}"#).unwrap();
        let store = DocumentStore::open(dir.path()).await.unwrap();

        let report = MigrationRunner::new(store).run("1.3.0").await;

        assert_eq!(report.failed.unwrap().version, "1.1.0");
        assert!(report.applied.is_empty());
    }
}
