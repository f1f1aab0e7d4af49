use tempfile::tempdir;
use tokio_test::assert_ok;

use rss_util::commands;
use rss_util::migrations::MigrationRunner;
use rss_util::store::DocumentStore;
use rss_util::{App, Config};

#[tokio::test]
async fn secret_roundtrip_through_commands() {
    let dir = tempdir().unwrap();
    let app = App::new(&Config::with_data_dir(dir.path())).await.unwrap();

    assert_eq!(commands::get_api_key(&app).await.data, Some(None));
    assert!(commands::set_api_key(&app, "sk-test-123").await.success);
    assert_eq!(
        commands::get_api_key(&app).await.data,
        Some(Some("sk-test-123".to_string()))
    );

    assert!(commands::set_api_key(&app, "").await.success);
    assert_eq!(commands::get_api_key(&app).await.data, Some(None));
    app.shutdown().await;
}

#[tokio::test]
async fn tampered_secret_reads_as_unset() {
    let dir = tempdir().unwrap();
    let app = App::new(&Config::with_data_dir(dir.path())).await.unwrap();
    assert!(commands::set_api_key(&app, "sk-test-123").await.success);

    std::fs::write(dir.path().join("installation.salt"), "AAAAAAAAAAAAAAAAAAAAAA==").unwrap();
    app.shutdown().await;
    let app = App::new(&Config::with_data_dir(dir.path())).await.unwrap();

    let response = commands::get_api_key(&app).await;
    assert!(response.success);
    assert_eq!(response.data, Some(None));
    app.shutdown().await;
}

#[tokio::test]
async fn corrupt_salt_does_not_block_startup() {
    let dir = tempdir().unwrap();
    let app = App::new(&Config::with_data_dir(dir.path())).await.unwrap();
    assert!(commands::set_api_key(&app, "sk-test-123").await.success);
    app.shutdown().await;

    std::fs::write(dir.path().join("installation.salt"), "not base64 !!!").unwrap();
    let app = assert_ok!(App::new(&Config::with_data_dir(dir.path())).await);

    assert_eq!(commands::get_api_key(&app).await.data, Some(None));
    assert!(commands::set_api_key(&app, "sk-new").await.success);
    assert_eq!(
        commands::get_api_key(&app).await.data,
        Some(Some("sk-new".to_string()))
    );
    app.shutdown().await;
}

#[tokio::test]
async fn unreadable_salt_falls_back_for_the_session() {
    let dir = tempdir().unwrap();
    std::fs::create_dir(dir.path().join("installation.salt")).unwrap();

    let app = assert_ok!(App::new(&Config::with_data_dir(dir.path())).await);

    assert_eq!(commands::get_api_key(&app).await.data, Some(None));
    assert!(commands::set_api_key(&app, "sk-test-123").await.success);
    assert_eq!(
        commands::get_api_key(&app).await.data,
        Some(Some("sk-test-123".to_string()))
    );
    app.shutdown().await;
}

#[tokio::test]
async fn second_migration_run_changes_nothing() {
    let dir = tempdir().unwrap();
    std::fs::write(
        dir.path().join("feeds.json"),
        r#"[{"id":"f1","title":"Old","url":"http://x"}]"#,
    )
    .unwrap();
    std::fs::write(dir.path().join("read-states.json"), r#"{"a1":true}"#).unwrap();
    let store = DocumentStore::open(dir.path()).await.unwrap();

    let first = MigrationRunner::new(store.clone()).run("1.3.0").await;
    assert!(first.succeeded());
    assert_eq!(first.applied.len(), 3);

    let snapshot = || {
        let mut files: Vec<(String, Vec<u8>)> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| {
                let e = e.unwrap();
                (
                    e.file_name().into_string().unwrap(),
                    std::fs::read(e.path()).unwrap(),
                )
            })
            .collect();
        files.sort();
        files
    };
    let before = snapshot();

    let second = MigrationRunner::new(store).run("1.3.0").await;

    assert!(second.succeeded());
    assert!(second.applied.is_empty());
    assert_eq!(second.from.as_deref(), Some("1.3.0"));
    assert_eq!(snapshot(), before);
}

#[tokio::test]
async fn startup_survives_a_failing_migration() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("feeds.json"), r#"{"not":"a list"}"#).unwrap();

    let app = assert_ok!(App::new(&Config::with_data_dir(dir.path())).await);

    let report = app.migration_report();
    assert!(!report.succeeded());
    assert_eq!(report.failed.as_ref().unwrap().version, "1.1.0");
    assert!(!commands::read_feeds(&app).await.success);
    assert!(commands::read_settings(&app).await.success);
    app.shutdown().await;
}
