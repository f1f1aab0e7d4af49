//! Request/response surface over [`App`].
//!
//! Every operation returns a [`CommandResponse`]: `success` plus either `data`
//! or an `error` message. Nothing here panics or returns `Err` across the
//! boundary.

use serde::Serialize;
use serde_json::Value;

use crate::app::{App, APP_VERSION};
use crate::error::Result;
use crate::feed::FetchedFeed;
use crate::models::{
    AiSummary, Article, ArticleSet, CalendarEventSet, Category, FeatureFlags, Feed, MirrorMode,
    ReadStates, Settings, KNOWN_FEATURE_FLAGS,
};
use crate::mirror::SyncOutcome;
use crate::store::CollectionKey;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> CommandResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: impl ToString) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
        }
    }
}

impl<T> From<Result<T>> for CommandResponse<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => {
                tracing::debug!("Command failed: {}", e);
                Self::err(e)
            }
        }
    }
}

/// Feed metadata plus articles, as returned by [`fetch_feed`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPreview {
    pub feed_title: String,
    pub feed_description: String,
    pub feed_link: String,
    pub articles: Vec<Article>,
}

impl From<FetchedFeed> for FeedPreview {
    fn from(feed: FetchedFeed) -> Self {
        Self {
            feed_title: feed.title,
            feed_description: feed.description,
            feed_link: feed.link,
            articles: feed.articles,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub written: usize,
    pub failed: usize,
    pub removed: usize,
}

impl From<SyncOutcome> for SyncResult {
    fn from(outcome: SyncOutcome) -> Self {
        match outcome {
            SyncOutcome::Skipped(reason) => Self {
                skipped: true,
                reason: Some(reason.to_string()),
                written: 0,
                failed: 0,
                removed: 0,
            },
            SyncOutcome::Completed(report) => Self {
                skipped: false,
                reason: None,
                written: report.written,
                failed: report.failed,
                removed: report.removed,
            },
        }
    }
}

// Generic collection operations

/// Reads any collection by filename, e.g. `feeds.json` or `articles-f1.json`.
pub async fn read_json(app: &App, filename: &str) -> CommandResponse<Value> {
    let result = async {
        let key = CollectionKey::from_filename(filename)?;
        app.store().read(&key).await
    }
    .await;
    result.into()
}

pub async fn write_json(app: &App, filename: &str, data: Value) -> CommandResponse<()> {
    let result = async {
        let key = CollectionKey::from_filename(filename)?;
        app.store().write(&key, data).await
    }
    .await;
    result.into()
}

// Feed operations

pub async fn read_feeds(app: &App) -> CommandResponse<Vec<Feed>> {
    app.store().read_feeds().await.into()
}

pub async fn write_feeds(app: &App, feeds: Vec<Feed>) -> CommandResponse<()> {
    app.store().write_feeds(&feeds).await.into()
}

pub async fn read_categories(app: &App) -> CommandResponse<Vec<Category>> {
    app.store().read_categories().await.into()
}

pub async fn write_categories(app: &App, categories: Vec<Category>) -> CommandResponse<()> {
    app.store().write_categories(&categories).await.into()
}

/// Fetches and parses a feed without storing anything.
pub async fn fetch_feed(app: &App, url: &str) -> CommandResponse<FeedPreview> {
    app.feed_source()
        .fetch(url)
        .await
        .map(FeedPreview::from)
        .into()
}

// Article operations

pub async fn read_articles(app: &App, feed_id: &str) -> CommandResponse<ArticleSet> {
    app.store().read_articles(feed_id).await.into()
}

pub async fn write_articles(app: &App, feed_id: &str, set: ArticleSet) -> CommandResponse<()> {
    app.store().write_articles(feed_id, &set).await.into()
}

// Read state operations

pub async fn read_read_states(app: &App) -> CommandResponse<ReadStates> {
    app.store().read_read_states().await.into()
}

pub async fn write_read_states(app: &App, states: ReadStates) -> CommandResponse<()> {
    app.store().write_read_states(&states).await.into()
}

pub async fn set_read_state(app: &App, article_id: &str, read: bool) -> CommandResponse<()> {
    app.store().set_read_state(article_id, read).await.into()
}

// Settings operations

pub async fn read_settings(app: &App) -> CommandResponse<Settings> {
    app.store().read_settings().await.into()
}

pub async fn write_settings(app: &App, settings: Settings) -> CommandResponse<()> {
    app.store().write_settings(&settings).await.into()
}

pub async fn get_feature_flags(app: &App) -> CommandResponse<FeatureFlags> {
    app.store().feature_flags().await.into()
}

pub async fn set_feature_flag(app: &App, flag: &str, enabled: bool) -> CommandResponse<()> {
    if flag.trim().is_empty() {
        return CommandResponse::err("flag name must not be empty");
    }
    if !KNOWN_FEATURE_FLAGS.contains(&flag) {
        tracing::debug!("Setting unknown feature flag {}", flag);
    }
    app.store().set_feature_flag(flag, enabled).await.into()
}

// Secret operations

/// The decrypted API key, `null` when unset or undecryptable.
pub async fn get_api_key(app: &App) -> CommandResponse<Option<String>> {
    app.api_key().await.into()
}

/// Stores the API key encrypted; an empty string clears it.
pub async fn set_api_key(app: &App, key: &str) -> CommandResponse<()> {
    app.set_api_key(key).await.into()
}

// AI summary operations

pub async fn read_ai_summary(app: &App, article_id: &str) -> CommandResponse<Option<AiSummary>> {
    app.store().read_ai_summary(article_id).await.into()
}

pub async fn write_ai_summary(
    app: &App,
    article_id: &str,
    summary: AiSummary,
) -> CommandResponse<()> {
    app.store()
        .write_ai_summary(article_id, summary)
        .await
        .into()
}

// Calendar operations

pub async fn read_calendar_events(app: &App) -> CommandResponse<CalendarEventSet> {
    app.store().read_calendar_events().await.into()
}

pub async fn write_calendar_events(app: &App, set: CalendarEventSet) -> CommandResponse<()> {
    app.store().write_calendar_events(&set).await.into()
}

pub async fn delete_calendar_event(app: &App, event_id: &str) -> CommandResponse<bool> {
    app.store().delete_calendar_event(event_id).await.into()
}

// Mirror operations

pub async fn get_mirror_directory(app: &App) -> CommandResponse<Option<String>> {
    app.store()
        .read_settings()
        .await
        .map(|s| s.mirror_directory())
        .into()
}

/// Sets the mirror directory; `None` or a blank path clears it.
pub async fn set_mirror_directory(app: &App, dir: Option<&str>) -> CommandResponse<()> {
    app.store()
        .update_settings(|settings| {
            settings.set_mirror_directory(dir);
            Ok(())
        })
        .await
        .into()
}

pub async fn get_mirror_mode(app: &App) -> CommandResponse<MirrorMode> {
    app.store()
        .read_settings()
        .await
        .map(|s| s.mirror_mode())
        .into()
}

pub async fn set_mirror_mode(app: &App, mode: MirrorMode) -> CommandResponse<()> {
    app.store()
        .update_settings(|settings| {
            settings.set_mirror_mode(mode);
            Ok(())
        })
        .await
        .into()
}

/// Runs a pass now. A pass skipped because mirroring is off still succeeds.
pub async fn sync_to_mirror(app: &App) -> CommandResponse<SyncResult> {
    app.sync_to_mirror().await.map(SyncResult::from).into()
}

// App info

pub fn get_app_version() -> CommandResponse<String> {
    CommandResponse::ok(APP_VERSION.to_string())
}
