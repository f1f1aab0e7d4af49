use chrono::Utc;
use futures::stream::{self, StreamExt};

use crate::error::Result;
use crate::models::{ArticleSet, Feed, FeedStatus};
use crate::store::{CollectionKey, DocumentStore};

use super::FeedSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RefreshSummary {
    pub refreshed: usize,
    pub failed: usize,
}

/// Fetches every stored feed, at most `concurrency` at a time.
///
/// A feed that fetches and stores cleanly becomes `healthy` with a fresh
/// `lastUpdated`; anything else marks it `error`. Individual failures are
/// logged, not returned.
pub async fn refresh_all<S>(
    store: &DocumentStore,
    source: &S,
    concurrency: usize,
) -> Result<RefreshSummary>
where
    S: FeedSource + ?Sized,
{
    let feeds = store.read_feeds().await?;

    let outcomes: Vec<bool> = stream::iter(feeds)
        .map(|feed| async move { refresh_feed(store, source, &feed).await })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let refreshed = outcomes.iter().filter(|ok| **ok).count();
    let summary = RefreshSummary {
        refreshed,
        failed: outcomes.len() - refreshed,
    };
    tracing::info!(
        "Refreshed {} feed(s), {} failed",
        summary.refreshed,
        summary.failed
    );
    Ok(summary)
}

/// Refreshes one feed and records the outcome in its status. Returns whether
/// it succeeded.
pub async fn refresh_feed<S>(store: &DocumentStore, source: &S, feed: &Feed) -> bool
where
    S: FeedSource + ?Sized,
{
    let stored = match source.fetch(&feed.url).await {
        Ok(fetched) => {
            tracing::debug!(
                "Fetched {} articles from {}",
                fetched.articles.len(),
                feed.title
            );
            let set = ArticleSet {
                feed_id: feed.id.clone(),
                last_fetched: Some(Utc::now()),
                articles: fetched.articles,
            };
            store.write_articles(&feed.id, &set).await
        }
        Err(e) => Err(e),
    };

    let status = match &stored {
        Ok(()) => FeedStatus::Healthy,
        Err(e) => {
            tracing::warn!("Failed to refresh {}: {}", feed.url, e);
            FeedStatus::Error
        }
    };
    if let Err(e) = record_status(store, &feed.id, status).await {
        tracing::warn!("Failed to record status of feed {}: {}", feed.id, e);
    }
    stored.is_ok()
}

// Re-reads the feed list under its lock so edits made while fetching survive.
async fn record_status(store: &DocumentStore, feed_id: &str, status: FeedStatus) -> Result<()> {
    store
        .update_as(&CollectionKey::Feeds, |feeds: &mut Vec<Feed>| {
            if let Some(feed) = feeds.iter_mut().find(|f| f.id == feed_id) {
                feed.status = status;
                if status == FeedStatus::Healthy {
                    feed.last_updated = Some(Utc::now());
                }
            }
            Ok(())
        })
        .await
}
