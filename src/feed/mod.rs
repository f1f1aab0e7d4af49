//! Feed fetching: the [`FeedSource`] boundary, its HTTP implementation and
//! the refresh pass that stores fetched articles and records feed status.

mod fetcher;
mod refresh;

use futures::future::BoxFuture;

use crate::error::Result;
use crate::models::Article;

pub use fetcher::HttpFeedSource;
pub use refresh::{refresh_all, refresh_feed, RefreshSummary};

/// A parsed feed as returned by a [`FeedSource`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FetchedFeed {
    pub title: String,
    pub description: String,
    pub link: String,
    pub articles: Vec<Article>,
}

/// Anything that can turn a feed URL into articles.
pub trait FeedSource: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<FetchedFeed>>;
}
