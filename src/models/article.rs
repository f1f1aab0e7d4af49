use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    /// May contain HTML.
    #[serde(default)]
    pub description: String,
    /// May contain HTML.
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub pub_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// All stored articles of one feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleSet {
    #[serde(default)]
    pub feed_id: String,
    #[serde(default)]
    pub last_fetched: Option<DateTime<Utc>>,
    #[serde(default)]
    pub articles: Vec<Article>,
}

impl ArticleSet {
    pub fn empty(feed_id: impl Into<String>) -> Self {
        Self {
            feed_id: feed_id.into(),
            last_fetched: None,
            articles: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadState {
    pub read: bool,
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
}

/// Article id to read state. A missing entry means unread.
pub type ReadStates = BTreeMap<String, ReadState>;
