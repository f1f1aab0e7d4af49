use std::time::Duration;

use chrono::Utc;
use feed_rs::model::Entry;
use feed_rs::parser;
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde_json::Map;
use url::Url;

use crate::error::Result;
use crate::models::Article;

use super::{FeedSource, FetchedFeed};

// Wide enough that html2text never wraps a snippet.
const SNIPPET_WIDTH: usize = 10_000;

pub struct HttpFeedSource {
    client: Client,
}

impl HttpFeedSource {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("rss-util/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }

    pub async fn fetch_feed(&self, url: &str) -> Result<FetchedFeed> {
        let parsed = Url::parse(url).map_err(|e| anyhow::anyhow!("Invalid feed URL {}: {}", url, e))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(anyhow::anyhow!("Unsupported feed URL scheme: {}", parsed.scheme()).into());
        }

        let response = self.client.get(parsed).send().await?;
        if !response.status().is_success() {
            return Err(anyhow::anyhow!("Failed to fetch feed: HTTP {}", response.status()).into());
        }

        let bytes = response.bytes().await?;
        parse_feed(&bytes)
    }
}

impl FeedSource for HttpFeedSource {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<FetchedFeed>> {
        self.fetch_feed(url).boxed()
    }
}

/// Parses RSS/Atom/JSON Feed bytes into our article model.
pub fn parse_feed(bytes: &[u8]) -> Result<FetchedFeed> {
    let feed = parser::parse(bytes)?;

    let articles = feed
        .entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| entry_to_article(index, entry))
        .collect();

    Ok(FetchedFeed {
        title: feed.title.map(|t| t.content).unwrap_or_default(),
        description: feed.description.map(|d| d.content).unwrap_or_default(),
        link: feed
            .links
            .first()
            .map(|l| l.href.clone())
            .unwrap_or_default(),
        articles,
    })
}

fn entry_to_article(index: usize, entry: Entry) -> Article {
    let link = entry
        .links
        .first()
        .map(|l| l.href.clone())
        .unwrap_or_default();

    let id = if !entry.id.trim().is_empty() {
        entry.id.clone()
    } else if !link.is_empty() {
        link.clone()
    } else {
        format!("article-{}-{}", Utc::now().timestamp_millis(), index)
    };

    let summary_html = entry.summary.as_ref().map(|s| s.content.as_str());
    // Try content first, then fall back to summary
    let content = entry
        .content
        .as_ref()
        .and_then(|c| c.body.clone())
        .or_else(|| summary_html.map(str::to_string))
        .unwrap_or_default();

    let description = summary_html
        .and_then(|html| html2text::from_read(html.as_bytes(), SNIPPET_WIDTH).ok())
        .map(|text| text.trim().to_string())
        .unwrap_or_default();

    Article {
        id,
        title: entry
            .title
            .map(|t| t.content)
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "Untitled".to_string()),
        link,
        description,
        content,
        pub_date: entry.published.or(entry.updated),
        author: entry
            .authors
            .first()
            .map(|a| a.name.clone())
            .unwrap_or_default(),
        categories: entry
            .categories
            .into_iter()
            .map(|c| c.label.unwrap_or(c.term))
            .collect(),
        extra: Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Demo Feed</title>
    <link>https://example.com/</link>
    <description>Just a demo</description>
    <item>
      <title>First post</title>
      <link>https://example.com/first</link>
      <guid>first-guid</guid>
      <description>&lt;p&gt;Hello &lt;b&gt;world&lt;/b&gt;&lt;/p&gt;</description>
      <pubDate>Tue, 05 Mar 2024 10:00:00 GMT</pubDate>
      <category>news</category>
    </item>
    <item>
      <description>No title here</description>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_parse_rss_maps_articles() {
        let feed = parse_feed(RSS.as_bytes()).unwrap();

        assert_eq!(feed.title, "Demo Feed");
        assert_eq!(feed.description, "Just a demo");
        assert_eq!(feed.articles.len(), 2);

        let first = &feed.articles[0];
        assert_eq!(first.id, "first-guid");
        assert_eq!(first.title, "First post");
        assert_eq!(first.link, "https://example.com/first");
        assert!(first.description.contains("Hello"));
        assert!(!first.description.contains("<p>"));
        assert!(first.content.contains("<b>world</b>"));
        assert!(first.pub_date.is_some());
        assert_eq!(first.categories, vec!["news"]);
    }

    #[test]
    fn test_missing_title_defaults_to_untitled() {
        let feed = parse_feed(RSS.as_bytes()).unwrap();
        let second = &feed.articles[1];
        assert_eq!(second.title, "Untitled");
        assert!(!second.id.is_empty());
    }

    #[test]
    fn test_garbage_is_a_parse_error() {
        assert!(matches!(
            parse_feed(b"definitely not a feed"),
            Err(crate::error::AppError::FeedParse(_))
        ));
    }

    #[tokio::test]
    async fn test_non_http_urls_are_rejected() {
        let source = HttpFeedSource::new().unwrap();
        assert!(source.fetch("file:///etc/passwd").await.is_err());
        assert!(source.fetch("not a url").await.is_err());
    }
}
