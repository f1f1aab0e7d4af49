//! Structured (markdown) rendering of the store.
//!
//! Every document starts with a `---` fenced header of `key: value` lines.
//! Values are JSON literals so they survive any characters in titles; the
//! `type` line is bare.

use std::collections::HashMap;
use std::path::PathBuf;

use serde_json::{json, Value};

use crate::models::{Article, ArticleSet, CalendarEvent, CalendarEventSet, Category, Feed};

use super::html::html_to_text;
use super::naming::{sanitize_filename, UniqueNames};

pub const FEEDS_DIR: &str = "feeds";
pub const CATEGORIES_DIR: &str = "categories";
pub const ARTICLES_DIR: &str = "articles";
pub const CALENDAR_DIR: &str = "calendar";

const NO_DATE_DIR: &str = "no-date";

/// Everything structured mode renders, read from the store once per pass.
#[derive(Debug, Default)]
pub struct StoreSnapshot {
    pub feeds: Vec<Feed>,
    pub categories: Vec<Category>,
    pub article_sets: Vec<ArticleSet>,
    pub calendar: CalendarEventSet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    /// Relative to the mirror root.
    pub path: PathBuf,
    pub contents: String,
}

pub fn render_all(snapshot: &StoreSnapshot) -> Vec<RenderedDocument> {
    let category_names: HashMap<&str, &str> = snapshot
        .categories
        .iter()
        .map(|c| (c.id.as_str(), c.name.as_str()))
        .collect();

    let mut docs = Vec::new();

    let mut names = UniqueNames::default();
    for feed in &snapshot.feeds {
        let category = feed
            .category
            .as_deref()
            .map(|id| category_names.get(id).copied().unwrap_or(id));
        docs.push(RenderedDocument {
            path: doc_path(&[FEEDS_DIR], &names.claim(&sanitize_filename(&feed.title))),
            contents: render_feed(feed, category),
        });
    }

    let mut names = UniqueNames::default();
    for category in &snapshot.categories {
        let feeds: Vec<&Feed> = snapshot
            .feeds
            .iter()
            .filter(|f| f.category.as_deref() == Some(category.id.as_str()))
            .collect();
        docs.push(RenderedDocument {
            path: doc_path(
                &[CATEGORIES_DIR],
                &names.claim(&sanitize_filename(&category.name)),
            ),
            contents: render_category(category, &feeds),
        });
    }

    let feed_titles: HashMap<&str, &str> = snapshot
        .feeds
        .iter()
        .map(|f| (f.id.as_str(), f.title.as_str()))
        .collect();
    let mut folders = UniqueNames::default();
    for set in &snapshot.article_sets {
        // Sets whose feed is gone are still mirrored, under the feed id.
        let feed_title = feed_titles
            .get(set.feed_id.as_str())
            .copied()
            .unwrap_or(set.feed_id.as_str());
        let folder = folders.claim(&sanitize_filename(feed_title));
        let mut names = UniqueNames::default();
        for article in &set.articles {
            docs.push(RenderedDocument {
                path: doc_path(
                    &[ARTICLES_DIR, &folder],
                    &names.claim(&sanitize_filename(&article.title)),
                ),
                contents: render_article(article, &set.feed_id, feed_title),
            });
        }
    }

    let mut names_by_month: HashMap<String, UniqueNames> = HashMap::new();
    for event in &snapshot.calendar.events {
        let month = match event.start_year_month() {
            Some((year, month)) => format!("{year:04}-{month:02}"),
            None => NO_DATE_DIR.to_string(),
        };
        let name = names_by_month
            .entry(month.clone())
            .or_default()
            .claim(&sanitize_filename(&event.title));
        docs.push(RenderedDocument {
            path: doc_path(&[CALENDAR_DIR, &month], &name),
            contents: render_calendar_event(event),
        });
    }

    docs
}

fn doc_path(dirs: &[&str], stem: &str) -> PathBuf {
    let mut path: PathBuf = dirs.iter().collect();
    path.push(format!("{stem}.md"));
    path
}

fn header(kind: &str, fields: &[(&str, Value)]) -> String {
    let mut out = String::from("---\n");
    out.push_str(&format!("type: {kind}\n"));
    for (key, value) in fields {
        if value.is_null() {
            continue;
        }
        out.push_str(&format!("{key}: {value}\n"));
    }
    out.push_str("---\n\n");
    out
}

fn opt(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |v| json!(v))
}

fn non_empty(value: &str) -> Value {
    if value.is_empty() {
        Value::Null
    } else {
        json!(value)
    }
}

pub fn render_feed(feed: &Feed, category: Option<&str>) -> String {
    let mut doc = header(
        "feed",
        &[
            ("id", json!(feed.id)),
            ("title", json!(feed.title)),
            ("url", json!(feed.url)),
            ("category", opt(category)),
            ("status", json!(feed.status.as_str())),
            ("lastUpdated", opt(feed.last_updated.map(|t| t.to_rfc3339()).as_deref())),
        ],
    );
    doc.push_str(&format!("# {}\n\n", feed.title));
    doc.push_str(&format!("Source: <{}>\n", feed.url));
    if let Some(category) = category {
        doc.push_str(&format!("\nCategory: {category}\n"));
    }
    doc
}

pub fn render_category(category: &Category, feeds: &[&Feed]) -> String {
    let mut doc = header(
        "category",
        &[
            ("id", json!(category.id)),
            ("name", json!(category.name)),
            ("icon", opt(category.icon.as_deref())),
        ],
    );
    doc.push_str(&format!("# {}\n", category.name));
    if !feeds.is_empty() {
        doc.push_str("\n## Feeds\n\n");
        for feed in feeds {
            doc.push_str(&format!("- {} <{}>\n", feed.title, feed.url));
        }
    }
    doc
}

pub fn render_article(article: &Article, feed_id: &str, feed_title: &str) -> String {
    let mut doc = header(
        "article",
        &[
            ("id", json!(article.id)),
            ("title", json!(article.title)),
            ("feed", json!(feed_title)),
            ("feedId", json!(feed_id)),
            ("link", non_empty(&article.link)),
            ("author", non_empty(&article.author)),
            ("pubDate", opt(article.pub_date.map(|t| t.to_rfc3339()).as_deref())),
            (
                "categories",
                if article.categories.is_empty() {
                    Value::Null
                } else {
                    json!(article.categories)
                },
            ),
        ],
    );
    doc.push_str(&format!("# {}\n", article.title));

    let description = html_to_text(&article.description);
    let content = html_to_text(&article.content);
    if !description.is_empty() {
        doc.push_str(&format!("\n{description}\n"));
    }
    if !content.is_empty() && content != description {
        doc.push_str(&format!("\n{content}\n"));
    }
    if !article.link.is_empty() {
        doc.push_str(&format!("\n[Original article]({})\n", article.link));
    }
    doc
}

pub fn render_calendar_event(event: &CalendarEvent) -> String {
    let mut doc = header(
        "calendar-event",
        &[
            ("id", json!(event.id)),
            ("title", json!(event.title)),
            ("startDate", opt(event.start_date.as_deref())),
            ("endDate", opt(event.end_date.as_deref())),
            ("location", opt(event.location.as_deref())),
            ("eventType", opt(event.event_type.as_deref())),
            ("confidence", event.confidence.map_or(Value::Null, |c| json!(c))),
            ("sourceArticleId", opt(event.source_article_id.as_deref())),
        ],
    );
    doc.push_str(&format!("# {}\n", event.title));
    match (event.start_date.as_deref(), event.end_date.as_deref()) {
        (Some(start), Some(end)) => doc.push_str(&format!("\nWhen: {start} to {end}\n")),
        (Some(start), None) => doc.push_str(&format!("\nWhen: {start}\n")),
        _ => {}
    }
    if let Some(location) = &event.location {
        doc.push_str(&format!("\nWhere: {location}\n"));
    }
    doc
}
