use std::fmt;

use serde_json::{json, Value};

use crate::error::{AppError, Result};

const ARTICLES_PREFIX: &str = "articles-";
const JSON_EXT: &str = ".json";

/// Written by the migration runner only; never addressable as a collection.
pub const SCHEMA_MARKER_FILE: &str = "schema-version.json";

/// Address of one collection file under the data root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CollectionKey {
    Feeds,
    Categories,
    ReadStates,
    Settings,
    AiSummaries,
    CalendarEvents,
    /// Article set of one feed, keyed by feed id.
    Articles(String),
    /// Any other `<name>.json` written through the generic channel.
    Custom(String),
}

impl CollectionKey {
    pub fn articles(feed_id: impl Into<String>) -> Self {
        CollectionKey::Articles(feed_id.into())
    }

    pub fn filename(&self) -> String {
        match self {
            CollectionKey::Feeds => "feeds.json".to_string(),
            CollectionKey::Categories => "categories.json".to_string(),
            CollectionKey::ReadStates => "read-states.json".to_string(),
            CollectionKey::Settings => "settings.json".to_string(),
            CollectionKey::AiSummaries => "ai-summaries.json".to_string(),
            CollectionKey::CalendarEvents => "calendar-events.json".to_string(),
            CollectionKey::Articles(feed_id) => format!("{ARTICLES_PREFIX}{feed_id}{JSON_EXT}"),
            CollectionKey::Custom(name) => format!("{name}{JSON_EXT}"),
        }
    }

    /// Parses an on-disk filename such as `feeds.json` or `articles-f1.json`.
    pub fn from_filename(filename: &str) -> Result<Self> {
        let invalid = || AppError::InvalidCollection(filename.to_string());
        if filename == SCHEMA_MARKER_FILE {
            return Err(invalid());
        }

        let stem = filename.strip_suffix(JSON_EXT).ok_or_else(invalid)?;
        if stem.is_empty()
            || stem.contains(['/', '\\', '\0'])
            || stem.contains("..")
            || stem.starts_with('.')
        {
            return Err(invalid());
        }

        let key = match stem {
            "feeds" => CollectionKey::Feeds,
            "categories" => CollectionKey::Categories,
            "read-states" => CollectionKey::ReadStates,
            "settings" => CollectionKey::Settings,
            "ai-summaries" => CollectionKey::AiSummaries,
            "calendar-events" => CollectionKey::CalendarEvents,
            other => match other.strip_prefix(ARTICLES_PREFIX) {
                Some("") => return Err(invalid()),
                Some(feed_id) => CollectionKey::Articles(feed_id.to_string()),
                None => CollectionKey::Custom(other.to_string()),
            },
        };
        Ok(key)
    }

    /// Validates a feed id before it becomes part of a filename.
    pub fn validate_feed_id(feed_id: &str) -> Result<()> {
        Self::from_filename(&format!("{ARTICLES_PREFIX}{feed_id}{JSON_EXT}")).map(|_| ())
    }

    /// The value a read yields when the collection has never been written.
    pub fn default_value(&self) -> Value {
        match self {
            CollectionKey::Feeds | CollectionKey::Categories => json!([]),
            CollectionKey::ReadStates | CollectionKey::Settings | CollectionKey::AiSummaries => {
                json!({})
            }
            CollectionKey::CalendarEvents => json!({ "events": [], "lastExtraction": null }),
            CollectionKey::Articles(feed_id) => {
                json!({ "feedId": feed_id, "lastFetched": null, "articles": [] })
            }
            CollectionKey::Custom(_) => Value::Null,
        }
    }

    pub fn feed_id(&self) -> Option<&str> {
        match self {
            CollectionKey::Articles(feed_id) => Some(feed_id),
            _ => None,
        }
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.filename())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filenames_round_trip_through_parsing() {
        let keys = [
            CollectionKey::Feeds,
            CollectionKey::Categories,
            CollectionKey::ReadStates,
            CollectionKey::Settings,
            CollectionKey::AiSummaries,
            CollectionKey::CalendarEvents,
            CollectionKey::articles("feed-1"),
            CollectionKey::Custom("notes".to_string()),
        ];
        for key in keys {
            assert_eq!(CollectionKey::from_filename(&key.filename()).unwrap(), key);
        }
    }

    #[test]
    fn traversal_and_foreign_names_are_rejected() {
        for name in [
            "../feeds.json",
            "a/b.json",
            "a\\b.json",
            "feeds.txt",
            ".json",
            ".hidden.json",
            "schema-version.json",
            "articles-.json",
        ] {
            assert!(
                CollectionKey::from_filename(name).is_err(),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn article_default_carries_feed_id() {
        let value = CollectionKey::articles("f9").default_value();
        assert_eq!(value["feedId"], "f9");
        assert!(value["lastFetched"].is_null());
        assert_eq!(value["articles"], json!([]));
    }

    #[test]
    fn list_and_map_defaults() {
        assert_eq!(CollectionKey::Feeds.default_value(), json!([]));
        assert_eq!(CollectionKey::Settings.default_value(), json!({}));
        assert_eq!(
            CollectionKey::CalendarEvents.default_value()["events"],
            json!([])
        );
        assert!(CollectionKey::Custom("x".into()).default_value().is_null());
    }
}
