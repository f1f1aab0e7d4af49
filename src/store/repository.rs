use chrono::Utc;

use crate::error::Result;
use crate::models::{
    AiSummaries, AiSummary, ArticleSet, CalendarEventSet, Category, FeatureFlags, Feed, ReadState,
    ReadStates, Settings,
};

use super::{CollectionKey, DocumentStore};

impl DocumentStore {
    // Feed operations

    pub async fn read_feeds(&self) -> Result<Vec<Feed>> {
        self.read_as(&CollectionKey::Feeds).await
    }

    pub async fn write_feeds(&self, feeds: &[Feed]) -> Result<()> {
        self.write_as(&CollectionKey::Feeds, &feeds).await
    }

    pub async fn read_categories(&self) -> Result<Vec<Category>> {
        self.read_as(&CollectionKey::Categories).await
    }

    pub async fn write_categories(&self, categories: &[Category]) -> Result<()> {
        self.write_as(&CollectionKey::Categories, &categories).await
    }

    // Article operations

    pub async fn read_articles(&self, feed_id: &str) -> Result<ArticleSet> {
        CollectionKey::validate_feed_id(feed_id)?;
        self.read_as(&CollectionKey::articles(feed_id)).await
    }

    /// Stores `set` under `feed_id`; the stored `feedId` is always `feed_id`.
    pub async fn write_articles(&self, feed_id: &str, set: &ArticleSet) -> Result<()> {
        CollectionKey::validate_feed_id(feed_id)?;
        self.write_as(&CollectionKey::articles(feed_id), set).await
    }

    // Read state operations

    pub async fn read_read_states(&self) -> Result<ReadStates> {
        self.read_as(&CollectionKey::ReadStates).await
    }

    pub async fn write_read_states(&self, states: &ReadStates) -> Result<()> {
        self.write_as(&CollectionKey::ReadStates, states).await
    }

    /// Marks a single article, leaving every other entry untouched.
    pub async fn set_read_state(&self, article_id: &str, read: bool) -> Result<()> {
        let article_id = article_id.to_string();
        self.update_as(&CollectionKey::ReadStates, move |states: &mut ReadStates| {
            let read_at = read.then(Utc::now);
            states.insert(article_id, ReadState { read, read_at });
            Ok(())
        })
        .await
    }

    // Settings operations

    pub async fn read_settings(&self) -> Result<Settings> {
        self.read_as(&CollectionKey::Settings).await
    }

    pub async fn write_settings(&self, settings: &Settings) -> Result<()> {
        self.write_as(&CollectionKey::Settings, settings).await
    }

    pub async fn update_settings<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Settings) -> Result<R>,
    {
        self.update_as::<Settings, R, F>(&CollectionKey::Settings, f)
            .await
    }

    pub async fn feature_flags(&self) -> Result<FeatureFlags> {
        Ok(self.read_settings().await?.feature_flags())
    }

    pub async fn set_feature_flag(&self, flag: &str, enabled: bool) -> Result<()> {
        self.update_settings(|settings| {
            settings.set_feature_flag(flag, enabled);
            Ok(())
        })
        .await
    }

    // Summary operations

    pub async fn read_ai_summaries(&self) -> Result<AiSummaries> {
        self.read_as(&CollectionKey::AiSummaries).await
    }

    pub async fn read_ai_summary(&self, article_id: &str) -> Result<Option<AiSummary>> {
        Ok(self.read_ai_summaries().await?.remove(article_id))
    }

    pub async fn write_ai_summary(&self, article_id: &str, summary: AiSummary) -> Result<()> {
        let article_id = article_id.to_string();
        self.update_as(&CollectionKey::AiSummaries, move |all: &mut AiSummaries| {
            all.insert(article_id, summary);
            Ok(())
        })
        .await
    }

    // Calendar operations

    pub async fn read_calendar_events(&self) -> Result<CalendarEventSet> {
        self.read_as(&CollectionKey::CalendarEvents).await
    }

    pub async fn write_calendar_events(&self, set: &CalendarEventSet) -> Result<()> {
        self.write_as(&CollectionKey::CalendarEvents, set).await
    }

    /// Returns whether an event with that id existed.
    pub async fn delete_calendar_event(&self, event_id: &str) -> Result<bool> {
        self.update_as(&CollectionKey::CalendarEvents, |set: &mut CalendarEventSet| {
            let before = set.events.len();
            set.events.retain(|e| e.id != event_id);
            Ok(set.events.len() != before)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Article, CalendarEvent};
    use serde_json::Map;
    use tempfile::tempdir;

    fn event(id: &str) -> CalendarEvent {
        CalendarEvent {
            id: id.to_string(),
            title: format!("Event {id}"),
            start_date: Some("2025-01-10".to_string()),
            end_date: None,
            location: None,
            confidence: Some(0.8),
            event_type: Some("conference".to_string()),
            source_article_id: None,
            extra: Map::new(),
        }
    }

    #[tokio::test]
    async fn test_write_articles_stamps_feed_id() {
        let dir = tempdir().unwrap();
        let store = DocumentStore::open(dir.path()).await.unwrap();
        let mut set = ArticleSet::empty("someone-else");
        set.articles.push(Article {
            id: "a1".to_string(),
            title: "Hello".to_string(),
            link: String::new(),
            description: String::new(),
            content: String::new(),
            pub_date: None,
            author: String::new(),
            categories: vec![],
            extra: Map::new(),
        });

        store.write_articles("f1", &set).await.unwrap();

        let stored = store.read_articles("f1").await.unwrap();
        assert_eq!(stored.feed_id, "f1");
        assert_eq!(stored.articles.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_feed_id_is_rejected() {
        let dir = tempdir().unwrap();
        let store = DocumentStore::open(dir.path()).await.unwrap();
        assert!(store.read_articles("../../etc").await.is_err());
        assert!(store
            .write_articles("a/b", &ArticleSet::empty("a/b"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_set_read_state_stamps_read_at() {
        let dir = tempdir().unwrap();
        let store = DocumentStore::open(dir.path()).await.unwrap();

        store.set_read_state("a1", true).await.unwrap();
        store.set_read_state("a2", false).await.unwrap();

        let states = store.read_read_states().await.unwrap();
        assert!(states["a1"].read && states["a1"].read_at.is_some());
        assert!(!states["a2"].read && states["a2"].read_at.is_none());
    }

    #[tokio::test]
    async fn test_delete_calendar_event_rewrites_set() {
        let dir = tempdir().unwrap();
        let store = DocumentStore::open(dir.path()).await.unwrap();
        store
            .write_calendar_events(&CalendarEventSet {
                events: vec![event("e1"), event("e2")],
                last_extraction: None,
            })
            .await
            .unwrap();

        assert!(store.delete_calendar_event("e1").await.unwrap());
        assert!(!store.delete_calendar_event("missing").await.unwrap());

        let set = store.read_calendar_events().await.unwrap();
        assert_eq!(set.events.len(), 1);
        assert_eq!(set.events[0].id, "e2");
    }

    #[tokio::test]
    async fn test_ai_summary_per_article() {
        let dir = tempdir().unwrap();
        let store = DocumentStore::open(dir.path()).await.unwrap();
        assert_eq!(store.read_ai_summary("a1").await.unwrap(), None);

        let summary = AiSummary {
            summary: "Short version".to_string(),
            footnotes: vec![],
            generated_at: Some(Utc::now()),
        };
        store.write_ai_summary("a1", summary.clone()).await.unwrap();

        assert_eq!(store.read_ai_summary("a1").await.unwrap(), Some(summary));
        assert_eq!(store.read_ai_summary("a2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_feature_flags_default_then_set() {
        let dir = tempdir().unwrap();
        let store = DocumentStore::open(dir.path()).await.unwrap();
        assert_eq!(store.feature_flags().await.unwrap().get("dataMirror"), Some(&false));

        store.set_feature_flag("dataMirror", true).await.unwrap();

        assert_eq!(store.feature_flags().await.unwrap().get("dataMirror"), Some(&true));
    }
}
