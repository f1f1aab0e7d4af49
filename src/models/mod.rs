mod article;
mod calendar;
mod feed;
mod settings;
mod summary;

pub use article::{Article, ArticleSet, ReadState, ReadStates};
pub use calendar::{CalendarEvent, CalendarEventSet};
pub use feed::{Category, Feed, FeedStatus};
pub use settings::{
    FeatureFlags, MirrorMode, Settings, FLAG_AI_SUMMARY, FLAG_CALENDAR_EVENTS, FLAG_DATA_MIRROR,
    KNOWN_FEATURE_FLAGS,
};
pub use summary::{AiSummaries, AiSummary};
