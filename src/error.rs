use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed parse error: {0}")]
    FeedParse(#[from] feed_rs::parser::ParseFeedError),

    #[error("Invalid collection: {0}")]
    InvalidCollection(String),

    #[error("Invalid payload for {collection}: {reason}")]
    InvalidPayload { collection: String, reason: String },

    #[error("Secret vault error: {0}")]
    Vault(String),

    #[error("Migration {version} failed: {reason}")]
    Migration { version: String, reason: String },

    #[error("Mirror error: {0}")]
    Mirror(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
