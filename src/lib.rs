//! Storage core of the rss-util feed reader: a file-backed JSON document
//! store, an optional mirror of that store in a user-chosen directory, an
//! at-rest secret vault and startup schema migrations.

pub mod app;
pub mod commands;
pub mod config;
pub mod error;
pub mod feed;
pub mod migrations;
pub mod mirror;
pub mod models;
pub mod store;
pub mod vault;

pub use app::App;
pub use config::Config;
pub use error::{AppError, Result};
