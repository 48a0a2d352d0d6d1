//! Configuration Module
//!
//! Configuration loading for the feed client.

mod settings;

pub use settings::{AuthToken, ConfigError, DEFAULT_TIME_SERIES_TIMEOUT, FeedConfig};
