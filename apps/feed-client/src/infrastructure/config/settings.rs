//! Feed Configuration Settings
//!
//! Configuration types for the feed client, loaded from environment variables.
//!
//! | Variable                      | Default | Meaning                              |
//! |-------------------------------|---------|--------------------------------------|
//! | `FEED_URL`                    | unset   | endpoint URL to connect to           |
//! | `FEED_AUTH_TOKEN`             | unset   | session auth token                   |
//! | `FEED_MAX_QUEUE_SIZE`         | `200`   | queued actions that force a flush    |
//! | `FEED_TIME_SERIES_TIMEOUT_MS` | `15000` | default bounded query deadline       |

use std::time::Duration;

use crate::application::services::DEFAULT_MAX_QUEUE_SIZE;

/// Default deadline for bounded time-series queries.
pub const DEFAULT_TIME_SERIES_TIMEOUT: Duration = Duration::from_secs(15);

/// Session authentication token.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    /// Wrap a token.
    #[must_use]
    pub const fn new(token: String) -> Self {
        Self(token)
    }

    /// Get the raw token.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AuthToken([REDACTED])")
    }
}

/// Feed client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    /// Endpoint URL; `Feed::from_config` connects to it when set.
    pub url: Option<String>,
    /// Session auth token.
    pub auth_token: Option<AuthToken>,
    /// Queued actions above which the batch is flushed immediately.
    pub max_queue_size: usize,
    /// Default deadline for `get_time_series`.
    pub time_series_timeout: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: None,
            auth_token: None,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            time_series_timeout: DEFAULT_TIME_SERIES_TIMEOUT,
        }
    }
}

impl FeedConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an empty or unparseable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an empty or unparseable value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let url = parse_env_string(&lookup, "FEED_URL")?;
        let auth_token = parse_env_string(&lookup, "FEED_AUTH_TOKEN")?.map(AuthToken::new);

        let max_queue_size =
            parse_env_usize(&lookup, "FEED_MAX_QUEUE_SIZE", defaults.max_queue_size)?;

        let time_series_timeout = parse_env_duration_millis(
            &lookup,
            "FEED_TIME_SERIES_TIMEOUT_MS",
            defaults.time_series_timeout,
        )?;

        Ok(Self {
            url,
            auth_token,
            max_queue_size,
            time_series_timeout,
        })
    }
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has a value that cannot be parsed.
    #[error("environment variable {key} has invalid value: {value}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
    },
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

fn parse_env_string(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<String>, ConfigError> {
    match lookup(key) {
        Some(value) if value.trim().is_empty() => Err(ConfigError::EmptyValue(key.to_string())),
        other => Ok(other),
    }
}

fn parse_env_usize(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: usize,
) -> Result<usize, ConfigError> {
    lookup(key).map_or(Ok(default), |value| {
        value.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value,
        })
    })
}

fn parse_env_duration_millis(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    lookup(key).map_or(Ok(default), |value| {
        value
            .trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            })
    })
}
