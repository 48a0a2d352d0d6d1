//! Tracing Initialization
//!
//! Installs a `tracing-subscriber` fmt layer filtered by `RUST_LOG`. The
//! library only emits events; hosts that already installed a subscriber can
//! skip this module entirely, and calling [`init`] twice is harmless.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: filter directives (default: `feed_client=info`)
//! - `FEED_LOG_ANSI`: set to "false" to disable colored output (default: true)
//! - `FEED_LOG_TARGETS`: set to "false" to hide event targets (default: true)
//!
//! # Usage
//!
//! ```ignore
//! use feed_client::infrastructure::telemetry;
//!
//! telemetry::init()?;
//! tracing::info!("Feed client starting");
//! ```

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

/// Filter used when `RUST_LOG` is unset or invalid.
const DEFAULT_DIRECTIVE: &str = "feed_client=info";

/// Telemetry errors.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// A global subscriber is already installed.
    #[error("failed to install tracing subscriber: {0}")]
    Init(#[from] TryInitError),
}

/// Telemetry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Emit ANSI colors.
    pub ansi: bool,
    /// Include event targets in output.
    pub with_target: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            ansi: true,
            with_target: true,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |key: &str| lookup(key).is_none_or(|v| v.to_lowercase() != "false");

        Self {
            ansi: flag("FEED_LOG_ANSI"),
            with_target: flag("FEED_LOG_TARGETS"),
        }
    }
}

/// Initialize tracing with configuration from environment.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init() -> Result<(), TelemetryError> {
    init_with_config(&TelemetryConfig::from_env())
}

/// Initialize tracing with custom configuration.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_with_config(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_ansi(config.ansi)
        .with_target(config.with_target)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = TelemetryConfig::default();
        assert!(config.ansi);
        assert!(config.with_target);
    }

    #[test]
    fn flags_disabled_by_false() {
        let config = TelemetryConfig::from_lookup(|key| match key {
            "FEED_LOG_ANSI" => Some("FALSE".to_string()),
            "FEED_LOG_TARGETS" => Some("yes".to_string()),
            _ => None,
        });

        assert!(!config.ansi);
        assert!(config.with_target);
    }

    #[test]
    fn second_init_reports_error() {
        let config = TelemetryConfig::default();
        let first = init_with_config(&config);
        let second = init_with_config(&config);

        // Another test may have installed the global subscriber first
        assert!(first.is_ok() || second.is_err());
        assert!(second.is_err());
    }
}
