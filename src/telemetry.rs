//! Logging setup
//!
//! Installs a `tracing-subscriber` registry with an `EnvFilter` and a text or
//! JSON fmt layer. `RUST_LOG` takes precedence over the configured filter.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::{LogConfig, LogFormat};
use crate::{Error, Result};

/// Filter used when neither `RUST_LOG` nor the config sets one
pub const DEFAULT_FILTER: &str = "info,clusterflow=debug";

/// Build the event filter for `config`
pub fn build_filter(config: &LogConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directives = config.filter.as_deref().unwrap_or(DEFAULT_FILTER);
    EnvFilter::try_new(directives)
        .map_err(|e| Error::config(format!("invalid log filter '{}': {}", directives, e)))
}

/// Install the global subscriber
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let filter = build_filter(config)?;

    let (text, json) = match config.format {
        LogFormat::Text => (Some(tracing_subscriber::fmt::layer().with_target(true)), None),
        LogFormat::Json => (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(true),
            ),
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .try_init()
        .map_err(|e| Error::config(format!("failed to initialize logging: {}", e)))
}
