//! Logging System
//!
//! Structured logging on the `tracing` crate. Level and format come from
//! configuration, overridable through the `PACKFS_LOG` environment
//! variable.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error, off
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: json, text (default: text)
    #[serde(default = "default_format")]
    pub format: String,

    /// Enable colored output (text format only)
    #[serde(default = "default_true")]
    pub color: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_format(),
            color: default_true(),
        }
    }
}

/// Initialize the logging system.
///
/// Priority order: `PACKFS_LOG` environment variable, then the supplied
/// configuration, then defaults.
pub fn init_logging(config: Option<&LoggingConfig>) -> Result<(), ConfigError> {
    let directives = std::env::var("PACKFS_LOG").unwrap_or_else(|_| {
        config
            .map(|c| c.level.clone())
            .unwrap_or_else(default_log_level)
    });
    let filter =
        EnvFilter::try_new(&directives).map_err(|e| ConfigError::InvalidFilter(e.to_string()))?;

    let base_subscriber = Registry::default().with(filter);
    let use_color = config.map(|c| c.color).unwrap_or(true);

    if config.map(|c| c.format == "json").unwrap_or(false) {
        base_subscriber
            .with(fmt::layer().json().with_target(true))
            .init();
    } else {
        base_subscriber
            .with(fmt::layer().with_target(true).with_ansi(use_color))
            .init();
    }

    Ok(())
}
