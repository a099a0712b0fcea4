//! Tracing initialisation
//!
//! `RUST_LOG` overrides the configured level when set.

use crate::config::LoggingConfig;
use crate::{Error, Result};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Check that a configured log level is one of the five tracing levels
pub fn validate_log_level(level: &str) -> Result<()> {
    let normalized = level.trim().to_ascii_lowercase();
    if VALID_LEVELS.contains(&normalized.as_str()) {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Invalid log level '{}' (expected one of: {})",
            level,
            VALID_LEVELS.join(", ")
        )))
    }
}

/// Install the global tracing subscriber
///
/// Logs go to stderr, or are appended to `config.file` when set.
///
/// # Errors
/// Returns error if the level is invalid, the log file cannot be opened, or a
/// global subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    validate_log_level(&config.level)?;

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(config.level.trim().to_ascii_lowercase())
            .map_err(|e| Error::Config(format!("Invalid log filter: {}", e)))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    Error::Config(format!("Open log file {} failed: {}", path.display(), e))
                })?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };

    installed.map_err(|e| Error::Internal(format!("Tracing init failed: {}", e)))
}
