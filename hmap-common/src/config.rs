//! Configuration file model and resolution
//!
//! The TOML file is resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. `HMAP_CONFIG` environment variable
//! 3. `<config_dir>/hmap/hmap.toml`
//! 4. Built-in defaults (no file)
//!
//! Every section is optional. Tables that *are* present must be complete:
//! a `[matching.weights]` table missing one of its four weights fails to parse
//! rather than silently falling back to a default.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming an explicit configuration file
pub const CONFIG_ENV_VAR: &str = "HMAP_CONFIG";

/// Configuration file loaded from TOML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Scoring weights, thresholds and geo radius
    #[serde(default)]
    pub matching: MatchingSection,

    /// Semantic arbiter endpoint and strict thresholds
    #[serde(default)]
    pub arbiter: ArbiterSection,

    /// Noise-token stripping rules for names and addresses
    #[serde(default)]
    pub rules: RulesSection,

    /// Batch runner limits
    #[serde(default)]
    pub runner: RunnerSection,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// `[matching]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchingSection {
    /// Distance (metres) at which geo similarity decays to zero
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo_radius_m: Option<f64>,

    /// Per-dimension weights; all four required when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<WeightsSection>,

    /// Classification thresholds; both required when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thresholds: Option<ThresholdsSection>,
}

/// `[matching.weights]` table
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightsSection {
    pub name: f64,
    pub address: f64,
    pub geo: f64,
    pub postal: f64,
}

/// `[matching.thresholds]` table
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdsSection {
    pub auto_match: f64,
    pub auto_reject: f64,
}

/// `[arbiter]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArbiterSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Chat-completions endpoint URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// API key (the `HMAP_ARBITER_API_KEY` environment variable takes priority)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Hard bound on a single arbiter call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Minimum arbiter confidence to accept a Match opinion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_confidence: Option<f64>,

    /// Minimum arbiter confidence to accept a NoMatch opinion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reject_confidence: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_per_second: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// `[rules]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RulesSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<FieldRulesSection>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<FieldRulesSection>,
}

/// `[rules.name]` / `[rules.address]` tables
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldRulesSection {
    /// Single words dropped wherever they occur
    #[serde(default)]
    pub remove_words: Vec<String>,

    /// Multi-word phrases dropped wherever they occur (chain suffixes etc.)
    #[serde(default)]
    pub remove_phrases: Vec<String>,

    /// Place names (cities, districts, regions) dropped before comparison
    #[serde(default)]
    pub remove_places: Vec<String>,
}

/// `[runner]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunnerSection {
    /// Candidates evaluated per local record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_candidates: Option<usize>,

    /// Local records processed concurrently
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,

    /// Result rows written between sink flushes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
}

/// Get the per-user default configuration file path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("hmap").join("hmap.toml"))
}

/// Resolve which configuration file to read, if any
///
/// Explicit sources (CLI argument, environment variable) are returned even if
/// the file does not exist so that the caller reports the mistake. The
/// per-user default is only returned when it exists.
pub fn resolve_config_path(cli_path: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Per-user config file
    default_config_path().filter(|p| p.exists())
}

/// Load the configuration, falling back to built-in defaults when no file exists
///
/// # Errors
/// - explicitly named file does not exist
/// - file cannot be read or parsed
pub fn load_toml_config(cli_path: Option<&Path>) -> Result<TomlConfig> {
    match resolve_config_path(cli_path) {
        Some(path) => {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            let config = read_toml_config(&path)?;
            info!("Configuration loaded from {}", path.display());
            Ok(config)
        }
        None => {
            info!("No configuration file found, using built-in defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Read and parse a TOML configuration file
pub fn read_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)?;
    debug!(path = %path.display(), "Parsed TOML configuration");
    Ok(config)
}

/// Write configuration atomically (temp file + rename)
///
/// Parent directories are created as needed. On Unix the file is restricted to
/// the owner (0600) because it may hold an API key.
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))?;
    }

    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(Error::Io(e));
    }

    debug!(path = %path.display(), "Configuration written");
    Ok(())
}
