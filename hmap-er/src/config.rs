//! Matcher configuration resolution for hmap-er
//!
//! Turns the optional TOML sections into a fully populated, validated
//! [`MatcherConfig`]. Missing sections fall back to built-in defaults; present
//! but invalid values are a `Configuration` error and stop the run before any
//! pair is evaluated.
//!
//! The arbiter API key is resolved ENV → TOML.

use crate::aggregator::{DimensionWeights, Thresholds};
use crate::arbiter::chat_completions::{DEFAULT_ENDPOINT, DEFAULT_MODEL};
use crate::arbiter::{ArbiterSettings, ChatCompletionsArbiter, SemanticArbiter};
use crate::error::{MatchError, MatchResult};
use crate::normalizer::NormalizationRules;
use crate::router::StrictThresholds;
use hmap_common::config::{
    ArbiterSection, MatchingSection, RunnerSection, ThresholdsSection, TomlConfig, WeightsSection,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable holding the arbiter API key
pub const API_KEY_ENV_VAR: &str = "HMAP_ARBITER_API_KEY";

pub const DEFAULT_GEO_RADIUS_M: f64 = 5000.0;
pub const DEFAULT_ARBITER_TIMEOUT_MS: u64 = 20_000;

/// Semantic arbiter settings
#[derive(Debug, Clone, PartialEq)]
pub struct ArbiterConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub strict: StrictThresholds,
    pub requests_per_second: u32,
    pub max_tokens: u32,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            timeout: Duration::from_millis(DEFAULT_ARBITER_TIMEOUT_MS),
            strict: StrictThresholds::default(),
            requests_per_second: 3,
            max_tokens: 150,
        }
    }
}

/// Batch runner limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Candidates evaluated per local record
    pub max_candidates: usize,
    /// Local records processed concurrently
    pub max_concurrency: usize,
    /// Result rows between sink flushes
    pub batch_size: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_candidates: 3,
            max_concurrency: 4,
            batch_size: 10,
        }
    }
}

/// Fully resolved matcher configuration
#[derive(Debug, Clone, PartialEq)]
pub struct MatcherConfig {
    pub weights: DimensionWeights,
    pub thresholds: Thresholds,
    pub geo_radius_m: f64,
    pub arbiter: ArbiterConfig,
    pub rules: NormalizationRules,
    pub runner: RunnerConfig,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            weights: DimensionWeights::default(),
            thresholds: Thresholds::default(),
            geo_radius_m: DEFAULT_GEO_RADIUS_M,
            arbiter: ArbiterConfig::default(),
            rules: NormalizationRules::default(),
            runner: RunnerConfig::default(),
        }
    }
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Resolve the arbiter API key
///
/// **Priority:** ENV → TOML. Logs a warning when both are set.
pub fn resolve_api_key(env_key: Option<String>, toml_key: Option<&str>) -> Option<String> {
    let env_key = env_key.filter(|k| is_valid_key(k));
    let toml_key = toml_key.filter(|k| is_valid_key(k));

    if env_key.is_some() && toml_key.is_some() {
        warn!(
            "Arbiter API key found in multiple sources: environment, TOML. Using environment (highest priority)."
        );
    }

    if let Some(key) = env_key {
        info!("Arbiter API key loaded from environment variable");
        return Some(key);
    }
    if let Some(key) = toml_key {
        info!("Arbiter API key loaded from TOML config");
        return Some(key.to_string());
    }
    None
}

fn positive(label: &str, value: Option<usize>, default: usize) -> MatchResult<usize> {
    match value {
        Some(0) => Err(MatchError::Configuration(format!("{} must be positive", label))),
        Some(v) => Ok(v),
        None => Ok(default),
    }
}

impl MatcherConfig {
    /// Resolve from TOML, reading the API key from `HMAP_ARBITER_API_KEY`
    ///
    /// # Errors
    /// `Configuration` for any invalid value
    pub fn from_toml(toml: &TomlConfig) -> MatchResult<Self> {
        Self::from_toml_with_env_key(toml, std::env::var(API_KEY_ENV_VAR).ok())
    }

    /// Resolve from TOML with an explicitly supplied environment key
    pub fn from_toml_with_env_key(toml: &TomlConfig, env_key: Option<String>) -> MatchResult<Self> {
        hmap_common::logging::validate_log_level(&toml.logging.level)
            .map_err(|e| MatchError::Configuration(e.to_string()))?;

        let defaults = Self::default();
        let matching = &toml.matching;

        let weights = matching
            .weights
            .map(|w| DimensionWeights {
                name: w.name,
                address: w.address,
                geo: w.geo,
                postal: w.postal,
            })
            .unwrap_or(defaults.weights);

        let thresholds = matching
            .thresholds
            .map(|t| Thresholds {
                auto_match: t.auto_match,
                auto_reject: t.auto_reject,
            })
            .unwrap_or(defaults.thresholds);

        let config = Self {
            weights,
            thresholds,
            geo_radius_m: matching.geo_radius_m.unwrap_or(defaults.geo_radius_m),
            arbiter: Self::arbiter_from_section(&toml.arbiter, env_key)?,
            rules: NormalizationRules::from_section(&toml.rules),
            runner: RunnerConfig {
                max_candidates: positive(
                    "runner.max_candidates",
                    toml.runner.max_candidates,
                    defaults.runner.max_candidates,
                )?,
                max_concurrency: positive(
                    "runner.max_concurrency",
                    toml.runner.max_concurrency,
                    defaults.runner.max_concurrency,
                )?,
                batch_size: positive("runner.batch_size", toml.runner.batch_size, defaults.runner.batch_size)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn arbiter_from_section(section: &ArbiterSection, env_key: Option<String>) -> MatchResult<ArbiterConfig> {
        let defaults = ArbiterConfig::default();
        let api_key = resolve_api_key(env_key, section.api_key.as_deref());

        // Enabled by default only when a key is available
        let enabled = section.enabled.unwrap_or(api_key.is_some());
        if enabled && api_key.is_none() {
            return Err(MatchError::Configuration(format!(
                "Semantic arbiter enabled but no API key configured. Set {} or [arbiter].api_key, \
                 or set [arbiter].enabled = false",
                API_KEY_ENV_VAR
            )));
        }

        let timeout_ms = section.timeout_ms.unwrap_or(DEFAULT_ARBITER_TIMEOUT_MS);
        if timeout_ms == 0 {
            return Err(MatchError::Configuration(
                "arbiter.timeout_ms must be positive".to_string(),
            ));
        }

        let requests_per_second = section.requests_per_second.unwrap_or(defaults.requests_per_second);
        if requests_per_second == 0 {
            return Err(MatchError::Configuration(
                "arbiter.requests_per_second must be positive".to_string(),
            ));
        }

        Ok(ArbiterConfig {
            enabled,
            endpoint: section.endpoint.clone().unwrap_or(defaults.endpoint),
            model: section.model.clone().unwrap_or(defaults.model),
            api_key,
            timeout: Duration::from_millis(timeout_ms),
            strict: StrictThresholds {
                match_confidence: section
                    .match_confidence
                    .unwrap_or(defaults.strict.match_confidence),
                reject_confidence: section
                    .reject_confidence
                    .unwrap_or(defaults.strict.reject_confidence),
            },
            requests_per_second,
            max_tokens: section.max_tokens.unwrap_or(defaults.max_tokens),
        })
    }

    /// Check every numeric setting
    ///
    /// # Errors
    /// `Configuration` naming the first invalid value
    pub fn validate(&self) -> MatchResult<()> {
        self.weights.validate()?;
        self.thresholds.validate()?;
        self.arbiter.strict.validate()?;

        if !self.geo_radius_m.is_finite() || self.geo_radius_m <= 0.0 {
            return Err(MatchError::Configuration(format!(
                "matching.geo_radius_m must be positive, got {}",
                self.geo_radius_m
            )));
        }
        if self.arbiter.timeout.is_zero() {
            return Err(MatchError::Configuration(
                "arbiter timeout must be positive".to_string(),
            ));
        }
        if self.runner.max_candidates == 0 || self.runner.max_concurrency == 0 || self.runner.batch_size == 0 {
            return Err(MatchError::Configuration(
                "runner limits must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Disable the semantic arbiter (uncertain pairs are deferred)
    pub fn without_arbiter(mut self) -> Self {
        self.arbiter.enabled = false;
        self
    }

    /// Build the configured arbiter, if enabled
    ///
    /// # Errors
    /// `Configuration` if enabled without a key or the client cannot be built
    pub fn build_arbiter(&self) -> MatchResult<Option<Arc<dyn SemanticArbiter>>> {
        if !self.arbiter.enabled {
            info!("Semantic arbiter disabled, uncertain pairs will be deferred");
            return Ok(None);
        }

        let api_key = self.arbiter.api_key.clone().ok_or_else(|| {
            MatchError::Configuration("Semantic arbiter enabled but no API key configured".to_string())
        })?;

        let settings = ArbiterSettings {
            endpoint: self.arbiter.endpoint.clone(),
            model: self.arbiter.model.clone(),
            api_key,
            max_tokens: self.arbiter.max_tokens,
            requests_per_second: self.arbiter.requests_per_second,
            request_timeout: self.arbiter.timeout,
        };

        info!(
            endpoint = %settings.endpoint,
            model = %settings.model,
            timeout_ms = self.arbiter.timeout.as_millis() as u64,
            "Semantic arbiter enabled"
        );
        Ok(Some(Arc::new(ChatCompletionsArbiter::new(settings)?)))
    }

    /// Express the numeric settings as a TOML document
    ///
    /// The API key and normalization rules are left out; the written file
    /// relies on the built-in rule lists.
    pub fn to_toml(&self) -> TomlConfig {
        TomlConfig {
            matching: MatchingSection {
                geo_radius_m: Some(self.geo_radius_m),
                weights: Some(WeightsSection {
                    name: self.weights.name,
                    address: self.weights.address,
                    geo: self.weights.geo,
                    postal: self.weights.postal,
                }),
                thresholds: Some(ThresholdsSection {
                    auto_match: self.thresholds.auto_match,
                    auto_reject: self.thresholds.auto_reject,
                }),
            },
            arbiter: ArbiterSection {
                enabled: Some(self.arbiter.enabled),
                endpoint: Some(self.arbiter.endpoint.clone()),
                model: Some(self.arbiter.model.clone()),
                api_key: None,
                timeout_ms: Some(self.arbiter.timeout.as_millis() as u64),
                match_confidence: Some(self.arbiter.strict.match_confidence),
                reject_confidence: Some(self.arbiter.strict.reject_confidence),
                requests_per_second: Some(self.arbiter.requests_per_second),
                max_tokens: Some(self.arbiter.max_tokens),
            },
            runner: RunnerSection {
                max_candidates: Some(self.runner.max_candidates),
                max_concurrency: Some(self.runner.max_concurrency),
                batch_size: Some(self.runner.batch_size),
            },
            ..Default::default()
        }
    }
}
