//! Error types for entity resolution
//!
//! Dimension-level failures (`ScorerUnavailable`) are absorbed into unknown
//! scores and arbiter failures degrade to human review. Only configuration
//! errors are fatal to a run.

use crate::types::{Dimension, RecordSide};
use thiserror::Error;

/// Entity resolution errors
#[derive(Debug, Error)]
pub enum MatchError {
    /// Record has no comparable identity field
    #[error("Invalid {side} record: {reason}")]
    InvalidRecord { side: RecordSide, reason: String },

    /// A dimension scorer could not run for this pair
    #[error("Scorer for {dimension} unavailable: {reason}")]
    ScorerUnavailable { dimension: Dimension, reason: String },

    #[error("Semantic arbiter timed out after {timeout_ms}ms")]
    ArbiterTimeout { timeout_ms: u64 },

    #[error("Semantic arbiter failed: {0}")]
    ArbiterFailure(String),

    /// Invalid or missing weight/threshold configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Common(#[from] hmap_common::Error),
}

impl MatchError {
    /// True only for errors that must stop a run before any evaluation
    pub fn is_fatal(&self) -> bool {
        match self {
            MatchError::Configuration(_) => true,
            MatchError::Common(hmap_common::Error::Config(_))
            | MatchError::Common(hmap_common::Error::TomlParse(_)) => true,
            _ => false,
        }
    }
}

/// Result alias for entity resolution operations
pub type MatchResult<T> = Result<T, MatchError>;
