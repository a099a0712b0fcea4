//! Similarity Scorers
//!
//! One scorer per dimension, each mapping two normalized records to a bounded
//! similarity. Missing input on either side yields `Similarity::Unknown`, never
//! a fabricated 0.0.
//!
//! # Architecture
//! - [`DimensionScorer`] is the per-dimension trait
//! - [`ScorerSet`] runs all scorers for a pair and absorbs `ScorerUnavailable`
//!   failures into unknown scores
//! - Scorers are pure and need no synchronization

pub mod address;
pub mod geo;
pub mod name;
pub mod postal;

pub use address::AddressScorer;
pub use geo::{haversine_m, GeoScorer};
pub use name::NameScorer;
pub use postal::PostalScorer;

use crate::error::MatchError;
use crate::normalizer::NormalizedRecord;
use crate::types::{Dimension, DimensionScore};

/// Scores one dimension of a normalized pair
///
/// # Errors
/// `MatchError::ScorerUnavailable` when the scorer cannot run for this pair
/// (e.g. malformed coordinates). The caller treats this as an unknown score.
pub trait DimensionScorer: Send + Sync {
    /// Dimension this scorer produces
    fn dimension(&self) -> Dimension;

    fn score(&self, a: &NormalizedRecord, b: &NormalizedRecord) -> Result<DimensionScore, MatchError>;
}

/// The full set of scorers applied to every pair
pub struct ScorerSet {
    scorers: Vec<Box<dyn DimensionScorer>>,
}

impl ScorerSet {
    /// Default scorers for all four dimensions
    pub fn new(geo_radius_m: f64) -> Self {
        Self {
            scorers: vec![
                Box::new(NameScorer),
                Box::new(AddressScorer),
                Box::new(GeoScorer::new(geo_radius_m)),
                Box::new(PostalScorer),
            ],
        }
    }

    /// Build from explicit scorers (one per dimension is expected)
    pub fn from_scorers(scorers: Vec<Box<dyn DimensionScorer>>) -> Self {
        Self { scorers }
    }

    /// Score every dimension of a pair
    ///
    /// Scorer failures are logged and recorded as unknown scores carrying the
    /// failure reason. Output is in canonical dimension order.
    pub fn score_all(&self, a: &NormalizedRecord, b: &NormalizedRecord) -> Vec<DimensionScore> {
        let mut scores: Vec<DimensionScore> = self
            .scorers
            .iter()
            .map(|scorer| match scorer.score(a, b) {
                Ok(score) => score,
                Err(e) => {
                    tracing::warn!(
                        dimension = %scorer.dimension(),
                        error = %e,
                        "Scorer unavailable, dimension treated as unknown"
                    );
                    DimensionScore::unavailable(scorer.dimension(), e.to_string())
                }
            })
            .collect();

        scores.sort_by_key(|s| s.dimension);
        scores
    }
}

/// Normalized Levenshtein similarity of two token lists after sorting tokens
///
/// Robust to word reordering ("aircity jeju" vs "jeju aircity").
pub(crate) fn token_sort_similarity(a: &[String], b: &[String]) -> f64 {
    let mut a_sorted: Vec<&str> = a.iter().map(String::as_str).collect();
    let mut b_sorted: Vec<&str> = b.iter().map(String::as_str).collect();
    a_sorted.sort_unstable();
    b_sorted.sort_unstable();
    strsim::normalized_levenshtein(&a_sorted.join(" "), &b_sorted.join(" "))
}
