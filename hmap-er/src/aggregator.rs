//! Confidence Aggregator
//!
//! Combines per-dimension scores into one weighted confidence and classifies
//! it against the AutoMatch/AutoReject thresholds.
//!
//! Unknown dimensions are excluded from both numerator and denominator, so the
//! remaining weights are re-normalized rather than the missing dimension being
//! counted as zero.

use crate::error::MatchError;
use crate::types::{Classification, Dimension, DimensionScore, MatchEvidence, WeightedScore};

/// Per-dimension weights
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DimensionWeights {
    pub name: f64,
    pub address: f64,
    pub geo: f64,
    pub postal: f64,
}

impl Default for DimensionWeights {
    /// Geo and postal are the strongest disambiguators, address the noisiest
    fn default() -> Self {
        Self {
            name: 0.25,
            address: 0.15,
            geo: 0.30,
            postal: 0.30,
        }
    }
}

impl DimensionWeights {
    pub fn get(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Name => self.name,
            Dimension::Address => self.address,
            Dimension::Geo => self.geo,
            Dimension::Postal => self.postal,
        }
    }

    /// # Errors
    /// Negative or non-finite weights, or all weights zero
    pub fn validate(&self) -> Result<(), MatchError> {
        for dimension in Dimension::ALL {
            let weight = self.get(dimension);
            if !weight.is_finite() || weight < 0.0 {
                return Err(MatchError::Configuration(format!(
                    "Weight for {} must be a finite non-negative number, got {}",
                    dimension, weight
                )));
            }
        }
        if Dimension::ALL.iter().all(|d| self.get(*d) == 0.0) {
            return Err(MatchError::Configuration(
                "At least one dimension weight must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Classification thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// confidence >= auto_match -> AutoMatch
    pub auto_match: f64,
    /// confidence <= auto_reject -> AutoReject
    pub auto_reject: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            auto_match: 0.90,
            auto_reject: 0.30,
        }
    }
}

impl Thresholds {
    /// # Errors
    /// Thresholds outside [0, 1] or auto_reject >= auto_match
    pub fn validate(&self) -> Result<(), MatchError> {
        for (label, value) in [("auto_match", self.auto_match), ("auto_reject", self.auto_reject)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(MatchError::Configuration(format!(
                    "Threshold {} must be within [0, 1], got {}",
                    label, value
                )));
            }
        }
        if self.auto_reject >= self.auto_match {
            return Err(MatchError::Configuration(format!(
                "auto_reject ({}) must be below auto_match ({})",
                self.auto_reject, self.auto_match
            )));
        }
        Ok(())
    }

    pub fn classify(&self, confidence: f64) -> Classification {
        if confidence >= self.auto_match {
            Classification::AutoMatch
        } else if confidence <= self.auto_reject {
            Classification::AutoReject
        } else {
            Classification::Uncertain
        }
    }
}

/// Aggregation result for one pair
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    /// None when the pair is unscorable
    pub confidence: Option<f64>,
    pub classification: Classification,
    pub evidence: MatchEvidence,
}

/// Weighted confidence aggregator
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceAggregator {
    weights: DimensionWeights,
    thresholds: Thresholds,
}

impl ConfidenceAggregator {
    /// Create an aggregator from already validated weights and thresholds
    pub fn new(weights: DimensionWeights, thresholds: Thresholds) -> Self {
        Self {
            weights,
            thresholds,
        }
    }

    pub fn weights(&self) -> &DimensionWeights {
        &self.weights
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Aggregate a set of dimension scores
    ///
    /// Input order does not matter: evidence is rebuilt in canonical dimension
    /// order and the weighted sum is taken in that order. If a dimension
    /// appears more than once, the first occurrence wins.
    ///
    /// The result is clamped to the range of the known scores so that float
    /// rounding can never push a pair of all-1.0 scores below 1.0.
    pub fn aggregate(&self, scores: &[DimensionScore]) -> Assessment {
        let evidence = MatchEvidence {
            scores: Dimension::ALL
                .iter()
                .filter_map(|d| scores.iter().find(|s| s.dimension == *d))
                .map(|score| WeightedScore {
                    score: score.clone(),
                    weight: self.weights.get(score.dimension),
                })
                .collect(),
        };

        let mut numerator = 0.0;
        let mut denominator = 0.0;
        let mut min_known = f64::INFINITY;
        let mut max_known = f64::NEG_INFINITY;

        for weighted in &evidence.scores {
            if let Some(value) = weighted.score.value() {
                if weighted.weight > 0.0 {
                    numerator += weighted.weight * value;
                    denominator += weighted.weight;
                    min_known = min_known.min(value);
                    max_known = max_known.max(value);
                }
            }
        }

        if denominator <= 0.0 {
            tracing::debug!(
                known = evidence.known_count(),
                "No weighted known dimension, pair is unscorable"
            );
            return Assessment {
                confidence: None,
                classification: Classification::Unscorable,
                evidence,
            };
        }

        let confidence = (numerator / denominator).clamp(min_known, max_known);
        let classification = self.thresholds.classify(confidence);

        tracing::debug!(
            confidence = confidence,
            classification = %classification,
            known = evidence.known_count(),
            "Aggregated pair confidence"
        );

        Assessment {
            confidence: Some(confidence),
            classification,
            evidence,
        }
    }
}
