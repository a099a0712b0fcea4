//! Address similarity
//!
//! Addresses with at least two components on both sides (street, locality,
//! region...) are compared component-wise: each component is matched to its
//! closest counterpart and the best-match similarities are averaged in both
//! directions. Otherwise the whole address is compared token-sorted.
//!
//! Transliterated or untranslatable components simply fail to find a close
//! counterpart and pull the mean down.

use super::{token_sort_similarity, DimensionScorer};
use crate::error::MatchError;
use crate::normalizer::NormalizedRecord;
use crate::types::{Dimension, DimensionScore};

#[derive(Debug, Clone, Copy, Default)]
pub struct AddressScorer;

impl AddressScorer {
    /// Mean over `from` of the best similarity against any component of `to`
    fn best_match_mean(from: &[String], to: &[String]) -> f64 {
        let total: f64 = from
            .iter()
            .map(|component| {
                to.iter()
                    .map(|other| strsim::normalized_levenshtein(component, other))
                    .fold(0.0, f64::max)
            })
            .sum();
        total / from.len() as f64
    }

    fn whole(a: &str, b: &str) -> f64 {
        let a_tokens: Vec<String> = a.split(' ').map(String::from).collect();
        let b_tokens: Vec<String> = b.split(' ').map(String::from).collect();
        token_sort_similarity(&a_tokens, &b_tokens)
    }
}

impl DimensionScorer for AddressScorer {
    fn dimension(&self) -> Dimension {
        Dimension::Address
    }

    fn score(&self, a: &NormalizedRecord, b: &NormalizedRecord) -> Result<DimensionScore, MatchError> {
        let (a, b) = match (&a.address, &b.address) {
            (Some(a), Some(b)) => (a, b),
            _ => return Ok(DimensionScore::unknown(Dimension::Address)),
        };

        let similarity = if a.components.len() >= 2 && b.components.len() >= 2 {
            let forward = Self::best_match_mean(&a.components, &b.components);
            let backward = Self::best_match_mean(&b.components, &a.components);
            (forward + backward) / 2.0
        } else {
            Self::whole(&a.full, &b.full)
        };

        Ok(DimensionScore::known(Dimension::Address, similarity))
    }
}
