//! Postal code similarity: exact token match

use super::DimensionScorer;
use crate::error::MatchError;
use crate::normalizer::NormalizedRecord;
use crate::types::{Dimension, DimensionScore};

#[derive(Debug, Clone, Copy, Default)]
pub struct PostalScorer;

impl DimensionScorer for PostalScorer {
    fn dimension(&self) -> Dimension {
        Dimension::Postal
    }

    fn score(&self, a: &NormalizedRecord, b: &NormalizedRecord) -> Result<DimensionScore, MatchError> {
        match (&a.postal_code, &b.postal_code) {
            (Some(a), Some(b)) => {
                let similarity = if a == b { 1.0 } else { 0.0 };
                Ok(DimensionScore::known(Dimension::Postal, similarity))
            }
            _ => Ok(DimensionScore::unknown(Dimension::Postal)),
        }
    }
}
