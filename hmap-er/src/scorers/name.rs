//! Name similarity

use super::{token_sort_similarity, DimensionScorer};
use crate::error::MatchError;
use crate::normalizer::NormalizedRecord;
use crate::types::{Dimension, DimensionScore};

/// Edit-distance name similarity
///
/// Takes the better of two views: the compact name with spaces removed
/// ("air city" == "aircity") and the token-sorted name (word reordering).
#[derive(Debug, Clone, Copy, Default)]
pub struct NameScorer;

impl NameScorer {
    fn compact(tokens: &[String]) -> String {
        tokens.concat()
    }
}

impl DimensionScorer for NameScorer {
    fn dimension(&self) -> Dimension {
        Dimension::Name
    }

    fn score(&self, a: &NormalizedRecord, b: &NormalizedRecord) -> Result<DimensionScore, MatchError> {
        if a.name_tokens.is_empty() || b.name_tokens.is_empty() {
            return Ok(DimensionScore::unknown(Dimension::Name));
        }

        let compact = strsim::normalized_levenshtein(
            &Self::compact(&a.name_tokens),
            &Self::compact(&b.name_tokens),
        );
        let reordered = token_sort_similarity(&a.name_tokens, &b.name_tokens);

        Ok(DimensionScore::known(Dimension::Name, compact.max(reordered)))
    }
}
