//! Core record, score and verdict types
//!
//! Records are immutable inputs owned by the caller. Scores, evidence and
//! verdicts are immutable once computed; a re-run produces new values.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

// ============================================================================
// Input records
// ============================================================================

/// Trusted, internally sourced hotel entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalHotelRecord {
    /// Unique, stable identifier
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub area_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_coordinate")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_coordinate")]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
}

/// Externally scraped candidate listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteListingRecord {
    #[serde(default)]
    pub source_hotel_id: Option<String>,
    /// Canonical listing URL
    pub url: String,
    pub name: String,
    #[serde(default, deserialize_with = "lenient_coordinate")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_coordinate")]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Read a coordinate cell without failing the whole record
///
/// Numbers and numeric strings are kept, empty cells and `null` are absent.
/// Anything else becomes NaN so the geo scorer sees a malformed coordinate.
fn lenient_coordinate<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    struct CoordinateVisitor;

    impl<'de> Visitor<'de> for CoordinateVisitor {
        type Value = Option<f64>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a coordinate number, a numeric string or nothing")
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
            Ok(Some(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            Ok(Some(v as f64))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(v as f64))
        }

        fn visit_bool<E: de::Error>(self, _v: bool) -> Result<Self::Value, E> {
            Ok(Some(f64::NAN))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            let trimmed = v.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            match trimmed.parse::<f64>() {
                Ok(value) => Ok(Some(value)),
                Err(_) => {
                    tracing::debug!(value = %trimmed, "Unparseable coordinate");
                    Ok(Some(f64::NAN))
                }
            }
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
            deserializer.deserialize_any(CoordinateVisitor)
        }
    }

    deserializer.deserialize_any(CoordinateVisitor)
}

/// Which side of a pair a record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSide {
    Local,
    Remote,
}

impl fmt::Display for RecordSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordSide::Local => write!(f, "local"),
            RecordSide::Remote => write!(f, "remote"),
        }
    }
}

// ============================================================================
// Dimension scores
// ============================================================================

/// One axis of comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Name,
    Address,
    Geo,
    Postal,
}

impl Dimension {
    /// All dimensions in canonical evidence order
    pub const ALL: [Dimension; 4] = [
        Dimension::Name,
        Dimension::Address,
        Dimension::Geo,
        Dimension::Postal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Name => "name",
            Dimension::Address => "address",
            Dimension::Geo => "geo",
            Dimension::Postal => "postal",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bounded similarity, or the "unknown" sentinel
///
/// `Unknown` is never the same as `Known(0.0)`: an unknown dimension is
/// excluded from aggregation instead of penalising the pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Similarity {
    Known(f64),
    Unknown,
}

impl Similarity {
    /// Create a known similarity clamped to [0.0, 1.0]; NaN becomes `Unknown`
    pub fn known(value: f64) -> Self {
        if value.is_nan() {
            Similarity::Unknown
        } else {
            Similarity::Known(value.clamp(0.0, 1.0))
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Similarity::Known(v) => Some(*v),
            Similarity::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Similarity::Known(_))
    }
}

/// Similarity for one dimension of one pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionScore {
    pub dimension: Dimension,
    pub similarity: Similarity,
    /// Great-circle distance in metres (geo dimension only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_m: Option<f64>,
    /// Why the score is unknown, when a scorer could not run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl DimensionScore {
    pub fn known(dimension: Dimension, value: f64) -> Self {
        Self {
            dimension,
            similarity: Similarity::known(value),
            distance_m: None,
            note: None,
        }
    }

    pub fn unknown(dimension: Dimension) -> Self {
        Self {
            dimension,
            similarity: Similarity::Unknown,
            distance_m: None,
            note: None,
        }
    }

    /// Unknown score recording why the scorer could not run
    pub fn unavailable(dimension: Dimension, reason: impl Into<String>) -> Self {
        Self {
            note: Some(reason.into()),
            ..Self::unknown(dimension)
        }
    }

    pub fn with_distance(mut self, distance_m: f64) -> Self {
        self.distance_m = Some(distance_m);
        self
    }

    pub fn value(&self) -> Option<f64> {
        self.similarity.value()
    }
}

/// A dimension score together with the weight it carried
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedScore {
    pub score: DimensionScore,
    pub weight: f64,
}

/// Audit trail for one verdict: scores in canonical dimension order plus weights
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MatchEvidence {
    pub scores: Vec<WeightedScore>,
}

impl MatchEvidence {
    /// Score for a given dimension, if it was computed
    pub fn get(&self, dimension: Dimension) -> Option<&DimensionScore> {
        self.scores
            .iter()
            .map(|w| &w.score)
            .find(|s| s.dimension == dimension)
    }

    /// Similarity value for a dimension (None when unknown or absent)
    pub fn similarity(&self, dimension: Dimension) -> Option<f64> {
        self.get(dimension).and_then(DimensionScore::value)
    }

    /// Geo distance in metres, when both sides had coordinates
    pub fn distance_m(&self) -> Option<f64> {
        self.get(Dimension::Geo).and_then(|s| s.distance_m)
    }

    /// Number of dimensions with a known score
    pub fn known_count(&self) -> usize {
        self.scores
            .iter()
            .filter(|w| w.score.similarity.is_known())
            .count()
    }
}

// ============================================================================
// Classification and verdict
// ============================================================================

/// Aggregator output band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    AutoMatch,
    AutoReject,
    Uncertain,
    /// No dimension produced a known score
    Unscorable,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::AutoMatch => "auto_match",
            Classification::AutoReject => "auto_reject",
            Classification::Uncertain => "uncertain",
            Classification::Unscorable => "unscorable",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal state of a pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    AutoMatch,
    AutoReject,
    NeedsSemanticReview,
    NeedsHumanReview,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::AutoMatch => "auto_match",
            Disposition::AutoReject => "auto_reject",
            Disposition::NeedsSemanticReview => "needs_semantic_review",
            Disposition::NeedsHumanReview => "needs_human_review",
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Semantic arbiter's judgement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Judgement {
    Match,
    NoMatch,
    Inconclusive,
}

/// Opinion returned by a semantic arbiter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbiterOpinion {
    pub judgement: Judgement,
    /// Arbiter's own confidence in its judgement (0.0-1.0)
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

impl ArbiterOpinion {
    pub fn new(judgement: Judgement, confidence: f64) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            judgement,
            confidence,
            rationale: None,
        }
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }
}

/// Why a pair was escalated to a human
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum EscalationReason {
    /// A record had no comparable identity field
    InvalidRecord(String),
    /// Every dimension was unknown
    NoKnownDimensions,
    ArbiterTimeout { timeout_ms: u64 },
    ArbiterFailure(String),
    ArbiterInconclusive,
    /// Arbiter gave a judgement below its strict threshold
    ArbiterBelowThreshold { judgement: Judgement, confidence: f64 },
}

impl fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EscalationReason::InvalidRecord(reason) => write!(f, "invalid record: {}", reason),
            EscalationReason::NoKnownDimensions => write!(f, "no known dimensions"),
            EscalationReason::ArbiterTimeout { timeout_ms } => {
                write!(f, "arbiter timed out after {}ms", timeout_ms)
            }
            EscalationReason::ArbiterFailure(reason) => write!(f, "arbiter failed: {}", reason),
            EscalationReason::ArbiterInconclusive => write!(f, "arbiter inconclusive"),
            EscalationReason::ArbiterBelowThreshold {
                judgement,
                confidence,
            } => write!(
                f,
                "arbiter {:?} at {:.2} below strict threshold",
                judgement, confidence
            ),
        }
    }
}

/// How the disposition was reached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum Resolution {
    /// Decided by rule-based thresholds alone
    Rules,
    /// Uncertain pair resolved by the semantic arbiter
    SemanticResolved { opinion: ArbiterOpinion },
    /// Uncertain pair left for offline semantic review (no arbiter configured)
    Deferred,
    /// Routed to human review
    Escalated {
        reason: EscalationReason,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        opinion: Option<ArbiterOpinion>,
    },
}

impl Resolution {
    pub fn label(&self) -> &'static str {
        match self {
            Resolution::Rules => "rules",
            Resolution::SemanticResolved { .. } => "semantic_resolved",
            Resolution::Deferred => "deferred",
            Resolution::Escalated { .. } => "escalated",
        }
    }
}

/// Final, immutable outcome for one (local, remote) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchVerdict {
    pub local: LocalHotelRecord,
    pub remote: RemoteListingRecord,
    pub disposition: Disposition,
    pub classification: Classification,
    /// Composite confidence; None when the pair was unscorable
    pub confidence: Option<f64>,
    pub evidence: MatchEvidence,
    pub resolution: Resolution,
    /// Whether the semantic arbiter was consulted for this pair
    pub arbiter_consulted: bool,
}
