//! Semantic arbiter collaborator
//!
//! The router consults an arbiter only for pairs in the Uncertain band. An
//! arbiter returns Match, NoMatch or Inconclusive with its own confidence, and
//! may fail or time out; the router bounds the call and degrades failures to
//! human review.

pub mod chat_completions;

pub use chat_completions::{ArbiterSettings, ChatCompletionsArbiter};

use crate::error::MatchError;
use crate::normalizer::NormalizedRecord;
use crate::types::{ArbiterOpinion, LocalHotelRecord, MatchEvidence, RemoteListingRecord};

/// Everything an arbiter may use to judge one pair
#[derive(Debug, Clone, Copy)]
pub struct ArbitrationRequest<'a> {
    pub local: &'a LocalHotelRecord,
    pub remote: &'a RemoteListingRecord,
    pub local_normalized: &'a NormalizedRecord,
    pub remote_normalized: &'a NormalizedRecord,
    pub evidence: &'a MatchEvidence,
    /// Rule-based composite confidence
    pub confidence: f64,
}

/// External semantic judgement of an uncertain pair
///
/// # Example
///
/// ```ignore
/// #[async_trait::async_trait]
/// impl SemanticArbiter for AlwaysUnsure {
///     fn name(&self) -> &'static str { "always-unsure" }
///
///     async fn arbitrate(&self, _req: &ArbitrationRequest<'_>) -> Result<ArbiterOpinion, MatchError> {
///         Ok(ArbiterOpinion::new(Judgement::Inconclusive, 0.0))
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait SemanticArbiter: Send + Sync {
    /// Arbiter name for logs
    fn name(&self) -> &'static str;

    /// Judge one pair
    ///
    /// # Errors
    /// `MatchError::ArbiterFailure` when the arbiter cannot produce an opinion
    async fn arbitrate(&self, request: &ArbitrationRequest<'_>) -> Result<ArbiterOpinion, MatchError>;
}
