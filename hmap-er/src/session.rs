//! Match Session
//!
//! Runs one (local, remote) pair through Normalizer → Scorers → Aggregator →
//! Router and bundles the result into an immutable [`MatchVerdict`].
//!
//! A session holds only configuration and the optional arbiter handle; no
//! state is shared between pair evaluations, so verdicts do not depend on
//! evaluation order and the same pair always yields the same verdict (up to
//! arbiter nondeterminism).

use crate::aggregator::{Assessment, ConfidenceAggregator};
use crate::arbiter::{ArbitrationRequest, SemanticArbiter};
use crate::config::MatcherConfig;
use crate::error::{MatchError, MatchResult};
use crate::normalizer::{FieldNormalizer, NormalizedRecord};
use crate::router::EscalationRouter;
use crate::scorers::ScorerSet;
use crate::types::{
    Classification, Dimension, Disposition, EscalationReason, LocalHotelRecord, MatchEvidence, MatchVerdict,
    RemoteListingRecord, Resolution,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Scored but not yet routed pair
#[derive(Debug, Clone, PartialEq)]
pub struct PairAssessment {
    pub local_normalized: NormalizedRecord,
    pub remote_normalized: NormalizedRecord,
    pub assessment: Assessment,
}

/// Pair evaluation pipeline
pub struct MatchSession {
    normalizer: FieldNormalizer,
    scorers: ScorerSet,
    aggregator: ConfidenceAggregator,
    router: EscalationRouter,
}

impl MatchSession {
    /// Create a session from validated configuration
    ///
    /// # Errors
    /// `Configuration` if the configuration fails validation
    pub fn new(config: &MatcherConfig, arbiter: Option<Arc<dyn SemanticArbiter>>) -> MatchResult<Self> {
        config.validate()?;

        Ok(Self {
            normalizer: FieldNormalizer::new(config.rules.clone()),
            scorers: ScorerSet::new(config.geo_radius_m),
            aggregator: ConfidenceAggregator::new(config.weights, config.thresholds),
            router: EscalationRouter::new(arbiter, config.arbiter.strict, config.arbiter.timeout),
        })
    }

    /// Replace the scorer set
    pub fn with_scorers(mut self, scorers: ScorerSet) -> Self {
        self.scorers = scorers;
        self
    }

    pub fn has_arbiter(&self) -> bool {
        self.router.has_arbiter()
    }

    /// Normalize, score and aggregate one pair without routing it
    ///
    /// # Errors
    /// `InvalidRecord` if either record has no comparable name
    pub fn assess(&self, local: &LocalHotelRecord, remote: &RemoteListingRecord) -> MatchResult<PairAssessment> {
        let local_normalized = self.normalizer.normalize_local(local)?;
        let remote_normalized = self.normalizer.normalize_remote(remote)?;

        let scores = self.scorers.score_all(&local_normalized, &remote_normalized);
        let assessment = self.aggregator.aggregate(&scores);

        tracing::debug!(
            code = %local.code,
            url = %remote.url,
            name = ?assessment.evidence.similarity(Dimension::Name),
            address = ?assessment.evidence.similarity(Dimension::Address),
            geo = ?assessment.evidence.similarity(Dimension::Geo),
            postal = ?assessment.evidence.similarity(Dimension::Postal),
            distance_m = ?assessment.evidence.distance_m(),
            confidence = ?assessment.confidence,
            "Pair scored"
        );

        Ok(PairAssessment {
            local_normalized,
            remote_normalized,
            assessment,
        })
    }

    /// Evaluate one pair to a terminal verdict
    ///
    /// Never fails: an invalid record becomes an Unscorable verdict escalated
    /// to human review, and arbiter failures become human review too.
    pub async fn evaluate(&self, local: &LocalHotelRecord, remote: &RemoteListingRecord) -> MatchVerdict {
        let pair = match self.assess(local, remote) {
            Ok(pair) => pair,
            Err(e) => return Self::invalid_verdict(local, remote, e),
        };

        let Assessment {
            confidence,
            classification,
            evidence,
        } = pair.assessment;

        let request = ArbitrationRequest {
            local,
            remote,
            local_normalized: &pair.local_normalized,
            remote_normalized: &pair.remote_normalized,
            evidence: &evidence,
            confidence: confidence.unwrap_or(0.0),
        };
        let routing = self.router.route(classification, request).await;

        MatchVerdict {
            local: local.clone(),
            remote: remote.clone(),
            disposition: routing.disposition,
            classification,
            confidence,
            evidence,
            resolution: routing.resolution,
            arbiter_consulted: routing.arbiter_consulted,
        }
    }

    /// Evaluate one pair unless cancelled first
    ///
    /// Returns `None` if the token fires before the verdict is complete; no
    /// partial verdict is ever produced.
    pub async fn evaluate_with_cancel(
        &self,
        local: &LocalHotelRecord,
        remote: &RemoteListingRecord,
        cancel: &CancellationToken,
    ) -> Option<MatchVerdict> {
        if cancel.is_cancelled() {
            return None;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(code = %local.code, url = %remote.url, "Pair evaluation cancelled");
                None
            }
            verdict = self.evaluate(local, remote) => Some(verdict),
        }
    }

    /// Evaluate every candidate for one local record
    ///
    /// Pairs run concurrently; verdicts come back in candidate order. No
    /// candidates yields no verdicts.
    pub async fn evaluate_candidates(
        &self,
        local: &LocalHotelRecord,
        candidates: &[RemoteListingRecord],
    ) -> Vec<MatchVerdict> {
        futures::future::join_all(candidates.iter().map(|remote| self.evaluate(local, remote))).await
    }

    fn invalid_verdict(local: &LocalHotelRecord, remote: &RemoteListingRecord, error: MatchError) -> MatchVerdict {
        tracing::warn!(
            code = %local.code,
            url = %remote.url,
            error = %error,
            "Pair cannot be scored, escalating to human review"
        );

        let reason = match error {
            MatchError::InvalidRecord { side, reason } => format!("{} record: {}", side, reason),
            other => other.to_string(),
        };

        MatchVerdict {
            local: local.clone(),
            remote: remote.clone(),
            disposition: Disposition::NeedsHumanReview,
            classification: Classification::Unscorable,
            confidence: None,
            evidence: MatchEvidence::default(),
            resolution: Resolution::Escalated {
                reason: EscalationReason::InvalidRecord(reason),
                opinion: None,
            },
            arbiter_consulted: false,
        }
    }
}
