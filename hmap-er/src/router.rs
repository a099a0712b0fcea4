//! Escalation Router
//!
//! Finite-state routing of a scored pair to its terminal disposition:
//!
//! ```text
//! Scored ── Unscorable ──────────────────────────────▶ NeedsHumanReview
//!        ── AutoMatch ───────────────────────────────▶ AutoMatch
//!        ── AutoReject ──────────────────────────────▶ AutoReject
//!        ── Uncertain ── no arbiter ─────────────────▶ NeedsSemanticReview
//!                     └─ arbiter ─┬─ Match ≥ strict ──▶ AutoMatch
//!                                 ├─ NoMatch ≥ strict ▶ AutoReject
//!                                 └─ otherwise ───────▶ NeedsHumanReview
//! ```
//!
//! "Otherwise" covers a weak opinion, an inconclusive opinion, an arbiter
//! failure and a timeout. The arbiter call is the only await point and is
//! bounded by `timeout`.

use crate::arbiter::{ArbitrationRequest, SemanticArbiter};
use crate::error::MatchError;
use crate::types::{ArbiterOpinion, Classification, Disposition, EscalationReason, Judgement, Resolution};
use std::sync::Arc;
use std::time::Duration;

/// Minimum arbiter confidence needed to settle an uncertain pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrictThresholds {
    pub match_confidence: f64,
    pub reject_confidence: f64,
}

impl Default for StrictThresholds {
    fn default() -> Self {
        Self {
            match_confidence: 0.95,
            reject_confidence: 0.95,
        }
    }
}

impl StrictThresholds {
    /// # Errors
    /// Either threshold outside [0, 1]
    pub fn validate(&self) -> Result<(), MatchError> {
        for (label, value) in [
            ("match_confidence", self.match_confidence),
            ("reject_confidence", self.reject_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(MatchError::Configuration(format!(
                    "Arbiter {} must be within [0, 1], got {}",
                    label, value
                )));
            }
        }
        Ok(())
    }
}

/// First routing step, decided from the classification alone
#[derive(Debug, Clone, PartialEq)]
pub enum RouteStep {
    Terminal {
        disposition: Disposition,
        resolution: Resolution,
    },
    ConsultArbiter,
}

/// What came back from the arbiter call
#[derive(Debug, Clone, PartialEq)]
pub enum ArbiterOutcome {
    Opinion(ArbiterOpinion),
    TimedOut { timeout_ms: u64 },
    Failed(String),
}

/// Terminal routing result
#[derive(Debug, Clone, PartialEq)]
pub struct Routing {
    pub disposition: Disposition,
    pub resolution: Resolution,
    pub arbiter_consulted: bool,
}

fn escalate(reason: EscalationReason, opinion: Option<ArbiterOpinion>) -> (Disposition, Resolution) {
    (
        Disposition::NeedsHumanReview,
        Resolution::Escalated { reason, opinion },
    )
}

/// Transition out of the Scored state
pub fn initial_transition(classification: Classification, arbiter_available: bool) -> RouteStep {
    let terminal = |disposition, resolution| RouteStep::Terminal {
        disposition,
        resolution,
    };

    match classification {
        Classification::Unscorable => {
            let (disposition, resolution) = escalate(EscalationReason::NoKnownDimensions, None);
            terminal(disposition, resolution)
        }
        Classification::AutoMatch => terminal(Disposition::AutoMatch, Resolution::Rules),
        Classification::AutoReject => terminal(Disposition::AutoReject, Resolution::Rules),
        Classification::Uncertain if arbiter_available => RouteStep::ConsultArbiter,
        Classification::Uncertain => terminal(Disposition::NeedsSemanticReview, Resolution::Deferred),
    }
}

/// Transition out of semantic review
pub fn arbiter_transition(outcome: ArbiterOutcome, strict: &StrictThresholds) -> (Disposition, Resolution) {
    match outcome {
        ArbiterOutcome::TimedOut { timeout_ms } => {
            escalate(EscalationReason::ArbiterTimeout { timeout_ms }, None)
        }
        ArbiterOutcome::Failed(reason) => escalate(EscalationReason::ArbiterFailure(reason), None),
        ArbiterOutcome::Opinion(opinion) => {
            let (threshold, disposition) = match opinion.judgement {
                Judgement::Inconclusive => {
                    return escalate(EscalationReason::ArbiterInconclusive, Some(opinion));
                }
                Judgement::Match => (strict.match_confidence, Disposition::AutoMatch),
                Judgement::NoMatch => (strict.reject_confidence, Disposition::AutoReject),
            };

            if opinion.confidence >= threshold {
                (disposition, Resolution::SemanticResolved { opinion })
            } else {
                escalate(
                    EscalationReason::ArbiterBelowThreshold {
                        judgement: opinion.judgement,
                        confidence: opinion.confidence,
                    },
                    Some(opinion),
                )
            }
        }
    }
}

/// Routes scored pairs, consulting the semantic arbiter for uncertain ones
pub struct EscalationRouter {
    arbiter: Option<Arc<dyn SemanticArbiter>>,
    strict: StrictThresholds,
    timeout: Duration,
}

impl EscalationRouter {
    pub fn new(
        arbiter: Option<Arc<dyn SemanticArbiter>>,
        strict: StrictThresholds,
        timeout: Duration,
    ) -> Self {
        Self {
            arbiter,
            strict,
            timeout,
        }
    }

    pub fn has_arbiter(&self) -> bool {
        self.arbiter.is_some()
    }

    /// Route one pair to a terminal disposition
    ///
    /// Never fails: arbiter errors and timeouts become NeedsHumanReview.
    pub async fn route(&self, classification: Classification, request: ArbitrationRequest<'_>) -> Routing {
        let arbiter = match (initial_transition(classification, self.has_arbiter()), &self.arbiter) {
            (RouteStep::Terminal { disposition, resolution }, _) => {
                tracing::debug!(
                    code = %request.local.code,
                    url = %request.remote.url,
                    classification = %classification,
                    disposition = %disposition,
                    "Pair routed by rules"
                );
                return Routing {
                    disposition,
                    resolution,
                    arbiter_consulted: false,
                };
            }
            (RouteStep::ConsultArbiter, Some(arbiter)) => arbiter,
            (RouteStep::ConsultArbiter, None) => {
                // initial_transition only asks for an arbiter when one exists
                return Routing {
                    disposition: Disposition::NeedsSemanticReview,
                    resolution: Resolution::Deferred,
                    arbiter_consulted: false,
                };
            }
        };

        let timeout_ms = self.timeout.as_millis() as u64;
        let outcome = match tokio::time::timeout(self.timeout, arbiter.arbitrate(&request)).await {
            Ok(Ok(opinion)) => ArbiterOutcome::Opinion(opinion),
            Ok(Err(MatchError::ArbiterTimeout { timeout_ms })) => {
                tracing::warn!(
                    code = %request.local.code,
                    url = %request.remote.url,
                    arbiter = arbiter.name(),
                    timeout_ms = timeout_ms,
                    "Semantic arbiter timed out, escalating to human review"
                );
                ArbiterOutcome::TimedOut { timeout_ms }
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    code = %request.local.code,
                    url = %request.remote.url,
                    arbiter = arbiter.name(),
                    error = %e,
                    "Semantic arbiter failed, escalating to human review"
                );
                ArbiterOutcome::Failed(e.to_string())
            }
            Err(_) => {
                tracing::warn!(
                    code = %request.local.code,
                    url = %request.remote.url,
                    arbiter = arbiter.name(),
                    timeout_ms = timeout_ms,
                    "Semantic arbiter timed out, escalating to human review"
                );
                ArbiterOutcome::TimedOut { timeout_ms }
            }
        };

        let (disposition, resolution) = arbiter_transition(outcome, &self.strict);
        tracing::info!(
            code = %request.local.code,
            url = %request.remote.url,
            disposition = %disposition,
            resolution = resolution.label(),
            "Uncertain pair routed after semantic review"
        );

        Routing {
            disposition,
            resolution,
            arbiter_consulted: true,
        }
    }
}
