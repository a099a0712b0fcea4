//! Batch runner
//!
//! Drives many local records through candidate supply and pair evaluation.
//!
//! # Architecture
//! - Local records are processed concurrently, at most `max_concurrency` at a
//!   time; the candidates of one local record are evaluated together
//! - Results are consumed in input order, so sink output is deterministic
//!   whatever the completion order
//! - A supplier failure for one local record is logged and counted; it never
//!   aborts the run, and the record is not marked done
//! - Local records the supplier already finished are skipped; records with
//!   no candidate are marked done and listed in the summary
//! - Cancellation abandons in-flight local records: their verdicts are not
//!   recorded and they are not marked done, so a resumed run retries them

use crate::error::MatchResult;
use crate::session::MatchSession;
use crate::sink::ResultSink;
use crate::supplier::CandidateSupplier;
use crate::types::{Disposition, LocalHotelRecord, MatchVerdict};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// End-of-run report
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub locals_total: usize,
    /// Local records whose verdicts were all recorded
    pub locals_processed: usize,
    /// Local records a previous run already finished
    pub locals_skipped: usize,
    /// Local records the supplier had no candidate for
    pub locals_without_candidates: usize,
    pub supplier_failures: usize,
    /// Local records abandoned by cancellation
    pub locals_cancelled: usize,
    pub pairs_evaluated: usize,
    pub auto_match: usize,
    pub auto_reject: usize,
    pub needs_semantic_review: usize,
    pub needs_human_review: usize,
    pub arbiter_consulted: usize,
    pub cancelled: bool,
    /// Codes of the local records without candidates, in input order
    pub unmatched_codes: Vec<String>,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl RunSummary {
    fn count(&mut self, verdict: &MatchVerdict) {
        self.pairs_evaluated += 1;
        match verdict.disposition {
            Disposition::AutoMatch => self.auto_match += 1,
            Disposition::AutoReject => self.auto_reject += 1,
            Disposition::NeedsSemanticReview => self.needs_semantic_review += 1,
            Disposition::NeedsHumanReview => self.needs_human_review += 1,
        }
        if verdict.arbiter_consulted {
            self.arbiter_consulted += 1;
        }
    }

    /// Log the summary at info level
    pub fn log(&self) {
        tracing::info!(
            locals_total = self.locals_total,
            locals_processed = self.locals_processed,
            locals_skipped = self.locals_skipped,
            locals_without_candidates = self.locals_without_candidates,
            supplier_failures = self.supplier_failures,
            locals_cancelled = self.locals_cancelled,
            pairs = self.pairs_evaluated,
            auto_match = self.auto_match,
            auto_reject = self.auto_reject,
            needs_semantic_review = self.needs_semantic_review,
            needs_human_review = self.needs_human_review,
            arbiter_consulted = self.arbiter_consulted,
            cancelled = self.cancelled,
            elapsed_ms = self.elapsed.as_millis() as u64,
            "Run complete"
        );
        if !self.unmatched_codes.is_empty() {
            tracing::info!(
                count = self.unmatched_codes.len(),
                codes = %self.unmatched_codes.join(","),
                "Local records without candidates"
            );
        }
    }
}

/// Outcome for one local record
enum LocalOutcome {
    Evaluated(Vec<MatchVerdict>),
    Skipped,
    NoCandidates,
    SupplierFailed,
    Cancelled,
}

/// Runs a batch of local records against a candidate supplier
pub struct MatchRunner {
    session: Arc<MatchSession>,
    supplier: Arc<dyn CandidateSupplier>,
    max_concurrency: usize,
    cancel_token: CancellationToken,
}

impl MatchRunner {
    pub fn new(session: Arc<MatchSession>, supplier: Arc<dyn CandidateSupplier>, max_concurrency: usize) -> Self {
        Self {
            session,
            supplier,
            max_concurrency: max_concurrency.max(1),
            cancel_token: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token
    pub fn with_cancel_token(mut self, cancel_token: CancellationToken) -> Self {
        self.cancel_token = cancel_token;
        self
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }

    async fn process_local(&self, local: &LocalHotelRecord) -> LocalOutcome {
        if self.cancel_token.is_cancelled() {
            return LocalOutcome::Cancelled;
        }

        if self.supplier.already_processed(local) {
            tracing::debug!(code = %local.code, "Already processed, skipping");
            return LocalOutcome::Skipped;
        }

        let candidates = match self.supplier.candidates(local).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!(code = %local.code, error = %e, "Candidate supplier failed");
                return LocalOutcome::SupplierFailed;
            }
        };

        if candidates.is_empty() {
            return LocalOutcome::NoCandidates;
        }

        let evaluations = candidates
            .iter()
            .map(|remote| self.session.evaluate_with_cancel(local, remote, &self.cancel_token));
        let verdicts: Option<Vec<MatchVerdict>> = futures::future::join_all(evaluations)
            .await
            .into_iter()
            .collect();

        match verdicts {
            Some(verdicts) => LocalOutcome::Evaluated(verdicts),
            None => LocalOutcome::Cancelled,
        }
    }

    async fn mark_done(&self, local: &LocalHotelRecord) {
        if let Err(e) = self.supplier.mark_done(local).await {
            tracing::warn!(code = %local.code, error = %e, "Failed to mark local record done");
        }
    }

    /// Run every local record and record verdicts to `sink`
    ///
    /// # Errors
    /// Sink write failures only; supplier and arbiter failures are absorbed
    pub async fn run(&self, locals: &[LocalHotelRecord], sink: &mut dyn ResultSink) -> MatchResult<RunSummary> {
        let start = Instant::now();
        let mut summary = RunSummary {
            locals_total: locals.len(),
            ..Default::default()
        };

        tracing::info!(
            locals = locals.len(),
            max_concurrency = self.max_concurrency,
            arbiter = self.session.has_arbiter(),
            "Starting match run"
        );

        let mut outcomes = stream::iter(locals)
            .map(|local| async move { (local, self.process_local(local).await) })
            .buffered(self.max_concurrency);

        while let Some((local, outcome)) = outcomes.next().await {
            match outcome {
                LocalOutcome::Evaluated(verdicts) => {
                    for verdict in &verdicts {
                        sink.record(verdict)?;
                        summary.count(verdict);
                    }
                    self.mark_done(local).await;
                    summary.locals_processed += 1;
                }
                LocalOutcome::Skipped => summary.locals_skipped += 1,
                LocalOutcome::NoCandidates => {
                    self.mark_done(local).await;
                    summary.locals_without_candidates += 1;
                    summary.unmatched_codes.push(local.code.clone());
                }
                LocalOutcome::SupplierFailed => summary.supplier_failures += 1,
                LocalOutcome::Cancelled => summary.locals_cancelled += 1,
            }
        }

        sink.flush()?;

        summary.cancelled = self.cancel_token.is_cancelled();
        if summary.cancelled {
            tracing::warn!(
                abandoned = summary.locals_cancelled,
                "Run cancelled, in-flight local records abandoned"
            );
        }
        summary.elapsed = start.elapsed();
        summary.log();
        Ok(summary)
    }
}
