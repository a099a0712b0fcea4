//! Result sinks
//!
//! The core hands each finished verdict to a sink through `record`; the output
//! format is the sink's concern.

use crate::error::MatchResult;
use crate::types::{Dimension, Judgement, MatchVerdict, Resolution};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Consumer of finished verdicts
pub trait ResultSink: Send {
    fn record(&mut self, verdict: &MatchVerdict) -> MatchResult<()>;

    /// Persist anything buffered
    fn flush(&mut self) -> MatchResult<()> {
        Ok(())
    }
}

/// Collects verdicts in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    verdicts: Vec<MatchVerdict>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn verdicts(&self) -> &[MatchVerdict] {
        &self.verdicts
    }

    pub fn into_verdicts(self) -> Vec<MatchVerdict> {
        self.verdicts
    }
}

impl ResultSink for MemorySink {
    fn record(&mut self, verdict: &MatchVerdict) -> MatchResult<()> {
        self.verdicts.push(verdict.clone());
        Ok(())
    }
}

/// One CSV row per verdict
#[derive(Debug, Serialize)]
struct VerdictRow<'a> {
    code: &'a str,
    local_name: &'a str,
    local_address: Option<&'a str>,
    local_postal_code: Option<&'a str>,
    local_latitude: Option<f64>,
    local_longitude: Option<f64>,
    url: &'a str,
    source_hotel_id: Option<&'a str>,
    remote_name: &'a str,
    remote_address: Option<&'a str>,
    remote_postal_code: Option<&'a str>,
    remote_latitude: Option<f64>,
    remote_longitude: Option<f64>,
    image_url: Option<&'a str>,
    name_similarity: Option<f64>,
    address_similarity: Option<f64>,
    geo_similarity: Option<f64>,
    postal_similarity: Option<f64>,
    distance_m: Option<f64>,
    postal_match: Option<bool>,
    confidence: Option<f64>,
    classification: &'static str,
    disposition: &'static str,
    resolution: &'static str,
    escalation_reason: Option<String>,
    arbiter_judgement: Option<&'static str>,
    arbiter_confidence: Option<f64>,
    arbiter_rationale: Option<&'a str>,
}

fn round4(value: Option<f64>) -> Option<f64> {
    value.map(|v| (v * 10_000.0).round() / 10_000.0)
}

fn judgement_label(judgement: Judgement) -> &'static str {
    match judgement {
        Judgement::Match => "match",
        Judgement::NoMatch => "no_match",
        Judgement::Inconclusive => "inconclusive",
    }
}

impl<'a> VerdictRow<'a> {
    fn from_verdict(v: &'a MatchVerdict) -> Self {
        let (escalation_reason, opinion) = match &v.resolution {
            Resolution::Escalated { reason, opinion } => (Some(reason.to_string()), opinion.as_ref()),
            Resolution::SemanticResolved { opinion } => (None, Some(opinion)),
            Resolution::Rules | Resolution::Deferred => (None, None),
        };
        let evidence = &v.evidence;

        Self {
            code: &v.local.code,
            local_name: &v.local.name,
            local_address: v.local.address.as_deref(),
            local_postal_code: v.local.postal_code.as_deref(),
            local_latitude: v.local.latitude,
            local_longitude: v.local.longitude,
            url: &v.remote.url,
            source_hotel_id: v.remote.source_hotel_id.as_deref(),
            remote_name: &v.remote.name,
            remote_address: v.remote.address.as_deref(),
            remote_postal_code: v.remote.postal_code.as_deref(),
            remote_latitude: v.remote.latitude,
            remote_longitude: v.remote.longitude,
            image_url: v.remote.image_url.as_deref(),
            name_similarity: round4(evidence.similarity(Dimension::Name)),
            address_similarity: round4(evidence.similarity(Dimension::Address)),
            geo_similarity: round4(evidence.similarity(Dimension::Geo)),
            postal_similarity: evidence.similarity(Dimension::Postal),
            distance_m: evidence.distance_m().map(f64::round),
            postal_match: evidence.similarity(Dimension::Postal).map(|s| s >= 1.0),
            confidence: round4(v.confidence),
            classification: v.classification.as_str(),
            disposition: v.disposition.as_str(),
            resolution: v.resolution.label(),
            escalation_reason,
            arbiter_judgement: opinion.map(|o| judgement_label(o.judgement)),
            arbiter_confidence: opinion.map(|o| o.confidence),
            arbiter_rationale: opinion.and_then(|o| o.rationale.as_deref()),
        }
    }
}

/// CSV sink flushed every `batch_size` rows
pub struct CsvResultSink<W: Write + Send> {
    writer: csv::Writer<W>,
    batch_size: usize,
    pending: usize,
    written: usize,
}

impl CsvResultSink<File> {
    /// Create (truncate) a CSV file
    pub fn create(path: &Path, batch_size: usize) -> MatchResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(path)?;
        tracing::info!(path = %path.display(), "Writing verdicts");
        Ok(Self::from_writer(file, batch_size))
    }
}

impl<W: Write + Send> CsvResultSink<W> {
    pub fn from_writer(writer: W, batch_size: usize) -> Self {
        Self {
            writer: csv::Writer::from_writer(writer),
            batch_size: batch_size.max(1),
            pending: 0,
            written: 0,
        }
    }

    /// Rows written so far
    pub fn written(&self) -> usize {
        self.written
    }

    /// Flush and return the underlying writer
    pub fn into_inner(mut self) -> MatchResult<W> {
        self.writer.flush()?;
        self.writer
            .into_inner()
            .map_err(|e| crate::error::MatchError::Io(e.into_error()))
    }
}

impl<W: Write + Send> ResultSink for CsvResultSink<W> {
    fn record(&mut self, verdict: &MatchVerdict) -> MatchResult<()> {
        self.writer.serialize(VerdictRow::from_verdict(verdict))?;
        self.pending += 1;
        self.written += 1;

        if self.pending >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> MatchResult<()> {
        if self.pending > 0 {
            tracing::debug!(rows = self.pending, total = self.written, "Flushing verdict batch");
        }
        self.writer.flush()?;
        self.pending = 0;
        Ok(())
    }
}
