//! Deterministic collaborators and record fixtures

use hmap_er::arbiter::{ArbitrationRequest, SemanticArbiter};
use hmap_er::normalizer::NormalizedRecord;
use hmap_er::scorers::{DimensionScorer, ScorerSet};
use hmap_er::supplier::CandidateSupplier;
use hmap_er::types::{ArbiterOpinion, Dimension, DimensionScore, Judgement};
use hmap_er::{LocalHotelRecord, MatchError, MatchResult, RemoteListingRecord};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// Fixtures
// ============================================================================

pub fn aircity_local() -> LocalHotelRecord {
    LocalHotelRecord {
        code: "JJ001".to_string(),
        name: "Hotel AirCity Jeju".to_string(),
        country_code: Some("KR".to_string()),
        area_name: Some("Jeju".to_string()),
        latitude: Some(33.48960876),
        longitude: Some(126.4925766),
        address: Some("12 Nohyeong-ro, Jeju-si, Jeju-do".to_string()),
        postal_code: Some("63124".to_string()),
    }
}

pub fn aircity_remote() -> RemoteListingRecord {
    RemoteListingRecord {
        source_hotel_id: Some("AG-77812".to_string()),
        url: "https://listings.example/hotel/aircity-jeju".to_string(),
        name: "Hotel AirCity Jeju".to_string(),
        latitude: Some(33.48960876),
        longitude: Some(126.4925766),
        address: Some("12 Nohyeong-ro, Jeju-si, Jeju-do".to_string()),
        postal_code: Some("63124".to_string()),
        image_url: Some("https://listings.example/img/77812.jpg".to_string()),
    }
}

pub fn local(code: &str, name: &str) -> LocalHotelRecord {
    LocalHotelRecord {
        code: code.to_string(),
        name: name.to_string(),
        country_code: None,
        area_name: None,
        latitude: None,
        longitude: None,
        address: None,
        postal_code: None,
    }
}

pub fn remote(url: &str, name: &str) -> RemoteListingRecord {
    RemoteListingRecord {
        source_hotel_id: None,
        url: url.to_string(),
        name: name.to_string(),
        latitude: None,
        longitude: None,
        address: None,
        postal_code: None,
        image_url: None,
    }
}

// ============================================================================
// Scorers
// ============================================================================

/// Returns a fixed similarity (or unknown) whatever the records
pub struct FixedScorer {
    pub dimension: Dimension,
    pub value: Option<f64>,
}

impl DimensionScorer for FixedScorer {
    fn dimension(&self) -> Dimension {
        self.dimension
    }

    fn score(&self, _a: &NormalizedRecord, _b: &NormalizedRecord) -> Result<DimensionScore, MatchError> {
        Ok(match self.value {
            Some(v) => DimensionScore::known(self.dimension, v),
            None => DimensionScore::unknown(self.dimension),
        })
    }
}

/// Scorer set with fixed name/address/geo/postal similarities
pub fn fixed_scores(name: Option<f64>, address: Option<f64>, geo: Option<f64>, postal: Option<f64>) -> ScorerSet {
    let scorer = |dimension, value| Box::new(FixedScorer { dimension, value }) as Box<dyn DimensionScorer>;
    ScorerSet::from_scorers(vec![
        scorer(Dimension::Name, name),
        scorer(Dimension::Address, address),
        scorer(Dimension::Geo, geo),
        scorer(Dimension::Postal, postal),
    ])
}

// ============================================================================
// Arbiters
// ============================================================================

/// Returns the same opinion every time and counts calls
pub struct ScriptedArbiter {
    opinion: ArbiterOpinion,
    calls: AtomicUsize,
}

impl ScriptedArbiter {
    pub fn new(judgement: Judgement, confidence: f64) -> Self {
        Self {
            opinion: ArbiterOpinion::new(judgement, confidence),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SemanticArbiter for ScriptedArbiter {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn arbitrate(&self, _request: &ArbitrationRequest<'_>) -> Result<ArbiterOpinion, MatchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.opinion.clone())
    }
}

/// Sleeps longer than any test timeout before answering
pub struct SlowArbiter {
    pub delay: Duration,
}

#[async_trait::async_trait]
impl SemanticArbiter for SlowArbiter {
    fn name(&self) -> &'static str {
        "slow"
    }

    async fn arbitrate(&self, _request: &ArbitrationRequest<'_>) -> Result<ArbiterOpinion, MatchError> {
        tokio::time::sleep(self.delay).await;
        Ok(ArbiterOpinion::new(Judgement::Match, 1.0))
    }
}

/// Always fails
pub struct FailingArbiter;

#[async_trait::async_trait]
impl SemanticArbiter for FailingArbiter {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn arbitrate(&self, _request: &ArbitrationRequest<'_>) -> Result<ArbiterOpinion, MatchError> {
        Err(MatchError::ArbiterFailure("HTTP 503: service unavailable".to_string()))
    }
}

/// Reports its own timeout instead of an opinion
pub struct TimingOutArbiter {
    pub timeout_ms: u64,
}

#[async_trait::async_trait]
impl SemanticArbiter for TimingOutArbiter {
    fn name(&self) -> &'static str {
        "timing-out"
    }

    async fn arbitrate(&self, _request: &ArbitrationRequest<'_>) -> Result<ArbiterOpinion, MatchError> {
        Err(MatchError::ArbiterTimeout {
            timeout_ms: self.timeout_ms,
        })
    }
}

/// Records the evidence it was shown
#[derive(Default)]
pub struct RecordingArbiter {
    pub seen_confidence: Mutex<Vec<f64>>,
}

#[async_trait::async_trait]
impl SemanticArbiter for RecordingArbiter {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn arbitrate(&self, request: &ArbitrationRequest<'_>) -> Result<ArbiterOpinion, MatchError> {
        self.seen_confidence.lock().unwrap().push(request.confidence);
        Ok(ArbiterOpinion::new(Judgement::Inconclusive, 0.0))
    }
}

// ============================================================================
// Suppliers
// ============================================================================

/// In-memory supplier; codes in `failing` return an error
#[derive(Default)]
pub struct MemorySupplier {
    pub listings: HashMap<String, Vec<RemoteListingRecord>>,
    pub failing: Vec<String>,
    pub done: Mutex<Vec<String>>,
    /// Per-code delay, used to make completion order differ from input order
    pub delays: HashMap<String, Duration>,
}

impl MemorySupplier {
    pub fn with(mut self, code: &str, candidates: Vec<RemoteListingRecord>) -> Self {
        self.listings.insert(code.to_string(), candidates);
        self
    }

    pub fn done(&self) -> Vec<String> {
        self.done.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl CandidateSupplier for MemorySupplier {
    async fn candidates(&self, local: &LocalHotelRecord) -> MatchResult<Vec<RemoteListingRecord>> {
        if let Some(delay) = self.delays.get(&local.code) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(&local.code) {
            return Err(MatchError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "listing source unavailable",
            )));
        }
        Ok(self.listings.get(&local.code).cloned().unwrap_or_default())
    }

    async fn mark_done(&self, local: &LocalHotelRecord) -> MatchResult<()> {
        self.done.lock().unwrap().push(local.code.clone());
        Ok(())
    }
}
