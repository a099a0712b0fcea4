//! Pair evaluation tests
//!
//! Exercise MatchSession end to end with deterministic arbiters.

mod helpers;

use helpers::*;
use hmap_er::arbiter::SemanticArbiter;
use hmap_er::normalizer::Coordinates;
use hmap_er::scorers::haversine_m;
use hmap_er::types::{Dimension, EscalationReason, Judgement};
use hmap_er::{Classification, Disposition, MatchSession, MatcherConfig, Resolution};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn session_with(arbiter: Option<Arc<dyn SemanticArbiter>>) -> MatchSession {
    MatchSession::new(&MatcherConfig::default(), arbiter).unwrap()
}

/// Name 0.40, address 0.30, geo and postal unknown: confidence 0.3625
fn uncertain_session(config: &MatcherConfig, arbiter: Option<Arc<dyn SemanticArbiter>>) -> MatchSession {
    MatchSession::new(config, arbiter)
        .unwrap()
        .with_scorers(fixed_scores(Some(0.40), Some(0.30), None, None))
}

// ============================================================================
// Rule-based outcomes
// ============================================================================

#[tokio::test]
async fn test_identical_pair_auto_matches_without_arbiter_call() {
    let (logs, _guard) = init_test_logging();
    let arbiter = Arc::new(ScriptedArbiter::new(Judgement::NoMatch, 1.0));
    let session = session_with(Some(arbiter.clone()));

    let verdict = session.evaluate(&aircity_local(), &aircity_remote()).await;

    assert_eq!(verdict.disposition, Disposition::AutoMatch);
    assert_eq!(verdict.classification, Classification::AutoMatch);
    assert!(verdict.confidence.unwrap() >= 0.95);
    assert_eq!(verdict.resolution, Resolution::Rules);
    assert!(!verdict.arbiter_consulted);
    assert_eq!(arbiter.calls(), 0);
    assert_eq!(verdict.evidence.distance_m(), Some(0.0));
    logs.assert_no_match("Semantic arbiter");
}

#[tokio::test]
async fn test_unrelated_pair_auto_rejects() {
    let mut local = aircity_local();
    local.address = Some("88 Haeundae-ro, Busan".to_string());
    local.postal_code = Some("48094".to_string());
    local.latitude = Some(35.1587);
    local.longitude = Some(129.1604);
    local.name = "Lotte Busan".to_string();

    let verdict = session_with(None).evaluate(&local, &aircity_remote()).await;

    assert_eq!(verdict.disposition, Disposition::AutoReject);
    assert_eq!(verdict.resolution, Resolution::Rules);
    assert_eq!(verdict.evidence.similarity(Dimension::Geo), Some(0.0));
    assert_eq!(verdict.evidence.similarity(Dimension::Postal), Some(0.0));
}

#[tokio::test]
async fn test_missing_remote_coordinates_leave_geo_unknown() {
    let mut remote = aircity_remote();
    remote.latitude = None;
    remote.longitude = None;

    let verdict = session_with(None).evaluate(&aircity_local(), &remote).await;

    assert_eq!(verdict.evidence.similarity(Dimension::Geo), None);
    assert_eq!(verdict.evidence.distance_m(), None);
    assert_eq!(verdict.evidence.known_count(), 3);
    // Renormalized over the known dimensions, not dragged down by geo
    assert!(verdict.confidence.unwrap() >= 0.95);
    assert_eq!(verdict.disposition, Disposition::AutoMatch);
}

#[tokio::test]
async fn test_malformed_coordinates_are_unknown_not_zero() {
    let mut remote = aircity_remote();
    remote.latitude = Some(133.0);

    let verdict = session_with(None).evaluate(&aircity_local(), &remote).await;

    let geo = verdict.evidence.get(Dimension::Geo).unwrap();
    assert_eq!(geo.value(), None);
    assert!(geo.note.is_some());
    assert_eq!(verdict.disposition, Disposition::AutoMatch);
}

#[tokio::test]
async fn test_unparseable_listing_coordinate_is_unknown_not_fatal() {
    let remote: hmap_er::types::RemoteListingRecord = serde_json::from_value(serde_json::json!({
        "url": "https://listings.example/hotel/aircity-jeju",
        "name": "Hotel AirCity Jeju",
        "latitude": "N/A",
        "longitude": "126.4925766",
        "address": "12 Nohyeong-ro, Jeju-si, Jeju-do",
        "postal_code": "63124"
    }))
    .unwrap();

    let verdict = session_with(None).evaluate(&aircity_local(), &remote).await;

    let geo = verdict.evidence.get(Dimension::Geo).unwrap();
    assert_eq!(geo.value(), None);
    assert!(geo.note.is_some());
    assert_eq!(verdict.evidence.known_count(), 3);
    assert_eq!(verdict.disposition, Disposition::AutoMatch);
}

#[tokio::test]
async fn test_all_unknown_escalates_to_human_review() {
    let arbiter = Arc::new(ScriptedArbiter::new(Judgement::Match, 1.0));
    let session = MatchSession::new(&MatcherConfig::default(), Some(arbiter.clone()))
        .unwrap()
        .with_scorers(fixed_scores(None, None, None, None));

    let verdict = session.evaluate(&aircity_local(), &aircity_remote()).await;

    assert_eq!(verdict.classification, Classification::Unscorable);
    assert_eq!(verdict.disposition, Disposition::NeedsHumanReview);
    assert_eq!(verdict.confidence, None);
    assert_eq!(
        verdict.resolution,
        Resolution::Escalated {
            reason: EscalationReason::NoKnownDimensions,
            opinion: None,
        }
    );
    assert_eq!(arbiter.calls(), 0);
}

#[tokio::test]
async fn test_invalid_local_record_never_reaches_arbiter() {
    let arbiter = Arc::new(ScriptedArbiter::new(Judgement::Match, 1.0));
    let session = session_with(Some(arbiter.clone()));
    let mut local = aircity_local();
    local.name = "  ".to_string();

    let verdict = session.evaluate(&local, &aircity_remote()).await;

    assert_eq!(verdict.disposition, Disposition::NeedsHumanReview);
    assert!(matches!(
        verdict.resolution,
        Resolution::Escalated {
            reason: EscalationReason::InvalidRecord(ref r),
            ..
        } if r.starts_with("local record")
    ));
    assert_eq!(arbiter.calls(), 0);
}

// ============================================================================
// Semantic review
// ============================================================================

#[tokio::test]
async fn test_uncertain_without_arbiter_is_deferred() {
    let session = uncertain_session(&MatcherConfig::default(), None);

    let verdict = session.evaluate(&aircity_local(), &aircity_remote()).await;

    assert_eq!(verdict.classification, Classification::Uncertain);
    assert!((verdict.confidence.unwrap() - 0.3625).abs() < 1e-9);
    assert_eq!(verdict.disposition, Disposition::NeedsSemanticReview);
    assert_eq!(verdict.resolution, Resolution::Deferred);
    assert!(!verdict.arbiter_consulted);
}

#[tokio::test]
async fn test_uncertain_pair_consults_arbiter_once() {
    let arbiter = Arc::new(RecordingArbiter::default());
    let session = uncertain_session(&MatcherConfig::default(), Some(arbiter.clone()));

    let verdict = session.evaluate(&aircity_local(), &aircity_remote()).await;

    let seen = arbiter.seen_confidence.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert!((seen[0] - 0.3625).abs() < 1e-9);
    assert!(verdict.arbiter_consulted);
    assert_eq!(verdict.disposition, Disposition::NeedsHumanReview);
    assert!(matches!(
        verdict.resolution,
        Resolution::Escalated {
            reason: EscalationReason::ArbiterInconclusive,
            opinion: Some(_),
        }
    ));
}

#[tokio::test]
async fn test_confident_arbiter_resolves_uncertain_pair() {
    let arbiter = Arc::new(ScriptedArbiter::new(Judgement::Match, 0.97));
    let session = uncertain_session(&MatcherConfig::default(), Some(arbiter.clone()));

    let verdict = session.evaluate(&aircity_local(), &aircity_remote()).await;

    assert_eq!(verdict.disposition, Disposition::AutoMatch);
    // Classification stays what the rules said
    assert_eq!(verdict.classification, Classification::Uncertain);
    assert!(matches!(verdict.resolution, Resolution::SemanticResolved { ref opinion } if opinion.confidence == 0.97));
    assert_eq!(arbiter.calls(), 1);

    let rejecting = Arc::new(ScriptedArbiter::new(Judgement::NoMatch, 0.99));
    let verdict = uncertain_session(&MatcherConfig::default(), Some(rejecting))
        .evaluate(&aircity_local(), &aircity_remote())
        .await;
    assert_eq!(verdict.disposition, Disposition::AutoReject);
}

#[tokio::test]
async fn test_exact_location_with_weak_text_goes_to_arbiter() {
    let arbiter = Arc::new(ScriptedArbiter::new(Judgement::Match, 0.97));
    let session = MatchSession::new(&MatcherConfig::default(), Some(arbiter.clone()))
        .unwrap()
        .with_scorers(fixed_scores(Some(0.40), Some(0.30), Some(1.0), Some(1.0)));

    let verdict = session.evaluate(&aircity_local(), &aircity_remote()).await;

    // 0.25*0.40 + 0.15*0.30 + 0.30*1.0 + 0.30*1.0
    assert!((verdict.confidence.unwrap() - 0.745).abs() < 1e-9);
    assert_eq!(verdict.classification, Classification::Uncertain);
    assert_eq!(arbiter.calls(), 1);
    assert!(verdict.arbiter_consulted);
    assert_eq!(verdict.disposition, Disposition::AutoMatch);
    assert!(matches!(verdict.resolution, Resolution::SemanticResolved { .. }));
}

#[tokio::test]
async fn test_arbiter_below_strict_threshold_escalates() {
    let arbiter = Arc::new(ScriptedArbiter::new(Judgement::Match, 0.80));
    let session = uncertain_session(&MatcherConfig::default(), Some(arbiter));

    let verdict = session.evaluate(&aircity_local(), &aircity_remote()).await;

    assert_eq!(verdict.disposition, Disposition::NeedsHumanReview);
    match verdict.resolution {
        Resolution::Escalated {
            reason: EscalationReason::ArbiterBelowThreshold { judgement, confidence },
            opinion: Some(opinion),
        } => {
            assert_eq!(judgement, Judgement::Match);
            assert_eq!(confidence, 0.80);
            assert_eq!(opinion.confidence, 0.80);
        }
        other => panic!("unexpected resolution {other:?}"),
    }
}

#[tokio::test]
async fn test_relaxed_strict_threshold_accepts_lower_confidence() {
    let mut config = MatcherConfig::default();
    config.arbiter.strict.match_confidence = 0.75;
    let session = uncertain_session(&config, Some(Arc::new(ScriptedArbiter::new(Judgement::Match, 0.80))));

    let verdict = session.evaluate(&aircity_local(), &aircity_remote()).await;

    assert_eq!(verdict.disposition, Disposition::AutoMatch);
}

#[tokio::test]
async fn test_arbiter_timeout_escalates_with_evidence() {
    let (logs, _guard) = init_test_logging();
    let mut config = MatcherConfig::default();
    config.arbiter.timeout = Duration::from_millis(50);
    let arbiter = Arc::new(SlowArbiter {
        delay: Duration::from_secs(5),
    });
    let session = uncertain_session(&config, Some(arbiter));

    let verdict = session.evaluate(&aircity_local(), &aircity_remote()).await;

    assert_eq!(verdict.disposition, Disposition::NeedsHumanReview);
    assert_eq!(
        verdict.resolution,
        Resolution::Escalated {
            reason: EscalationReason::ArbiterTimeout { timeout_ms: 50 },
            opinion: None,
        }
    );
    assert!(verdict.arbiter_consulted);
    assert_eq!(verdict.evidence.similarity(Dimension::Name), Some(0.40));
    assert_eq!(verdict.evidence.similarity(Dimension::Address), Some(0.30));
    assert!(logs.contains_at(tracing::Level::WARN, "timed out"));
}

#[tokio::test]
async fn test_arbiter_reported_timeout_is_logged() {
    let (logs, _guard) = init_test_logging();
    let session = uncertain_session(
        &MatcherConfig::default(),
        Some(Arc::new(TimingOutArbiter { timeout_ms: 1500 })),
    );

    let verdict = session.evaluate(&aircity_local(), &aircity_remote()).await;

    assert_eq!(
        verdict.resolution,
        Resolution::Escalated {
            reason: EscalationReason::ArbiterTimeout { timeout_ms: 1500 },
            opinion: None,
        }
    );
    let record = logs
        .find_at(tracing::Level::WARN, "Semantic arbiter timed out")
        .expect("timeout warning");
    assert!(record.target.starts_with("hmap_er"));
    assert!(record.has_field("timeout_ms", "1500"));
    assert!(record.has_field("arbiter", "timing-out"));
    assert!(record.has_field("code", "JJ001"));
    logs.assert_no_match("Semantic arbiter failed");
}

#[tokio::test]
async fn test_arbiter_failure_escalates_and_is_logged() {
    let (logs, _guard) = init_test_logging();
    let session = uncertain_session(&MatcherConfig::default(), Some(Arc::new(FailingArbiter)));

    let verdict = session.evaluate(&aircity_local(), &aircity_remote()).await;

    assert_eq!(verdict.disposition, Disposition::NeedsHumanReview);
    assert!(matches!(
        verdict.resolution,
        Resolution::Escalated {
            reason: EscalationReason::ArbiterFailure(ref r),
            ..
        } if r.contains("503")
    ));
    logs.assert_contains("Semantic arbiter failed");
    assert!(logs.contains_at(tracing::Level::WARN, "Semantic arbiter failed"));
}

// ============================================================================
// Determinism and symmetry
// ============================================================================

#[tokio::test]
async fn test_reevaluation_is_identical() {
    let session = session_with(None);
    let mut remote = aircity_remote();
    remote.name = "AirCity Hotel".to_string();
    remote.latitude = Some(33.4901);

    let first = session.evaluate(&aircity_local(), &remote).await;
    let second = session.evaluate(&aircity_local(), &remote).await;
    assert_eq!(first, second);

    let fresh = session_with(None).evaluate(&aircity_local(), &remote).await;
    assert_eq!(first, fresh);
}

#[tokio::test]
async fn test_verdicts_independent_of_evaluation_order() {
    let session = session_with(None);
    let a = aircity_remote();
    let mut b = aircity_remote();
    b.url = "https://listings.example/hotel/other".to_string();
    b.name = "Ramada Jeju".to_string();

    let forward = session.evaluate_candidates(&aircity_local(), &[a.clone(), b.clone()]).await;
    let backward = session.evaluate_candidates(&aircity_local(), &[b, a]).await;

    assert_eq!(forward[0], backward[1]);
    assert_eq!(forward[1], backward[0]);
}

#[test]
fn test_geo_distance_symmetric() {
    let jeju = Coordinates {
        latitude: 33.48960876,
        longitude: 126.4925766,
    };
    let airport = Coordinates {
        latitude: 33.5104,
        longitude: 126.4914,
    };
    assert_eq!(haversine_m(jeju, airport), haversine_m(airport, jeju));
    assert!(haversine_m(jeju, airport) > 2000.0);
}

#[tokio::test]
async fn test_swapping_coordinates_gives_same_geo_score() {
    let session = session_with(None);
    let mut local = aircity_local();
    let mut remote = aircity_remote();
    remote.latitude = Some(33.5104);
    remote.longitude = Some(126.4914);

    let forward = session.evaluate(&local, &remote).await;

    std::mem::swap(&mut local.latitude, &mut remote.latitude);
    std::mem::swap(&mut local.longitude, &mut remote.longitude);
    let swapped = session.evaluate(&local, &remote).await;

    assert_eq!(
        forward.evidence.similarity(Dimension::Geo),
        swapped.evidence.similarity(Dimension::Geo)
    );
    assert_eq!(forward.evidence.distance_m(), swapped.evidence.distance_m());
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_cancel_during_arbitration_yields_no_verdict() {
    let session = uncertain_session(
        &MatcherConfig::default(),
        Some(Arc::new(SlowArbiter {
            delay: Duration::from_secs(5),
        })),
    );
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let verdict = session
        .evaluate_with_cancel(&aircity_local(), &aircity_remote(), &token)
        .await;

    assert!(verdict.is_none());
}
