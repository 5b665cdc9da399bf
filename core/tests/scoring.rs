//! Fraud risk scorer tests: aggregation, level mapping, detectors, the
//! degraded path, and the end-to-end night-visit scenario.

use chrono::{DateTime, Duration, Utc};
use fieldguard_core::{
    behavior::{BehaviorPattern, WorkingHours},
    config::EngineConfig,
    location::LocationPoint,
    scorer::{
        aggregate_score, ActivityKind, CheckContext, FlagEvidence, FlagKind, FraudCheckInput,
        FraudFlag, FraudRiskScorer, RiskLevel,
    },
    sensor::MovementSummary,
    store::TelemetryStore,
    types::Severity,
};

fn ts(s: &str) -> DateTime<Utc> {
    s.parse().expect("timestamp literal")
}

fn fix(lat: f64, lon: f64, accuracy_m: f64, at: DateTime<Utc>) -> LocationPoint {
    LocationPoint {
        latitude: lat,
        longitude: lon,
        accuracy_m,
        timestamp: at,
        speed_mps: Some(1.0),
        heading_deg: None,
    }
}

fn flag(severity: Severity, confidence: f64) -> FraudFlag {
    FraudFlag {
        kind: FlagKind::Location,
        severity,
        description: "test flag".to_string(),
        evidence: FlagEvidence::Accuracy { accuracy_m: 10.0 },
        confidence,
    }
}

/// Scorer plus a second handle onto the same database for test setup.
fn build_scorer(tag: &str) -> (FraudRiskScorer, TelemetryStore) {
    let store = TelemetryStore::shared_memory(tag).expect("store");
    store.migrate().expect("migrate");
    let scorer = FraudRiskScorer::new(store.reopen().expect("reopen"), &EngineConfig::default());
    (scorer, store)
}

fn input(agent: &str, activity: ActivityKind, at: DateTime<Utc>) -> FraudCheckInput {
    FraudCheckInput {
        agent_id: agent.to_string(),
        activity,
        location: None,
        timestamp: at,
        previous_locations: Vec::new(),
        metadata: None,
    }
}

// Wednesday noon: inside every default working pattern, not a weekend.
const QUIET_TIME: &str = "2024-03-13T12:00:00Z";

#[test]
fn no_evidence_scores_zero() {
    let (scorer, _store) = build_scorer("sco-baseline");
    let result = scorer.check(
        &input("agent-1", ActivityKind::Sale, ts(QUIET_TIME)),
        &CheckContext::empty(),
    );

    assert_eq!(result.risk_score, 0.0);
    assert_eq!(result.risk_level, RiskLevel::Low);
    assert!(result.flags.is_empty());
    assert_eq!(result.reason, "No fraud indicators detected");
    assert_eq!(result.auto_actions, vec!["log_incident".to_string()]);
}

#[test]
fn adding_a_flag_never_lowers_the_score() {
    let base = vec![flag(Severity::Medium, 0.6)];
    let mut widened = base.clone();
    widened.push(flag(Severity::High, 0.8));

    assert!(aggregate_score(&widened) >= aggregate_score(&base));

    let mut critical = widened.clone();
    critical.push(flag(Severity::Critical, 0.95));
    assert!(aggregate_score(&critical) >= aggregate_score(&widened));
}

#[test]
fn score_is_clamped_and_zero_for_no_flags() {
    assert_eq!(aggregate_score(&[]), 0.0);
    let maxed = vec![flag(Severity::Critical, 1.0), flag(Severity::Critical, 1.0)];
    assert_eq!(aggregate_score(&maxed), 100.0);
}

#[test]
fn level_boundaries_are_exact() {
    assert_eq!(RiskLevel::for_score(0.0), RiskLevel::Low);
    assert_eq!(RiskLevel::for_score(29.999), RiskLevel::Low);
    assert_eq!(RiskLevel::for_score(30.0), RiskLevel::Medium);
    assert_eq!(RiskLevel::for_score(59.999), RiskLevel::Medium);
    assert_eq!(RiskLevel::for_score(60.0), RiskLevel::High);
    assert_eq!(RiskLevel::for_score(79.999), RiskLevel::High);
    assert_eq!(RiskLevel::for_score(80.0), RiskLevel::Critical);
    assert_eq!(RiskLevel::for_score(100.0), RiskLevel::Critical);
    // Pure function: repeated calls agree.
    assert_eq!(RiskLevel::for_score(45.0), RiskLevel::for_score(45.0));
}

#[test]
fn impossible_speed_dominates_the_verdict() {
    let (scorer, _store) = build_scorer("sco-speed");
    let t0 = ts(QUIET_TIME);

    let mut event = input("agent-2", ActivityKind::VisitStart, t0 + Duration::seconds(60));
    event.previous_locations = vec![fix(52.520008, 13.404954, 10.0, t0)];
    // ~10 km from the previous fix, 60 seconds later.
    event.location = Some(fix(52.610008, 13.404954, 10.0, t0 + Duration::seconds(60)));

    let result = scorer.check(&event, &CheckContext::empty());

    let speed_flag = result
        .flags
        .iter()
        .find(|f| f.kind == FlagKind::Location && f.severity == Severity::Critical)
        .expect("critical location flag");
    assert!(matches!(
        speed_flag.evidence,
        FlagEvidence::Movement(_)
    ));
    assert!(result.risk_level >= RiskLevel::High);
    assert!(result.reason.contains("km/h"));
}

#[test]
fn internal_failure_degrades_to_low_not_error() {
    // No migration: every store query inside the scorer fails.
    let store = TelemetryStore::in_memory().expect("store");
    let scorer = FraudRiskScorer::new(store, &EngineConfig::default());

    let result = scorer.check(
        &input("agent-3", ActivityKind::Survey, ts(QUIET_TIME)),
        &CheckContext::empty(),
    );

    assert_eq!(result.risk_level, RiskLevel::Low);
    assert_eq!(result.risk_score, 0.0);
    assert!(result.flags.is_empty());
    assert!(result.reason.contains("system error"));
}

#[test]
fn night_visit_with_spoofed_gps_and_no_approach() {
    let (scorer, store) = build_scorer("sco-night");
    let at = ts("2024-03-13T02:00:00Z");

    let mut pattern = BehaviorPattern::new("agent-4".to_string(), at);
    pattern.typical_working_hours = WorkingHours {
        start_hour: 8,
        end_hour: 17,
    };
    store.save_behavior_pattern(&pattern).expect("save pattern");

    let mut event = input("agent-4", ActivityKind::VisitStart, at);
    event.location = Some(fix(52.520008, 13.404954, 0.5, at));

    let ctx = CheckContext {
        movement: Some(MovementSummary {
            is_stationary: true,
            average_magnitude: 0.4,
            samples: 10,
        }),
        device: None,
        history: None,
    };
    let result = scorer.check(&event, &ctx);

    assert!(result
        .flags
        .iter()
        .any(|f| f.kind == FlagKind::Time && f.severity == Severity::High));
    assert!(result
        .flags
        .iter()
        .any(|f| f.kind == FlagKind::Location && f.severity == Severity::High));
    assert!(result
        .flags
        .iter()
        .any(|f| f.kind == FlagKind::Behavior && f.severity == Severity::Medium));
    assert!(
        result.risk_level >= RiskLevel::High,
        "expected High or Critical, got {:?} at {:.1}",
        result.risk_level,
        result.risk_score
    );
    // Each flag kind contributes its recommendation exactly once.
    let mut deduped = result.recommendations.clone();
    deduped.dedup();
    assert_eq!(deduped.len(), result.recommendations.len());
}

#[test]
fn evening_activity_outside_pattern_is_medium() {
    let (scorer, store) = build_scorer("sco-evening");
    let at = ts("2024-03-13T19:00:00Z");

    let mut pattern = BehaviorPattern::new("agent-5".to_string(), at);
    pattern.typical_working_hours = WorkingHours {
        start_hour: 8,
        end_hour: 17,
    };
    store.save_behavior_pattern(&pattern).expect("save pattern");

    let result = scorer.check(
        &input("agent-5", ActivityKind::Sale, at),
        &CheckContext::empty(),
    );

    let time_flag = result
        .flags
        .iter()
        .find(|f| f.kind == FlagKind::Time)
        .expect("time flag");
    // 19:00 is outside the pattern but inside the 6-22 hard bounds.
    assert_eq!(time_flag.severity, Severity::Medium);
}

#[test]
fn weekend_activity_is_flagged() {
    let (scorer, _store) = build_scorer("sco-weekend");
    // A Saturday.
    let result = scorer.check(
        &input("agent-6", ActivityKind::Survey, ts("2024-03-16T12:00:00Z")),
        &CheckContext::empty(),
    );

    assert!(result
        .flags
        .iter()
        .any(|f| f.kind == FlagKind::Time
            && matches!(f.evidence, FlagEvidence::Weekend { .. })));
}

#[test]
fn activity_burst_flags_high() {
    let (scorer, store) = build_scorer("sco-burst");
    let at = ts(QUIET_TIME);

    for i in 0..11 {
        store
            .record_activity(
                &"agent-7".to_string(),
                ActivityKind::Sale,
                None,
                at - Duration::minutes(55) + Duration::minutes(i * 5),
            )
            .expect("record");
    }

    let result = scorer.check(&input("agent-7", ActivityKind::Sale, at), &CheckContext::empty());

    let burst = result
        .flags
        .iter()
        .find(|f| f.kind == FlagKind::Behavior)
        .expect("burst flag");
    assert_eq!(burst.severity, Severity::High);
}

#[test]
fn repeated_identical_submissions_flag_pattern() {
    let (scorer, store) = build_scorer("sco-repeat");
    let at = ts(QUIET_TIME);
    let metadata = serde_json::json!({"survey_id": "sv-12", "answers": [1, 1, 1]});

    for i in 0..6 {
        store
            .record_activity(
                &"agent-8".to_string(),
                ActivityKind::Survey,
                Some(&metadata),
                at - Duration::minutes(25) + Duration::minutes(i * 4),
            )
            .expect("record");
    }

    let mut event = input("agent-8", ActivityKind::Survey, at);
    event.metadata = Some(metadata);
    let result = scorer.check(&event, &CheckContext::empty());

    assert!(result
        .flags
        .iter()
        .any(|f| f.kind == FlagKind::Pattern && f.severity == Severity::Medium));

    // Different metadata in the same window stays quiet.
    let mut other = input("agent-8", ActivityKind::Survey, at + Duration::minutes(1));
    other.metadata = Some(serde_json::json!({"survey_id": "sv-99"}));
    let result = scorer.check(&other, &CheckContext::empty());
    assert!(!result.flags.iter().any(|f| f.kind == FlagKind::Pattern));
}

#[test]
fn every_verdict_lands_in_the_audit_log() {
    let (scorer, _store) = build_scorer("sco-audit");
    let at = ts(QUIET_TIME);

    for i in 0..3 {
        scorer.check(
            &input("agent-9", ActivityKind::PhotoCapture, at + Duration::minutes(i)),
            &CheckContext::empty(),
        );
    }

    let history = scorer.fraud_history(10).expect("history");
    assert_eq!(history.len(), 3);
    assert!(history.iter().all(|r| r.agent_id == "agent-9"));
}
