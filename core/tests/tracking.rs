//! Location tracker integration tests: movement detection, history
//! bounds, tracking lifecycle.

use chrono::{DateTime, Duration, Utc};
use fieldguard_core::{
    config::EngineConfig,
    error::EngineError,
    event::BufferedAlertSink,
    location::{LocationHistory, LocationPoint, SuspiciousMovementKind},
    store::TelemetryStore,
    tracker::{LocationTracker, ScriptedLocationSource, TrackingOptions},
    types::Severity,
};
use std::sync::Arc;

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

fn build_tracker(tag: &str, fixes: Vec<LocationPoint>) -> (LocationTracker, Arc<BufferedAlertSink>) {
    let store = TelemetryStore::shared_memory(tag).expect("store");
    store.migrate().expect("migrate");
    let alerts = Arc::new(BufferedAlertSink::new());
    let tracker = LocationTracker::new(
        Box::new(ScriptedLocationSource::new(fixes)),
        store,
        alerts.clone(),
        &EngineConfig::default(),
    );
    (tracker, alerts)
}

#[test]
fn impossible_speed_flagged_critical() {
    let (mut tracker, alerts) = build_tracker("trk-speed", Vec::new());
    let t0 = ts("2024-03-13T10:00:00Z");

    // ~10 km in 60 seconds, roughly 600 km/h.
    tracker.ingest_fix(fix(52.520008, 13.404954, 10.0, t0));
    tracker.ingest_fix(fix(52.610008, 13.404954, 10.0, t0 + Duration::seconds(60)));

    let finding = tracker
        .movement_log()
        .iter()
        .find(|m| m.kind == SuspiciousMovementKind::ImpossibleSpeed)
        .expect("impossible speed finding");
    assert_eq!(finding.severity, Severity::Critical);
    assert!((finding.confidence - 0.95).abs() < 1e-9);
    // Critical findings surface as a user-facing alert.
    assert!(!alerts.is_empty());
}

#[test]
fn implausible_speed_band_flagged_high() {
    let (mut tracker, _alerts) = build_tracker("trk-band", Vec::new());
    let t0 = ts("2024-03-13T10:00:00Z");

    // ~2.5 km in 60 seconds, roughly 150 km/h: inside the 120-200 band.
    tracker.ingest_fix(fix(52.520008, 13.404954, 10.0, t0));
    tracker.ingest_fix(fix(52.542508, 13.404954, 10.0, t0 + Duration::seconds(60)));

    let finding = tracker
        .movement_log()
        .iter()
        .find(|m| m.kind == SuspiciousMovementKind::ImpossibleSpeed)
        .expect("speed finding");
    assert_eq!(finding.severity, Severity::High);
    assert!((finding.confidence - 0.8).abs() < 1e-9);
}

#[test]
fn teleportation_needs_distance_speed_and_bad_accuracy() {
    let (mut tracker, _alerts) = build_tracker("trk-tele", Vec::new());
    let t0 = ts("2024-03-13T10:00:00Z");

    // 1.5 km in 30 s with 150 m accuracy.
    tracker.ingest_fix(fix(52.520008, 13.404954, 10.0, t0));
    tracker.ingest_fix(fix(52.533508, 13.404954, 150.0, t0 + Duration::seconds(30)));

    assert!(tracker
        .movement_log()
        .iter()
        .any(|m| m.kind == SuspiciousMovementKind::Teleportation));

    // Same jump with good accuracy is speed-flagged but not teleportation.
    let (mut tracker2, _alerts2) = build_tracker("trk-tele2", Vec::new());
    tracker2.ingest_fix(fix(52.520008, 13.404954, 10.0, t0));
    tracker2.ingest_fix(fix(52.533508, 13.404954, 10.0, t0 + Duration::seconds(30)));
    assert!(!tracker2
        .movement_log()
        .iter()
        .any(|m| m.kind == SuspiciousMovementKind::Teleportation));
}

#[test]
fn unrealistic_precision_reads_as_spoofing() {
    let (mut tracker, _alerts) = build_tracker("trk-precise", Vec::new());
    tracker.ingest_fix(fix(52.520008, 13.404954, 0.5, ts("2024-03-13T10:00:00Z")));

    assert!(tracker
        .movement_log()
        .iter()
        .any(|m| m.kind == SuspiciousMovementKind::GpsSpoofing));
}

#[test]
fn truncated_coordinates_read_as_spoofing() {
    let (mut tracker, _alerts) = build_tracker("trk-trunc", Vec::new());
    tracker.ingest_fix(fix(52.52, 13.4, 10.0, ts("2024-03-13T10:00:00Z")));

    assert!(tracker
        .movement_log()
        .iter()
        .any(|m| m.kind == SuspiciousMovementKind::GpsSpoofing));
}

#[test]
fn missing_reported_speed_while_moving_reads_as_spoofing() {
    let (mut tracker, _alerts) = build_tracker("trk-nospeed", Vec::new());
    let t0 = ts("2024-03-13T10:00:00Z");

    // ~100 m in 10 s, no reported speed.
    let mut first = fix(52.520008, 13.404954, 10.0, t0);
    first.speed_mps = None;
    let mut second = fix(52.520908, 13.404954, 10.0, t0 + Duration::seconds(10));
    second.speed_mps = None;

    tracker.ingest_fix(first);
    tracker.ingest_fix(second);

    assert!(tracker
        .movement_log()
        .iter()
        .any(|m| m.kind == SuspiciousMovementKind::GpsSpoofing));
}

#[test]
fn repeated_exact_coordinate_flags_on_sixth_fix() {
    let (mut tracker, _alerts) = build_tracker("trk-repeat", Vec::new());
    let t0 = ts("2024-03-13T10:00:00Z");

    for i in 0..5 {
        tracker.ingest_fix(fix(
            52.520008,
            13.404954,
            10.0,
            t0 + Duration::seconds(60 * i),
        ));
        assert!(
            !tracker
                .movement_log()
                .iter()
                .any(|m| m.kind == SuspiciousMovementKind::LocationJumping),
            "must not flag before the sixth identical fix"
        );
    }
    tracker.ingest_fix(fix(52.520008, 13.404954, 10.0, t0 + Duration::seconds(300)));

    let finding = tracker
        .movement_log()
        .iter()
        .find(|m| m.kind == SuspiciousMovementKind::LocationJumping)
        .expect("repetition finding");
    assert_eq!(finding.severity, Severity::Medium);
}

#[test]
fn history_keeps_newest_thousand_fifo() {
    let mut history = LocationHistory::with_capacity(1000);
    let t0 = ts("2024-03-13T00:00:00Z");
    for i in 0..1500i64 {
        let recorded = history.record(fix(
            52.520008 + i as f64 * 1e-6,
            13.404954,
            10.0,
            t0 + Duration::seconds(i),
        ));
        assert!(recorded);
    }

    assert_eq!(history.len(), 1000);
    // The earliest 500 were evicted: the oldest survivor is fix #500.
    let oldest = history.iter().next().expect("oldest");
    assert_eq!(oldest.timestamp, t0 + Duration::seconds(500));
}

#[test]
fn out_of_order_fix_is_rejected() {
    let mut history = LocationHistory::with_capacity(10);
    let t0 = ts("2024-03-13T10:00:00Z");
    assert!(history.record(fix(52.520008, 13.404954, 10.0, t0)));
    assert!(!history.record(fix(
        52.520108,
        13.404954,
        10.0,
        t0 - Duration::seconds(30)
    )));
    assert_eq!(history.len(), 1);
}

#[test]
fn streamed_fixes_drain_through_the_tracker() {
    let t0 = ts("2024-03-13T10:00:00Z");
    let fixes = vec![
        fix(52.520008, 13.404954, 10.0, t0),
        fix(52.520108, 13.404954, 10.0, t0 + Duration::seconds(60)),
        fix(52.520208, 13.404954, 10.0, t0 + Duration::seconds(120)),
    ];
    let (mut tracker, _alerts) = build_tracker("trk-stream", fixes);

    tracker.start_tracking(TrackingOptions::default()).expect("start");
    let events = tracker.process_pending();
    assert_eq!(tracker.history().len(), 3);
    // Slow walking fixes produce no detections.
    assert!(events.is_empty());

    tracker.stop_tracking();
    assert!(!tracker.is_tracking());
    // Idempotent.
    tracker.stop_tracking();
}

#[test]
fn tracking_requires_permission() {
    let store = TelemetryStore::shared_memory("trk-perm").expect("store");
    store.migrate().expect("migrate");
    let mut tracker = LocationTracker::new(
        Box::new(ScriptedLocationSource::without_permission()),
        store,
        Arc::new(BufferedAlertSink::new()),
        &EngineConfig::default(),
    );

    match tracker.start_tracking(TrackingOptions::default()) {
        Err(EngineError::PermissionDenied { .. }) => {}
        other => panic!("expected PermissionDenied, got {other:?}"),
    }
    assert!(!tracker.is_tracking());
}

#[test]
fn failed_fix_leaves_history_untouched() {
    let (mut tracker, _alerts) = build_tracker("trk-fail", Vec::new());

    match tracker.current_location() {
        Err(EngineError::LocationUnavailable { .. }) => {}
        other => panic!("expected LocationUnavailable, got {other:?}"),
    }
    assert!(tracker.history().is_empty());
}

#[test]
fn double_start_is_rejected() {
    let (mut tracker, _alerts) = build_tracker("trk-double", Vec::new());
    tracker.start_tracking(TrackingOptions::default()).expect("start");
    match tracker.start_tracking(TrackingOptions::default()) {
        Err(EngineError::TrackingAlreadyActive) => {}
        other => panic!("expected TrackingAlreadyActive, got {other:?}"),
    }
}
