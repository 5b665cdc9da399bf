//! Geofence membership and transition tests.

use chrono::{DateTime, Duration, Utc};
use fieldguard_core::{
    config::EngineConfig,
    event::{BufferedAlertSink, EngineEvent},
    geofence::{GeofenceArea, GeofenceKind},
    location::LocationPoint,
    store::TelemetryStore,
    tracker::{LocationTracker, ScriptedLocationSource},
};
use std::sync::Arc;

fn ts(s: &str) -> DateTime<Utc> {
    s.parse().expect("timestamp literal")
}

fn fix(lat: f64, lon: f64, at: DateTime<Utc>) -> LocationPoint {
    LocationPoint {
        latitude: lat,
        longitude: lon,
        accuracy_m: 10.0,
        timestamp: at,
        speed_mps: Some(1.5),
        heading_deg: None,
    }
}

fn fence(id: &str, lat: f64, lon: f64, radius_m: f64, kind: GeofenceKind) -> GeofenceArea {
    GeofenceArea {
        id: id.to_string(),
        name: format!("{id} area"),
        center_latitude: lat,
        center_longitude: lon,
        radius_m,
        kind,
    }
}

fn build_tracker(tag: &str) -> (LocationTracker, Arc<BufferedAlertSink>, TelemetryStore) {
    let store = TelemetryStore::shared_memory(tag).expect("store");
    store.migrate().expect("migrate");
    let alerts = Arc::new(BufferedAlertSink::new());
    let tracker = LocationTracker::new(
        Box::new(ScriptedLocationSource::new(Vec::new())),
        store.reopen().expect("reopen"),
        alerts.clone(),
        &EngineConfig::default(),
    );
    (tracker, alerts, store)
}

fn enter_events(events: &[EngineEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, EngineEvent::GeofenceEntered { .. }))
        .count()
}

fn exit_events(events: &[EngineEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, EngineEvent::GeofenceExited { .. }))
        .count()
}

#[test]
fn repeated_inside_fix_enters_exactly_once() {
    let (mut tracker, _alerts, _store) = build_tracker("geo-once");
    tracker
        .register_geofence(fence("wh-1", 52.520008, 13.404954, 200.0, GeofenceKind::Warehouse))
        .expect("register");

    let t0 = ts("2024-03-13T10:00:00Z");
    let mut events = tracker.ingest_fix(fix(52.520008, 13.404954, t0));
    events.extend(tracker.ingest_fix(fix(52.520008, 13.404954, t0 + Duration::seconds(60))));

    assert_eq!(enter_events(&events), 1, "one crossing, one ENTER");
    assert_eq!(exit_events(&events), 0);
}

#[test]
fn crossing_out_and_back_fires_each_transition_once() {
    let (mut tracker, _alerts, _store) = build_tracker("geo-cross");
    tracker
        .register_geofence(fence("cu-7", 52.520008, 13.404954, 200.0, GeofenceKind::Customer))
        .expect("register");

    let t0 = ts("2024-03-13T10:00:00Z");
    let mut events = tracker.ingest_fix(fix(52.520008, 13.404954, t0));
    // ~1.1 km north: well outside the 200 m radius.
    events.extend(tracker.ingest_fix(fix(
        52.530008,
        13.404954,
        t0 + Duration::seconds(600),
    )));
    events.extend(tracker.ingest_fix(fix(
        52.520008,
        13.404954,
        t0 + Duration::seconds(1200),
    )));

    assert_eq!(enter_events(&events), 2);
    assert_eq!(exit_events(&events), 1);
}

#[test]
fn restricted_entry_raises_an_alert_and_security_issue() {
    let (mut tracker, alerts, store) = build_tracker("geo-restricted");
    tracker
        .register_geofence(fence(
            "rz-1",
            52.520008,
            13.404954,
            150.0,
            GeofenceKind::Restricted,
        ))
        .expect("register");

    tracker.ingest_fix(fix(52.520008, 13.404954, ts("2024-03-13T10:00:00Z")));

    assert!(!alerts.is_empty(), "restricted entry must alert");
    let issues = store.security_issues(10).expect("issues");
    assert!(issues.iter().any(|i| i.title.contains("Restricted")));
}

#[test]
fn membership_survives_a_tracker_restart() {
    let t0 = ts("2024-03-13T10:00:00Z");
    let (mut tracker, _alerts, store) = build_tracker("geo-restart");
    tracker
        .register_geofence(fence("of-1", 52.520008, 13.404954, 200.0, GeofenceKind::Office))
        .expect("register");
    let events = tracker.ingest_fix(fix(52.520008, 13.404954, t0));
    assert_eq!(enter_events(&events), 1);
    drop(tracker);

    // New tracker over the same database: still inside, so no second ENTER.
    let alerts = Arc::new(BufferedAlertSink::new());
    let mut revived = LocationTracker::new(
        Box::new(ScriptedLocationSource::new(Vec::new())),
        store.reopen().expect("reopen"),
        alerts,
        &EngineConfig::default(),
    );
    revived.load_persisted().expect("load");
    assert_eq!(revived.geofences().len(), 1);

    let events = revived.ingest_fix(fix(52.520008, 13.404954, t0 + Duration::seconds(60)));
    assert_eq!(enter_events(&events), 0, "persisted membership suppresses re-ENTER");
}

#[test]
fn removing_a_geofence_clears_its_state() {
    let (mut tracker, _alerts, _store) = build_tracker("geo-remove");
    tracker
        .register_geofence(fence("wh-9", 52.520008, 13.404954, 200.0, GeofenceKind::Warehouse))
        .expect("register");
    tracker.ingest_fix(fix(52.520008, 13.404954, ts("2024-03-13T10:00:00Z")));

    assert!(tracker.remove_geofence(&"wh-9".to_string()).expect("remove"));
    assert!(tracker.geofences().is_empty());
    assert!(!tracker.remove_geofence(&"wh-9".to_string()).expect("second remove"));
}
