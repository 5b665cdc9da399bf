//! Location acquisition, history, suspicious-movement detection, and
//! geofence evaluation.
//!
//! Fixes arrive from the platform through a channel and are drained by a
//! single consumer, so no two fixes are ever processed concurrently. Each
//! fix runs the same fixed pipeline: order check, movement detection
//! against the immediately preceding fix, history append, geofence
//! transitions, persistence.
//!
//! Detection-layer storage failures are logged and the cycle continues on
//! in-memory state; they never halt the pipeline.

use crate::{
    config::{DetectionConfig, EngineConfig},
    error::{EngineError, EngineResult},
    event::{Alert, AlertSink, EngineEvent, SecurityIssue},
    geo,
    geofence::{GeofenceArea, GeofenceKind},
    location::{
        LocationHistory, LocationPoint, MovementEvidence, SuspiciousMovement,
        SuspiciousMovementKind,
    },
    store::TelemetryStore,
    types::{GeofenceId, Severity},
};
use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccuracyTier {
    High,
    Balanced,
    LowPower,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TrackingOptions {
    pub accuracy: AccuracyTier,
    pub min_interval_ms: u64,
    pub min_distance_m: f64,
}

impl Default for TrackingOptions {
    fn default() -> Self {
        Self {
            accuracy: AccuracyTier::High,
            min_interval_ms: 5_000,
            min_distance_m: 10.0,
        }
    }
}

/// Platform location provider. The host wires the real GPS bindings;
/// tests and the replay tool use [`ScriptedLocationSource`].
pub trait LocationSource: Send {
    fn permission_granted(&self) -> bool;

    /// One high-accuracy fix, blocking until acquired or failed.
    fn current_fix(&mut self) -> EngineResult<LocationPoint>;

    /// Begin delivering fixes into `sink` until stopped. Implementations
    /// must drop their copy of the sender on stop so the subscription
    /// never leaks.
    fn start_stream(
        &mut self,
        options: &TrackingOptions,
        sink: Sender<LocationPoint>,
    ) -> EngineResult<()>;

    /// Must be safe to call at any time, any number of times.
    fn stop_stream(&mut self);
}

/// Deterministic source fed from a queue. `current_fix` pops the queue;
/// `start_stream` flushes the remaining queue into the sink and then keeps
/// accepting fixes through the [`FixFeeder`].
pub struct ScriptedLocationSource {
    queue: VecDeque<LocationPoint>,
    permission: bool,
    sink: Arc<Mutex<Option<Sender<LocationPoint>>>>,
}

impl ScriptedLocationSource {
    pub fn new(fixes: Vec<LocationPoint>) -> Self {
        Self {
            queue: fixes.into(),
            permission: true,
            sink: Arc::new(Mutex::new(None)),
        }
    }

    /// A source that simulates a revoked location permission.
    pub fn without_permission() -> Self {
        let mut source = Self::new(Vec::new());
        source.permission = false;
        source
    }

    /// Handle for pushing fixes into a live stream from outside.
    pub fn feeder(&self) -> FixFeeder {
        FixFeeder(Arc::clone(&self.sink))
    }
}

impl LocationSource for ScriptedLocationSource {
    fn permission_granted(&self) -> bool {
        self.permission
    }

    fn current_fix(&mut self) -> EngineResult<LocationPoint> {
        self.queue
            .pop_front()
            .ok_or_else(|| EngineError::LocationUnavailable {
                reason: "no scripted fix queued".to_string(),
            })
    }

    fn start_stream(
        &mut self,
        _options: &TrackingOptions,
        sink: Sender<LocationPoint>,
    ) -> EngineResult<()> {
        for fix in self.queue.drain(..) {
            // Receiver still held by the tracker at this point.
            let _ = sink.send(fix);
        }
        *self.sink.lock().expect("scripted sink poisoned") = Some(sink);
        Ok(())
    }

    fn stop_stream(&mut self) {
        *self.sink.lock().expect("scripted sink poisoned") = None;
    }
}

/// Pushes fixes into a streaming [`ScriptedLocationSource`].
#[derive(Clone)]
pub struct FixFeeder(Arc<Mutex<Option<Sender<LocationPoint>>>>);

impl FixFeeder {
    /// Returns false when no stream is active.
    pub fn send(&self, fix: LocationPoint) -> bool {
        match self.0.lock().expect("scripted sink poisoned").as_ref() {
            Some(tx) => tx.send(fix).is_ok(),
            None => false,
        }
    }
}

/// Evaluate one fix against the immediately preceding one.
///
/// `identical_occurrences` counts how many fixes in history (including
/// this one) share the exact coordinate pair.
pub fn detect_movement_anomalies(
    prev: Option<&LocationPoint>,
    curr: &LocationPoint,
    identical_occurrences: usize,
    cfg: &DetectionConfig,
) -> Vec<SuspiciousMovement> {
    let mut findings = Vec::new();

    let mut computed_speed_mps = 0.0;
    if let Some(prev) = prev {
        let distance_m = prev.distance_m(curr);
        let elapsed_s = curr.seconds_since(prev);
        if elapsed_s > 0.0 {
            computed_speed_mps = distance_m / elapsed_s;

            if computed_speed_mps > cfg.impossible_speed_mps {
                findings.push(SuspiciousMovement {
                    id: Uuid::new_v4(),
                    kind: SuspiciousMovementKind::ImpossibleSpeed,
                    severity: Severity::Critical,
                    detected_at: curr.timestamp,
                    description: format!(
                        "Movement at {:.0} km/h exceeds the physical limit",
                        computed_speed_mps * 3.6
                    ),
                    evidence: MovementEvidence::Speed {
                        speed_mps: computed_speed_mps,
                        distance_m,
                        elapsed_s,
                    },
                    confidence: 0.95,
                });
            } else if computed_speed_mps >= cfg.high_speed_mps {
                findings.push(SuspiciousMovement {
                    id: Uuid::new_v4(),
                    kind: SuspiciousMovementKind::ImpossibleSpeed,
                    severity: Severity::High,
                    detected_at: curr.timestamp,
                    description: format!(
                        "Movement at {:.0} km/h is implausible for a field agent",
                        computed_speed_mps * 3.6
                    ),
                    evidence: MovementEvidence::Speed {
                        speed_mps: computed_speed_mps,
                        distance_m,
                        elapsed_s,
                    },
                    confidence: 0.8,
                });
            }

            if distance_m > cfg.teleport_distance_m
                && elapsed_s < cfg.teleport_window_s
                && curr.accuracy_m > cfg.teleport_min_accuracy_m
            {
                findings.push(SuspiciousMovement {
                    id: Uuid::new_v4(),
                    kind: SuspiciousMovementKind::Teleportation,
                    severity: Severity::High,
                    detected_at: curr.timestamp,
                    description: format!(
                        "Jumped {distance_m:.0} m in {elapsed_s:.0} s with {:.0} m accuracy",
                        curr.accuracy_m
                    ),
                    evidence: MovementEvidence::Jump {
                        distance_m,
                        elapsed_s,
                        accuracy_m: curr.accuracy_m,
                    },
                    confidence: 0.85,
                });
            }
        }
    }

    let lat_decimals = geo::decimal_precision(curr.latitude, cfg.min_coordinate_decimals);
    let lon_decimals = geo::decimal_precision(curr.longitude, cfg.min_coordinate_decimals);
    let coordinate_decimals = lat_decimals.min(lon_decimals);

    let too_precise = curr.accuracy_m < cfg.spoof_accuracy_floor_m;
    let speed_missing_while_moving =
        computed_speed_mps > cfg.spoof_speed_floor_mps && curr.speed_mps.is_none();
    let truncated_coordinates = coordinate_decimals < cfg.min_coordinate_decimals;

    if too_precise || speed_missing_while_moving || truncated_coordinates {
        let description = if too_precise {
            format!(
                "Reported accuracy {:.2} m is too precise for a real receiver",
                curr.accuracy_m
            )
        } else if speed_missing_while_moving {
            format!(
                "Device moving at {:.1} m/s but the receiver reports no speed",
                computed_speed_mps
            )
        } else {
            format!("Coordinates carry only {coordinate_decimals} decimal digit(s)")
        };
        findings.push(SuspiciousMovement {
            id: Uuid::new_v4(),
            kind: SuspiciousMovementKind::GpsSpoofing,
            severity: Severity::High,
            detected_at: curr.timestamp,
            description,
            evidence: MovementEvidence::Spoofing {
                accuracy_m: curr.accuracy_m,
                reported_speed_mps: curr.speed_mps,
                computed_speed_mps,
                coordinate_decimals,
            },
            confidence: 0.75,
        });
    }

    if identical_occurrences > cfg.repeat_fix_threshold {
        findings.push(SuspiciousMovement {
            id: Uuid::new_v4(),
            kind: SuspiciousMovementKind::LocationJumping,
            severity: Severity::Medium,
            detected_at: curr.timestamp,
            description: format!(
                "Exact coordinate repeated {identical_occurrences} times"
            ),
            evidence: MovementEvidence::Repetition {
                occurrences: identical_occurrences,
                latitude: curr.latitude,
                longitude: curr.longitude,
            },
            confidence: 0.6,
        });
    }

    findings
}

pub struct LocationTracker {
    source: Box<dyn LocationSource>,
    store: TelemetryStore,
    alerts: Arc<dyn AlertSink>,
    detection: DetectionConfig,
    security_log_capacity: usize,
    history: LocationHistory,
    geofences: Vec<GeofenceArea>,
    geofence_state: HashMap<GeofenceId, bool>,
    movement_log: Vec<SuspiciousMovement>,
    rx: Option<Receiver<LocationPoint>>,
    tracking: bool,
}

impl LocationTracker {
    pub fn new(
        source: Box<dyn LocationSource>,
        store: TelemetryStore,
        alerts: Arc<dyn AlertSink>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            source,
            store,
            alerts,
            detection: config.detection.clone(),
            security_log_capacity: config.buffers.security_log_capacity,
            history: LocationHistory::with_capacity(config.buffers.history_capacity),
            geofences: Vec::new(),
            geofence_state: HashMap::new(),
            movement_log: Vec::new(),
            rx: None,
            tracking: false,
        }
    }

    /// Restore history, geofences, and per-geofence membership from the
    /// store. Called once at engine init.
    pub fn load_persisted(&mut self) -> EngineResult<()> {
        let capacity = self.history.capacity();
        self.history = LocationHistory::restore(capacity, self.store.location_history()?);
        self.geofences = self.store.geofences()?;
        for fence in &self.geofences {
            if let Some(inside) = self.store.geofence_status(&fence.id)? {
                self.geofence_state.insert(fence.id.clone(), inside);
            }
        }
        log::info!(
            "tracker restored: {} fixes, {} geofences",
            self.history.len(),
            self.geofences.len()
        );
        Ok(())
    }

    pub fn history(&self) -> &LocationHistory {
        &self.history
    }

    pub fn movement_log(&self) -> &[SuspiciousMovement] {
        &self.movement_log
    }

    pub fn geofences(&self) -> &[GeofenceArea] {
        &self.geofences
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    // ── Geofence registry ──────────────────────────────────────

    pub fn register_geofence(&mut self, area: GeofenceArea) -> EngineResult<()> {
        self.geofences.retain(|g| g.id != area.id);
        self.geofences.push(area);
        self.store.save_geofences(&self.geofences)
    }

    pub fn remove_geofence(&mut self, id: &GeofenceId) -> EngineResult<bool> {
        let before = self.geofences.len();
        self.geofences.retain(|g| g.id != *id);
        if self.geofences.len() == before {
            return Ok(false);
        }
        self.geofence_state.remove(id);
        self.store.clear_geofence_status(id)?;
        self.store.save_geofences(&self.geofences)?;
        Ok(true)
    }

    // ── Acquisition ────────────────────────────────────────────

    /// One high-accuracy fix. A failed acquisition surfaces the error and
    /// leaves the history untouched.
    pub fn current_location(&mut self) -> EngineResult<LocationPoint> {
        let fix = self.source.current_fix()?;
        self.history.record(fix);
        self.persist_history();
        Ok(fix)
    }

    pub fn start_tracking(&mut self, options: TrackingOptions) -> EngineResult<()> {
        if !self.source.permission_granted() {
            return Err(EngineError::PermissionDenied {
                what: "location".to_string(),
            });
        }
        if self.tracking {
            return Err(EngineError::TrackingAlreadyActive);
        }
        let (tx, rx) = mpsc::channel();
        self.source.start_stream(&options, tx)?;
        self.rx = Some(rx);
        self.tracking = true;
        log::info!("tracking started: {options:?}");
        Ok(())
    }

    /// Idempotent. Safe to call at any time, including while fixes are
    /// still queued; the source subscription is released.
    pub fn stop_tracking(&mut self) {
        if self.tracking {
            log::info!("tracking stopped");
        }
        self.source.stop_stream();
        self.rx = None;
        self.tracking = false;
    }

    /// Drain and process every queued fix. The single-consumer loop the
    /// platform callbacks feed into.
    pub fn process_pending(&mut self) -> Vec<EngineEvent> {
        let mut pending = Vec::new();
        if let Some(rx) = &self.rx {
            while let Ok(fix) = rx.try_recv() {
                pending.push(fix);
            }
        }
        let mut events = Vec::new();
        for fix in pending {
            events.extend(self.ingest_fix(fix));
        }
        events
    }

    /// Process one delivered fix: movement detection, history append,
    /// geofence transitions, persistence.
    pub fn ingest_fix(&mut self, fix: LocationPoint) -> Vec<EngineEvent> {
        if let Some(last) = self.history.latest() {
            if fix.timestamp < last.timestamp {
                log::debug!("dropping out-of-order fix at {}", fix.timestamp);
                return Vec::new();
            }
        }

        let mut events = Vec::new();

        let occurrences = self.history.identical_count(fix.latitude, fix.longitude) + 1;
        let findings = detect_movement_anomalies(
            self.history.latest(),
            &fix,
            occurrences,
            &self.detection,
        );

        self.history.record(fix);

        for finding in findings {
            self.report_movement(&finding);
            events.push(EngineEvent::SuspiciousMovementDetected { movement: finding.clone() });
            self.movement_log.push(finding);
        }

        events.extend(self.evaluate_geofences(&fix));
        self.persist_history();
        events
    }

    fn report_movement(&self, finding: &SuspiciousMovement) {
        log::warn!(
            "suspicious movement: {} ({})",
            finding.kind.label(),
            finding.description
        );
        let issue = SecurityIssue {
            id: finding.id,
            severity: finding.severity,
            title: format!("Suspicious movement: {}", finding.kind.label()),
            description: finding.description.clone(),
            recorded_at: finding.detected_at,
        };
        if let Err(e) = self
            .store
            .append_security_issue(&issue, self.security_log_capacity)
        {
            log::warn!("failed to persist security issue: {e}");
        }
        if finding.severity >= Severity::High {
            self.alerts.notify(&Alert {
                title: issue.title,
                description: issue.description,
            });
        }
    }

    /// Transition detection per registered geofence. An ENTER fires only
    /// on outside->inside, an EXIT only on inside->outside; repeating the
    /// same membership is silent.
    fn evaluate_geofences(&mut self, fix: &LocationPoint) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        for fence in &self.geofences {
            let inside = fence.contains(fix);
            let was_inside = self
                .geofence_state
                .get(&fence.id)
                .copied()
                .unwrap_or(false);
            if inside == was_inside {
                continue;
            }
            self.geofence_state.insert(fence.id.clone(), inside);
            if let Err(e) = self.store.set_geofence_status(&fence.id, inside) {
                log::warn!("failed to persist geofence status for {}: {e}", fence.id);
            }
            if inside {
                log::info!("entered geofence {} ({})", fence.id, fence.name);
                if fence.kind == GeofenceKind::Restricted {
                    self.report_restricted_entry(fence, fix);
                }
                events.push(EngineEvent::GeofenceEntered {
                    geofence_id: fence.id.clone(),
                    name: fence.name.clone(),
                    kind: fence.kind,
                    at: fix.timestamp,
                });
            } else {
                log::info!("exited geofence {} ({})", fence.id, fence.name);
                events.push(EngineEvent::GeofenceExited {
                    geofence_id: fence.id.clone(),
                    name: fence.name.clone(),
                    kind: fence.kind,
                    at: fix.timestamp,
                });
            }
        }
        events
    }

    fn report_restricted_entry(&self, fence: &GeofenceArea, fix: &LocationPoint) {
        let issue = SecurityIssue {
            id: Uuid::new_v4(),
            severity: Severity::High,
            title: "Restricted area entered".to_string(),
            description: format!("Agent entered restricted geofence '{}'", fence.name),
            recorded_at: fix.timestamp,
        };
        if let Err(e) = self
            .store
            .append_security_issue(&issue, self.security_log_capacity)
        {
            log::warn!("failed to persist security issue: {e}");
        }
        self.alerts.notify(&Alert {
            title: issue.title,
            description: issue.description,
        });
    }

    fn persist_history(&self) {
        if let Err(e) = self.store.save_location_history(&self.history.snapshot()) {
            log::warn!("failed to persist location history: {e}");
        }
    }
}
