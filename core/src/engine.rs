//! The engine facade: explicit wiring and lifecycle for the whole
//! location-integrity stack.
//!
//! RULES:
//!   - No global singletons. The host constructs one FieldGuard, passes it
//!     around, and tears it down explicitly.
//!   - Each component owns its own store connection (reopen of the same
//!     database) and its own buffers; nothing mutates another component's
//!     state directly.
//!   - The scorer only ever sees read-only views of the tracker's history
//!     and the monitor's movement summary.

use crate::{
    config::EngineConfig,
    error::EngineResult,
    event::{Alert, AlertSink, EngineEvent, SecurityIssue},
    fingerprint::{DeviceCheck, DeviceInfoSource, FingerprintCollector},
    scorer::{CheckContext, FraudCheckInput, FraudCheckResult, FraudRiskScorer},
    sensor::SensorStreamMonitor,
    store::TelemetryStore,
    tracker::{LocationSource, LocationTracker},
    types::Severity,
};
use std::sync::Arc;
use uuid::Uuid;

pub struct FieldGuard {
    store: TelemetryStore,
    pub monitor: SensorStreamMonitor,
    pub tracker: LocationTracker,
    collector: FingerprintCollector,
    scorer: FraudRiskScorer,
    alerts: Arc<dyn AlertSink>,
    config: EngineConfig,
    device: Option<DeviceCheck>,
    initialized: bool,
}

impl FieldGuard {
    /// Wire a fully assembled engine. Every component gets its own
    /// connection to the same database.
    pub fn new(
        store: TelemetryStore,
        location_source: Box<dyn LocationSource>,
        device_info: Box<dyn DeviceInfoSource>,
        alerts: Arc<dyn AlertSink>,
        config: EngineConfig,
    ) -> EngineResult<Self> {
        store.migrate()?;
        let tracker = LocationTracker::new(
            location_source,
            store.reopen()?,
            Arc::clone(&alerts),
            &config,
        );
        let collector = FingerprintCollector::new(device_info, store.reopen()?);
        let scorer = FraudRiskScorer::new(store.reopen()?, &config);
        let monitor = SensorStreamMonitor::with_threshold(config.buffers.stationary_threshold);
        Ok(Self {
            store,
            monitor,
            tracker,
            collector,
            scorer,
            alerts,
            config,
            device: None,
            initialized: false,
        })
    }

    /// Startup pass: restore persisted tracker state, collect the device
    /// fingerprint, and run the integrity sweep. Identity-change and
    /// tamper findings are recorded and alerted here, once.
    ///
    /// Storage failures degrade to in-memory state and missing device
    /// evidence; only permission failures are terminal, and those surface
    /// from start_tracking, not here.
    pub fn init(&mut self) -> EngineResult<Vec<EngineEvent>> {
        if let Err(e) = self.tracker.load_persisted() {
            log::warn!("could not restore tracker state: {e}");
        }

        let check = match self.collector.collect() {
            Ok(check) => check,
            Err(e) => {
                log::warn!("fingerprint collection failed: {e}");
                self.initialized = true;
                return Ok(Vec::new());
            }
        };
        let mut events = Vec::new();

        if check.identity_changed {
            let previous = check
                .previous_device_id
                .clone()
                .unwrap_or_else(|| "unknown".to_string());
            self.record_device_issue(
                Severity::Critical,
                "Device identity changed".to_string(),
                format!(
                    "Registered device {previous} replaced by {}",
                    check.fingerprint.device_id
                ),
            );
            events.push(EngineEvent::DeviceIdentityChanged {
                previous_id: previous,
                current_id: check.fingerprint.device_id.clone(),
            });
        }
        if check.tamper_suspected {
            let reason = check.tamper_reasons.join(", ");
            self.record_device_issue(
                Severity::High,
                "Device tampering suspected".to_string(),
                reason.clone(),
            );
            events.push(EngineEvent::DeviceTamperSuspected { reason });
        }

        self.device = Some(check);
        self.initialized = true;
        log::info!("engine initialized");
        Ok(events)
    }

    /// Score one activity event against everything the engine knows.
    pub fn check_activity(&self, input: &FraudCheckInput) -> FraudCheckResult {
        let ctx = CheckContext {
            movement: self.monitor.recent_movement(self.config.buffers.movement_window),
            device: self.device.as_ref(),
            history: Some(self.tracker.history()),
        };
        let result = self.scorer.check(input, &ctx);
        log::info!(
            "fraud check {}: agent={} activity={} level={} score={:.1}",
            result.check_id,
            result.agent_id,
            result.activity.label(),
            result.risk_level.label(),
            result.risk_score
        );
        result
    }

    /// The device integrity findings from the startup sweep.
    pub fn device_check(&self) -> Option<&DeviceCheck> {
        self.device.as_ref()
    }

    pub fn scorer(&self) -> &FraudRiskScorer {
        &self.scorer
    }

    /// Recent persisted security findings, newest last.
    pub fn security_issues(&self, limit: usize) -> EngineResult<Vec<SecurityIssue>> {
        self.store.security_issues(limit)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Stop tracking and release the location subscription. Idempotent.
    pub fn shutdown(&mut self) {
        self.tracker.stop_tracking();
        self.initialized = false;
        log::info!("engine shut down");
    }

    fn record_device_issue(&self, severity: Severity, title: String, description: String) {
        let issue = SecurityIssue {
            id: Uuid::new_v4(),
            severity,
            title: title.clone(),
            description: description.clone(),
            recorded_at: chrono::Utc::now(),
        };
        if let Err(e) = self
            .store
            .append_security_issue(&issue, self.config.buffers.security_log_capacity)
        {
            log::warn!("failed to persist device security issue: {e}");
        }
        self.alerts.notify(&Alert { title, description });
    }
}
