//! Engine events and the user-facing alert hook.
//!
//! RULE: components surface findings ONLY through events and the alert
//! sink. No component renders UI or blocks a business action; the host
//! decides what to do with each event.

use crate::{
    geofence::GeofenceKind,
    location::SuspiciousMovement,
    scorer::RiskLevel,
    types::{AgentId, GeofenceId, Severity},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use uuid::Uuid;

/// Every event the engine emits to the host.
/// Variants are added as features land, never removed or reordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    GeofenceEntered {
        geofence_id: GeofenceId,
        name: String,
        kind: GeofenceKind,
        at: DateTime<Utc>,
    },
    GeofenceExited {
        geofence_id: GeofenceId,
        name: String,
        kind: GeofenceKind,
        at: DateTime<Utc>,
    },
    SuspiciousMovementDetected {
        movement: SuspiciousMovement,
    },
    DeviceIdentityChanged {
        previous_id: String,
        current_id: String,
    },
    DeviceTamperSuspected {
        reason: String,
    },
    FraudCheckCompleted {
        check_id: Uuid,
        agent_id: AgentId,
        risk_level: RiskLevel,
        risk_score: f64,
    },
}

/// A persisted security finding: suspicious movement, device swap, tamper.
/// Append-only, bounded in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityIssue {
    pub id: Uuid,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub recorded_at: DateTime<Utc>,
}

/// What the alert hook receives. Rendering is the host's concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub title: String,
    pub description: String,
}

/// Host-supplied callback for High/Critical findings.
pub trait AlertSink: Send + Sync {
    fn notify(&self, alert: &Alert);
}

/// Sink that drops every alert. Hosts without a UI surface use this.
pub struct NullAlertSink;

impl AlertSink for NullAlertSink {
    fn notify(&self, _alert: &Alert) {}
}

/// Sink that buffers alerts in memory. Used by tests and the replay tool.
#[derive(Default)]
pub struct BufferedAlertSink {
    alerts: Mutex<Vec<Alert>>,
}

impl BufferedAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<Alert> {
        std::mem::take(&mut self.alerts.lock().expect("alert buffer poisoned"))
    }

    pub fn len(&self) -> usize {
        self.alerts.lock().expect("alert buffer poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AlertSink for BufferedAlertSink {
    fn notify(&self, alert: &Alert) {
        self.alerts
            .lock()
            .expect("alert buffer poisoned")
            .push(alert.clone());
    }
}
