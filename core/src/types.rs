//! Shared primitive types used across the entire engine.

use serde::{Deserialize, Serialize};

/// A stable, unique identifier for a field agent.
pub type AgentId = String;

/// A stable, unique identifier for a registered geofence.
pub type GeofenceId = String;

/// Severity attached to every fraud flag and security finding.
/// Ordering matters: aggregation compares severities, so the derive
/// order (Low < Medium < High < Critical) must never change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}
