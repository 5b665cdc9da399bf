//! Engine configuration.
//!
//! Detection thresholds are deliberately config, not code: the clustering
//! and coordinate-precision heuristics are known false-positive risks, and
//! product wants to retune them without a release. Defaults reproduce the
//! shipped behavior exactly. Scoring weights and level boundaries are NOT
//! here; those are fixed constants in the scorer.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Above this computed speed the movement is physically impossible
    /// for a field agent (200 km/h).
    pub impossible_speed_mps: f64,
    /// Lower band of implausible speed (120 km/h).
    pub high_speed_mps: f64,
    /// Teleportation: minimum jump distance...
    pub teleport_distance_m: f64,
    /// ...within this many seconds...
    pub teleport_window_s: f64,
    /// ...with accuracy worse than this.
    pub teleport_min_accuracy_m: f64,
    /// Reported accuracy below this is too precise to be a real receiver.
    pub spoof_accuracy_floor_m: f64,
    /// Computed speed above which a missing reported-speed field is
    /// suspicious.
    pub spoof_speed_floor_mps: f64,
    /// Genuine fixes carry at least this many coordinate decimals.
    pub min_coordinate_decimals: u32,
    /// Identical (lat, lng) pairs tolerated in history before the
    /// repetition flag fires.
    pub repeat_fix_threshold: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            impossible_speed_mps: 55.56,
            high_speed_mps: 33.33,
            teleport_distance_m: 1000.0,
            teleport_window_s: 60.0,
            teleport_min_accuracy_m: 100.0,
            spoof_accuracy_floor_m: 1.0,
            spoof_speed_floor_mps: 1.0,
            min_coordinate_decimals: 4,
            repeat_fix_threshold: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Accuracy worse than this degrades the fix to a Medium flag.
    pub poor_accuracy_m: f64,
    /// Activity before this hour is High-severity off-hours.
    pub early_hour: u32,
    /// Activity after this hour is High-severity off-hours.
    pub late_hour: u32,
    /// Velocity window for the burst check, minutes.
    pub velocity_window_min: i64,
    /// Activities tolerated inside the velocity window.
    pub velocity_threshold: u32,
    /// Window for the repeated-submission check, minutes.
    pub similarity_window_min: i64,
    /// Near-identical activities tolerated inside the window.
    pub similarity_threshold: u32,
    /// Fraud audit log capacity (FIFO beyond this).
    pub audit_log_capacity: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            poor_accuracy_m: 100.0,
            early_hour: 6,
            late_hour: 22,
            velocity_window_min: 60,
            velocity_threshold: 10,
            similarity_window_min: 30,
            similarity_threshold: 5,
            audit_log_capacity: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    pub history_capacity: usize,
    pub movement_window: usize,
    pub stationary_threshold: f64,
    /// Security-issue log capacity (FIFO beyond this).
    pub security_log_capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            history_capacity: 1000,
            movement_window: 10,
            stationary_threshold: 1.2,
            security_log_capacity: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    pub fuel_price_per_litre: f64,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            fuel_price_per_litre: 1.60,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub detection: DetectionConfig,
    pub scoring: ScoringConfig,
    pub buffers: BufferConfig,
    pub route: RouteConfig,
}

impl EngineConfig {
    /// Load from a JSON file. Missing fields fall back to defaults, so a
    /// partial override file is fine.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        Ok(serde_json::from_str(&content)?)
    }
}
