//! Location fixes, the bounded location history, and suspicious-movement
//! records.
//!
//! RULE: the history is owned exclusively by the tracker. Everything else
//! gets read-only views. A recorded fix is immutable.

use crate::{
    geo,
    ring::Ring,
    types::Severity,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single GPS fix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationPoint {
    pub latitude: f64,
    pub longitude: f64,
    /// Reported horizontal accuracy in meters.
    pub accuracy_m: f64,
    pub timestamp: DateTime<Utc>,
    /// Speed as reported by the receiver, if any. Absence on a moving
    /// device is itself a spoofing signal.
    pub speed_mps: Option<f64>,
    pub heading_deg: Option<f64>,
}

impl LocationPoint {
    pub fn distance_m(&self, other: &LocationPoint) -> f64 {
        geo::haversine_distance_m(self.latitude, self.longitude, other.latitude, other.longitude)
    }

    pub fn bearing_deg_to(&self, other: &LocationPoint) -> f64 {
        geo::initial_bearing_deg(self.latitude, self.longitude, other.latitude, other.longitude)
    }

    /// Seconds elapsed from `earlier` to this fix.
    pub fn seconds_since(&self, earlier: &LocationPoint) -> f64 {
        (self.timestamp - earlier.timestamp).num_milliseconds() as f64 / 1000.0
    }
}

/// Time-ordered, bounded fix history. Oldest entries are evicted FIFO.
#[derive(Debug, Clone)]
pub struct LocationHistory {
    ring: Ring<LocationPoint>,
}

impl LocationHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ring: Ring::with_capacity(capacity),
        }
    }

    /// Append a fix. Rejects fixes older than the newest entry so the
    /// history never goes out of timestamp order; returns whether the
    /// fix was recorded.
    pub fn record(&mut self, point: LocationPoint) -> bool {
        if let Some(last) = self.ring.latest() {
            if point.timestamp < last.timestamp {
                return false;
            }
        }
        self.ring.push(point);
        true
    }

    pub fn latest(&self) -> Option<&LocationPoint> {
        self.ring.latest()
    }

    /// The fix immediately preceding the newest one.
    pub fn previous(&self) -> Option<&LocationPoint> {
        self.ring.nth_latest(1)
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocationPoint> {
        self.ring.iter()
    }

    /// How many recorded fixes share this exact coordinate pair.
    /// Bitwise equality is intentional: repeated byte-identical fixes are
    /// the replay signature this check is after.
    pub fn identical_count(&self, latitude: f64, longitude: f64) -> usize {
        self.ring
            .iter()
            .filter(|p| p.latitude == latitude && p.longitude == longitude)
            .count()
    }

    /// Snapshot oldest to newest, for persistence.
    pub fn snapshot(&self) -> Vec<LocationPoint> {
        self.ring.to_vec()
    }

    /// Rebuild from a persisted snapshot. Out-of-order entries are dropped.
    pub fn restore(capacity: usize, points: Vec<LocationPoint>) -> Self {
        let mut history = Self::with_capacity(capacity);
        for p in points {
            history.record(p);
        }
        history
    }
}

/// Why a movement looked suspicious.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspiciousMovementKind {
    ImpossibleSpeed,
    Teleportation,
    GpsSpoofing,
    /// The source's "location clustering": the same exact coordinate
    /// repeating. Distinct from teleportation.
    LocationJumping,
}

impl SuspiciousMovementKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::ImpossibleSpeed => "impossible_speed",
            Self::Teleportation => "teleportation",
            Self::GpsSpoofing => "gps_spoofing",
            Self::LocationJumping => "location_jumping",
        }
    }
}

/// Concrete evidence behind a movement finding. One variant per detector
/// so consumers can match exhaustively instead of digging through an
/// untyped payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MovementEvidence {
    Speed {
        speed_mps: f64,
        distance_m: f64,
        elapsed_s: f64,
    },
    Jump {
        distance_m: f64,
        elapsed_s: f64,
        accuracy_m: f64,
    },
    Spoofing {
        accuracy_m: f64,
        reported_speed_mps: Option<f64>,
        computed_speed_mps: f64,
        coordinate_decimals: u32,
    },
    Repetition {
        occurrences: usize,
        latitude: f64,
        longitude: f64,
    },
}

/// One suspicious-movement finding. Append-only: entries are never mutated
/// after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuspiciousMovement {
    pub id: Uuid,
    pub kind: SuspiciousMovementKind,
    pub severity: Severity,
    pub detected_at: DateTime<Utc>,
    pub description: String,
    pub evidence: MovementEvidence,
    /// Detector confidence in [0, 1].
    pub confidence: f64,
}
