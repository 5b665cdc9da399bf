//! Motion-sensor stream monitor.
//!
//! Samples accelerometer, gyroscope, and magnetometer triplets into bounded
//! per-sensor rings and summarizes recent movement for the behavior
//! detector. A device with no sensor support simply never samples; empty
//! buffers read as "no evidence", never as a flag.

use crate::ring::Ring;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const SENSOR_BUFFER_CAPACITY: usize = 100;
pub const MOVEMENT_WINDOW: usize = 10;

/// Mean accelerometer magnitude below this (device-g units) reads as a
/// stationary device.
pub const STATIONARY_THRESHOLD: f64 = 1.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Accelerometer,
    Gyroscope,
    Magnetometer,
}

/// One axis-triplet sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub timestamp: DateTime<Utc>,
}

impl SensorSample {
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// Summary of the recent accelerometer window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovementSummary {
    pub is_stationary: bool,
    pub average_magnitude: f64,
    pub samples: usize,
}

pub struct SensorStreamMonitor {
    accelerometer: Ring<SensorSample>,
    gyroscope: Ring<SensorSample>,
    magnetometer: Ring<SensorSample>,
    stationary_threshold: f64,
}

impl SensorStreamMonitor {
    pub fn new() -> Self {
        Self::with_threshold(STATIONARY_THRESHOLD)
    }

    pub fn with_threshold(stationary_threshold: f64) -> Self {
        Self {
            accelerometer: Ring::with_capacity(SENSOR_BUFFER_CAPACITY),
            gyroscope: Ring::with_capacity(SENSOR_BUFFER_CAPACITY),
            magnetometer: Ring::with_capacity(SENSOR_BUFFER_CAPACITY),
            stationary_threshold,
        }
    }

    /// Append a sample to the matching ring. Oldest entries drop off once
    /// the ring holds SENSOR_BUFFER_CAPACITY samples.
    pub fn sample(&mut self, kind: SensorKind, sample: SensorSample) {
        self.ring_mut(kind).push(sample);
    }

    pub fn sample_count(&self, kind: SensorKind) -> usize {
        self.ring(kind).len()
    }

    /// Mean Euclidean magnitude of the last `window` accelerometer samples.
    /// Returns None when no samples exist: no evidence either way.
    pub fn recent_movement(&self, window: usize) -> Option<MovementSummary> {
        if self.accelerometer.is_empty() {
            return None;
        }
        let mut sum = 0.0;
        let mut count = 0usize;
        for s in self.accelerometer.recent(window) {
            sum += s.magnitude();
            count += 1;
        }
        let average_magnitude = sum / count as f64;
        Some(MovementSummary {
            is_stationary: average_magnitude < self.stationary_threshold,
            average_magnitude,
            samples: count,
        })
    }

    fn ring(&self, kind: SensorKind) -> &Ring<SensorSample> {
        match kind {
            SensorKind::Accelerometer => &self.accelerometer,
            SensorKind::Gyroscope => &self.gyroscope,
            SensorKind::Magnetometer => &self.magnetometer,
        }
    }

    fn ring_mut(&mut self, kind: SensorKind) -> &mut Ring<SensorSample> {
        match kind {
            SensorKind::Accelerometer => &mut self.accelerometer,
            SensorKind::Gyroscope => &mut self.gyroscope,
            SensorKind::Magnetometer => &mut self.magnetometer,
        }
    }
}

impl Default for SensorStreamMonitor {
    fn default() -> Self {
        Self::new()
    }
}
