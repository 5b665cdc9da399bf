//! Device identity fingerprinting and tamper heuristics.
//!
//! A fingerprint is a static snapshot taken once at process start. The
//! collector compares it against the last persisted snapshot to catch a
//! device swap, and inspects capabilities for tamper signals (emulators,
//! sensor-spoofing tooling). The snapshot is persisted as last-known after
//! every successful collection.

use crate::{
    error::EngineResult,
    sensor::SensorKind,
    store::TelemetryStore,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fewer motion sensors than this suggests a stripped-down emulator or
/// spoofing sandbox.
const MIN_MOTION_SENSORS: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceFingerprint {
    pub device_id: String,
    pub device_name: String,
    pub os_name: String,
    pub os_version: String,
    pub brand: String,
    pub model: String,
    pub is_physical_device: bool,
    pub available_sensors: Vec<SensorKind>,
    pub screen_width_px: u32,
    pub screen_height_px: u32,
    pub timezone: String,
    pub locale: String,
    pub collected_at: DateTime<Utc>,
}

impl DeviceFingerprint {
    pub fn motion_sensor_count(&self) -> usize {
        self.available_sensors.len()
    }
}

/// Platform facts supplier. The host wires the real platform bindings;
/// tests and the replay tool use [`StaticDeviceInfo`].
pub trait DeviceInfoSource: Send {
    fn fingerprint(&self) -> EngineResult<DeviceFingerprint>;
}

/// A fixed fingerprint handed in up front. Enough for hosts that gather
/// platform facts themselves, and for every test.
pub struct StaticDeviceInfo {
    fingerprint: DeviceFingerprint,
}

impl StaticDeviceInfo {
    pub fn new(fingerprint: DeviceFingerprint) -> Self {
        Self { fingerprint }
    }
}

impl DeviceInfoSource for StaticDeviceInfo {
    fn fingerprint(&self) -> EngineResult<DeviceFingerprint> {
        Ok(self.fingerprint.clone())
    }
}

/// Outcome of one collection pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceCheck {
    pub fingerprint: DeviceFingerprint,
    /// Device id differs from the last persisted snapshot.
    pub identity_changed: bool,
    /// Id of the previously persisted device, when identity changed.
    pub previous_device_id: Option<String>,
    pub tamper_suspected: bool,
    pub tamper_reasons: Vec<String>,
}

pub struct FingerprintCollector {
    source: Box<dyn DeviceInfoSource>,
    store: TelemetryStore,
}

impl FingerprintCollector {
    pub fn new(source: Box<dyn DeviceInfoSource>, store: TelemetryStore) -> Self {
        Self { source, store }
    }

    /// Collect the current fingerprint, diff it against the persisted one,
    /// and persist the new snapshot as last-known.
    pub fn collect(&self) -> EngineResult<DeviceCheck> {
        let fingerprint = self.source.fingerprint()?;
        let last = self.store.device_fingerprint()?;

        let (identity_changed, previous_device_id) = match &last {
            Some(prev) if prev.device_id != fingerprint.device_id => {
                (true, Some(prev.device_id.clone()))
            }
            _ => (false, None),
        };

        let tamper_reasons = tamper_reasons(&fingerprint);
        let check = DeviceCheck {
            tamper_suspected: !tamper_reasons.is_empty(),
            tamper_reasons,
            fingerprint,
            identity_changed,
            previous_device_id,
        };

        if check.identity_changed {
            log::warn!(
                "device identity changed: {} -> {}",
                check.previous_device_id.as_deref().unwrap_or("?"),
                check.fingerprint.device_id
            );
        }

        self.store.save_device_fingerprint(&check.fingerprint)?;
        Ok(check)
    }
}

/// Device-swap condition: the stable device id differs.
pub fn identity_changed(current: &DeviceFingerprint, last: &DeviceFingerprint) -> bool {
    current.device_id != last.device_id
}

/// Tamper signals carried by the snapshot itself.
pub fn tamper_suspected(fingerprint: &DeviceFingerprint) -> bool {
    !tamper_reasons(fingerprint).is_empty()
}

fn tamper_reasons(fingerprint: &DeviceFingerprint) -> Vec<String> {
    let mut reasons = Vec::new();
    if !fingerprint.is_physical_device {
        reasons.push("running on an emulator".to_string());
    }
    if fingerprint.motion_sensor_count() < MIN_MOTION_SENSORS {
        reasons.push(format!(
            "only {} motion sensor(s) available",
            fingerprint.motion_sensor_count()
        ));
    }
    reasons
}
