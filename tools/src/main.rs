//! fieldguard-replay: headless trace replayer for the fraud engine.
//!
//! Feeds a recorded trace of GPS fixes and activity events through a fully
//! wired engine and prints every detection and verdict. Used to reproduce
//! field reports and to eyeball threshold changes before shipping them.
//!
//! Usage:
//!   fieldguard-replay --trace trace.json
//!   fieldguard-replay --trace trace.json --db replay.db --config overrides.json

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fieldguard_core::{
    config::EngineConfig,
    engine::FieldGuard,
    event::{Alert, AlertSink},
    fingerprint::{DeviceFingerprint, StaticDeviceInfo},
    location::LocationPoint,
    scorer::{ActivityKind, FraudCheckInput},
    sensor::SensorKind,
    store::TelemetryStore,
    tracker::ScriptedLocationSource,
};
use std::env;
use std::sync::Arc;

/// One recorded activity event in the trace file.
#[derive(serde::Deserialize)]
struct TraceActivity {
    activity: ActivityKind,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    location: Option<LocationPoint>,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

#[derive(serde::Deserialize)]
struct Trace {
    agent_id: String,
    #[serde(default)]
    device: Option<DeviceFingerprint>,
    #[serde(default)]
    fixes: Vec<LocationPoint>,
    #[serde(default)]
    activities: Vec<TraceActivity>,
}

/// Prints alerts as they fire, the way the host app would surface them.
struct StdoutAlertSink;

impl AlertSink for StdoutAlertSink {
    fn notify(&self, alert: &Alert) {
        println!("  ALERT: {} — {}", alert.title, alert.description);
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let trace_path = string_arg(&args, "--trace").unwrap_or_else(|| "trace.json".to_string());
    let db = string_arg(&args, "--db");
    let config_path = string_arg(&args, "--config");

    let content = std::fs::read_to_string(&trace_path)
        .with_context(|| format!("Cannot read trace {trace_path}"))?;
    let trace: Trace = serde_json::from_str(&content)
        .with_context(|| format!("Malformed trace {trace_path}"))?;

    let config = match config_path {
        Some(p) => EngineConfig::load(&p)?,
        None => EngineConfig::default(),
    };

    // Without --db, replay against a shared-memory database so every
    // component connection sees the same state and nothing touches disk.
    let store = match db.as_deref() {
        Some(path) => TelemetryStore::open(path)?,
        None => TelemetryStore::shared_memory("fieldguard_replay")?,
    };

    let device = trace.device.clone().unwrap_or_else(default_device);
    let source = ScriptedLocationSource::new(Vec::new());
    let feeder = source.feeder();

    let mut engine = FieldGuard::new(
        store,
        Box::new(source),
        Box::new(StaticDeviceInfo::new(device)),
        Arc::new(StdoutAlertSink),
        config,
    )?;

    println!("fieldguard-replay");
    println!("  trace:      {trace_path}");
    println!("  agent:      {}", trace.agent_id);
    println!("  fixes:      {}", trace.fixes.len());
    println!("  activities: {}", trace.activities.len());
    println!();

    let startup = engine.init()?;
    for event in &startup {
        println!("startup event: {}", serde_json::to_string(event)?);
    }

    engine.tracker.start_tracking(Default::default())?;
    for fix in &trace.fixes {
        feeder.send(*fix);
    }
    let events = engine.tracker.process_pending();
    for event in &events {
        println!("tracking event: {}", serde_json::to_string(event)?);
    }
    println!(
        "processed {} fixes, {} suspicious movements",
        trace.fixes.len(),
        engine.tracker.movement_log().len()
    );
    println!();

    for activity in &trace.activities {
        let input = FraudCheckInput {
            agent_id: trace.agent_id.clone(),
            activity: activity.activity,
            location: activity.location,
            timestamp: activity.timestamp,
            previous_locations: Vec::new(),
            metadata: activity.metadata.clone(),
        };
        let result = engine.check_activity(&input);
        println!(
            "{} {} -> {} (score {:.1}): {}",
            result.checked_at,
            result.activity.label(),
            result.risk_level.label(),
            result.risk_score,
            result.reason
        );
        for flag in &result.flags {
            println!(
                "    [{}] {}: {}",
                flag.severity.label(),
                kind_label(flag),
                flag.description
            );
        }
    }

    engine.shutdown();
    Ok(())
}

fn kind_label(flag: &fieldguard_core::scorer::FraudFlag) -> &'static str {
    use fieldguard_core::scorer::FlagKind;
    match flag.kind {
        FlagKind::Location => "location",
        FlagKind::Time => "time",
        FlagKind::Device => "device",
        FlagKind::Behavior => "behavior",
        FlagKind::Pattern => "pattern",
    }
}

fn default_device() -> DeviceFingerprint {
    DeviceFingerprint {
        device_id: "replay-device".to_string(),
        device_name: "Replay Device".to_string(),
        os_name: "android".to_string(),
        os_version: "14".to_string(),
        brand: "generic".to_string(),
        model: "replay".to_string(),
        is_physical_device: true,
        available_sensors: vec![
            SensorKind::Accelerometer,
            SensorKind::Gyroscope,
            SensorKind::Magnetometer,
        ],
        screen_width_px: 1080,
        screen_height_px: 2400,
        timezone: "UTC".to_string(),
        locale: "en-US".to_string(),
        collected_at: Utc::now(),
    }
}

fn string_arg(args: &[String], name: &str) -> Option<String> {
    args.windows(2)
        .find(|w| w[0] == name)
        .map(|w| w[1].clone())
}
