//! fieldguard-core: on-device location-integrity and fraud-risk scoring
//! for field agents.
//!
//! The pipeline runs bottom-up: GPS fixes and sensor samples feed the
//! tracker, monitor, fingerprint collector, and behavior baseline; the
//! fraud risk scorer fuses those evidence streams into a bounded 0-100
//! risk score per activity event. The host app decides what to do with
//! the verdict; the engine never blocks a business action itself.

pub mod behavior;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod fingerprint;
pub mod geo;
pub mod geofence;
pub mod location;
pub mod ring;
pub mod route;
pub mod scorer;
pub mod sensor;
pub mod store;
pub mod tracker;
pub mod types;
