//! Per-agent behavior baseline.
//!
//! The pattern is the agent's historical norm: typical hours, common
//! places, average speeds. It is loaded from the store, mutated
//! incrementally as activities complete, and never deleted, only updated.

use crate::{geo, types::AgentId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Two common locations closer than this are treated as the same place.
const COMMON_LOCATION_MATCH_RADIUS_M: f64 = 100.0;

/// How many distinct common locations a pattern keeps. Least-visited is
/// dropped first on overflow.
const MAX_COMMON_LOCATIONS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorkingHours {
    /// First hour of the agent's typical day, 0-23.
    pub start_hour: u32,
    /// Last hour of the agent's typical day, inclusive.
    pub end_hour: u32,
}

impl WorkingHours {
    pub fn contains(&self, hour: u32) -> bool {
        hour >= self.start_hour && hour <= self.end_hour
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CommonLocation {
    pub latitude: f64,
    pub longitude: f64,
    /// How many completed visits resolved to this place.
    pub frequency: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorPattern {
    pub agent_id: AgentId,
    pub average_visit_duration_min: f64,
    pub typical_working_hours: WorkingHours,
    pub common_locations: Vec<CommonLocation>,
    pub average_movement_speed_mps: f64,
    /// Running count behind the incremental averages.
    pub visits_recorded: u64,
    pub last_updated: DateTime<Utc>,
}

impl BehaviorPattern {
    /// Fresh baseline for an agent with no history yet.
    pub fn new(agent_id: AgentId, now: DateTime<Utc>) -> Self {
        Self {
            agent_id,
            average_visit_duration_min: 0.0,
            typical_working_hours: WorkingHours {
                start_hour: 8,
                end_hour: 17,
            },
            common_locations: Vec::new(),
            average_movement_speed_mps: 0.0,
            visits_recorded: 0,
            last_updated: now,
        }
    }

    /// Fold one completed visit into the running averages and bump the
    /// matching common location (or add a new one).
    pub fn record_visit(
        &mut self,
        duration_min: f64,
        latitude: f64,
        longitude: f64,
        movement_speed_mps: Option<f64>,
        now: DateTime<Utc>,
    ) {
        let n = self.visits_recorded as f64;
        self.average_visit_duration_min =
            (self.average_visit_duration_min * n + duration_min) / (n + 1.0);
        if let Some(speed) = movement_speed_mps {
            self.average_movement_speed_mps =
                (self.average_movement_speed_mps * n + speed) / (n + 1.0);
        }
        self.visits_recorded += 1;
        self.bump_common_location(latitude, longitude);
        self.last_updated = now;
    }

    /// True when the given place is within the match radius of any
    /// established common location.
    pub fn is_common_location(&self, latitude: f64, longitude: f64) -> bool {
        self.common_locations.iter().any(|c| {
            geo::haversine_distance_m(c.latitude, c.longitude, latitude, longitude)
                <= COMMON_LOCATION_MATCH_RADIUS_M
        })
    }

    fn bump_common_location(&mut self, latitude: f64, longitude: f64) {
        if let Some(existing) = self.common_locations.iter_mut().find(|c| {
            geo::haversine_distance_m(c.latitude, c.longitude, latitude, longitude)
                <= COMMON_LOCATION_MATCH_RADIUS_M
        }) {
            existing.frequency += 1;
            return;
        }
        self.common_locations.push(CommonLocation {
            latitude,
            longitude,
            frequency: 1,
        });
        if self.common_locations.len() > MAX_COMMON_LOCATIONS {
            // Drop the least-visited place to keep the record bounded.
            if let Some((idx, _)) = self
                .common_locations
                .iter()
                .enumerate()
                .min_by_key(|(_, c)| c.frequency)
            {
                self.common_locations.remove(idx);
            }
        }
    }
}
