//! Greedy nearest-neighbor route planning.
//!
//! This is a planning utility consumed by the host's scheduling screens,
//! not part of fraud scoring. It is a heuristic, not optimal TSP: the
//! ordering must be deterministic for a fixed input, which is what the
//! tests pin down, not optimality.

use crate::{geo, location::LocationPoint};
use serde::{Deserialize, Serialize};

/// Minutes of travel per kilometer at the assumed urban speed (~30 km/h).
pub const MINUTES_PER_KM: f64 = 2.0;

/// Fuel burn assumption.
pub const FUEL_LITRES_PER_KM: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl Waypoint {
    pub fn distance_m(&self, other: &Waypoint) -> f64 {
        geo::haversine_distance_m(self.latitude, self.longitude, other.latitude, other.longitude)
    }
}

impl From<&LocationPoint> for Waypoint {
    fn from(p: &LocationPoint) -> Self {
        Self {
            latitude: p.latitude,
            longitude: p.longitude,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePlan {
    /// Visiting order as indices into the input waypoint list.
    pub order: Vec<usize>,
    /// Distance of each leg in meters, starting with start -> first stop.
    pub leg_distances_m: Vec<f64>,
    pub total_distance_m: f64,
    pub estimated_time_min: f64,
    pub fuel_cost: f64,
}

/// Order waypoints by repeatedly taking the nearest unvisited one.
/// Ties break to the earliest index in the input list, which is what makes
/// the output deterministic for a fixed input ordering.
pub fn optimize_route(
    waypoints: &[Waypoint],
    start: &Waypoint,
    fuel_price_per_litre: f64,
) -> RoutePlan {
    let mut order = Vec::with_capacity(waypoints.len());
    let mut leg_distances_m = Vec::with_capacity(waypoints.len());
    let mut visited = vec![false; waypoints.len()];
    let mut current = *start;
    let mut total_distance_m = 0.0;

    for _ in 0..waypoints.len() {
        let mut best: Option<(usize, f64)> = None;
        for (i, wp) in waypoints.iter().enumerate() {
            if visited[i] {
                continue;
            }
            let d = current.distance_m(wp);
            // Strict less-than keeps the first-encountered index on ties.
            if best.map_or(true, |(_, bd)| d < bd) {
                best = Some((i, d));
            }
        }
        let (idx, dist) = match best {
            Some(b) => b,
            None => break,
        };
        visited[idx] = true;
        order.push(idx);
        leg_distances_m.push(dist);
        total_distance_m += dist;
        current = waypoints[idx];
    }

    let km = total_distance_m / 1000.0;
    RoutePlan {
        order,
        leg_distances_m,
        total_distance_m,
        estimated_time_min: km * MINUTES_PER_KM,
        fuel_cost: km * FUEL_LITRES_PER_KM * fuel_price_per_litre,
    }
}
