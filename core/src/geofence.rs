//! Circular geofences.
//!
//! Membership is derived per fix; transition state lives per geofence in
//! the store (key `geofence_<id>_status`), never on the area itself.

use crate::{geo, location::LocationPoint, types::GeofenceId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeofenceKind {
    Customer,
    Warehouse,
    Office,
    Restricted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceArea {
    pub id: GeofenceId,
    pub name: String,
    pub center_latitude: f64,
    pub center_longitude: f64,
    pub radius_m: f64,
    pub kind: GeofenceKind,
}

impl GeofenceArea {
    pub fn contains(&self, point: &LocationPoint) -> bool {
        geo::haversine_distance_m(
            point.latitude,
            point.longitude,
            self.center_latitude,
            self.center_longitude,
        ) <= self.radius_m
    }

    pub fn distance_to_center_m(&self, point: &LocationPoint) -> f64 {
        geo::haversine_distance_m(
            point.latitude,
            point.longitude,
            self.center_latitude,
            self.center_longitude,
        )
    }
}
