//! Great-circle geometry on the WGS-84 sphere approximation.
//!
//! Everything here is pure math on (latitude, longitude) pairs in degrees.
//! Distances are meters, bearings degrees in [0, 360).

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance in meters between two coordinates.
pub fn haversine_distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_phi = (lat2 - lat1).to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();

    let a = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Initial bearing in degrees from the first coordinate to the second,
/// normalized to [0, 360).
pub fn initial_bearing_deg(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();

    let y = delta_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * delta_lambda.cos();

    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

/// Number of significant decimal digits in a coordinate, capped at `max`.
///
/// A value like 52.52 reports 2; 52.520013 reports 4 when capped there.
/// Used by the spoofing heuristic: genuine GPS fixes carry more than a few
/// decimals, while fabricated coordinates are often truncated.
pub fn decimal_precision(value: f64, max: u32) -> u32 {
    let mut scaled = value.abs();
    for digits in 0..max {
        if (scaled - scaled.round()).abs() < 1e-9 * scaled.abs().max(1.0) {
            return digits;
        }
        scaled *= 10.0;
    }
    max
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_degree_of_latitude_is_about_111_km() {
        let d = haversine_distance_m(52.0, 13.0, 53.0, 13.0);
        assert!((d - 111_195.0).abs() < 100.0, "got {d}");
    }

    #[test]
    fn zero_distance_for_identical_points() {
        assert_eq!(haversine_distance_m(52.52, 13.405, 52.52, 13.405), 0.0);
    }

    #[test]
    fn bearing_is_normalized_to_compass_range() {
        // Due north.
        let north = initial_bearing_deg(52.0, 13.0, 53.0, 13.0);
        assert!(north.abs() < 1e-6, "got {north}");
        // Due west comes back as 270, not -90.
        let west = initial_bearing_deg(0.0, 13.0, 0.0, 12.0);
        assert!((west - 270.0).abs() < 1e-6, "got {west}");
    }

    #[test]
    fn decimal_precision_counts_significant_decimals() {
        assert_eq!(decimal_precision(52.52, 6), 2);
        assert_eq!(decimal_precision(13.4, 6), 1);
        assert_eq!(decimal_precision(52.520008, 6), 6);
        assert_eq!(decimal_precision(-13.0, 6), 0);
        assert_eq!(decimal_precision(52.123456789, 4), 4);
    }
}
