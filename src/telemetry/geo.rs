//! # Geodesy Helpers
//!
//! Great-circle distance and initial bearing on a spherical Earth.

use serde::Serialize;

/// Mean Earth radius in kilometers
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A latitude/longitude pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoPoint {
    /// Latitude in degrees, positive north
    pub lat: f64,

    /// Longitude in degrees, positive east
    pub lon: f64,
}

impl GeoPoint {
    /// Create a point from decimal degrees
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Create a point from MAVLink 1e7-scaled integer degrees
    ///
    /// # Arguments
    ///
    /// * `lat_e7` - Latitude in degrees × 10^7
    /// * `lon_e7` - Longitude in degrees × 10^7
    pub fn from_e7(lat_e7: i32, lon_e7: i32) -> Self {
        Self {
            lat: lat_e7 as f64 / 1e7,
            lon: lon_e7 as f64 / 1e7,
        }
    }
}

/// Great-circle distance between two points (haversine formula)
///
/// # Arguments
///
/// * `from` - Start point
/// * `to` - End point
///
/// # Returns
///
/// * `f64` - Distance in kilometers
///
/// # Examples
///
/// ```
/// use osd_telemetry::telemetry::geo::{great_circle_distance, GeoPoint};
///
/// let d = great_circle_distance(GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 1.0));
/// assert!((d - 111.19).abs() < 0.5);
/// ```
pub fn great_circle_distance(from: GeoPoint, to: GeoPoint) -> f64 {
    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let dlat = lat2 - lat1;
    let dlon = (to.lon - from.lon).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Initial bearing (forward azimuth) when travelling from `from` to `to`
///
/// # Returns
///
/// * `f64` - Bearing in degrees, normalized to [0, 360)
pub fn initial_bearing(from: GeoPoint, to: GeoPoint) -> f64 {
    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let dlon = (to.lon - from.lon).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();

    let bearing = y.atan2(x).to_degrees().rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if bearing >= 360.0 {
        0.0
    } else {
        bearing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-3;

    #[test]
    fn test_one_degree_of_longitude_at_equator() {
        let d = great_circle_distance(GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 1.0));
        assert!((d - 111.19).abs() < 0.5, "got {} km", d);
    }

    #[test]
    fn test_distance_to_self_is_zero() {
        let p = GeoPoint::new(52.2297, 21.0122);
        assert_eq!(great_circle_distance(p, p), 0.0);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let warsaw = GeoPoint::new(52.2297, 21.0122);
        let kyiv = GeoPoint::new(50.4501, 30.5234);
        let there = great_circle_distance(warsaw, kyiv);
        let back = great_circle_distance(kyiv, warsaw);
        assert!((there - back).abs() < TOLERANCE);
        // Roughly 690 km between the two capitals
        assert!((there - 690.0).abs() < 10.0, "got {} km", there);
    }

    #[test]
    fn test_bearing_due_east() {
        let b = initial_bearing(GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 1.0));
        assert!((b - 90.0).abs() < TOLERANCE, "got {}", b);
    }

    #[test]
    fn test_bearing_cardinal_directions() {
        let origin = GeoPoint::new(0.0, 0.0);
        let north = initial_bearing(origin, GeoPoint::new(1.0, 0.0));
        let south = initial_bearing(origin, GeoPoint::new(-1.0, 0.0));
        let west = initial_bearing(origin, GeoPoint::new(0.0, -1.0));

        assert!(north.abs() < TOLERANCE, "north: {}", north);
        assert!((south - 180.0).abs() < TOLERANCE, "south: {}", south);
        assert!((west - 270.0).abs() < TOLERANCE, "west: {}", west);
    }

    #[test]
    fn test_bearing_range() {
        let points = [
            GeoPoint::new(10.0, 10.0),
            GeoPoint::new(-45.0, 170.0),
            GeoPoint::new(60.0, -179.5),
            GeoPoint::new(-0.0001, -0.0001),
        ];
        for &a in &points {
            for &b in &points {
                let bearing = initial_bearing(a, b);
                assert!((0.0..360.0).contains(&bearing), "{:?} -> {:?}: {}", a, b, bearing);
            }
        }
    }

    #[test]
    fn test_from_e7() {
        let p = GeoPoint::from_e7(377_749_000, -1_224_194_000);
        assert!((p.lat - 37.7749).abs() < 1e-9);
        assert!((p.lon + 122.4194).abs() < 1e-9);
    }
}
