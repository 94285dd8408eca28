//! Spherical-Earth geometry helpers shared by the triangulation and spread
//! engines.
//!
//! The Earth radius and the use of a spherical (not WGS-84 ellipsoidal)
//! model are both load-bearing constants inherited from the source
//! algorithms: changing them changes every downstream confidence and
//! uncertainty number.

/// Mean Earth radius in meters, as used by every distance/bearing
/// calculation in this crate.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A point in an Earth-centered Cartesian frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cartesian {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Cartesian {
    pub fn sub(self, other: Cartesian) -> Cartesian {
        Cartesian {
            x: self.x - other.x,
            y: self.y - other.y,
            z: self.z - other.z,
        }
    }

    pub fn add(self, other: Cartesian) -> Cartesian {
        Cartesian {
            x: self.x + other.x,
            y: self.y + other.y,
            z: self.z + other.z,
        }
    }

    pub fn scale(self, s: f64) -> Cartesian {
        Cartesian {
            x: self.x * s,
            y: self.y * s,
            z: self.z * s,
        }
    }

    pub fn dot(self, other: Cartesian) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn norm(self) -> f64 {
        self.dot(self).sqrt()
    }
}

/// Convert lat/lon/altitude (degrees, degrees, meters) to Cartesian
/// coordinates on a sphere of radius [`EARTH_RADIUS_M`] + altitude.
pub fn latlon_to_cartesian(lat_deg: f64, lon_deg: f64, alt_m: f64) -> Cartesian {
    let lat = lat_deg.to_radians();
    let lon = lon_deg.to_radians();
    let r = EARTH_RADIUS_M + alt_m;
    Cartesian {
        x: r * lat.cos() * lon.cos(),
        y: r * lat.cos() * lon.sin(),
        z: r * lat.sin(),
    }
}

/// Inverse of [`latlon_to_cartesian`]: returns (latitude, longitude, altitude).
pub fn cartesian_to_latlon(p: Cartesian) -> (f64, f64, f64) {
    let r = p.norm();
    let lat = (p.z / r).asin().to_degrees();
    let lon = p.y.atan2(p.x).to_degrees();
    let alt = r - EARTH_RADIUS_M;
    (lat, lon, alt)
}

/// Convert a compass bearing and elevation pitch (both degrees) to a unit
/// direction vector in the same local frame as [`latlon_to_cartesian`].
/// North = 0 degrees, East = 90 degrees.
pub fn bearing_to_direction(bearing_deg: f64, pitch_deg: f64) -> Cartesian {
    let bearing = bearing_deg.to_radians();
    let pitch = pitch_deg.to_radians();
    Cartesian {
        x: bearing.sin() * pitch.cos(),
        y: bearing.cos() * pitch.cos(),
        z: pitch.sin(),
    }
}

/// Great-circle bearing in degrees [0, 360) from point 1 to point 2.
pub fn calculate_bearing(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let y = delta_lon.sin() * lat2_rad.cos();
    let x = lat1_rad.cos() * lat2_rad.sin() - lat1_rad.sin() * lat2_rad.cos() * delta_lon.cos();

    let mut bearing = y.atan2(x).to_degrees();
    if bearing < 0.0 {
        bearing += 360.0;
    }
    bearing
}

/// Smallest unsigned difference between two bearings, handling wraparound
/// at 0/360 degrees. Always non-negative, at most 180.
pub fn angle_difference(angle1: f64, angle2: f64) -> f64 {
    let mut diff = angle1 - angle2;
    while diff > 180.0 {
        diff -= 360.0;
    }
    while diff < -180.0 {
        diff += 360.0;
    }
    diff.abs()
}

/// Great-circle distance in meters between two lat/lon points (haversine).
pub fn haversine_distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cartesian_roundtrip_preserves_latlon() {
        let (lat, lon, alt) = (37.7749, -122.4194, 150.0);
        let p = latlon_to_cartesian(lat, lon, alt);
        let (lat2, lon2, alt2) = cartesian_to_latlon(p);
        assert!((lat - lat2).abs() < 1e-6);
        assert!((lon - lon2).abs() < 1e-6);
        assert!((alt - alt2).abs() < 1e-3);
    }

    #[test]
    fn bearing_north_is_zero() {
        // Point directly north of the origin has bearing ~0.
        let bearing = calculate_bearing(10.0, 10.0, 11.0, 10.0);
        assert!(bearing.abs() < 0.5);
    }

    #[test]
    fn bearing_east_is_ninety() {
        let bearing = calculate_bearing(10.0, 10.0, 10.0, 11.0);
        assert!((bearing - 90.0).abs() < 1.0);
    }

    #[test]
    fn angle_difference_handles_wraparound() {
        assert!((angle_difference(350.0, 10.0) - 20.0).abs() < 1e-9);
        assert!((angle_difference(10.0, 350.0) - 20.0).abs() < 1e-9);
        assert_eq!(angle_difference(0.0, 0.0), 0.0);
    }

    #[test]
    fn haversine_zero_for_identical_points() {
        assert_eq!(haversine_distance_m(1.0, 1.0, 1.0, 1.0), 0.0);
    }

    #[test]
    fn haversine_known_distance_equator() {
        // One degree of longitude at the equator is ~111.19 km.
        let d = haversine_distance_m(0.0, 0.0, 0.0, 1.0);
        assert!((d - 111_195.0).abs() < 500.0);
    }
}
