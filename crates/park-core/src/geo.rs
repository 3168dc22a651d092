//! Great-circle distance between stored positions.
//!
//! Positions are stored on the ledger as integer micro-degrees. They are
//! only converted to floating-point degrees at the moment a distance is
//! computed.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Mean Earth radius used by the haversine formula, in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Micro-degrees per degree.
pub const MICRO_PER_DEGREE: f64 = 1_000_000.0;

const MAX_LAT_MICRO: i64 = 90_000_000;
const MAX_LNG_MICRO: i64 = 180_000_000;

/// Haversine distance in meters between two points given in degrees.
#[must_use]
pub fn distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Rounding can push `a` a hair above 1 for antipodal points.
    let c = 2.0 * a.sqrt().min(1.0).asin();
    EARTH_RADIUS_M * c
}

/// A position in integer micro-degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in micro-degrees.
    pub lat_micro: i64,
    /// Longitude in micro-degrees.
    pub lng_micro: i64,
}

impl GeoPoint {
    /// Create a point from micro-degrees.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidCoordinates`] when outside ±90° / ±180°.
    pub const fn from_micro(lat_micro: i64, lng_micro: i64) -> Result<Self> {
        if lat_micro.unsigned_abs() > MAX_LAT_MICRO.unsigned_abs()
            || lng_micro.unsigned_abs() > MAX_LNG_MICRO.unsigned_abs()
        {
            return Err(CoreError::InvalidCoordinates {
                lat: lat_micro,
                lng: lng_micro,
            });
        }
        Ok(Self {
            lat_micro,
            lng_micro,
        })
    }

    /// Create a point from decimal degrees, rounding to the nearest micro-degree.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidCoordinates`] for out-of-range or
    /// non-finite input.
    pub fn from_degrees(lat: f64, lng: f64) -> Result<Self> {
        if !lat.is_finite() || !lng.is_finite() {
            return Err(CoreError::InvalidCoordinates { lat: 0, lng: 0 });
        }
        Self::from_micro(
            (lat * MICRO_PER_DEGREE).round() as i64,
            (lng * MICRO_PER_DEGREE).round() as i64,
        )
    }

    /// Latitude in degrees.
    #[must_use]
    pub fn lat(self) -> f64 {
        self.lat_micro as f64 / MICRO_PER_DEGREE
    }

    /// Longitude in degrees.
    #[must_use]
    pub fn lng(self) -> f64 {
        self.lng_micro as f64 / MICRO_PER_DEGREE
    }

    /// Distance to another point in meters.
    #[must_use]
    pub fn distance_to(self, other: Self) -> f64 {
        distance_meters(self.lat(), self.lng(), other.lat(), other.lng())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_same_point_is_zero() {
        let p = GeoPoint::from_degrees(44.4268, 26.1025).unwrap();
        assert!(p.distance_to(p).abs() < f64::EPSILON);
    }

    #[test]
    fn test_known_distance() {
        // Bucharest University Square to Piata Victoriei is roughly 2.2 km.
        let a = GeoPoint::from_degrees(44.4355, 26.1025).unwrap();
        let b = GeoPoint::from_degrees(44.4521, 26.0860).unwrap();
        let d = a.distance_to(b);
        assert!(d > 2_000.0 && d < 2_500.0, "got {d}");
    }

    #[test]
    fn test_one_degree_of_latitude() {
        let d = distance_meters(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111_195.0).abs() < 50.0, "got {d}");
    }

    #[test]
    fn test_antipodal_is_half_circumference() {
        let d = distance_meters(0.0, 0.0, 0.0, 180.0);
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_M).abs() < 1.0);
    }

    #[test]
    fn test_micro_degree_conversion() {
        let p = GeoPoint::from_micro(44_426_800, -26_102_500).unwrap();
        assert!((p.lat() - 44.4268).abs() < 1e-9);
        assert!((p.lng() + 26.1025).abs() < 1e-9);
    }

    #[test]
    fn test_out_of_range_rejected() {
        assert!(GeoPoint::from_micro(90_000_001, 0).is_err());
        assert!(GeoPoint::from_micro(0, -180_000_001).is_err());
        assert!(GeoPoint::from_degrees(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_extreme_values_rejected() {
        assert!(GeoPoint::from_micro(i64::MIN, 0).is_err());
        assert!(GeoPoint::from_micro(0, i64::MIN).is_err());
        assert!(GeoPoint::from_micro(i64::MAX, 0).is_err());
        // Saturates to i64::MIN when cast.
        assert!(GeoPoint::from_degrees(-1e13, 0.0).is_err());
        assert!(GeoPoint::from_degrees(0.0, 1e300).is_err());
    }

    #[test]
    fn test_bounds_are_inclusive() {
        assert!(GeoPoint::from_micro(-90_000_000, -180_000_000).is_ok());
        assert!(GeoPoint::from_micro(90_000_000, 180_000_000).is_ok());
    }

    proptest! {
        #[test]
        fn prop_distance_is_symmetric(
            lat1 in -90_000_000i64..=90_000_000,
            lng1 in -180_000_000i64..=180_000_000,
            lat2 in -90_000_000i64..=90_000_000,
            lng2 in -180_000_000i64..=180_000_000,
        ) {
            let a = GeoPoint::from_micro(lat1, lng1).unwrap();
            let b = GeoPoint::from_micro(lat2, lng2).unwrap();
            prop_assert!((a.distance_to(b) - b.distance_to(a)).abs() < 1e-6);
        }

        #[test]
        fn prop_distance_to_self_is_zero(
            lat in -90_000_000i64..=90_000_000,
            lng in -180_000_000i64..=180_000_000,
        ) {
            let p = GeoPoint::from_micro(lat, lng).unwrap();
            prop_assert_eq!(p.distance_to(p), 0.0);
        }
    }
}
