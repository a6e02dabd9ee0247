use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoordinateError {
    #[error("invalid latitude: {0}, must be between -90 and 90")]
    Latitude(f64),
    #[error("invalid longitude: {0}, must be between -180 and 180")]
    Longitude(f64),
    #[error("invalid radius: {0}, must be a finite number of meters >= 0")]
    Radius(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Builds a point, rejecting non-finite or out-of-range degrees.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CoordinateError> {
        // NaN fails both range checks.
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(CoordinateError::Latitude(latitude));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(CoordinateError::Longitude(longitude));
        }
        Ok(GeoPoint {
            latitude,
            longitude,
        })
    }

    /// Great-circle surface distance in meters (haversine).
    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        let phi1 = self.latitude.to_radians();
        let phi2 = other.latitude.to_radians();
        let d_phi = phi2 - phi1;
        let d_lambda = other.longitude.to_radians() - self.longitude.to_radians();

        // Rounding can push `a` a hair past 1 near antipodes.
        let a = ((d_phi / 2.0).sin().powi(2)
            + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2))
        .min(1.0);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_M * c
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub point: GeoPoint,
    pub is_locked: bool,
    #[serde(rename = "radius")]
    pub radius_m: f64,
}

pub fn validate_radius(radius_m: f64) -> Result<f64, CoordinateError> {
    if radius_m.is_finite() && radius_m >= 0.0 {
        Ok(radius_m)
    } else {
        Err(CoordinateError::Radius(radius_m))
    }
}

/// Whether `submitted` may check in against `location`.
///
/// Unlocked locations accept everything without computing a distance. Locked
/// locations accept iff the haversine distance is at most the radius; the
/// boundary itself is inside.
pub fn within_geofence(location: &Location, submitted: &GeoPoint) -> bool {
    if !location.is_locked {
        return true;
    }
    location.point.distance_m(submitted) <= location.radius_m
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn location(lat: f64, lon: f64, radius_m: f64, is_locked: bool) -> Location {
        Location {
            id: "loc-1".to_string(),
            name: "Gerbang Utama".to_string(),
            point: GeoPoint {
                latitude: lat,
                longitude: lon,
            },
            is_locked,
            radius_m,
        }
    }

    #[test]
    fn unlocked_location_accepts_any_point() {
        let loc = location(-6.2, 106.816666, 0.0, false);
        let far = GeoPoint {
            latitude: 51.86,
            longitude: 4.35,
        };
        assert!(within_geofence(&loc, &far));
        // Garbage coordinates never reach the distance computation.
        let nan = GeoPoint {
            latitude: f64::NAN,
            longitude: f64::NAN,
        };
        assert!(within_geofence(&loc, &nan));
    }

    #[rstest]
    #[case(0.0)]
    #[case(1.0)]
    #[case(100.0)]
    fn identical_point_is_always_inside(#[case] radius_m: f64) {
        let loc = location(-6.2, 106.816666, radius_m, true);
        assert!(within_geofence(&loc, &loc.point));
    }

    #[test]
    fn one_hundredth_degree_south_is_about_1112_meters() {
        let a = GeoPoint::new(-6.2, 106.816666).expect("valid point");
        let b = GeoPoint::new(-6.21, 106.816666).expect("valid point");
        let d = a.distance_m(&b);
        assert!((d - 1111.95).abs() < 0.01, "distance was {d}");
    }

    #[rstest]
    #[case(100.0, false)]
    #[case(1500.0, true)]
    fn locked_location_compares_distance_to_radius(#[case] radius_m: f64, #[case] expected: bool) {
        let loc = location(-6.2, 106.816666, radius_m, true);
        let submitted = GeoPoint {
            latitude: -6.21,
            longitude: 106.816666,
        };
        assert_eq!(within_geofence(&loc, &submitted), expected);
    }

    #[test]
    fn boundary_distance_is_accepted() {
        let center = GeoPoint {
            latitude: 0.0,
            longitude: 0.0,
        };
        let edge = GeoPoint {
            latitude: 0.001,
            longitude: 0.0,
        };
        let d = center.distance_m(&edge);

        let exact = location(0.0, 0.0, d, true);
        assert!(within_geofence(&exact, &edge));

        let short = location(0.0, 0.0, d * (1.0 - 1e-9), true);
        assert!(!within_geofence(&short, &edge));
    }

    #[rstest]
    #[case((-6.2, 106.816666), (-6.21, 106.9))]
    #[case((51.8615899, 4.3580323), (-33.86, 151.21))]
    #[case((89.9, -179.9), (-89.9, 179.9))]
    fn distance_is_symmetric(#[case] a: (f64, f64), #[case] b: (f64, f64)) {
        let a = GeoPoint::new(a.0, a.1).expect("valid point");
        let b = GeoPoint::new(b.0, b.1).expect("valid point");
        let ab = a.distance_m(&b);
        let ba = b.distance_m(&a);
        assert!((ab - ba).abs() < 1e-6, "{ab} != {ba}");
    }

    #[test]
    fn antipodes_are_half_the_circumference_apart() {
        let a = GeoPoint::new(0.0, 0.0).expect("valid point");
        let b = GeoPoint::new(0.0, 180.0).expect("valid point");
        let half = std::f64::consts::PI * EARTH_RADIUS_M;
        assert!((a.distance_m(&b) - half).abs() < 1e-3);
    }

    #[rstest]
    #[case(90.5, 0.0, CoordinateError::Latitude(90.5))]
    #[case(-91.0, 0.0, CoordinateError::Latitude(-91.0))]
    #[case(0.0, 180.01, CoordinateError::Longitude(180.01))]
    #[case(0.0, f64::INFINITY, CoordinateError::Longitude(f64::INFINITY))]
    fn out_of_range_coordinates_are_rejected(
        #[case] lat: f64,
        #[case] lon: f64,
        #[case] expected: CoordinateError,
    ) {
        assert_eq!(GeoPoint::new(lat, lon), Err(expected));
    }

    #[test]
    fn nan_latitude_is_rejected() {
        assert!(matches!(
            GeoPoint::new(f64::NAN, 0.0),
            Err(CoordinateError::Latitude(_))
        ));
    }

    #[test]
    fn radius_must_be_finite_and_non_negative() {
        assert_eq!(validate_radius(0.0), Ok(0.0));
        assert_eq!(validate_radius(250.0), Ok(250.0));
        assert!(validate_radius(-1.0).is_err());
        assert!(validate_radius(f64::NAN).is_err());
        assert!(validate_radius(f64::INFINITY).is_err());
    }

    #[test]
    fn location_serializes_flat() {
        let loc = location(-6.2, 106.816666, 100.0, true);
        let v = serde_json::to_value(&loc).expect("serialize location");
        pretty_assertions::assert_eq!(
            v,
            serde_json::json!({
                "id": "loc-1",
                "name": "Gerbang Utama",
                "latitude": -6.2,
                "longitude": 106.816666,
                "isLocked": true,
                "radius": 100.0
            })
        );
    }
}
