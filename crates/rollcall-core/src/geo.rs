//! Great-circle distance and geofence checks

use rollcall_api::{Coordinate, Geofence};

/// Mean Earth radius used for all distance computations
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Haversine distance between two coordinates, in meters
pub fn distance(a: &Coordinate, b: &Coordinate) -> f64 {
    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();
    let half_dlat = ((b.latitude - a.latitude).to_radians() / 2.0).sin();
    let half_dlon = ((b.longitude - a.longitude).to_radians() / 2.0).sin();

    let h = half_dlat * half_dlat + lat_a.cos() * lat_b.cos() * half_dlon * half_dlon;
    2.0 * EARTH_RADIUS_METERS * h.sqrt().min(1.0).asin()
}

/// Whether `point` is inside the fence.
///
/// Distances are compared in whole meters; device positions are not more
/// precise than that.
pub fn within(fence: &Geofence, point: &Coordinate) -> bool {
    distance(&fence.center, point).round() <= fence.radius_meters
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fence(radius_meters: f64) -> Geofence {
        Geofence {
            center: Coordinate::new(0.0, 0.0),
            radius_meters,
        }
    }

    #[test]
    fn test_distance_is_symmetric_and_zero_on_identity() {
        let pretoria = Coordinate::new(-25.7545, 28.2314);
        let cape_town = Coordinate::new(-33.9249, 18.4241);

        assert_eq!(distance(&pretoria, &cape_town), distance(&cape_town, &pretoria));
        assert_eq!(distance(&pretoria, &pretoria), 0.0);

        // ~1,300 km
        let d = distance(&pretoria, &cape_town);
        assert!((1_250_000.0..1_350_000.0).contains(&d), "{}", d);
    }

    #[test]
    fn test_distance_grows_with_separation() {
        let origin = Coordinate::new(0.0, 0.0);
        let near = distance(&origin, &Coordinate::new(0.0, 0.001));
        let far = distance(&origin, &Coordinate::new(0.0, 0.002));
        let antipode = distance(&origin, &Coordinate::new(0.0, 180.0));

        assert!(near < far);
        assert!(far < antipode);
        assert!((antipode - std::f64::consts::PI * EARTH_RADIUS_METERS).abs() < 1e-3);
    }

    #[test]
    fn test_within_geofence_boundary() {
        let fence = fence(100.0);
        assert!(within(&fence, &Coordinate::new(0.0, 0.0009)));
        assert!(!within(&fence, &Coordinate::new(0.0, 0.002)));
        assert!(within(&fence, &fence.center));
    }

    #[test]
    fn test_zero_radius_only_accepts_center() {
        let fence = fence(0.0);
        assert!(within(&fence, &Coordinate::new(0.0, 0.0)));
        assert!(!within(&fence, &Coordinate::new(0.0, 0.0001)));
    }
}
