//! # Geometry on E7 coordinates
//!
//! Points travel on the wire as integer latitude/longitude pairs scaled by
//! 10^7 ("E7"). This module converts them back to degrees for distance
//! calculations and implements the rectangle containment test used by
//! `ListFeatures`.
//!
//! ## Overview
//!
//! - [`distance`] - great-circle distance in metres (haversine).
//! - [`Bounds`] - a rectangle with its corners normalized so that the
//!   containment check does not care which corner the client called `lo`.
//! - [`is_valid`] - range check for latitude/longitude.
//!
//! All functions are pure and infallible.

use crate::proto::{Point, Rectangle};

/// Scale between E7 integers and degrees.
pub const COORD_FACTOR: f64 = 1e7;

/// Mean Earth radius used by [`distance`].
pub const EARTH_RADIUS_METRES: f64 = 6_371_000.0;

/// Largest valid E7 latitude magnitude (90 degrees).
pub const MAX_LATITUDE: i32 = 900_000_000;

/// Largest valid E7 longitude magnitude (180 degrees).
pub const MAX_LONGITUDE: i32 = 1_800_000_000;

/// Great-circle distance between two points in metres.
///
/// Uses the haversine formula on a sphere of radius
/// [`EARTH_RADIUS_METRES`]. The result is always finite and non-negative,
/// symmetric in its arguments, and exactly `0.0` for identical points.
pub fn distance(a: &Point, b: &Point) -> f64 {
    let lat1 = to_radians(a.latitude);
    let lat2 = to_radians(b.latitude);
    let delta_lat = lat2 - lat1;
    let delta_lon = to_radians(b.longitude) - to_radians(a.longitude);

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    // Rounding can push `h` a hair outside [0, 1] for antipodal points.
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_METRES * c
}

/// Returns `true` when the point lies within the valid E7 latitude and
/// longitude ranges (inclusive).
pub const fn is_valid(point: &Point) -> bool {
    point.latitude >= -MAX_LATITUDE
        && point.latitude <= MAX_LATITUDE
        && point.longitude >= -MAX_LONGITUDE
        && point.longitude <= MAX_LONGITUDE
}

fn to_radians(e7: i32) -> f64 {
    (f64::from(e7) / COORD_FACTOR).to_radians()
}

/// A latitude/longitude box with normalized corners.
///
/// The protocol does not order `lo` and `hi`, so both are folded into
/// min/max pairs on construction. Bounds are inclusive; a degenerate
/// rectangle whose corners coincide contains exactly that point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bounds {
    lo_lat: i32,
    hi_lat: i32,
    lo_lon: i32,
    hi_lon: i32,
}

impl Bounds {
    /// Builds bounds from two opposite corners given in any order.
    pub fn new(a: Point, b: Point) -> Self {
        Self {
            lo_lat: a.latitude.min(b.latitude),
            hi_lat: a.latitude.max(b.latitude),
            lo_lon: a.longitude.min(b.longitude),
            hi_lon: a.longitude.max(b.longitude),
        }
    }

    /// Inclusive containment test.
    pub const fn contains(&self, point: &Point) -> bool {
        point.latitude >= self.lo_lat
            && point.latitude <= self.hi_lat
            && point.longitude >= self.lo_lon
            && point.longitude <= self.hi_lon
    }
}

impl From<&Rectangle> for Bounds {
    /// A missing corner is read as the default point `(0, 0)`.
    fn from(rect: &Rectangle) -> Self {
        Self::new(rect.lo.unwrap_or_default(), rect.hi.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const fn point(latitude: i32, longitude: i32) -> Point {
        Point {
            latitude,
            longitude,
        }
    }

    #[test]
    fn distance_to_self_is_zero() {
        for p in [
            point(0, 0),
            point(409_146_138, -746_188_906),
            point(-MAX_LATITUDE, MAX_LONGITUDE),
        ] {
            assert_eq!(distance(&p, &p), 0.0);
        }
    }

    #[test]
    fn distance_is_symmetric() {
        let a = point(407_838_351, -746_143_763);
        let b = point(419_999_544, -740_371_136);
        let ab = distance(&a, &b);
        let ba = distance(&b, &a);
        assert!((ab - ba).abs() < 1e-9, "{ab} != {ba}");
        assert!(ab > 0.0);
    }

    #[test]
    fn one_degree_of_longitude_at_the_equator() {
        let d = distance(&point(0, 0), &point(0, 10_000_000));
        let expected = EARTH_RADIUS_METRES * core::f64::consts::PI / 180.0;
        assert!((d - expected).abs() < 1.0, "got {d}, expected {expected}");
    }

    #[test]
    fn antipodal_points_are_half_the_circumference() {
        let d = distance(&point(0, 0), &point(0, MAX_LONGITUDE));
        let expected = EARTH_RADIUS_METRES * core::f64::consts::PI;
        assert!(d.is_finite());
        assert!((d - expected).abs() < 1.0);
    }

    #[test]
    fn bounds_are_inclusive() {
        let bounds = Bounds::new(point(10, 10), point(20, 20));
        assert!(bounds.contains(&point(10, 10)));
        assert!(bounds.contains(&point(20, 20)));
        assert!(bounds.contains(&point(15, 20)));
        assert!(!bounds.contains(&point(9, 15)));
        assert!(!bounds.contains(&point(15, 21)));
    }

    #[test]
    fn bounds_ignore_corner_order() {
        let a = point(-5, 30);
        let b = point(40, -12);
        assert_eq!(Bounds::new(a, b), Bounds::new(b, a));
        assert_eq!(
            Bounds::new(point(-5, -12), point(40, 30)),
            Bounds::new(a, b)
        );
    }

    #[test]
    fn degenerate_rectangle_contains_only_its_point() {
        let p = point(413_628_156, -749_015_468);
        let bounds = Bounds::new(p, p);
        assert!(bounds.contains(&p));
        assert!(!bounds.contains(&point(p.latitude + 1, p.longitude)));
        assert!(!bounds.contains(&point(p.latitude, p.longitude - 1)));
    }

    #[test]
    fn missing_corners_default_to_origin() {
        let rect = Rectangle {
            lo: None,
            hi: Some(point(10, 10)),
        };
        let bounds = Bounds::from(&rect);
        assert!(bounds.contains(&point(0, 0)));
        assert!(bounds.contains(&point(5, 5)));
        assert!(!bounds.contains(&point(-1, 5)));
    }

    #[test]
    fn validates_coordinate_ranges() {
        assert!(is_valid(&point(MAX_LATITUDE, -MAX_LONGITUDE)));
        assert!(!is_valid(&point(MAX_LATITUDE + 1, 0)));
        assert!(!is_valid(&point(0, -MAX_LONGITUDE - 1)));
    }
}
