//! In-memory feature database.
//!
//! The [`FeatureStore`] is built once at startup (see [`loader`]) and shared
//! read-only behind an `Arc` for the lifetime of the process, so lookups need
//! no locking.
//!
//! A feature with an empty name means "nothing known here". Such entries are
//! kept in the table (they are part of the dataset) but never returned as a
//! positive match by [`FeatureStore::get`] or [`FeatureStore::within`].

pub mod loader;

pub use loader::DatabaseError;

use routeguide_core::{
    geo::Bounds,
    proto::{Feature, Point, Rectangle},
};
use std::collections::HashMap;

/// Immutable, insertion-ordered collection of features with an exact-point
/// index.
#[derive(Debug, Clone, Default)]
pub struct FeatureStore {
    features: Vec<Feature>,
    // First named feature at each location.
    index: HashMap<Point, usize>,
}

impl FeatureStore {
    pub fn new(features: Vec<Feature>) -> Self {
        let mut index = HashMap::with_capacity(features.len());
        for (i, feature) in features.iter().enumerate() {
            if feature.name.is_empty() {
                continue;
            }
            if let Some(location) = feature.location {
                index.entry(location).or_insert(i);
            }
        }

        Self { features, index }
    }

    /// Number of stored features, including unnamed ones.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// All stored features in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }

    /// Returns the named feature located exactly at `point`, if any.
    pub fn get(&self, point: &Point) -> Option<&Feature> {
        self.index.get(point).map(|&i| &self.features[i])
    }

    /// `GetFeature` semantics: the stored named feature at `point`, or an
    /// unnamed feature carrying the requested location.
    pub fn feature_at(&self, point: Point) -> Feature {
        self.get(&point).cloned().unwrap_or_else(|| Feature {
            name: String::new(),
            location: Some(point),
        })
    }

    /// `ListFeatures` semantics: lazily yields every named feature inside the
    /// rectangle's normalized, inclusive bounds, in insertion order.
    ///
    /// Features without a location are never inside any rectangle.
    pub fn within<'a>(&'a self, rect: &Rectangle) -> impl Iterator<Item = &'a Feature> + use<'a> {
        let bounds = Bounds::from(rect);
        self.features.iter().filter(move |feature| {
            !feature.name.is_empty()
                && feature
                    .location
                    .is_some_and(|location| bounds.contains(&location))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(latitude: i32, longitude: i32) -> Point {
        Point {
            latitude,
            longitude,
        }
    }

    fn feature(name: &str, latitude: i32, longitude: i32) -> Feature {
        Feature {
            name: name.to_string(),
            location: Some(point(latitude, longitude)),
        }
    }

    fn rect(lo: Point, hi: Point) -> Rectangle {
        Rectangle {
            lo: Some(lo),
            hi: Some(hi),
        }
    }

    fn names<'a>(features: impl Iterator<Item = &'a Feature>) -> Vec<&'a str> {
        features.map(|f| f.name.as_str()).collect()
    }

    fn sample() -> FeatureStore {
        FeatureStore::new(vec![
            feature("north", 30, 10),
            feature("", 15, 15),
            feature("center", 15, 15),
            feature("south", -30, 10),
            feature("edge", 20, 20),
            feature("center-duplicate", 15, 15),
            Feature {
                name: "nowhere".to_string(),
                location: None,
            },
        ])
    }

    #[test]
    fn get_returns_first_named_feature_at_point() {
        let store = sample();
        assert_eq!(store.get(&point(15, 15)).unwrap().name, "center");
        assert_eq!(store.get(&point(30, 10)).unwrap().name, "north");
        assert!(store.get(&point(1, 1)).is_none());
    }

    #[test]
    fn feature_at_unknown_point_is_unnamed() {
        let store = sample();
        let missing = store.feature_at(point(1, 2));
        assert_eq!(missing.name, "");
        assert_eq!(missing.location, Some(point(1, 2)));

        let found = store.feature_at(point(20, 20));
        assert_eq!(found.name, "edge");
    }

    #[test]
    fn unnamed_only_location_is_not_a_match() {
        let store = FeatureStore::new(vec![feature("", 5, 5)]);
        assert!(store.get(&point(5, 5)).is_none());
        assert_eq!(store.feature_at(point(5, 5)).name, "");
        assert_eq!(store.within(&rect(point(0, 0), point(10, 10))).count(), 0);
    }

    #[test]
    fn within_keeps_insertion_order_and_skips_unnamed() {
        let store = sample();
        let found = names(store.within(&rect(point(10, 10), point(20, 20))));
        assert_eq!(found, vec!["center", "edge", "center-duplicate"]);
    }

    #[test]
    fn within_is_invariant_under_corner_swap() {
        let store = sample();
        let a = point(-40, 0);
        let b = point(25, 30);
        let forward = names(store.within(&rect(a, b)));
        let backward = names(store.within(&rect(b, a)));
        assert_eq!(forward, backward);
        assert_eq!(forward, vec!["center", "south", "edge", "center-duplicate"]);

        // Mixed corners: lo has the high latitude, hi the high longitude.
        let mixed = names(store.within(&rect(point(25, 0), point(-40, 30))));
        assert_eq!(mixed, forward);
    }

    #[test]
    fn degenerate_rectangle_matches_exact_point() {
        let store = sample();
        let p = point(20, 20);
        assert_eq!(names(store.within(&rect(p, p))), vec!["edge"]);
    }

    #[test]
    fn empty_store() {
        let store = FeatureStore::default();
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);
        assert_eq!(store.feature_at(point(0, 0)).name, "");
        assert_eq!(store.within(&Rectangle::default()).count(), 0);
    }
}
