use crate::server::store::FeatureStore;
use routeguide_core::{
    geo,
    proto::{Point, RouteSummary},
};
use tokio::time::Instant;

/// Accumulates the points of a single `RecordRoute` call.
///
/// One aggregator is created when the call starts and consumed by
/// [`finish`](Self::finish) when the client half-closes. If the call is
/// cancelled the aggregator is simply dropped and no summary is produced.
///
/// Points are not range-checked; out-of-range coordinates are folded in like
/// any other.
#[derive(Debug)]
pub struct RouteAggregator<'a> {
    store: &'a FeatureStore,
    point_count: i32,
    feature_count: i32,
    distance: f64,
    previous: Option<Point>,
    started: Instant,
}

impl<'a> RouteAggregator<'a> {
    /// Starts a new route. The elapsed time is measured from here.
    pub fn new(store: &'a FeatureStore) -> Self {
        Self {
            store,
            point_count: 0,
            feature_count: 0,
            distance: 0.0,
            previous: None,
            started: Instant::now(),
        }
    }

    /// Folds the next point of the route into the running totals.
    pub fn record(&mut self, point: Point) {
        self.point_count = self.point_count.saturating_add(1);

        if self.store.get(&point).is_some() {
            self.feature_count = self.feature_count.saturating_add(1);
        }

        if let Some(previous) = self.previous.replace(point) {
            self.distance += geo::distance(&previous, &point);
        }
    }

    pub const fn point_count(&self) -> i32 {
        self.point_count
    }

    /// Completes the route.
    ///
    /// Distance is rounded to whole metres and elapsed time truncated to
    /// whole seconds; both saturate at `i32::MAX`.
    pub fn finish(self) -> RouteSummary {
        let elapsed = self.started.elapsed().as_secs();

        RouteSummary {
            point_count: self.point_count,
            feature_count: self.feature_count,
            // `as` saturates for out-of-range floats.
            distance: self.distance.round() as i32,
            elapsed_time: i32::try_from(elapsed).unwrap_or(i32::MAX),
        }
    }
}
