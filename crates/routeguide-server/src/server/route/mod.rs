//! `RecordRoute` aggregation.
//!
//! - [`aggregator`] - per-call state machine folding points into a
//!   [`RouteSummary`](routeguide_core::proto::RouteSummary).

pub mod aggregator;

pub use aggregator::RouteAggregator;
