//! # `routeguide-server`: the RouteGuide gRPC service
//!
//! A tonic implementation of the four-RPC RouteGuide tutorial service over an
//! in-memory feature database.
//!
//! ## Highlights
//!
//! - **Unary and server streaming lookups**: `GetFeature` and `ListFeatures`
//!   run against an immutable, lock-free [`FeatureStore`].
//! - **Client streaming aggregation**: `RecordRoute` folds a stream of points
//!   into a single [`RouteSummary`](routeguide_core::proto::RouteSummary).
//! - **Bidirectional relay**: `RouteChat` broadcasts notes to every other
//!   participant at the same location through a shared [`ChatRelay`].
//! - **Graceful shutdown**: new streams are refused, in-flight streams drain,
//!   and stragglers are cancelled.
//!
//! ## Module Overview
//!
//! - [`server::store`] - feature database and startup loader.
//! - [`server::route`] - per-call route aggregation.
//! - [`server::chat`] - location-keyed chat registry.
//! - [`server::service`] - the gRPC service and stream lifecycle.
//! - [`server::config`] - CLI / environment configuration.
//! - [`server::telemetry`] - logging, tracing and metrics setup.
//!
//! [`FeatureStore`]: server::store::FeatureStore
//! [`ChatRelay`]: server::chat::ChatRelay

pub mod server;
