//! gRPC service implementation and stream coordination.
//!
//! This module contains the client-facing RouteGuide handlers and the logic
//! that drives each streaming call until it completes, fails, or is cancelled
//! by shutdown.
//!
//! ## Structure
//!
//! - [`handler`] - gRPC service entry point (`RouteGuideService`).
//! - [`streams`] - per-call stream drivers.
//! - [`lifecycle`] - stream admission and phased shutdown.

pub mod handler;
pub mod lifecycle;
pub mod streams;
