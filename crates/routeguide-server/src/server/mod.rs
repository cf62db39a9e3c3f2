//! Server runtime: components, gRPC service and process plumbing.

pub mod chat;
pub mod config;
pub mod route;
pub mod service;
pub mod store;
pub mod telemetry;
