//! Shared definitions used by both the server runtime and clients.
//!
//! ## Submodules
//!
//! - [`error`] - Service error type and its `tonic::Status` mapping.
//! - [`geo`] - Distance and rectangle containment on E7 coordinates.

pub mod error;
pub mod geo;

pub use error::{Error, Result};
