//! Error types for the RouteGuide service.
//!
//! This module defines the central `Error` enum for conditions the service
//! itself raises while driving a streaming call. It implements `From<Error>`
//! for `tonic::Status` so handlers can propagate with `?`.
//!
//! ## Error Cases
//! - `RequestCancelled`: The client went away mid-stream.
//! - `ServiceShutdown`: The call was refused or stopped by server shutdown.
//!
//! None of the four RouteGuide RPCs define domain validation errors.

use tonic::Status;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the RouteGuide service.
#[derive(Clone, Copy, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The client aborted the request.
    #[error("Request cancelled by client")]
    RequestCancelled,

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::RequestCancelled => Status::cancelled("Request was cancelled"),
            Error::ServiceShutdown => Status::unavailable("Service is shutting down"),
        }
    }
}
