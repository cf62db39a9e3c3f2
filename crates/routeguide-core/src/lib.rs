#![doc = include_str!("../README.md")]

mod common;
pub use common::*;

/// gRPC service and message definitions generated from
/// `proto/route_guide.proto`.
///
/// ## Service
///
/// - `RouteGuide` - `GetFeature` (unary), `ListFeatures` (server
///   streaming), `RecordRoute` (client streaming) and `RouteChat`
///   (bidirectional streaming).
///
/// ## Messages
///
/// - [`Point`](proto::Point) - E7 latitude/longitude pair. All-scalar, so prost
///   derives `Copy`, `Eq` and `Hash` and it can key a `HashMap`.
/// - [`Rectangle`](proto::Rectangle), [`Feature`](proto::Feature),
///   [`FeatureDatabase`](proto::FeatureDatabase),
///   [`RouteNote`](proto::RouteNote), [`RouteSummary`](proto::RouteSummary).
pub mod proto {
    tonic::include_proto!("routeguide");

    /// Encoded file descriptor set, registered with the reflection service.
    pub const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("routeguide_descriptor");
}
