/// Builds the gRPC client and server code for the `route_guide.proto`
/// definition using `tonic-prost-build`.
///
/// This code generation step processes the Protocol Buffer definitions located
/// in the `proto` directory and emits Rust modules with gRPC bindings into the
/// crate's `OUT_DIR`, together with an encoded file descriptor set used by
/// server reflection.
///
/// # Point as a map key
///
/// `Point` holds only scalar fields, so prost already derives `Copy`, `Eq`
/// and `Hash` for it. It keys the feature index and the chat relay registry
/// directly; no extra attribute is needed.
///
/// # Files and Paths
///
/// - Proto file: `proto/route_guide.proto`
/// - Includes: `proto/`
/// - Descriptor: `$OUT_DIR/routeguide_descriptor.bin`
///
/// # Output
///
/// Generated code will be accessible in Rust via:
///
/// ```rust
/// pub mod proto {
///     tonic::include_proto!("routeguide");
/// }
/// ```
use std::env;
use std::path::PathBuf;
fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let descriptor_path = out_dir.join("routeguide_descriptor.bin");

    let mut config = tonic_prost_build::Config::new();

    config.file_descriptor_set_path(&descriptor_path);

    tonic_prost_build::configure()
        .compile_with_config(config, &["proto/route_guide.proto"], &["proto"])
        .unwrap();
}
