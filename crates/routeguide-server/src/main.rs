#![doc = include_str!("../README.md")]

use clap::Parser;
use futures::Stream;
use routeguide_core::proto::{FILE_DESCRIPTOR_SET, route_guide_server::RouteGuideServer};
use routeguide_server::server::{
    config::{CliArgs, ServerConfig},
    service::handler::RouteGuideService,
    store::FeatureStore,
    telemetry::init_telemetry,
};
use std::sync::Arc;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpListener,
    signal,
};
use tokio_stream::wrappers::TcpListenerStream;
use tonic::{
    codec::CompressionEncoding,
    transport::{Server, server::Connected},
};
use tonic_health::server::HealthReporter;
use tonic_web::GrpcWebLayer;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

type RouteGuide = RouteGuideServer<RouteGuideService>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let config = ServerConfig::try_from(CliArgs::parse())?;
    let providers = init_telemetry(config.log_format)?;

    let store = FeatureStore::load(&config.db_path)?;
    #[cfg(feature = "tracing")]
    tracing::info!(
        features = store.len(),
        db = %config.db_path.display(),
        "Feature database loaded"
    );

    let service = RouteGuideService::new(config.clone(), Arc::new(store));
    let result = if config.uds {
        serve_uds(&config, service).await
    } else {
        let listener = TcpListener::bind(&config.server_addr).await?;
        announce("tcp", &config);
        serve(TcpListenerStream::new(listener), service).await
    };

    providers.shutdown();
    result
}

#[cfg(unix)]
async fn serve_uds(config: &ServerConfig, service: RouteGuideService) -> anyhow::Result<()> {
    use tokio_stream::wrappers::UnixListenerStream;

    let path = &config.server_addr;
    let listener = tokio::net::UnixListener::bind(path)?;
    announce("uds", config);
    let result = serve(UnixListenerStream::new(listener), service).await;
    // A panic may still leave the socket file behind.
    let _ = std::fs::remove_file(path);
    result
}

#[cfg(not(unix))]
async fn serve_uds(_config: &ServerConfig, _service: RouteGuideService) -> anyhow::Result<()> {
    anyhow::bail!("Unix domain sockets are not supported on this platform")
}

fn announce(_transport: &'static str, _config: &ServerConfig) {
    #[cfg(feature = "tracing")]
    tracing::info!(
        transport = _transport,
        addr = %_config.server_addr,
        stream_buffer = _config.stream_buffer_size,
        chat_history = _config.chat_history_limit,
        shutdown_timeout_s = _config.shutdown_timeout,
        "RouteGuide listening"
    );
}

/// Serves RouteGuide next to health and reflection until a termination
/// signal has been handled.
async fn serve<I, IO, IE>(incoming: I, service: RouteGuideService) -> anyhow::Result<()>
where
    I: Stream<Item = Result<IO, IE>>,
    IO: AsyncRead + AsyncWrite + Connected + Unpin + Send + 'static,
    IE: Into<tower::BoxError>,
{
    let (health, health_service) = tonic_health::server::health_reporter();
    health.set_serving::<RouteGuide>().await;

    let reflection = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;

    let route_guide = [
        CompressionEncoding::Zstd,
        CompressionEncoding::Gzip,
        CompressionEncoding::Deflate,
    ]
    .into_iter()
    .fold(RouteGuide::new(service.clone()), |svc, encoding| {
        svc.send_compressed(encoding).accept_compressed(encoding)
    });

    // Browsers reach the service through gRPC-Web from any origin.
    let web = ServiceBuilder::new()
        .layer(CorsLayer::permissive())
        .layer(GrpcWebLayer::new());

    Server::builder()
        .accept_http1(true)
        .http2_adaptive_window(Some(true))
        .layer(web)
        .add_service(health_service)
        .add_service(reflection)
        .add_service(route_guide)
        .serve_with_incoming_shutdown(incoming, drain_on_signal(service, health))
        .await?;

    #[cfg(feature = "tracing")]
    tracing::info!("RouteGuide stopped");
    Ok(())
}

/// Waits for a termination signal, reports `NOT_SERVING`, then drains and
/// cancels in-flight streams before the transport stops.
async fn drain_on_signal(service: RouteGuideService, health: HealthReporter) {
    let _signal = termination_signal().await;
    #[cfg(feature = "tracing")]
    tracing::info!(signal = _signal, "Draining RouteGuide streams");

    health.set_not_serving::<RouteGuide>().await;
    service.shutdown().await;
}

/// Resolves with the name of the first termination signal received. A
/// signal that cannot be listened for never fires.
async fn termination_signal() -> &'static str {
    let interrupt = async {
        if let Err(_e) = signal::ctrl_c().await {
            #[cfg(feature = "tracing")]
            tracing::warn!("Cannot listen for SIGINT: {}", _e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("Cannot listen for SIGTERM: {}", _e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => "SIGINT",
        () = terminate => "SIGTERM",
    }
}
