//! # Logging, tracing and metrics
//!
//! Console logging through `tracing_subscriber::fmt` is always installed.
//! OpenTelemetry export is opt-in through cargo features.
//!
//! ## Feature matrix
//!
//! - `tracing`: Enables `tracing` spans/events in the service and exports
//!   them as OpenTelemetry traces.
//! - `metrics`: Enables OpenTelemetry metrics (request counts, in-flight
//!   streams, relayed notes, ...).
//! - `otlp`: Ships traces and metrics to an OTLP collector over gRPC.
//! - `stdout`: Prints traces and metrics to stdout.
//!
//! Exporters need `tracing` or `metrics` to have anything to export. Both
//! exporters may be enabled together.
//!
//! ## Console format
//!
//! [`LogFormat::Pretty`] (default) prints multi-line human readable records;
//! [`LogFormat::Json`] prints one JSON object per line for log shippers. The
//! level filter comes from `RUST_LOG` and defaults to `info`.
//!
//! ## Example usage
//!
//! ```bash
//! cargo run --bin routeguide-server --features tracing,metrics,stdout
//! ```
//!
//! The OTLP exporter takes its endpoint, headers, compression and timeout
//! from the standard `OTEL_EXPORTER_OTLP_*` environment variables.

#[cfg(all(
    any(feature = "otlp", feature = "stdout"),
    not(any(feature = "tracing", feature = "metrics"))
))]
compile_error!("The 'otlp' and 'stdout' exporters need 'tracing' or 'metrics' enabled.");

use clap::ValueEnum;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt,
};

#[cfg(feature = "metrics")]
use opentelemetry::metrics::{Counter, Histogram, Meter, UpDownCounter};
#[cfg(feature = "metrics")]
use opentelemetry_sdk::metrics as sdkmetrics;
#[cfg(feature = "metrics")]
use std::sync::OnceLock;

#[cfg(any(feature = "metrics", feature = "tracing"))]
use opentelemetry::{InstrumentationScope, KeyValue};
#[cfg(any(feature = "metrics", feature = "tracing"))]
use opentelemetry_sdk::{Resource, error::OTelSdkResult};
#[cfg(any(feature = "metrics", feature = "tracing"))]
use opentelemetry_semantic_conventions as semvcns;

#[cfg(feature = "tracing")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "tracing")]
use opentelemetry_sdk::propagation::TraceContextPropagator;
#[cfg(feature = "tracing")]
use opentelemetry_sdk::trace as sdktrace;

const SERVICE_NAME: &str = "routeguide";

/// Console log layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Exporter handles that must be flushed on shutdown.
pub struct TelemetryProviders {
    #[cfg(feature = "tracing")]
    pub tracer_provider: sdktrace::SdkTracerProvider,
    #[cfg(feature = "metrics")]
    pub meter_provider: sdkmetrics::SdkMeterProvider,
}

impl TelemetryProviders {
    /// Flushes and shuts down every enabled exporter. Errors go to stderr
    /// since the subscriber may already be gone.
    pub fn shutdown(&self) {
        #[cfg(feature = "tracing")]
        report(
            "traces",
            self.tracer_provider
                .force_flush()
                .and_then(|()| self.tracer_provider.shutdown()),
        );

        #[cfg(feature = "metrics")]
        report(
            "metrics",
            self.meter_provider
                .force_flush()
                .and_then(|()| self.meter_provider.shutdown()),
        );
    }
}

#[cfg(any(feature = "metrics", feature = "tracing"))]
fn report(signal: &str, result: OTelSdkResult) {
    if let Err(err) = result {
        eprintln!("Failed to flush {signal}: {err}");
    }
}

fn console_layer(format: LogFormat) -> Box<dyn Layer<Registry> + Send + Sync> {
    let layer = tracing_subscriber::fmt::layer()
        .with_thread_ids(true)
        .with_line_number(true)
        .with_target(false)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_file(true);

    match format {
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Json => layer.json().flatten_event(true).boxed(),
    }
}

/// Installs the global subscriber and any enabled OpenTelemetry pipelines.
pub fn init_telemetry(format: LogFormat) -> anyhow::Result<TelemetryProviders> {
    #[cfg(feature = "tracing")]
    opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());

    #[cfg(feature = "tracing")]
    let tracer_provider = init_tracer()?;

    #[cfg(feature = "metrics")]
    let meter_provider = init_metrics()?;

    #[cfg(any(feature = "metrics", feature = "tracing"))]
    let scope = InstrumentationScope::builder(SERVICE_NAME)
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(semvcns::SCHEMA_URL)
        .build();

    // The console layer is unrelated to the `opentelemetry_stdout` exporter;
    // it only renders spans/events for humans or log shippers.
    let registry = tracing_subscriber::registry()
        .with(console_layer(format))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()));

    #[cfg(feature = "tracing")]
    let registry = {
        opentelemetry::global::set_tracer_provider(tracer_provider.clone());
        registry.with(
            tracing_opentelemetry::layer()
                .with_tracer(tracer_provider.tracer_with_scope(scope.clone()))
                .with_error_records_to_exceptions(true),
        )
    };

    #[cfg(feature = "metrics")]
    let registry = {
        opentelemetry::global::set_meter_provider(meter_provider.clone());
        let meter = opentelemetry::global::meter_with_scope(scope);
        let _ = INSTRUMENTS.set(Instruments::new(&meter));

        registry.with(tracing_opentelemetry::MetricsLayer::new(
            meter_provider.clone(),
        ))
    };

    registry.init();

    Ok(TelemetryProviders {
        #[cfg(feature = "tracing")]
        tracer_provider,
        #[cfg(feature = "metrics")]
        meter_provider,
    })
}

#[cfg(any(feature = "metrics", feature = "tracing"))]
fn resource() -> Resource {
    Resource::builder()
        .with_service_name(SERVICE_NAME)
        .with_schema_url(
            [KeyValue::new(
                semvcns::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            )],
            semvcns::SCHEMA_URL,
        )
        .build()
}

#[cfg(feature = "metrics")]
fn init_metrics() -> anyhow::Result<sdkmetrics::SdkMeterProvider> {
    let builder = sdkmetrics::SdkMeterProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = builder.with_periodic_exporter(opentelemetry_stdout::MetricExporter::default());

    #[cfg(feature = "otlp")]
    let builder = builder.with_periodic_exporter(
        opentelemetry_otlp::MetricExporter::builder()
            .with_tonic()
            .build()?,
    );

    Ok(builder.build())
}

#[cfg(feature = "tracing")]
fn init_tracer() -> anyhow::Result<sdktrace::SdkTracerProvider> {
    let builder = sdktrace::SdkTracerProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = builder.with_batch_exporter(opentelemetry_stdout::SpanExporter::default());

    #[cfg(feature = "otlp")]
    let builder = builder.with_batch_exporter(
        opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .build()?,
    );

    Ok(builder.build())
}

/// Instruments registered once the meter provider is up.
#[cfg(feature = "metrics")]
struct Instruments {
    requests: Counter<u64>,
    streams_inflight: UpDownCounter<i64>,
    stream_errors: Counter<u64>,
    stream_duration_ms: Histogram<f64>,
    features_streamed: Counter<u64>,
    points_recorded: Counter<u64>,
    notes_relayed: Counter<u64>,
    peers_evicted: Counter<u64>,
}

#[cfg(feature = "metrics")]
static INSTRUMENTS: OnceLock<Instruments> = OnceLock::new();

#[cfg(feature = "metrics")]
impl Instruments {
    fn new(meter: &Meter) -> Self {
        let counter = |name: &'static str, description: &'static str| {
            meter.u64_counter(name).with_description(description).build()
        };

        Self {
            requests: counter("requests", "Total gRPC requests, by RPC"),
            streams_inflight: meter
                .i64_up_down_counter("streams_inflight")
                .with_description("Concurrent gRPC streams")
                .build(),
            stream_errors: counter("errors", "Errored/cancelled streams"),
            stream_duration_ms: meter
                .f64_histogram("stream_duration")
                .with_unit("ms")
                .with_description("End-to-end stream duration")
                .build(),
            features_streamed: counter("features_streamed", "Features sent by ListFeatures"),
            points_recorded: counter("points_recorded", "Points received by RecordRoute"),
            notes_relayed: counter("notes_relayed", "RouteChat notes delivered to peers"),
            peers_evicted: counter(
                "peers_evicted",
                "RouteChat peers evicted after their stream closed",
            ),
        }
    }
}

// Every helper below is a no-op until `init_telemetry` registers the
// instruments, and always without the `metrics` feature.
#[cfg(feature = "metrics")]
fn with_instruments(f: impl FnOnce(&Instruments)) {
    if let Some(instruments) = INSTRUMENTS.get() {
        f(instruments);
    }
}

pub fn increment_requests(rpc: &'static str) {
    #[cfg(feature = "metrics")]
    with_instruments(|m| m.requests.add(1, &[KeyValue::new("rpc", rpc)]));
    #[cfg(not(feature = "metrics"))]
    let _ = rpc;
}

pub fn increment_streams_inflight() {
    #[cfg(feature = "metrics")]
    with_instruments(|m| m.streams_inflight.add(1, &[]));
}

pub fn decrement_streams_inflight() {
    #[cfg(feature = "metrics")]
    with_instruments(|m| m.streams_inflight.add(-1, &[]));
}

pub fn increment_stream_errors() {
    #[cfg(feature = "metrics")]
    with_instruments(|m| m.stream_errors.add(1, &[]));
}

pub fn record_stream_duration(duration_ms: f64) {
    #[cfg(feature = "metrics")]
    with_instruments(|m| m.stream_duration_ms.record(duration_ms, &[]));
    #[cfg(not(feature = "metrics"))]
    let _ = duration_ms;
}

pub fn increment_features_streamed(count: u64) {
    #[cfg(feature = "metrics")]
    with_instruments(|m| m.features_streamed.add(count, &[]));
    #[cfg(not(feature = "metrics"))]
    let _ = count;
}

pub fn increment_points_recorded(count: u64) {
    #[cfg(feature = "metrics")]
    with_instruments(|m| m.points_recorded.add(count, &[]));
    #[cfg(not(feature = "metrics"))]
    let _ = count;
}

pub fn increment_notes_relayed(count: u64) {
    #[cfg(feature = "metrics")]
    with_instruments(|m| m.notes_relayed.add(count, &[]));
    #[cfg(not(feature = "metrics"))]
    let _ = count;
}

pub fn increment_peers_evicted(count: u64) {
    #[cfg(feature = "metrics")]
    with_instruments(|m| m.peers_evicted.add(count, &[]));
    #[cfg(not(feature = "metrics"))]
    let _ = count;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helpers_are_inert_without_a_meter() {
        increment_requests("GetFeature");
        increment_streams_inflight();
        decrement_streams_inflight();
        increment_stream_errors();
        record_stream_duration(1.5);
        increment_features_streamed(3);
        increment_points_recorded(3);
        increment_notes_relayed(2);
        increment_peers_evicted(1);
    }

    #[test]
    fn log_format_parses_from_cli_values() {
        assert_eq!(LogFormat::from_str("pretty", true), Ok(LogFormat::Pretty));
        assert_eq!(LogFormat::from_str("JSON", true), Ok(LogFormat::Json));
        assert!(LogFormat::from_str("xml", true).is_err());
    }
}
