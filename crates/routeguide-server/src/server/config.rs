use crate::server::telemetry::LogFormat;
use anyhow::bail;
use clap::Parser;
use std::path::PathBuf;

/// Runtime configuration for the `routeguide-server` binary.
///
/// These settings control where the server listens, which feature database
/// it loads at startup, and how much buffering each streaming call gets. All
/// values are parsed from CLI arguments or environment variables (a `.env`
/// file is honored), with defaults suitable for local development.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "routeguide-server",
    version,
    about = "A gRPC RouteGuide service: feature lookups, route summaries and route chat"
)]
pub struct CliArgs {
    /// Address to listen on (TCP or Unix socket path; use --uds for Unix
    /// socket).
    ///
    /// Example: "0.0.0.0:10000" or "/tmp/routeguide.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:10000"))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be
    /// a file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,

    /// Path of the feature database loaded at startup.
    ///
    /// Files ending in `.json` are read as a JSON array of features; anything
    /// else is decoded as a binary protobuf `FeatureDatabase`.
    ///
    /// Environment variable: `ROUTE_GUIDE_DB`
    #[arg(long, env = "ROUTE_GUIDE_DB", default_value = "data/route_guide_db.json")]
    pub db_path: PathBuf,

    /// Capacity of the response buffer between the `ListFeatures` producer
    /// task and the gRPC stream.
    ///
    /// Environment variable: `STREAM_BUFFER_SIZE`
    #[arg(long, env = "STREAM_BUFFER_SIZE", default_value_t = 16)]
    pub stream_buffer_size: usize,

    /// Number of notes retained per location in the chat history. `0`
    /// disables history.
    ///
    /// Environment variable: `CHAT_HISTORY_LIMIT`
    #[arg(long, env = "CHAT_HISTORY_LIMIT", default_value_t = 256)]
    pub chat_history_limit: usize,

    /// Seconds to wait for in-flight streams to finish during shutdown before
    /// they are cancelled.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 3)]
    pub shutdown_timeout: u64,

    /// Console log layout: `pretty` or `json`.
    ///
    /// Environment variable: `LOG_FORMAT`
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub uds: bool,
    pub db_path: PathBuf,
    pub stream_buffer_size: usize,
    pub chat_history_limit: usize,
    pub shutdown_timeout: u64,
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_addr: String::from("0.0.0.0:10000"),
            uds: false,
            db_path: PathBuf::from("data/route_guide_db.json"),
            stream_buffer_size: 16,
            chat_history_limit: 256,
            shutdown_timeout: 3,
            log_format: LogFormat::Pretty,
        }
    }
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.stream_buffer_size == 0 {
            bail!("STREAM_BUFFER_SIZE must be greater than 0");
        }

        Ok(Self {
            server_addr: args.server_addr,
            uds: args.uds,
            db_path: args.db_path,
            stream_buffer_size: args.stream_buffer_size,
            chat_history_limit: args.chat_history_limit,
            shutdown_timeout: args.shutdown_timeout,
            log_format: args.log_format,
        })
    }
}
