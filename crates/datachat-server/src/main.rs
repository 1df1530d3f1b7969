//! Datachat server - HTTP/WebSocket backend for chat sessions with
//! file-backed natural-language querying.

use anyhow::Result;
use clap::Parser;
use datachat_server::{config::Config, logging, router, state::AppState};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::services::ServeDir;

use logging::{LogConfig, LogFormat};

/// Datachat server - chat sessions with natural-language table querying.
#[derive(Parser, Debug)]
#[command(name = "datachat-server")]
#[command(about = "HTTP/WebSocket backend for chat sessions with file-backed querying")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override port from config
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable verbose logging (INFO level for most targets)
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging (DEBUG level)
    #[arg(short, long)]
    debug: bool,

    /// Enable trace logging (TRACE level for everything)
    #[arg(long)]
    trace: bool,

    /// Quiet mode (WARN and ERROR only)
    #[arg(short, long)]
    quiet: bool,

    /// Set log level for specific targets (e.g., "model=debug" or "relay=trace")
    /// Can be specified multiple times. Targets are prefixed with "datachat::" automatically.
    #[arg(long = "log", value_name = "TARGET=LEVEL")]
    log_overrides: Vec<String>,

    /// Log output format
    #[arg(long = "log-format", value_name = "FORMAT", default_value = "text")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::from_cli(
        cli.verbose,
        cli.debug,
        cli.trace,
        cli.quiet,
        cli.log_overrides,
        cli.log_format,
    );
    logging::init(&log_config);

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    if let Some(port) = cli.port {
        config.port = port;
    }

    tracing::info!(target: "datachat::startup", "Loaded configuration (port: {})", config.port);

    let static_dir = config.static_dir.clone();
    let state = Arc::new(AppState::new(config.clone())?);
    tracing::info!(target: "datachat::startup", "Initialized application state");

    let app = router(state).fallback_service(ServeDir::new(&static_dir));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!(target: "datachat::startup", "Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
