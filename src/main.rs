// CAPsMAN Exporter - Prometheus exporter for MikroTik CAPsMAN registration tables
//
// Polls the CAPsMAN registration table of every configured RouterOS device and
// exposes per-station signal, rate and traffic metrics on /metrics.
//
// # Features
// - Current and legacy registration table schemas, selectable per deployment
// - Combined "tx,rx" traffic fields split into separate counters
// - Partial results when individual fields are malformed
// - Scrape health metrics per device and collector
// - Systemd integration (JSON logs when running as a service)
//
// # Usage
// capsman-exporter --config <settings.json>
//
// Example:
// capsman-exporter --config /etc/capsman-exporter/settings.json --listen 127.0.0.1:9436

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use clap::Parser;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// Module declarations
mod config;
mod exposition;
mod metrics;
mod routeros;
mod scheduler;

use config::ExporterSettings;
use exposition::MetricStore;
use metrics::create_enabled_collectors;
use routeros::RestClient;
use scheduler::{DeviceTarget, MetricScheduler};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the JSON settings file
    #[arg(short, long)]
    config: PathBuf,

    /// Override the listen address from the settings file
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Override the poll interval (seconds) from the settings file
    #[arg(short, long)]
    interval: Option<u64>,

    /// Collect every device once, print the metrics and exit
    #[arg(long)]
    once: bool,

    /// Log level used when RUST_LOG is not set (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Application entry point
///
/// This function:
/// 1. Parses command-line arguments and initializes logging
/// 2. Loads and validates the settings file
/// 3. Creates the enabled collectors and registers their descriptors
/// 4. Starts the scheduler and the HTTP server
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    info!("=== CAPsMAN Exporter Starting ===");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut settings = ExporterSettings::load(&args.config)
        .await
        .context("Failed to load exporter settings")?;
    if let Some(listen) = args.listen {
        settings.listen = listen;
    }
    if let Some(interval) = args.interval {
        settings.poll_interval = interval;
    }
    settings.validate().context("Invalid exporter settings")?;

    let collectors = create_enabled_collectors(&settings.collectors);
    info!("Created {} collector(s)", collectors.len());

    let store = Arc::new(MetricStore::new());
    for collector in &collectors {
        let count = store
            .register(collector.as_ref())
            .await
            .with_context(|| format!("Failed to register collector '{}'", collector.name()))?;
        info!("Collector '{}' declares {} metric(s)", collector.name(), count);
    }

    let mut targets = Vec::with_capacity(settings.devices.len());
    for device in &settings.devices {
        let client = RestClient::new(device, settings.request_timeout())
            .with_context(|| format!("Failed to create client for device '{}'", device.name))?;
        targets.push(DeviceTarget {
            device: device.device(),
            client: Arc::new(client),
        });
    }

    let scheduler = MetricScheduler::new(targets, Arc::clone(&store), settings.poll_interval());

    if args.once {
        scheduler.collect_once(&collectors).await;
        let text = store.render().await.context("Failed to render metrics")?;
        print!("{}", text);
        return Ok(());
    }

    tokio::spawn(scheduler.start(collectors));

    let app = Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .with_state(store);

    let listener = TcpListener::bind(settings.listen)
        .await
        .with_context(|| format!("Failed to bind {}", settings.listen))?;

    info!("=== CAPsMAN Exporter Started Successfully ===");
    info!("Metrics endpoint: http://{}/metrics", settings.listen);

    axum::serve(listener, app)
        .await
        .context("HTTP server stopped")?;

    Ok(())
}

/// Initializes the logging subsystem
///
/// Sets up structured logging with:
/// - Timestamp, level and target for each log entry
/// - Colored output when running in a terminal
/// - JSON output when running as a systemd service
///
/// # Log Levels
/// Default: the `--log-level` argument.
/// Can be overridden with RUST_LOG environment variable
fn init_logging(default_level: &str) {
    // Systemd sets INVOCATION_ID for the processes it starts
    let is_systemd = env::var("INVOCATION_ID").is_ok();

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if is_systemd {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Root handler - links the endpoints
async fn root_handler() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html>
<head><title>CAPsMAN Exporter</title></head>
<body>
    <h1>CAPsMAN Exporter</h1>
    <ul>
        <li><a href="/metrics">/metrics</a> - Prometheus metrics</li>
        <li><a href="/status">/status</a> - Last collection cycle per device (JSON)</li>
        <li><a href="/health">/health</a> - Health check</li>
    </ul>
</body>
</html>"#,
    )
}

/// Metrics handler - returns the Prometheus text format
async fn metrics_handler(State(store): State<Arc<MetricStore>>) -> impl IntoResponse {
    match store.render().await {
        Ok(text) => (
            StatusCode::OK,
            [("Content-Type", "text/plain; version=0.0.4; charset=utf-8")],
            text,
        ),
        Err(e) => {
            error!("Failed to render metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("Content-Type", "text/plain; charset=utf-8")],
                e.to_string(),
            )
        }
    }
}

/// Health check handler
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Status handler - last cycle of every (device, collector) pair
async fn status_handler(State(store): State<Arc<MetricStore>>) -> impl IntoResponse {
    Json(store.status().await)
}
