//! Langdetect Server
//!
//! Loads the CLD3 engine once, then serves the detection API and the
//! interactive page.

use anyhow::Result;
use clap::Parser;
use langdetect_engine::{EngineCell, EngineLoader};
use langdetect_server::{run_server, AppState, Cli, ServiceConfig};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    init_tracing(cli.verbose);

    info!("Starting langdetect server");

    // Load configuration
    let config = ServiceConfig::load(&cli.config, &cli)?;
    info!("Static directory: {}", config.static_dir.display());

    // Initialize metrics
    let metrics_handle = init_metrics()?;

    // Acquire the engine before accepting requests
    let loader = EngineLoader::new(config.artifact_config());
    info!("Artifact: {}", loader.config().artifact_path.display());
    let engine = Arc::new(EngineCell::new());
    engine.initialize(loader.load().await)?;

    let addr = config.socket_addr()?;
    print_banner(&config, engine.is_loaded());

    let state = AppState::new(config, engine).with_metrics(metrics_handle);
    run_server(state, addr).await
}

fn print_banner(config: &ServiceConfig, wasm_loaded: bool) {
    let mode = if wasm_loaded {
        "server-side detection"
    } else {
        "browser-side mode"
    };
    let url = config.public_url();

    println!();
    println!("  CLD3 Language Detector");
    println!("  Server running at {}", url);
    println!("  WASM mode:    {}", mode);
    println!("  API endpoint: POST /api/detect");
    println!("  Health check: GET /api/health");
    println!();
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("langdetect=debug,tower_http=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("langdetect=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Initialize metrics exporter and return handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!(
        "langdetect_requests_total",
        "Total number of detection requests by endpoint"
    );
    metrics::describe_counter!(
        "langdetect_detections_total",
        "Total number of detection outcomes"
    );
    metrics::describe_histogram!(
        "langdetect_engine_latency_us",
        metrics::Unit::Microseconds,
        "Engine call latency in microseconds"
    );

    info!("Metrics exporter initialized");
    Ok(handle)
}
