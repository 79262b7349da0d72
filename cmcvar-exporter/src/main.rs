// CMCVAR Exporter - Prometheus exporter for CMC III sockets
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # CMCVAR Exporter
//!
//! Re-exports the socket measurements of a Rittal CMC III PDU, read from
//! a Prometheus server, as gauges labeled with the machine plugged into
//! each socket.
//!
//! ## Usage
//!
//! ```bash
//! # Defaults: port 8123, config.json, one cycle a minute
//! cmcvar-exporter --prometheus-url http://prometheus:9090
//!
//! # Same through the environment
//! PORT=9200 UPDATE_PERIOD_S=30 BINDINGS_CONFIG=/etc/cmcvar.json cmcvar-exporter
//! ```

mod client;
mod config;
mod error;
mod metrics;
mod poller;
mod retry;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use clap::Parser;
use config::{Args, BindingsStore, ExporterConfig};
use error::Result;
use metrics::SocketMetrics;
use poller::{LastCycle, Poller, PollerState};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers.
struct AppState {
    metrics: Arc<SocketMetrics>,
    poller: Arc<PollerState>,
    prometheus_url: String,
    device_index: String,
    start_time: Instant,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match args.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("CMCVAR Exporter v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(&args).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(args: &Args) -> Result<()> {
    let config = ExporterConfig::try_from(args)?;
    let bindings = BindingsStore::open(&config.bindings_path)?;
    let metrics = Arc::new(SocketMetrics::new()?);

    let poller = Poller::new(config.clone(), bindings, Arc::clone(&metrics))?;
    let state = Arc::new(AppState {
        metrics,
        poller: poller.state(),
        prometheus_url: config.prometheus_url.clone(),
        device_index: config.device_index.clone(),
        start_time: Instant::now(),
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poll_task = tokio::spawn(poller.run(shutdown_rx));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Starting server on http://{}", addr);
    info!("Metrics endpoint: http://{}/metrics", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = poll_task.await {
        error!("Poller task ended abnormally: {}", e);
    }
    info!("Stopped");
    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/status", get(status_handler))
        .route("/tree", get(tree_handler))
        .with_state(state)
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C, shutting down"),
        Err(e) => error!("Cannot listen for Ctrl-C: {}", e),
    }
}

/// Root handler - shows a simple HTML page.
async fn root_handler() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>CMCVAR Exporter</title>
    <style>
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 800px; margin: 50px auto; padding: 20px; }
        h1 { color: #2c3e50; }
        a { color: #3498db; text-decoration: none; }
        .endpoints { background: #f8f9fa; padding: 20px; border-radius: 8px; margin: 20px 0; }
        code { background: #e9ecef; padding: 2px 6px; border-radius: 4px; }
    </style>
</head>
<body>
    <h1>CMCVAR Exporter</h1>
    <p>CMC III socket measurements, labeled by the machine plugged into each socket.</p>

    <div class="endpoints">
        <h2>Endpoints</h2>
        <div><a href="/metrics">/metrics</a> - Prometheus metrics</div>
        <div><a href="/health">/health</a> - Health check</div>
        <div><a href="/ready">/ready</a> - Ready once a cycle has been published</div>
        <div><a href="/status">/status</a> - Poll status (JSON)</div>
        <div><a href="/tree">/tree</a> - Last assembled variable tree (JSON)</div>
    </div>

    <p>Each leaf of a bound socket is exported as <code>sockets_&lt;slot&gt;_&lt;variable&gt;</code>
    with the labels <code>key</code>, <code>index</code> and <code>node</code>.</p>
</body>
</html>"#,
    )
}

/// Metrics handler - returns Prometheus text format.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Readiness check handler.
async fn ready_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.poller.is_ready() {
        (StatusCode::OK, "Ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Waiting for first cycle")
    }
}

/// Status information response.
#[derive(Serialize)]
struct StatusResponse {
    version: String,
    uptime_secs: u64,
    prometheus_url: String,
    device_index: String,
    running: bool,
    cycles_ok: u64,
    cycles_failed: u64,
    last: LastCycle,
}

/// Status handler - returns JSON status information.
async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let poller = &state.poller;
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        prometheus_url: state.prometheus_url.clone(),
        device_index: state.device_index.clone(),
        running: poller.running.load(Ordering::SeqCst),
        cycles_ok: poller.cycles_ok.load(Ordering::SeqCst),
        cycles_failed: poller.cycles_failed.load(Ordering::SeqCst),
        last: poller.last.read().await.clone(),
    })
}

/// Last assembled tree, 404 until a cycle succeeds.
async fn tree_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.poller.tree_json.read().await.clone() {
        Some(json) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            json,
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "No cycle published yet").into_response(),
    }
}
