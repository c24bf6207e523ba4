//! Embargo Gateway - example host server for the embargo gate
//!
//! Serves a small site whose content routes are held back until the configured
//! embargo deadline, while operational endpoints stay reachable.
//!
//! # Routes
//!
//! - `/`, `/press`: rendered views tagged `embargo`
//! - `/api/ping`: plain API route
//! - `/embargo/status`: deadline and decision counters (never gated)
//! - `/metrics`: Prometheus metrics (never gated)
//! - `/health`: liveness (never gated)

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use clap::Parser;
use embargo_core::{
    embargo_middleware, Deadline, EmbargoConfig, EmbargoGate, EmbargoState, RouteCatalog,
    RouteMeta,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Tag carried by content routes
const EMBARGO_TAG: &str = "embargo";

#[derive(Parser, Debug)]
#[command(name = "embargo-gateway")]
#[command(about = "Embargo Gateway - Serves content behind a time-based embargo", long_about = None)]
struct Args {
    /// Path to configuration file (ignored if --env-mode is set)
    #[arg(short, long, default_value = "config/embargo.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Load configuration from environment variables instead of file
    #[arg(long, default_value = "false")]
    env_mode: bool,

    /// Bind address for HTTP server
    #[arg(long, default_value = "0.0.0.0:8080")]
    listen: String,
}

#[derive(Serialize)]
struct EmbargoStatus {
    now: DateTime<Utc>,
    deadline: Option<DateTime<Utc>>,
    dynamic: bool,
    lifted: bool,
    blocks_total: u64,
    passes_total: u64,
    resolution_failures: u64,
    uptime_seconds: u64,
}

/// GET /embargo/status - Deadline and decision counters
async fn get_status(State(state): State<EmbargoState>) -> Response {
    let now = Utc::now();
    let gate = state.gate();

    let deadline = match gate.deadline().current().await {
        Ok(at) => at,
        Err(e) => {
            error!("Failed to resolve embargo deadline: {}", e);
            state.metrics().record_resolution_failure();
            return (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response();
        }
    };

    let metrics = state.metrics();
    Json(EmbargoStatus {
        now,
        deadline: Some(deadline),
        dynamic: matches!(gate.deadline(), Deadline::Dynamic { .. }),
        lifted: now >= deadline,
        blocks_total: metrics.blocks_total(),
        passes_total: metrics.passes_total(),
        resolution_failures: metrics.resolution_failures(),
        uptime_seconds: metrics.uptime_seconds(),
    })
    .into_response()
}

/// GET /metrics - Prometheus metrics
async fn get_metrics(State(state): State<EmbargoState>) -> String {
    state.metrics().prometheus_format()
}

/// GET /health - Simple health check
async fn health_check() -> StatusCode {
    StatusCode::OK
}

async fn home() -> Html<&'static str> {
    Html("<!doctype html><html><body><h1>Launch day</h1><p>The wait is over.</p></body></html>")
}

async fn press() -> Html<&'static str> {
    Html("<!doctype html><html><body><h1>Press release</h1></body></html>")
}

async fn ping() -> &'static str {
    "pong"
}

/// Route metadata for the gated content routes
fn route_catalog() -> RouteCatalog {
    let mut catalog = RouteCatalog::new();
    catalog
        .insert("/", RouteMeta::view().with_tag(EMBARGO_TAG))
        .insert("/press", RouteMeta::view().with_tag(EMBARGO_TAG))
        .insert("/api/ping", RouteMeta::default());
    catalog
}

/// Build the application router
///
/// Operational routes are merged outside the embargo layer so they stay reachable.
fn build_app(state: EmbargoState) -> Router {
    let content = Router::new()
        .route("/", get(home))
        .route("/press", get(press))
        .route("/api/ping", get(ping))
        .route_layer(middleware::from_fn_with_state(state.clone(), embargo_middleware));

    let ops = Router::new()
        .route("/embargo/status", get(get_status))
        .route("/metrics", get(get_metrics))
        .route("/health", get(health_check))
        .with_state(state);

    content
        .merge(ops)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse arguments
    let args = Args::parse();

    // Initialize tracing
    let log_level = args.log_level.parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .json()
        .init();

    info!("Embargo Gateway v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = if args.env_mode {
        info!("Loading configuration from environment variables");
        EmbargoConfig::from_env()
            .context("Failed to load configuration from environment")?
    } else {
        info!("Loading configuration from file: {:?}", args.config);
        EmbargoConfig::from_file(&args.config)
            .context("Failed to load configuration from file")?
    };

    // Register the gate; no deadline means no server
    let gate = EmbargoGate::from_config(&config)
        .context("Failed to register embargo gate")?;

    info!("Embargo scope: {:?}", gate.scope());

    let state = EmbargoState::new(gate).with_catalog(route_catalog());
    let app = build_app(state);

    let addr: SocketAddr = args.listen.parse()
        .context("Invalid listen address")?;

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Embargo Gateway stopped");
    Ok(())
}
