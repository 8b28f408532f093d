//! kx-daemon entry point.
//!
//! This file is intentionally thin: it sets up tracing, builds the shared
//! state, wires middleware, and starts the HTTP server. All route handlers
//! live in `routes.rs`; all shared state types live in `state.rs`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use kx_config::ConfigMode;
use kx_daemon::{routes, state};
use kx_runtime::{Runtime, RuntimeConfig};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Dev convenience: silent if the file does not exist, production
    // injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let pool = kx_db::connect_from_env().await.context("connect to database")?;

    let config_paths_env = std::env::var("KX_DAEMON_CONFIG_PATHS").unwrap_or_default();
    let config_paths: Vec<&str> = config_paths_env.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
    let mode = run_mode_from_env();
    let (app_key, app_secret) = resolve_broker_secrets(&config_paths, mode)?;

    let runtime = Arc::new(Runtime::new(pool, RuntimeConfig::default(), app_key, app_secret));
    let handles = runtime.spawn_background_loops();

    let shared = Arc::new(state::AppState::new(runtime));
    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(1));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = bind_addr_from_env().unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8899)));
    info!("kx-daemon listening on http://{}", addr);

    let server = axum::serve(tokio::net::TcpListener::bind(addr).await?, app);
    let result = server.await.context("server crashed");

    handles.abort_all();
    result
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("KX_DAEMON_ADDR").ok()?.parse().ok()
}

fn run_mode_from_env() -> ConfigMode {
    match std::env::var("KX_RUN_MODE").ok().as_deref() {
        Some("live") | Some("LIVE") => ConfigMode::Live,
        _ => ConfigMode::Paper,
    }
}

/// Loads the layered config (if any paths are configured) and resolves the
/// broker app key/secret for `mode`, failing closed if either is missing.
fn resolve_broker_secrets(config_paths: &[&str], mode: ConfigMode) -> anyhow::Result<(String, String)> {
    let config_json = if config_paths.is_empty() {
        serde_json::json!({})
    } else {
        kx_config::load_layered_yaml(config_paths)?.config_json
    };

    let secrets = kx_config::resolve_secrets_for_mode(&config_json, mode)?;
    let app_key = secrets.broker_app_key.context("missing broker app key for run mode")?;
    let app_secret = secrets
        .broker_app_secret
        .context("missing broker app secret for run mode")?;
    Ok((app_key, app_secret))
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
        "http://localhost:1420",
        "http://127.0.0.1:1420",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
