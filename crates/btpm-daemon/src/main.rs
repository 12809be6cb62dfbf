//! btpm-daemon entry point.
//!
//! Thin on purpose: load config, pick a snapshot store, build the registry,
//! spawn the poll loop and serve the read-only API until Ctrl-C.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use btpm_config::{load_layered_yaml, report_unused_keys, MonitorConfig, UnusedKeyPolicy};
use btpm_daemon::{routes, state};
use btpm_db::{FileSnapshotStore, PgSnapshotStore};
use btpm_links::{Links, NullStore, SnapshotStore};
use btpm_rpc::{IconRpcSource, RpcSettings};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

const ENV_CONFIG: &str = "BTPM_CONFIG";
const ENV_SNAPSHOT_FILE: &str = "BTPM_SNAPSHOT_FILE";
const ENV_DAEMON_ADDR: &str = "BTPM_DAEMON_ADDR";
const DEFAULT_CONFIG: &str = "config/monitor.yaml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let config = load_config()?;
    info!(
        config_hash = %config.config_hash,
        networks = config.topology.nodes().len(),
        links = config.topology.connections().len(),
        grace_secs = config.engine.grace_period.as_secs(),
        poll_secs = config.poll_interval.as_secs(),
        "config loaded"
    );

    let store = build_store().await?;
    let source = IconRpcSource::new(
        config.topology.clone(),
        RpcSettings {
            request_timeout: config.engine.query_timeout.mul_f64(0.9),
        },
    )
    .context("failed to build rpc source")?;

    let links = Arc::new(Links::new(
        config.topology.clone(),
        Arc::new(source),
        store,
        config.engine,
    ));
    let shared = Arc::new(state::AppState::new(links));

    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(1));
    state::spawn_poll_loop(Arc::clone(&shared), config.poll_interval);

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = bind_addr_from_env().unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8100)));
    info!("btpm-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    info!("btpm-daemon stopped");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn load_config() -> anyhow::Result<MonitorConfig> {
    let raw = std::env::var(ENV_CONFIG).unwrap_or_else(|_| DEFAULT_CONFIG.to_string());
    let paths: Vec<&str> = raw.split(',').map(str::trim).filter(|p| !p.is_empty()).collect();

    let loaded = load_layered_yaml(&paths).with_context(|| format!("loading config {raw}"))?;
    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    for key in &report.unused_leaf_pointers {
        warn!(key = %key, "unused config key");
    }
    MonitorConfig::from_loaded(&loaded)
}

/// Postgres when BTPM_DATABASE_URL is set, else a JSON file when
/// BTPM_SNAPSHOT_FILE is set, else no persistence.
async fn build_store() -> anyhow::Result<Arc<dyn SnapshotStore>> {
    if std::env::var(btpm_db::ENV_DB_URL).is_ok() {
        let pool = btpm_db::connect_from_env().await?;
        btpm_db::migrate(&pool).await?;
        info!("snapshot store: postgres");
        return Ok(Arc::new(PgSnapshotStore::new(pool)));
    }
    if let Ok(path) = std::env::var(ENV_SNAPSHOT_FILE) {
        info!(path = %path, "snapshot store: file");
        return Ok(Arc::new(FileSnapshotStore::new(path)));
    }
    warn!("no snapshot store configured; link state will not survive restarts");
    Ok(Arc::new(NullStore))
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var(ENV_DAEMON_ADDR).ok()?.parse().ok()
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "ctrl-c handler failed; shutting down");
    }
    info!("shutdown requested");
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
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET])
        .allow_headers(tower_http::cors::Any)
}
