// VPSight - Web Server
// Public dashboard, admin area and JSON admin API over Axum

use anyhow::{Context, Result};
use std::sync::Arc;
use vpsight::server::{build_router, AppState};
use vpsight::{init_tracing, AppConfig, SqliteStore, SystemClock};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("vpsight=info,tower_http=info");

    let config = AppConfig::from_env()?;
    let store = SqliteStore::open(&config.db_path, &config.public_url)?;
    tracing::info!(path = ?config.db_path, "database opened");

    let bind_addr = config.bind_addr.clone();
    let state = AppState::bootstrap(store, config, Arc::new(SystemClock))?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;

    tracing::info!(addr = %bind_addr, "🚀 server listening");
    tracing::info!("   UI:    http://{}/", bind_addr);
    tracing::info!("   Admin: http://{}/admin/dashboard", bind_addr);

    axum::serve(listener, app)
        .await
        .context("Server terminated unexpectedly")?;

    Ok(())
}
