//! F1 Race Replay Server
//!
//! Loads race exports, keeps the playback clock, and serves the replay
//! control API

use anyhow::{Context, Result};
use frr_server::{api, config::ServerConfig, state};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting F1 Race Replay Server");

    let config = ServerConfig::from_env();
    info!("Race cache: {}", config.cache_dir.display());

    let addr = config.bind;
    let state = state::AppState::new(config);
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
