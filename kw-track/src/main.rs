//! kw-track - Listing Analysis Tracker
//!
//! Sits between the kamerwatch dashboard UI and the scraper backend:
//! submits listing URLs for analysis, polls jobs to completion, drives
//! duplicate resolution, and serves normalized change/availability read
//! models. Integrates with the UI via HTTP REST + SSE.

use anyhow::Result;
use kw_common::config::TrackConfig;
use kw_common::events::EventBus;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use kw_track::services::HttpScraperBackend;
use kw_track::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing; KW_LOG_FILTER wins over the config file because
    // the subscriber must exist before the config is loaded.
    let filter = std::env::var("KW_LOG_FILTER").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting kw-track (Listing Analysis Tracker)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Resolve configuration (env -> TOML -> defaults)
    let config = TrackConfig::resolve()?;
    info!("Backend: {}", config.backend_url);

    // Scraper backend client
    let backend = Arc::new(HttpScraperBackend::new(&config.backend_url)?);

    // Event bus for SSE broadcasting
    let event_bus = EventBus::new(256);
    info!("Event bus initialized");

    // Create application state
    let listen_port = config.listen_port;
    let state = AppState::new(backend, event_bus, config);

    // Build router
    let app = kw_track::build_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", listen_port)).await?;
    info!("Listening on http://127.0.0.1:{}", listen_port);
    info!("Health check: http://127.0.0.1:{}/health", listen_port);

    axum::serve(listener, app).await?;

    Ok(())
}
