//! kw-track library interface
//!
//! Exposes the tracker core and HTTP surface for integration testing.

pub mod api;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use kw_common::config::TrackConfig;
use kw_common::events::EventBus;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::services::duplicate_resolver::DuplicateResolver;
use crate::services::job_tracker::{JobTracker, PollPolicy};
use crate::services::ScraperBackend;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Scraper backend handle
    pub backend: Arc<dyn ScraperBackend>,
    /// Event bus feeding the SSE stream
    pub event_bus: EventBus,
    /// Analysis job tracking
    pub tracker: JobTracker,
    /// Duplicate resolution workflow
    pub resolver: DuplicateResolver,
    /// Resolved service configuration
    pub config: TrackConfig,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(backend: Arc<dyn ScraperBackend>, event_bus: EventBus, config: TrackConfig) -> Self {
        let tracker = JobTracker::new(
            backend.clone(),
            event_bus.clone(),
            PollPolicy::from_config(&config),
            config.auto_link_threshold,
        );
        let resolver = DuplicateResolver::new(backend.clone(), tracker.clone(), event_bus.clone());

        Self {
            backend,
            event_bus,
            tracker,
            resolver,
            config,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::analysis_routes())
        .merge(api::changes_routes())
        .merge(api::availability_routes())
        .merge(api::health_routes())
        .route("/events", get(api::event_stream))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
