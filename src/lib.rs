//! fleetd library - vehicle fleet telemetry service
//!
//! Ingests telemetry samples from vehicle agents over persistent TCP
//! connections, persists them in SQLite, and serves a read-only HTTP
//! API for latest state, per-vehicle history, and fleet aggregates.

use axum::Router;
use chrono::{DateTime, Utc};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod model;

use db::TelemetryStore;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Telemetry store handle
    pub store: TelemetryStore,
    /// Process start instant, for health uptime
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// Create new application state
    pub fn new(store: TelemetryStore) -> Self {
        Self {
            store,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
///
/// All routes live under /api. CORS is permissive: the read API is
/// consumed by a dashboard served from a different origin.
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .route("/api/telemetry/latest", get(api::latest_telemetry))
        .route("/api/telemetry/history", get(api::vehicle_history))
        .route("/api/telemetry/vehicles", get(api::vehicle_list))
        .route("/api/telemetry/recent", get(api::recent_telemetry))
        .route("/api/stats", get(api::get_stats))
        .merge(api::health_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
