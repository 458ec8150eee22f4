//! Aggregate statistics endpoint

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use tracing::error;

use crate::error::{ApiError, ApiResult};
use crate::model::AggregateStats;
use crate::AppState;

/// Response for GET /api/stats
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub success: bool,
    pub data: AggregateStats,
}

/// GET /api/stats
///
/// Fleet-wide aggregates: row counts, per-vehicle counts, storage
/// footprint, receive-time bounds, and reading averages. An empty store
/// returns zeroed values, not an error.
pub async fn get_stats(State(state): State<AppState>) -> ApiResult<Json<StatsResponse>> {
    let data = state.store.stats().await.map_err(|e| {
        error!("stats query failed: {e}");
        ApiError::Internal("Failed to fetch database statistics".to_string())
    })?;

    Ok(Json(StatsResponse {
        success: true,
        data,
    }))
}
