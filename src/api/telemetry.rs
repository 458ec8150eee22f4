//! Telemetry read endpoints
//!
//! Stateless handlers over the store: latest-per-vehicle, per-vehicle
//! history, the vehicle list, and the raw recent feed. Every response,
//! success or failure, carries the `success` envelope; storage failures
//! are logged in full here and surfaced as generic messages.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::{ApiError, ApiResult};
use crate::model::Sample;
use crate::AppState;

/// Query parameters for the history endpoint.
///
/// `limit` is accepted as a raw string and parsed leniently: a
/// non-numeric value falls back to the default instead of failing the
/// request, so every response stays in the JSON envelope.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub vehicle_id: Option<String>,
    pub limit: Option<String>,
}

/// Query parameters for the recent feed
#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<String>,
}

/// Response for GET /api/telemetry/latest and /api/telemetry/recent
#[derive(Debug, Serialize)]
pub struct SampleListResponse {
    pub success: bool,
    pub count: usize,
    pub data: Vec<Sample>,
}

/// Response for GET /api/telemetry/history
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub success: bool,
    pub vehicle_id: String,
    pub count: usize,
    pub data: Vec<Sample>,
}

/// Response for GET /api/telemetry/vehicles
#[derive(Debug, Serialize)]
pub struct VehicleListResponse {
    pub success: bool,
    pub count: usize,
    pub vehicles: Vec<String>,
}

/// GET /api/telemetry/latest
///
/// Most recent sample per vehicle, newest first.
pub async fn latest_telemetry(
    State(state): State<AppState>,
) -> ApiResult<Json<SampleListResponse>> {
    let data = state.store.latest().await.map_err(|e| {
        error!("latest telemetry query failed: {e}");
        ApiError::Internal("Failed to fetch latest telemetry".to_string())
    })?;

    Ok(Json(SampleListResponse {
        success: true,
        count: data.len(),
        data,
    }))
}

/// GET /api/telemetry/history?vehicle_id=X&limit=N
///
/// Time-ordered history for one vehicle, newest first. `vehicle_id` is
/// required; the request is rejected before any storage access when it
/// is missing. `limit` is capped at 1000 (default 100).
pub async fn vehicle_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<HistoryResponse>> {
    let vehicle_id = match query.vehicle_id {
        Some(id) if !id.is_empty() => id,
        _ => {
            return Err(ApiError::BadRequest(
                "vehicle_id parameter is required".to_string(),
            ))
        }
    };

    let limit = parse_limit(query.limit.as_deref());
    let data = state.store.history(&vehicle_id, limit).await.map_err(|e| {
        error!(%vehicle_id, "telemetry history query failed: {e}");
        ApiError::Internal("Failed to fetch telemetry history".to_string())
    })?;

    Ok(Json(HistoryResponse {
        success: true,
        vehicle_id,
        count: data.len(),
        data,
    }))
}

/// GET /api/telemetry/vehicles
///
/// All known vehicle ids, lexicographically ordered.
pub async fn vehicle_list(State(state): State<AppState>) -> ApiResult<Json<VehicleListResponse>> {
    let vehicles = state.store.vehicle_ids().await.map_err(|e| {
        error!("vehicle list query failed: {e}");
        ApiError::Internal("Failed to fetch vehicles".to_string())
    })?;

    Ok(Json(VehicleListResponse {
        success: true,
        count: vehicles.len(),
        vehicles,
    }))
}

/// GET /api/telemetry/recent?limit=N
///
/// Most recently received samples across all vehicles, newest first by
/// receive instant. `limit` is capped at 500 (default 50).
pub async fn recent_telemetry(
    State(state): State<AppState>,
    Query(query): Query<RecentQuery>,
) -> ApiResult<Json<SampleListResponse>> {
    let limit = parse_limit(query.limit.as_deref());
    let data = state.store.recent(limit).await.map_err(|e| {
        error!("recent telemetry query failed: {e}");
        ApiError::Internal("Failed to fetch recent telemetry".to_string())
    })?;

    Ok(Json(SampleListResponse {
        success: true,
        count: data.len(),
        data,
    }))
}

/// Lenient limit parsing: absent or non-numeric values become None,
/// which the store resolves to its default.
fn parse_limit(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|s| s.parse::<i64>().ok())
}
