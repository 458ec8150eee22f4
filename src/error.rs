//! Error types for fleetd
//!
//! One enum per failure domain: validation of inbound samples, storage
//! access, per-message ingestion, and the HTTP API surface. Nothing
//! here is fatal to the process; binaries wrap startup-only failures in
//! `anyhow` with context.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Reasons a decoded sample is rejected before storage.
///
/// The display strings are part of the wire protocol: they are sent
/// verbatim in rejection acknowledgments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// `vehicle_id` absent or empty
    #[error("Missing vehicle_id")]
    MissingVehicleId,

    /// None of speed, latitude, temperature present
    #[error("No telemetry data provided")]
    NoTelemetryData,
}

/// Storage-engine failure (connectivity, pool exhaustion after the
/// acquire timeout). The store never retries; callers surface this as a
/// generic failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
}

/// Per-message ingestion failure, classified for acknowledgment
#[derive(Debug, Error)]
pub enum IngestError {
    /// Malformed inbound record; the connection stays open
    #[error("invalid message format: {0}")]
    Decode(#[from] serde_json::Error),

    /// Structurally sound but incomplete sample; rejected with reason
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Insert failed; acked generically, never with internal detail
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or invalid request parameter (400)
    #[error("{0}")]
    BadRequest(String),

    /// Storage failure behind a read endpoint (500). Carries the
    /// per-endpoint generic message; the real cause is logged at the
    /// handler.
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "success": false,
            "error": message,
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_wire_strings() {
        assert_eq!(ValidationError::MissingVehicleId.to_string(), "Missing vehicle_id");
        assert_eq!(
            ValidationError::NoTelemetryData.to_string(),
            "No telemetry data provided"
        );
    }

    #[test]
    fn test_bad_request_maps_to_400() {
        let response = ApiError::BadRequest("vehicle_id parameter is required".to_string())
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_internal_maps_to_500() {
        let response = ApiError::Internal("Failed to fetch latest telemetry".to_string())
            .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
