//! Telemetry data model
//!
//! Three shapes of the same observation, in the order they move through
//! the service: `RawSample` (as decoded off the wire), `NewSample`
//! (validated and normalized, not yet persisted), and `Sample` (a
//! persisted row with its storage-assigned id). Aggregate statistics
//! types for the stats endpoint live here too.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Inbound telemetry record exactly as decoded from one framed message.
///
/// Mirrors the wire payload 1:1; every field is optional at this stage.
/// Unknown keys are ignored; a value of the wrong type fails the decode
/// rather than being coerced, so zero-valued readings survive intact.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSample {
    /// Vehicle identifier (required for a sample to be valid)
    pub vehicle_id: Option<String>,
    /// Speed in km/h
    pub speed: Option<f64>,
    /// Latitude in decimal degrees
    pub latitude: Option<f64>,
    /// Longitude in decimal degrees
    pub longitude: Option<f64>,
    /// Temperature in degrees Celsius
    pub temperature: Option<f64>,
    /// Fuel level as a percentage
    pub fuel_level: Option<f64>,
    /// Engine revolutions per minute
    pub engine_rpm: Option<i64>,
    /// Free-text vehicle status
    pub status: Option<String>,
    /// Agent-supplied observation instant (RFC 3339)
    pub timestamp: Option<DateTime<Utc>>,
}

/// Validated, normalized sample awaiting insertion.
///
/// Produced by `ingest::validate`. Invariants:
/// - `vehicle_id` is non-empty.
/// - At least one of `speed`, `latitude`, `temperature` is present.
/// - `status` is non-empty (`"unknown"` when the agent sent none).
/// - `timestamp` is set (server receive time when the agent sent none).
#[derive(Debug, Clone, PartialEq)]
pub struct NewSample {
    pub vehicle_id: String,
    pub speed: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub temperature: Option<f64>,
    pub fuel_level: Option<f64>,
    pub engine_rpm: Option<i64>,
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

/// Persisted telemetry sample as returned by store queries and the read
/// API. Timestamps serialize as RFC 3339; absent readings as `null`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    /// Storage-assigned surrogate key, monotonically increasing
    pub id: i64,
    pub vehicle_id: String,
    pub speed: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub temperature: Option<f64>,
    pub fuel_level: Option<f64>,
    pub engine_rpm: Option<i64>,
    pub status: String,
    /// Observation instant (agent-supplied or defaulted at ingest)
    pub timestamp: DateTime<Utc>,
    /// Server-side receive instant, never agent-controlled
    pub received_at: DateTime<Utc>,
}

/// Per-vehicle row count for the stats endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleCount {
    pub vehicle_id: String,
    pub count: i64,
}

/// Fleet-wide reading averages. All values are 0 on an empty store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Averages {
    /// Mean speed in km/h, rounded to 2 decimals
    pub speed: f64,
    /// Mean engine RPM, rounded to integer precision
    pub rpm: f64,
    /// Mean temperature in °C, rounded to 2 decimals
    pub temperature: f64,
    pub max_speed: f64,
    pub min_speed: f64,
}

/// Aggregate statistics over all stored samples
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateStats {
    pub total_records: i64,
    /// Row counts per vehicle, ordered by vehicle id
    pub vehicle_counts: Vec<VehicleCount>,
    /// Human-readable storage footprint, e.g. "36.0 KB"
    pub database_size: String,
    /// Receive instant of the oldest stored sample (None when empty)
    pub oldest_timestamp: Option<DateTime<Utc>>,
    /// Receive instant of the newest stored sample (None when empty)
    pub latest_timestamp: Option<DateTime<Utc>>,
    pub averages: Averages,
}

/// Convert a stored millisecond timestamp back to a UTC instant.
///
/// Timestamps persist as integer Unix milliseconds so ordering and
/// comparison stay exact integer operations. Values outside chrono's
/// representable range clamp to the epoch rather than failing a read.
///
/// # Examples
/// ```
/// use fleetd::model::timestamp_from_millis;
///
/// let dt = timestamp_from_millis(1_704_067_200_000);
/// assert_eq!(dt.to_rfc3339(), "2024-01-01T00:00:00+00:00");
/// ```
pub fn timestamp_from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_sample_ignores_unknown_keys() {
        let raw: RawSample =
            serde_json::from_str(r#"{"vehicle_id":"CAR-001","speed":42.5,"tire_psi":32}"#)
                .unwrap();
        assert_eq!(raw.vehicle_id.as_deref(), Some("CAR-001"));
        assert_eq!(raw.speed, Some(42.5));
    }

    #[test]
    fn test_raw_sample_null_reads_as_absent() {
        let raw: RawSample =
            serde_json::from_str(r#"{"vehicle_id":"CAR-001","speed":null}"#).unwrap();
        assert_eq!(raw.speed, None);
    }

    #[test]
    fn test_raw_sample_zero_speed_preserved() {
        let raw: RawSample =
            serde_json::from_str(r#"{"vehicle_id":"CAR-001","speed":0.0}"#).unwrap();
        assert_eq!(raw.speed, Some(0.0));
    }

    #[test]
    fn test_raw_sample_wrong_type_fails_decode() {
        let result = serde_json::from_str::<RawSample>(r#"{"vehicle_id":"X","speed":"fast"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_raw_sample_timestamp_parses_rfc3339() {
        let raw: RawSample = serde_json::from_str(
            r#"{"vehicle_id":"CAR-001","timestamp":"2024-01-01T00:00:01Z"}"#,
        )
        .unwrap();
        let ts = raw.timestamp.unwrap();
        assert_eq!(ts.timestamp_millis(), 1_704_067_201_000);
    }

    #[test]
    fn test_sample_serializes_timestamps_as_rfc3339() {
        let sample = Sample {
            id: 7,
            vehicle_id: "CAR-001".to_string(),
            speed: Some(0.0),
            latitude: None,
            longitude: None,
            temperature: Some(21.5),
            fuel_level: None,
            engine_rpm: None,
            status: "unknown".to_string(),
            timestamp: timestamp_from_millis(1_704_067_200_000),
            received_at: timestamp_from_millis(1_704_067_200_500),
        };
        let json = serde_json::to_value(&sample).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["speed"], 0.0);
        assert!(json["latitude"].is_null());
        assert!(json["timestamp"].as_str().unwrap().starts_with("2024-01-01T00:00:00"));
        assert!(json["received_at"].as_str().unwrap().starts_with("2024-01-01T00:00:00.5"));
    }

    #[test]
    fn test_timestamp_from_millis_out_of_range_clamps() {
        let dt = timestamp_from_millis(i64::MAX);
        assert_eq!(dt, DateTime::<Utc>::default());
    }
}
