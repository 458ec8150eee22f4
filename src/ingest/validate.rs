//! Sample validation and normalization
//!
//! Pure gatekeeping between decode and storage: a sample must carry a
//! vehicle id and at least one live reading before it is persisted.

use chrono::{DateTime, Utc};

use crate::error::ValidationError;
use crate::model::{NewSample, RawSample};

/// Validate a decoded sample and normalize it for storage.
///
/// A sample is storable iff `vehicle_id` is non-empty AND at least one
/// of `speed`, `latitude`, `temperature` is present. That specific
/// triple is the liveness check; other readings (fuel, RPM) do not
/// satisfy it on their own. No numeric range checks are applied:
/// out-of-range values are a data-quality concern for consumers, not a
/// protocol concern.
///
/// Normalization applies the protocol defaults: `status` becomes
/// `"unknown"` when absent or empty, and `timestamp` falls back to
/// `received_at` when the agent sent none. Taking the receive instant
/// as a parameter keeps this function deterministic.
///
/// # Arguments
/// * `raw` - Sample as decoded from one framed message
/// * `received_at` - Server-side receive instant, used as the timestamp
///   default
///
/// # Returns
/// A normalized `NewSample` ready for insertion, or the rejection
/// reason.
///
/// # Examples
/// ```
/// use chrono::Utc;
/// use fleetd::ingest::validate;
/// use fleetd::model::RawSample;
///
/// let raw = RawSample {
///     vehicle_id: Some("CAR-001".to_string()),
///     speed: Some(62.5),
///     ..RawSample::default()
/// };
/// let sample = validate(raw, Utc::now()).unwrap();
/// assert_eq!(sample.vehicle_id, "CAR-001");
/// assert_eq!(sample.status, "unknown");
/// ```
pub fn validate(raw: RawSample, received_at: DateTime<Utc>) -> Result<NewSample, ValidationError> {
    let vehicle_id = match raw.vehicle_id {
        Some(id) if !id.is_empty() => id,
        _ => return Err(ValidationError::MissingVehicleId),
    };

    if raw.speed.is_none() && raw.latitude.is_none() && raw.temperature.is_none() {
        return Err(ValidationError::NoTelemetryData);
    }

    let status = match raw.status {
        Some(s) if !s.is_empty() => s,
        _ => "unknown".to_string(),
    };

    Ok(NewSample {
        vehicle_id,
        speed: raw.speed,
        latitude: raw.latitude,
        longitude: raw.longitude,
        temperature: raw.temperature,
        fuel_level: raw.fuel_level,
        engine_rpm: raw.engine_rpm,
        status,
        timestamp: raw.timestamp.unwrap_or(received_at),
    })
}
