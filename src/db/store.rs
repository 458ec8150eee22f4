//! Telemetry store
//!
//! All reads and writes for telemetry samples. The store is a cheap
//! cloneable handle over the pool; it is constructed once at startup
//! and injected into the ingestion listener and the API state.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::StoreError;
use crate::model::{
    timestamp_from_millis, AggregateStats, Averages, NewSample, Sample, VehicleCount,
};

/// History rows returned when the caller names no limit
pub const DEFAULT_HISTORY_LIMIT: i64 = 100;
/// Hard cap on history rows per query; larger requests are clamped, not
/// rejected
pub const MAX_HISTORY_LIMIT: i64 = 1000;
/// Recent-feed rows returned when the caller names no limit
pub const DEFAULT_RECENT_LIMIT: i64 = 50;
/// Hard cap on recent-feed rows per query
pub const MAX_RECENT_LIMIT: i64 = 500;

/// Row shape shared by the telemetry table and the latest view
#[derive(Debug, sqlx::FromRow)]
struct SampleRow {
    id: i64,
    vehicle_id: String,
    speed: Option<f64>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    temperature: Option<f64>,
    fuel_level: Option<f64>,
    engine_rpm: Option<i64>,
    status: String,
    timestamp_ms: i64,
    received_at_ms: i64,
}

impl From<SampleRow> for Sample {
    fn from(row: SampleRow) -> Self {
        Sample {
            id: row.id,
            vehicle_id: row.vehicle_id,
            speed: row.speed,
            latitude: row.latitude,
            longitude: row.longitude,
            temperature: row.temperature,
            fuel_level: row.fuel_level,
            engine_rpm: row.engine_rpm,
            status: row.status,
            timestamp: timestamp_from_millis(row.timestamp_ms),
            received_at: timestamp_from_millis(row.received_at_ms),
        }
    }
}

/// Handle for all telemetry storage operations
#[derive(Clone)]
pub struct TelemetryStore {
    pool: SqlitePool,
}

impl TelemetryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Persist a validated sample and return its assigned id.
    ///
    /// The receive instant is recorded here, server-side; agents cannot
    /// influence it. Bounded by the pool's acquire timeout.
    pub async fn insert(&self, sample: &NewSample) -> Result<i64, StoreError> {
        let received_at = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO telemetry (vehicle_id, speed, latitude, longitude, temperature,
                                   fuel_level, engine_rpm, status, timestamp_ms, received_at_ms)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&sample.vehicle_id)
        .bind(sample.speed)
        .bind(sample.latitude)
        .bind(sample.longitude)
        .bind(sample.temperature)
        .bind(sample.fuel_level)
        .bind(sample.engine_rpm)
        .bind(&sample.status)
        .bind(sample.timestamp.timestamp_millis())
        .bind(received_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Most recent sample per vehicle, newest first.
    ///
    /// "Most recent" is decided by the sample timestamp, not arrival
    /// order, so out-of-order delivery cannot regress a vehicle's
    /// latest state.
    pub async fn latest(&self) -> Result<Vec<Sample>, StoreError> {
        let rows = sqlx::query_as::<_, SampleRow>(
            r#"
            SELECT id, vehicle_id, speed, latitude, longitude, temperature,
                   fuel_level, engine_rpm, status, timestamp_ms, received_at_ms
            FROM latest_telemetry
            ORDER BY timestamp_ms DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Sample::from).collect())
    }

    /// Samples for one vehicle, newest first, at most
    /// `clamp(limit, 1, 1000)` rows (default 100 when `limit` is None).
    pub async fn history(
        &self,
        vehicle_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<Sample>, StoreError> {
        let limit = clamp_limit(limit, DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT);

        let rows = sqlx::query_as::<_, SampleRow>(
            r#"
            SELECT id, vehicle_id, speed, latitude, longitude, temperature,
                   fuel_level, engine_rpm, status, timestamp_ms, received_at_ms
            FROM telemetry
            WHERE vehicle_id = ?
            ORDER BY timestamp_ms DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(vehicle_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Sample::from).collect())
    }

    /// Distinct vehicle ids in lexicographic order
    pub async fn vehicle_ids(&self) -> Result<Vec<String>, StoreError> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT vehicle_id FROM telemetry ORDER BY vehicle_id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    /// Most recently received samples across all vehicles, newest first
    /// by receive instant, at most `clamp(limit, 1, 500)` rows (default
    /// 50 when `limit` is None).
    pub async fn recent(&self, limit: Option<i64>) -> Result<Vec<Sample>, StoreError> {
        let limit = clamp_limit(limit, DEFAULT_RECENT_LIMIT, MAX_RECENT_LIMIT);

        let rows = sqlx::query_as::<_, SampleRow>(
            r#"
            SELECT id, vehicle_id, speed, latitude, longitude, temperature,
                   fuel_level, engine_rpm, status, timestamp_ms, received_at_ms
            FROM telemetry
            ORDER BY received_at_ms DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Sample::from).collect())
    }

    /// Aggregate statistics over all stored samples. An empty store
    /// yields zeroed counts and averages, not an error.
    pub async fn stats(&self) -> Result<AggregateStats, StoreError> {
        let total_records: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM telemetry")
            .fetch_one(&self.pool)
            .await?;

        let vehicle_counts = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT vehicle_id, COUNT(*)
            FROM telemetry
            GROUP BY vehicle_id
            ORDER BY vehicle_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|(vehicle_id, count)| VehicleCount { vehicle_id, count })
        .collect();

        // Size lookup is best effort; a failure here should not take
        // down the whole stats response.
        let database_size = match self.database_size_bytes().await {
            Ok(bytes) => format_size(bytes),
            Err(e) => {
                tracing::warn!("database size lookup failed: {e}");
                "unknown".to_string()
            }
        };

        let (oldest_ms, latest_ms): (Option<i64>, Option<i64>) =
            sqlx::query_as("SELECT MIN(received_at_ms), MAX(received_at_ms) FROM telemetry")
                .fetch_one(&self.pool)
                .await?;

        let averages: (Option<f64>, Option<f64>, Option<f64>, Option<f64>, Option<f64>) =
            sqlx::query_as(
                r#"
                SELECT AVG(speed), AVG(engine_rpm), AVG(temperature),
                       MAX(speed), MIN(speed)
                FROM telemetry
                "#,
            )
            .fetch_one(&self.pool)
            .await?;
        let (avg_speed, avg_rpm, avg_temp, max_speed, min_speed) = averages;

        Ok(AggregateStats {
            total_records,
            vehicle_counts,
            database_size,
            oldest_timestamp: oldest_ms.map(timestamp_from_millis),
            latest_timestamp: latest_ms.map(timestamp_from_millis),
            averages: Averages {
                speed: round2(avg_speed.unwrap_or(0.0)),
                rpm: avg_rpm.unwrap_or(0.0).round(),
                temperature: round2(avg_temp.unwrap_or(0.0)),
                max_speed: round2(max_speed.unwrap_or(0.0)),
                min_speed: round2(min_speed.unwrap_or(0.0)),
            },
        })
    }

    async fn database_size_bytes(&self) -> Result<i64, StoreError> {
        let page_count: i64 = sqlx::query_scalar("PRAGMA page_count")
            .fetch_one(&self.pool)
            .await?;
        let page_size: i64 = sqlx::query_scalar("PRAGMA page_size")
            .fetch_one(&self.pool)
            .await?;
        Ok(page_count * page_size)
    }
}

/// Clamp a caller-supplied row limit into [1, max], falling back to the
/// default when none was supplied. Over-limit requests are capped, not
/// rejected.
fn clamp_limit(requested: Option<i64>, default: i64, max: i64) -> i64 {
    requested.unwrap_or(default).clamp(1, max)
}

/// Format a byte count for humans: "512 B", "36.0 KB", "5.1 MB"
fn format_size(bytes: i64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let bytes = bytes.max(0);
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;
    use sqlx::sqlite::SqlitePoolOptions;

    #[test]
    fn test_clamp_limit_default_when_absent() {
        assert_eq!(clamp_limit(None, 100, 1000), 100);
        assert_eq!(clamp_limit(None, 50, 500), 50);
    }

    #[test]
    fn test_clamp_limit_caps_high_requests() {
        assert_eq!(clamp_limit(Some(5000), 100, 1000), 1000);
        assert_eq!(clamp_limit(Some(9999), 50, 500), 500);
    }

    #[test]
    fn test_clamp_limit_floors_at_one() {
        assert_eq!(clamp_limit(Some(0), 100, 1000), 1);
        assert_eq!(clamp_limit(Some(-5), 100, 1000), 1);
    }

    #[test]
    fn test_clamp_limit_passes_in_range_values() {
        assert_eq!(clamp_limit(Some(250), 100, 1000), 250);
    }

    #[test]
    fn test_format_size_bytes() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(512), "512 B");
    }

    #[test]
    fn test_format_size_kilobytes() {
        assert_eq!(format_size(36 * 1024), "36.0 KB");
    }

    #[test]
    fn test_format_size_megabytes() {
        assert_eq!(format_size(5 * 1024 * 1024 + 100 * 1024), "5.1 MB");
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(15.666_666), 15.67);
        assert_eq!(round2(0.0), 0.0);
    }

    #[tokio::test]
    async fn test_insert_and_latest_round_trip() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init_schema(&pool).await.unwrap();
        let store = TelemetryStore::new(pool);

        let sample = NewSample {
            vehicle_id: "CAR-001".to_string(),
            speed: Some(62.5),
            latitude: Some(52.0786),
            longitude: Some(-1.0169),
            temperature: Some(24.0),
            fuel_level: Some(88.2),
            engine_rpm: Some(9200),
            status: "running".to_string(),
            timestamp: timestamp_from_millis(1_704_067_200_000),
        };

        let id = store.insert(&sample).await.unwrap();
        assert!(id > 0);

        let latest = store.latest().await.unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].id, id);
        assert_eq!(latest[0].vehicle_id, "CAR-001");
        assert_eq!(latest[0].speed, Some(62.5));
        assert_eq!(latest[0].timestamp, sample.timestamp);
        assert!(latest[0].received_at >= sample.timestamp);
    }
}
