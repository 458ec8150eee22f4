//! Database access for fleetd
//!
//! Owns pool construction and the idempotent schema. All telemetry
//! reads and writes go through [`TelemetryStore`].

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;

use crate::config::DatabaseConfig;

mod store;
pub use store::{
    TelemetryStore, DEFAULT_HISTORY_LIMIT, DEFAULT_RECENT_LIMIT, MAX_HISTORY_LIMIT,
    MAX_RECENT_LIMIT,
};

/// Initialize the database connection pool and schema.
///
/// The pool is bounded: borrowers wait up to the acquire timeout and
/// then fail, surfacing as a storage-unavailable condition rather than
/// blocking indefinitely. WAL journal mode keeps concurrent ingestion
/// writers and API readers from starving each other.
pub async fn init_pool(config: &DatabaseConfig) -> Result<SqlitePool> {
    if let Some(parent) = config.path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    tracing::debug!("Opening database at {}", config.path.display());

    let connect_options =
        SqliteConnectOptions::from_str(config.path.to_str().context("Invalid database path")?)
            .context("Failed to parse database path")?
            .busy_timeout(Duration::from_millis(5000))
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_millis(config.acquire_timeout_ms))
        .idle_timeout(Duration::from_millis(config.idle_timeout_ms))
        .connect_with(connect_options)
        .await
        .context("Failed to open database pool")?;

    init_schema(&pool).await.context("Failed to initialize database schema")?;

    tracing::info!(
        "Database ready: {} ({} connections, acquire timeout {}ms)",
        config.path.display(),
        config.max_connections,
        config.acquire_timeout_ms
    );

    Ok(pool)
}

/// Create the telemetry table, its indexes, and the latest-per-vehicle
/// view if they do not exist. Safe to run on every startup.
///
/// Timestamps are stored as integer Unix milliseconds so ordering is an
/// exact integer comparison. The `latest_telemetry` view is a
/// query-time reduction over the base table; there is no separately
/// maintained "latest" row that a second write path could desynchronize.
pub async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS telemetry (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            vehicle_id     TEXT NOT NULL,
            speed          REAL,
            latitude       REAL,
            longitude      REAL,
            temperature    REAL,
            fuel_level     REAL,
            engine_rpm     INTEGER,
            status         TEXT NOT NULL DEFAULT 'unknown',
            timestamp_ms   INTEGER NOT NULL,
            received_at_ms INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_telemetry_vehicle_ts
            ON telemetry (vehicle_id, timestamp_ms DESC)
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_telemetry_received
            ON telemetry (received_at_ms DESC)
        "#,
    )
    .execute(pool)
    .await?;

    // Ties on timestamp_ms break toward the higher id (the later insert)
    sqlx::query(
        r#"
        CREATE VIEW IF NOT EXISTS latest_telemetry AS
            SELECT id, vehicle_id, speed, latitude, longitude, temperature,
                   fuel_level, engine_rpm, status, timestamp_ms, received_at_ms
            FROM (
                SELECT t.*, ROW_NUMBER() OVER (
                    PARTITION BY vehicle_id
                    ORDER BY timestamp_ms DESC, id DESC
                ) AS row_rank
                FROM telemetry t
            )
            WHERE row_rank = 1
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database schema initialized (telemetry, latest_telemetry)");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    #[tokio::test]
    async fn test_init_schema_idempotent() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        init_schema(&pool).await.unwrap();
        init_schema(&pool).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM telemetry")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_latest_view_exists() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        init_schema(&pool).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM latest_telemetry")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
