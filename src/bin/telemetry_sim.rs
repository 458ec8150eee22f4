//! telemetry-sim - synthetic fleet agent
//!
//! Drives a small fleet of simulated vehicles against a running fleetd
//! instance. Each vehicle holds one persistent connection and emits one
//! newline-framed sample per tick, reading the acknowledgment for each.
//! Motion follows a closed parametric circuit so the speed, RPM, and
//! position traces look plausible on a dashboard.

use std::f64::consts::TAU;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Sample points per lap of the synthetic circuit
const LAP_STEPS: u64 = 120;

// Circuit center, roughly Silverstone
const BASE_LATITUDE: f64 = 52.0786;
const BASE_LONGITUDE: f64 = -1.0169;

#[derive(Parser, Debug)]
#[command(name = "telemetry-sim")]
#[command(about = "Synthetic fleet agent for fleetd")]
#[command(version)]
struct Args {
    /// Ingestion listener host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Ingestion listener port
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Number of simulated vehicles
    #[arg(long, default_value_t = 3)]
    vehicles: u32,

    /// Milliseconds between samples per vehicle
    #[arg(long, default_value_t = 250)]
    interval_ms: u64,

    /// Laps to drive before exiting (0 = run until interrupted)
    #[arg(long, default_value_t = 0)]
    laps: u64,
}

/// One simulated vehicle's evolving state
struct Vehicle {
    id: String,
    /// Phase offset spreading vehicles around the circuit
    phase: f64,
    step: u64,
    fuel_level: f64,
}

impl Vehicle {
    fn new(index: u32, count: u32) -> Self {
        Self {
            id: format!("CAR-{:03}", index + 1),
            phase: TAU * f64::from(index) / f64::from(count.max(1)),
            step: 0,
            fuel_level: 95.0 - f64::from(index) * 7.0,
        }
    }

    /// Produce the next sample and advance one step around the circuit
    fn next_sample(&mut self) -> Value {
        let theta = self.phase + TAU * (self.step % LAP_STEPS) as f64 / LAP_STEPS as f64;
        self.step += 1;

        // Three slow corners per lap; speed dips into each
        let speed = 165.0 + 120.0 * (theta * 3.0).sin();
        let engine_rpm = (4500.0 + speed * 28.0) as i64;
        // Track temperature loosely follows speed
        let temperature = 20.0 + 25.0 * (speed / 300.0);

        self.fuel_level -= 0.05;
        if self.fuel_level < 1.0 {
            self.fuel_level = 100.0; // pit stop
        }

        let status = if speed > 10.0 { "running" } else { "idle" };

        json!({
            "vehicle_id": self.id,
            "speed": round1(speed),
            "latitude": round6(BASE_LATITUDE + 0.012 * theta.cos()),
            "longitude": round6(BASE_LONGITUDE + 0.018 * theta.sin()),
            "temperature": round1(temperature),
            "fuel_level": round1(self.fuel_level),
            "engine_rpm": engine_rpm,
            "status": status,
            "timestamp": Utc::now().to_rfc3339(),
        })
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn round6(v: f64) -> f64 {
    (v * 1_000_000.0).round() / 1_000_000.0
}

/// Drive one vehicle: a persistent connection, one framed sample per
/// tick, one acknowledgment line read back per sample.
async fn drive(mut vehicle: Vehicle, addr: String, interval: Duration, laps: u64) -> Result<()> {
    let stream = TcpStream::connect(&addr)
        .await
        .with_context(|| format!("Failed to connect to {addr}"))?;
    let (reader, mut writer) = stream.into_split();
    let mut acks = BufReader::new(reader).lines();

    info!(vehicle = %vehicle.id, "connected to {addr}");

    let mut ticker = tokio::time::interval(interval);
    let mut sent: u64 = 0;
    let mut rejected: u64 = 0;

    loop {
        if laps > 0 && vehicle.step >= laps * LAP_STEPS {
            break;
        }
        ticker.tick().await;

        let mut line = vehicle.next_sample().to_string();
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;

        let ack = acks
            .next_line()
            .await?
            .context("Connection closed while waiting for acknowledgment")?;
        let ack: Value = serde_json::from_str(&ack).context("Unparseable acknowledgment")?;
        if let Some(error) = ack.get("error").and_then(Value::as_str) {
            rejected += 1;
            warn!(vehicle = %vehicle.id, "sample rejected: {error}");
        }

        sent += 1;
        if sent % LAP_STEPS == 0 {
            info!(vehicle = %vehicle.id, sent, rejected, "completed a lap");
        }
    }

    info!(vehicle = %vehicle.id, sent, rejected, "done");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "telemetry_sim=info".into()),
        )
        .init();

    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);
    let interval = Duration::from_millis(args.interval_ms);

    info!(
        "Driving {} vehicles against {} every {}ms",
        args.vehicles, addr, args.interval_ms
    );

    let mut fleet = JoinSet::new();
    for index in 0..args.vehicles {
        let vehicle = Vehicle::new(index, args.vehicles);
        let addr = addr.clone();
        let laps = args.laps;
        fleet.spawn(async move { drive(vehicle, addr, interval, laps).await });
    }

    while let Some(result) = fleet.join_next().await {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("vehicle task failed: {e:#}"),
            Err(e) => warn!("vehicle task panicked: {e}"),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_are_always_valid() {
        let mut vehicle = Vehicle::new(0, 3);
        for _ in 0..(2 * LAP_STEPS) {
            let sample = vehicle.next_sample();
            assert_eq!(sample["vehicle_id"], "CAR-001");
            assert!(sample["speed"].as_f64().unwrap() > 0.0);
            assert!(sample["latitude"].is_number());
            assert!(sample["fuel_level"].as_f64().unwrap() >= 1.0);
        }
    }

    #[test]
    fn test_fleet_ids_are_distinct() {
        let ids: Vec<String> = (0..3).map(|i| Vehicle::new(i, 3).id).collect();
        assert_eq!(ids, vec!["CAR-001", "CAR-002", "CAR-003"]);
    }

    #[test]
    fn test_circuit_closes_after_one_lap() {
        let mut vehicle = Vehicle::new(0, 1);
        let first = vehicle.next_sample();
        for _ in 0..(LAP_STEPS - 1) {
            vehicle.next_sample();
        }
        let wrapped = vehicle.next_sample();
        assert_eq!(first["latitude"], wrapped["latitude"]);
        assert_eq!(first["longitude"], wrapped["longitude"]);
    }
}
