//! HTTP API handlers for fleetd

pub mod health;
pub mod stats;
pub mod telemetry;

pub use health::health_routes;
pub use stats::get_stats;
pub use telemetry::{latest_telemetry, recent_telemetry, vehicle_history, vehicle_list};
