//! Configuration resolution
//!
//! Settings resolve in priority order: command line, then environment,
//! then TOML config file, then compiled default. The first two tiers
//! come from clap (`env` attributes on [`Args`]); this module layers
//! the file and the defaults underneath.
//!
//! File shape:
//!
//! ```toml
//! api_addr = "0.0.0.0:3000"
//! ingest_addr = "0.0.0.0:8080"
//!
//! [database]
//! path = "fleetd.db"
//! max_connections = 20
//! acquire_timeout_ms = 2000
//! idle_timeout_ms = 30000
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

const DEFAULT_API_PORT: u16 = 3000;
const DEFAULT_INGEST_PORT: u16 = 8080;
const DEFAULT_DB_PATH: &str = "fleetd.db";
const DEFAULT_MAX_CONNECTIONS: u32 = 20;
const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 2000;
const DEFAULT_IDLE_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_CONFIG_PATH: &str = "fleetd.toml";

/// Command-line arguments for fleetd
#[derive(Parser, Debug, Default)]
#[command(name = "fleetd")]
#[command(about = "Vehicle fleet telemetry ingestion and query service")]
#[command(version)]
pub struct Args {
    /// Address for the HTTP read API
    #[arg(long, env = "FLEETD_API_ADDR")]
    pub api_addr: Option<SocketAddr>,

    /// Address for the TCP telemetry listener
    #[arg(long, env = "FLEETD_INGEST_ADDR")]
    pub ingest_addr: Option<SocketAddr>,

    /// SQLite database path
    #[arg(long, env = "FLEETD_DB")]
    pub database: Option<PathBuf>,

    /// TOML config file (./fleetd.toml is used when present and no
    /// path is given)
    #[arg(short, long, env = "FLEETD_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Effective service configuration after all tiers are resolved
#[derive(Debug, Clone)]
pub struct Config {
    pub api_addr: SocketAddr,
    pub ingest_addr: SocketAddr,
    pub database: DatabaseConfig,
}

/// Database location and pool tuning
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
    pub idle_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DB_PATH),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout_ms: DEFAULT_ACQUIRE_TIMEOUT_MS,
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
        }
    }
}

/// Optional overrides as read from the TOML file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    api_addr: Option<SocketAddr>,
    ingest_addr: Option<SocketAddr>,
    database: FileDatabaseConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileDatabaseConfig {
    path: Option<PathBuf>,
    max_connections: Option<u32>,
    acquire_timeout_ms: Option<u64>,
    idle_timeout_ms: Option<u64>,
}

impl Config {
    /// Resolve the effective configuration from all four tiers.
    ///
    /// An explicitly named config file must exist; the implicit
    /// `./fleetd.toml` is simply skipped when absent.
    pub fn resolve(args: &Args) -> Result<Config> {
        let file = load_file_config(args.config.as_deref())?;

        let api_addr = args
            .api_addr
            .or(file.api_addr)
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], DEFAULT_API_PORT)));

        let ingest_addr = args
            .ingest_addr
            .or(file.ingest_addr)
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], DEFAULT_INGEST_PORT)));

        let database = DatabaseConfig {
            path: args
                .database
                .clone()
                .or(file.database.path)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            max_connections: file
                .database
                .max_connections
                .unwrap_or(DEFAULT_MAX_CONNECTIONS),
            acquire_timeout_ms: file
                .database
                .acquire_timeout_ms
                .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_MS),
            idle_timeout_ms: file
                .database
                .idle_timeout_ms
                .unwrap_or(DEFAULT_IDLE_TIMEOUT_MS),
        };

        Ok(Config {
            api_addr,
            ingest_addr,
            database,
        })
    }
}

fn load_file_config(path: Option<&Path>) -> Result<FileConfig> {
    let (path, required) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
    };

    if !path.exists() {
        if required {
            anyhow::bail!("Config file not found: {}", path.display());
        }
        return Ok(FileConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    Ok(config)
}
