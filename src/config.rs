//! Application configuration module
//!
//! Handles loading configuration from environment variables.

use crate::health::{HealthConfig, DEFAULT_ENGINE_PORT};
use crate::process::ProcessOptions;
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration value for {var}: {value}")]
    InvalidValue { var: String, value: String },

    #[error("Cannot determine a data directory; set HOTSWAP_DATA_DIR")]
    NoDataDir,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: Ipv4Addr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::new(127, 0, 0, 1),
            port: 3000,
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3001".to_string()],
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Per-user directory for cache, presets and history
    pub data_dir: PathBuf,
    /// Optional directory of `.bim` files opened as local targets
    pub catalog_dir: Option<PathBuf>,
    pub health_interval: Duration,
    pub health_tcp_timeout: Duration,
    pub health_default_port: u16,
    pub process_close_timeout: Duration,
    pub process_unlock_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".tabular-hotswap"),
            catalog_dir: None,
            health_interval: Duration::from_secs(30),
            health_tcp_timeout: Duration::from_secs(5),
            health_default_port: DEFAULT_ENGINE_PORT,
            process_close_timeout: Duration::from_secs(15),
            process_unlock_timeout: Duration::from_secs(30),
        }
    }
}

impl EngineConfig {
    pub fn health(&self) -> HealthConfig {
        HealthConfig {
            interval: self.health_interval,
            tcp_timeout: self.health_tcp_timeout,
            default_port: self.health_default_port,
        }
    }

    pub fn process(&self) -> ProcessOptions {
        ProcessOptions {
            close_timeout: self.process_close_timeout,
            unlock_timeout: self.process_unlock_timeout,
            ..ProcessOptions::default()
        }
    }
}

/// Complete application settings
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub server: ServerConfig,
    pub cors: CorsConfig,
    pub engine: EngineConfig,
}

/// Parse an optional variable, rejecting malformed values
fn parse_var<T: FromStr>(var: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                var: var.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

fn secs(var: &str, default: Duration) -> Result<Duration, ConfigError> {
    Ok(parse_var::<u64>(var)?.map(Duration::from_secs).unwrap_or(default))
}

/// Per-user application data directory
fn default_data_dir() -> Result<PathBuf, ConfigError> {
    let base = std::env::var_os("APPDATA")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("XDG_DATA_HOME").map(PathBuf::from))
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local").join("share")))
        .ok_or(ConfigError::NoDataDir)?;
    Ok(base.join("tabular-hotswap"))
}

impl Settings {
    /// Load settings from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists (ignore errors if file not found)
        let _ = dotenvy::dotenv();

        let defaults = Settings::default();

        let server = ServerConfig {
            host: parse_var("HOST")?.unwrap_or(defaults.server.host),
            port: parse_var("PORT")?.unwrap_or(defaults.server.port),
        };

        let cors = CorsConfig {
            allowed_origins: std::env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors.allowed_origins),
        };

        let data_dir = match std::env::var_os("HOTSWAP_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => default_data_dir()?,
        };

        let engine_defaults = defaults.engine;
        let engine = EngineConfig {
            data_dir,
            catalog_dir: std::env::var_os("HOTSWAP_CATALOG_DIR").map(PathBuf::from),
            health_interval: secs("HEALTH_INTERVAL_SECS", engine_defaults.health_interval)?,
            health_tcp_timeout: secs("HEALTH_TCP_TIMEOUT_SECS", engine_defaults.health_tcp_timeout)?,
            health_default_port: parse_var("HEALTH_DEFAULT_PORT")?
                .unwrap_or(engine_defaults.health_default_port),
            process_close_timeout: secs("PROCESS_CLOSE_TIMEOUT_SECS", engine_defaults.process_close_timeout)?,
            process_unlock_timeout: secs(
                "PROCESS_UNLOCK_TIMEOUT_SECS",
                engine_defaults.process_unlock_timeout,
            )?,
        };

        Ok(Self { server, cors, engine })
    }
}
