//! Target Health Monitoring
//!
//! Background reachability checks for registered swap targets. Local targets
//! get a TCP connect, hosted targets a URL shape check plus DNS resolution.
//! Status changes are pushed to a single registered callback.

pub mod checker;
pub mod reach;

pub use checker::HealthChecker;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Default port of a local analytical engine
pub const DEFAULT_ENGINE_PORT: u16 = 2383;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Unknown,
    Checking,
    Healthy,
    Unhealthy,
    Error,
}

impl HealthStatus {
    /// Statuses that warrant confirmation before swapping to the target
    pub fn is_failing(self) -> bool {
        matches!(self, Self::Unhealthy | Self::Error)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResult {
    pub key: String,
    pub status: HealthStatus,
    pub message: String,
    pub latency_ms: Option<u64>,
    pub checked_at: Option<DateTime<Utc>>,
}

impl HealthResult {
    pub fn unknown(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            status: HealthStatus::Unknown,
            message: "Not checked yet".to_string(),
            latency_ms: None,
            checked_at: None,
        }
    }
}

/// Payload of a status-change notification
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthChange {
    pub key: String,
    pub previous: HealthStatus,
    pub current: HealthResult,
}

/// Invoked on the checker's task; must return quickly and never block
pub type HealthCallback = Arc<dyn Fn(&HealthChange) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct HealthConfig {
    pub interval: Duration,
    pub tcp_timeout: Duration,
    pub default_port: u16,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            tcp_timeout: Duration::from_secs(5),
            default_port: DEFAULT_ENGINE_PORT,
        }
    }
}
