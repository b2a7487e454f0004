//! Exporter configuration.

use crate::error::{ExporterError, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration for the metrics service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Global prefix prepended to every exported family name.
    pub prefix: String,

    /// HTTP exposition server configuration.
    pub exporter: ExporterConfig,

    /// Idle-series retention configuration.
    pub retention: RetentionConfig,

    /// Declared metric families.
    #[serde(rename = "metric")]
    pub metrics: Vec<MetricConfig>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            prefix: "pulse".to_string(),
            exporter: ExporterConfig::default(),
            retention: RetentionConfig::default(),
            metrics: Vec::new(),
        }
    }
}

impl MetricsConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the TOML is malformed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ExporterError::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::load_str(&content)
    }

    /// Load configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed.
    pub fn load_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// HTTP exposition server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    /// Enable the HTTP exposition server.
    pub enabled: bool,

    /// IP address to bind to.
    pub address: IpAddr,

    /// Port to listen on.
    pub port: u16,

    /// Exposition endpoint path.
    pub path: String,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 9090,
            path: "/metrics".to_string(),
        }
    }
}

impl ExporterConfig {
    /// Get the socket address.
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

/// Idle-series retention configuration.
///
/// When enabled, series that have not been written for `idle_timeout`
/// are removed by a periodic sweep. Write-once series are exempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Enable the idle eviction sweep.
    pub enabled: bool,

    /// How long a series may go unwritten before eviction.
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,

    /// How often the eviction sweep runs.
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            idle_timeout: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Declaration of one metric family.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricConfig {
    /// Metric name, matched case-insensitively on write.
    pub name: String,

    /// Kind name: `immutable`, `counter`, `gauge`, `window_sum` or
    /// `window_max` (case-insensitive). Unknown kinds fall back to gauge.
    pub kind: String,

    /// Help text describing the metric.
    pub help: String,

    /// Label names for this metric.
    pub labels: Vec<String>,

    /// Window length for the periodic kinds. Defaults per kind.
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub window: Option<Duration>,
}

impl Default for MetricConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: "gauge".to_string(),
            help: String::new(),
            labels: Vec::new(),
            window: None,
        }
    }
}
