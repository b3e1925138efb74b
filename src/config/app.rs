//! Application configuration structures.

use std::collections::HashSet;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::probe::{AlertThresholds, Dialect, LatencyThresholds};

use super::validation::ConfigError;

// =============================================================================
// Constants
// =============================================================================

/// Default echo requests per probe.
pub const DEFAULT_PROBE_COUNT: u32 = 4;

/// Default per-reply ping timeout.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default pause between sweeps, measured from sweep completion.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Default number of targets probed at once.
pub const DEFAULT_CONCURRENCY: usize = 4;

fn default_probe_count() -> u32 {
    DEFAULT_PROBE_COUNT
}

fn default_probe_timeout() -> Duration {
    DEFAULT_PROBE_TIMEOUT
}

fn default_sweep_interval() -> Duration {
    DEFAULT_SWEEP_INTERVAL
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

// =============================================================================
// Server Configuration
// =============================================================================

/// Web server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address (default: "0.0.0.0").
    pub bind: String,

    /// Server port (default: 8080).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

// =============================================================================
// Database Configuration
// =============================================================================

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database file path.
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "pingwatch.db".to_string(),
        }
    }
}

impl DatabaseConfig {
    /// Connection URL for the configured file.
    pub fn url(&self) -> String {
        format!("sqlite:{}", self.path)
    }
}

// =============================================================================
// Probe Configuration
// =============================================================================

/// Probe behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Echo requests per probe (default: 4).
    pub count: u32,

    /// Per-reply timeout (default: "5s").
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Pause between sweeps, from completion of one to start of the
    /// next (default: "60s").
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Targets probed concurrently within a sweep (default: 4).
    pub concurrency: usize,

    /// Force a ping dialect instead of the host's native one.
    pub dialect: Option<Dialect>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            count: DEFAULT_PROBE_COUNT,
            timeout: DEFAULT_PROBE_TIMEOUT,
            interval: DEFAULT_SWEEP_INTERVAL,
            concurrency: DEFAULT_CONCURRENCY,
            dialect: None,
        }
    }
}

// =============================================================================
// Targets
// =============================================================================

/// One monitored host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Operating partner name.
    pub partner: String,

    /// Country or site label, the dashboard's primary grouping key.
    pub country: String,

    /// Host address to ping.
    pub ip: String,

    /// External designation for the host.
    pub dn_ext: String,
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Web server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Probe behavior.
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Latency bucket boundaries.
    #[serde(default)]
    pub thresholds: LatencyThresholds,

    /// Operator alert limits.
    #[serde(default)]
    pub alerts: AlertThresholds,

    /// Monitored hosts.
    pub targets: Vec<Target>,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.bind.parse::<IpAddr>().map_err(|_| {
            ConfigError::invalid(format!(
                "invalid server bind address: '{}'",
                self.server.bind
            ))
        })?;

        if self.server.port == 0 {
            return Err(ConfigError::invalid("server port must be non-zero"));
        }

        if self.database.path.trim().is_empty() {
            return Err(ConfigError::invalid("database path must not be empty"));
        }

        if self.probe.count == 0 {
            return Err(ConfigError::invalid("probe count must be at least 1"));
        }

        if self.probe.timeout < Duration::from_secs(1) {
            return Err(ConfigError::invalid("probe timeout must be at least 1s"));
        }

        if self.probe.concurrency == 0 {
            return Err(ConfigError::invalid("probe concurrency must be at least 1"));
        }

        self.thresholds
            .validate()
            .map_err(ConfigError::ValidationError)?;

        if self.alerts.max_latency_ms <= 0.0
            || self.alerts.max_packet_loss_pct <= 0.0
            || self.alerts.max_jitter_ms <= 0.0
        {
            return Err(ConfigError::invalid("alert thresholds must be positive"));
        }

        if self.targets.is_empty() {
            return Err(ConfigError::invalid("at least one target is required"));
        }

        let mut seen = HashSet::new();
        for target in &self.targets {
            if target.ip.trim().is_empty()
                || target.country.trim().is_empty()
                || target.partner.trim().is_empty()
            {
                return Err(ConfigError::invalid(format!(
                    "target fields must not be empty: {target:?}"
                )));
            }
            if !seen.insert(target.ip.as_str()) {
                return Err(ConfigError::invalid(format!(
                    "duplicate target ip: '{}'",
                    target.ip
                )));
            }
        }

        Ok(())
    }
}
