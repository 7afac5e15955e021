//! Application Configuration
//!
//! Layered from built-in defaults, an optional config file, then
//! `RENDEZVOUS__<SECTION>__<KEY>` environment variables.

use crate::preferences::Preferences;
use crate::rate_limit::RateLimitConfig;
use alerting::{MonitorConfig, SensorSampler, SimulatedSampler};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use storage::{StoreConfig, DEFAULT_QUEUE_DEPTH};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "RENDEZVOUS";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub store: StoreSection,
    pub monitor: MonitorConfig,
    pub sensor: SensorConfig,
    pub preferences: Preferences,
}

impl AppConfig {
    /// Load configuration, reading `path` (any extension `config` supports)
    /// if it exists. Fails on monitor settings that cannot run.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = Config::builder()
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config
            .monitor
            .validate()
            .map_err(|e| ConfigError::Message(e.to_string()))?;
        Ok(config)
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub bind_addr: String,
    /// Throttle message writes per client IP
    pub rate_limit_enabled: bool,
    pub rate_limit: RateLimitConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            rate_limit_enabled: true,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Log output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Maximum level: trace, debug, info, warn or error
    pub level: String,
    /// Emit JSON lines instead of human-readable text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Message store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// Path to the SQLite database file
    pub database_path: String,
    pub max_connections: u32,
    /// Busy timeout (milliseconds)
    pub busy_timeout_ms: u64,
    /// Mutations queued before callers wait
    pub queue_depth: usize,
}

impl Default for StoreSection {
    fn default() -> Self {
        let database = StoreConfig::default();
        Self {
            database_path: database.database_path,
            max_connections: database.max_connections,
            busy_timeout_ms: database.busy_timeout_ms,
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

impl StoreSection {
    /// Connection settings for the store
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            database_path: self.database_path.clone(),
            max_connections: self.max_connections,
            busy_timeout_ms: self.busy_timeout_ms,
        }
    }
}

/// Which ambient sensor to sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    /// Synthetic drifting readings
    Simulated,
    /// No sensor present; monitoring cannot start
    None,
}

/// Sensor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub kind: SensorKind,
    /// Center of the simulated drift (°C)
    pub base_celsius: f64,
    /// Peak deviation of the simulated drift (°C)
    pub amplitude: f64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            kind: SensorKind::Simulated,
            base_celsius: 21.0,
            amplitude: 1.0,
        }
    }
}

impl SensorConfig {
    /// Build a fresh sampler for one monitoring session
    pub fn build_sampler(&self, monitor: &MonitorConfig) -> Box<dyn SensorSampler> {
        match self.kind {
            SensorKind::Simulated => Box::new(
                SimulatedSampler::new(
                    self.base_celsius,
                    self.amplitude,
                    Duration::from_millis(monitor.sample_interval_ms),
                )
                .with_queue_depth(monitor.queue_depth),
            ),
            SensorKind::None => Box::new(SimulatedSampler::absent()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_load_without_file() {
        let config = AppConfig::load("does-not-exist/rendezvous").unwrap();

        assert_eq!(config.server.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.monitor.threshold_celsius, 0.5);
        assert_eq!(config.store.database_path, "message_database.db");
        assert_eq!(config.store.queue_depth, DEFAULT_QUEUE_DEPTH);
        assert_eq!(config.sensor.kind, SensorKind::Simulated);
        assert!(!config.preferences.monitoring_enabled);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = std::env::temp_dir().join(format!("rendezvous-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("rendezvous.toml");
        std::fs::write(
            &path,
            "[monitor]\nthreshold_celsius = 1.5\n\n[preferences]\nusername = \"Lexi\"\n\n[sensor]\nkind = \"none\"\n",
        )
        .unwrap();

        let config = AppConfig::load(path.to_str().unwrap()).unwrap();

        assert_eq!(config.monitor.threshold_celsius, 1.5);
        assert_eq!(config.monitor.queue_depth, MonitorConfig::default().queue_depth);
        assert_eq!(config.preferences.username, "Lexi");
        assert_eq!(config.sensor.kind, SensorKind::None);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_zero_sample_interval_rejected() {
        let dir = std::env::temp_dir().join(format!("rendezvous-interval-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("rendezvous.toml");
        std::fs::write(&path, "[monitor]\nsample_interval_ms = 0\n").unwrap();

        let result = AppConfig::load(path.to_str().unwrap());

        assert!(matches!(result, Err(ConfigError::Message(_))));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
