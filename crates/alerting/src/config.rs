//! Monitor configuration

use crate::MonitorError;
use serde::{Deserialize, Serialize};

/// Monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Minimum change from the last alerted reading before a new alert (°C)
    pub threshold_celsius: f64,

    /// Readings buffered between sampler and evaluator
    pub queue_depth: usize,

    /// Sampling cadence for simulated sensors (milliseconds)
    pub sample_interval_ms: u64,

    /// Alerts retained by the in-memory history sink
    pub history_limit: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            threshold_celsius: 0.5,
            queue_depth: 32,
            sample_interval_ms: 200,
            history_limit: 100,
        }
    }
}

impl MonitorConfig {
    /// Create sensitive config (smaller dead-band)
    pub fn sensitive() -> Self {
        Self {
            threshold_celsius: 0.2,
            ..Default::default()
        }
    }

    /// Create relaxed config (wider dead-band)
    pub fn relaxed() -> Self {
        Self {
            threshold_celsius: 1.0,
            ..Default::default()
        }
    }

    /// Reject settings that would silence or kill a session
    pub fn validate(&self) -> Result<(), MonitorError> {
        if !self.threshold_celsius.is_finite() || self.threshold_celsius < 0.0 {
            return Err(MonitorError::InvalidConfig(format!(
                "threshold_celsius must be a finite, non-negative number (got {})",
                self.threshold_celsius
            )));
        }
        if self.sample_interval_ms == 0 {
            return Err(MonitorError::InvalidConfig(
                "sample_interval_ms must be at least 1".to_string(),
            ));
        }
        if self.queue_depth == 0 {
            return Err(MonitorError::InvalidConfig(
                "queue_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_threshold() {
        let config = MonitorConfig::default();
        assert_eq!(config.threshold_celsius, 0.5);
        assert!(MonitorConfig::sensitive().threshold_celsius < config.threshold_celsius);
        assert!(MonitorConfig::relaxed().threshold_celsius > config.threshold_celsius);
    }

    #[test]
    fn test_validate_rejects_unusable_settings() {
        assert!(MonitorConfig::default().validate().is_ok());
        assert!(MonitorConfig::sensitive().validate().is_ok());

        for threshold in [f64::NAN, f64::INFINITY, -0.5] {
            let config = MonitorConfig {
                threshold_celsius: threshold,
                ..Default::default()
            };
            assert!(matches!(
                config.validate(),
                Err(MonitorError::InvalidConfig(_))
            ));
        }

        let config = MonitorConfig {
            sample_interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(MonitorError::InvalidConfig(_))
        ));
    }
}
