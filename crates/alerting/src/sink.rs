//! Alert Delivery

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

/// A qualifying temperature change
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemperatureAlert {
    /// Reading that triggered the alert (°C)
    pub celsius: f64,
    /// Previously alerted (or baseline) reading (°C)
    pub previous: f64,
    /// Absolute change between the two
    pub delta: f64,
    /// Monitoring session that produced the alert
    pub session: Uuid,
    pub observed_at: DateTime<Utc>,
}

impl fmt::Display for TemperatureAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Temperature changed. Now: {} °C", self.celsius)
    }
}

/// Delivery failures reported by a sink
#[derive(Debug, Clone, Error, PartialEq)]
pub enum NotifyError {
    /// Host refused to show notifications
    #[error("Notification permission denied")]
    PermissionDenied,

    #[error("Notification delivery failed: {0}")]
    Delivery(String),
}

/// Presentation-side receiver of alerts.
///
/// Called from the monitor's evaluation task; implementations must not block.
pub trait AlertSink: Send + Sync + 'static {
    fn notify(&self, alert: &TemperatureAlert) -> Result<(), NotifyError>;
}

/// Sink that writes alerts to the log
#[derive(Debug, Default)]
pub struct LogSink;

impl AlertSink for LogSink {
    fn notify(&self, alert: &TemperatureAlert) -> Result<(), NotifyError> {
        info!(session = %alert.session, delta = alert.delta, "{}", alert);
        Ok(())
    }
}

/// Sink that keeps a bounded history of delivered alerts, gated by a
/// notification permission switch
pub struct HistorySink {
    alerts: Mutex<VecDeque<TemperatureAlert>>,
    limit: usize,
    permitted: AtomicBool,
}

impl HistorySink {
    /// Create a sink retaining up to `limit` alerts
    pub fn new(limit: usize, permitted: bool) -> Self {
        Self {
            alerts: Mutex::new(VecDeque::with_capacity(limit.min(1024))),
            limit: limit.max(1),
            permitted: AtomicBool::new(permitted),
        }
    }

    /// Grant or revoke notification permission
    pub fn set_permitted(&self, permitted: bool) {
        self.permitted.store(permitted, Ordering::Relaxed);
    }

    pub fn is_permitted(&self) -> bool {
        self.permitted.load(Ordering::Relaxed)
    }

    /// Most recent alerts first
    pub fn recent(&self, limit: usize) -> Vec<TemperatureAlert> {
        self.alerts
            .lock()
            .map(|a| a.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    /// Number of retained alerts
    pub fn len(&self) -> usize {
        self.alerts.lock().map(|a| a.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear the history
    pub fn clear(&self) {
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.clear();
        }
    }
}

impl AlertSink for HistorySink {
    fn notify(&self, alert: &TemperatureAlert) -> Result<(), NotifyError> {
        if !self.is_permitted() {
            return Err(NotifyError::PermissionDenied);
        }

        let mut alerts = self
            .alerts
            .lock()
            .map_err(|e| NotifyError::Delivery(format!("Lock error: {}", e)))?;

        while alerts.len() >= self.limit {
            alerts.pop_front();
        }
        alerts.push_back(alert.clone());
        Ok(())
    }
}
