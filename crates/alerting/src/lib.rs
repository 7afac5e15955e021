//! Alerting System
//!
//! Watches an ambient temperature stream and raises at most one alert per
//! qualifying change, suppressing sensor noise with a dead-band measured
//! from the last alerted reading.

mod config;
mod deadband;
mod monitor;
mod sampler;
mod sink;

pub use config::MonitorConfig;
pub use deadband::{DeadBand, Decision, MonitorState};
pub use monitor::TemperatureMonitor;
pub use sampler::{ManualSampler, SampleFeed, SensorSampler, SimulatedSampler};
pub use sink::{AlertSink, HistorySink, LogSink, NotifyError, TemperatureAlert};

use thiserror::Error;
use uuid::Uuid;

/// Monitor errors
#[derive(Debug, Error)]
pub enum MonitorError {
    /// No ambient temperature sensor to attach to
    #[error("Ambient temperature sensor unavailable: {0}")]
    SensorUnavailable(String),

    /// `start()` called while a session is active
    #[error("Monitor already running (session {0})")]
    AlreadyRunning(Uuid),

    /// Configuration the monitor cannot run with
    #[error("Invalid monitor configuration: {0}")]
    InvalidConfig(String),

    /// The evaluation task panicked or was cancelled
    #[error("Monitor task failed: {0}")]
    TaskFailed(String),
}
