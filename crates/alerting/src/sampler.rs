//! Sensor Samplers
//!
//! A sampler pushes raw ambient temperature readings into a channel that the
//! monitor drains. The monitor never polls the hardware itself.

use crate::MonitorError;
use std::f64::consts::TAU;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Shortest cadence a simulated sensor will tick at
pub const MIN_SAMPLE_INTERVAL: Duration = Duration::from_millis(1);

/// Source of ambient temperature readings (°C)
pub trait SensorSampler: Send + Sync {
    /// Human-readable sensor name for logs
    fn name(&self) -> &str;

    /// Start delivering readings.
    ///
    /// Fails with [`MonitorError::SensorUnavailable`] when no sensor is present.
    fn attach(&mut self) -> Result<mpsc::Receiver<f64>, MonitorError>;

    /// Stop delivering readings
    fn detach(&mut self);
}

/// Sinusoidal drift around a base temperature
#[derive(Debug, Clone, Copy)]
struct Drift {
    base_celsius: f64,
    amplitude: f64,
    period_samples: u32,
}

impl Drift {
    fn at(&self, step: u64) -> f64 {
        let phase = (step % self.period_samples as u64) as f64 / self.period_samples as f64;
        self.base_celsius + self.amplitude * (phase * TAU).sin()
    }
}

/// Synthetic sensor drifting sinusoidally around a base temperature at a
/// fixed cadence
pub struct SimulatedSampler {
    drift: Drift,
    interval: Duration,
    queue_depth: usize,
    available: bool,
    task: Option<JoinHandle<()>>,
}

impl SimulatedSampler {
    /// Create a simulated sensor
    ///
    /// # Arguments
    /// * `base_celsius` - Center of the drift
    /// * `amplitude` - Peak deviation from the center
    /// * `interval` - Time between readings, at least [`MIN_SAMPLE_INTERVAL`]
    pub fn new(base_celsius: f64, amplitude: f64, interval: Duration) -> Self {
        Self {
            drift: Drift {
                base_celsius,
                amplitude,
                period_samples: 120,
            },
            interval: interval.max(MIN_SAMPLE_INTERVAL),
            queue_depth: 32,
            available: true,
            task: None,
        }
    }

    /// A device without an ambient temperature sensor
    pub fn absent() -> Self {
        let mut sampler = Self::new(0.0, 0.0, Duration::from_secs(1));
        sampler.available = false;
        sampler
    }

    /// Readings per full drift cycle
    pub fn with_period(mut self, period_samples: u32) -> Self {
        self.drift.period_samples = period_samples.max(1);
        self
    }

    /// Channel capacity between sensor and monitor
    pub fn with_queue_depth(mut self, queue_depth: usize) -> Self {
        self.queue_depth = queue_depth.max(1);
        self
    }

    /// Reading produced at step `step`
    pub fn reading_at(&self, step: u64) -> f64 {
        self.drift.at(step)
    }
}

impl SensorSampler for SimulatedSampler {
    fn name(&self) -> &str {
        "simulated-ambient"
    }

    fn attach(&mut self) -> Result<mpsc::Receiver<f64>, MonitorError> {
        if !self.available {
            return Err(MonitorError::SensorUnavailable(
                "device reports no ambient temperature sensor".to_string(),
            ));
        }

        self.detach();
        let (tx, rx) = mpsc::channel(self.queue_depth);
        let drift = self.drift;
        let interval = self.interval;

        info!(
            "Simulated sensor attached: {:.1} ± {:.1} °C every {:?}",
            drift.base_celsius, drift.amplitude, interval
        );

        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut step: u64 = 0;
            loop {
                ticker.tick().await;
                match tx.try_send(drift.at(step)) {
                    Ok(()) => {}
                    // Monitor is behind; this reading is a missed sample.
                    Err(TrySendError::Full(_)) => debug!("Sensor queue full, reading skipped"),
                    Err(TrySendError::Closed(_)) => break,
                }
                step = step.wrapping_add(1);
            }
            debug!("Simulated sensor stopped");
        }));

        Ok(rx)
    }

    fn detach(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for SimulatedSampler {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Sampler fed by the caller through a [`SampleFeed`]
pub struct ManualSampler {
    receiver: Option<mpsc::Receiver<f64>>,
}

impl ManualSampler {
    /// Create a sampler and the feed that drives it
    pub fn new(queue_depth: usize) -> (Self, SampleFeed) {
        let (sender, receiver) = mpsc::channel(queue_depth.max(1));
        (
            Self {
                receiver: Some(receiver),
            },
            SampleFeed { sender },
        )
    }
}

impl SensorSampler for ManualSampler {
    fn name(&self) -> &str {
        "manual"
    }

    fn attach(&mut self) -> Result<mpsc::Receiver<f64>, MonitorError> {
        self.receiver.take().ok_or_else(|| {
            MonitorError::SensorUnavailable("manual feed already attached".to_string())
        })
    }

    fn detach(&mut self) {}
}

/// Push side of a [`ManualSampler`]. Dropping it ends the reading stream.
#[derive(Clone)]
pub struct SampleFeed {
    sender: mpsc::Sender<f64>,
}

impl SampleFeed {
    /// Deliver one reading; returns false once the monitor stopped listening
    pub async fn push(&self, celsius: f64) -> bool {
        self.sender.send(celsius).await.is_ok()
    }

    /// Deliver several readings in order
    pub async fn push_all(&self, readings: &[f64]) -> bool {
        for &celsius in readings {
            if !self.push(celsius).await {
                return false;
            }
        }
        true
    }
}
