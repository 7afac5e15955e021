//! Dead-band Decision State Machine

use serde::Serialize;
use tracing::debug;

/// Lifecycle of one monitoring session
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MonitorState {
    /// No session
    Stopped,
    /// Session started, first reading not yet seen
    WarmingUp,
    /// Evaluating readings against the last alerted value
    Armed { baseline: f64 },
}

/// Outcome of feeding one reading to a [`DeadBand`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    /// No session is active; reading ignored
    Inactive,
    /// Reading was not a finite number; treated as a missed sample
    Dropped,
    /// First reading of the session became the baseline
    Baseline(f64),
    /// Change from the baseline is inside the dead-band
    Suppressed { delta: f64 },
    /// Change reached the threshold; the reading is the new baseline
    Alert { previous: f64, delta: f64 },
}

/// Warm-up exclusion plus dead-band around the last alerted reading
#[derive(Debug, Clone)]
pub struct DeadBand {
    threshold: f64,
    state: MonitorState,
}

impl DeadBand {
    /// Create a stopped dead-band with the given threshold (°C)
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.abs(),
            state: MonitorState::Stopped,
        }
    }

    /// Begin a session. Any previous baseline is discarded.
    pub fn start(&mut self) {
        self.state = MonitorState::WarmingUp;
    }

    /// End the session and discard its state
    pub fn stop(&mut self) {
        self.state = MonitorState::Stopped;
    }

    /// Current state
    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// Configured threshold (°C)
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Last alerted (or baseline) reading of the current session
    pub fn last_notified(&self) -> Option<f64> {
        match self.state {
            MonitorState::Armed { baseline } => Some(baseline),
            _ => None,
        }
    }

    /// Evaluate one reading
    pub fn observe(&mut self, sample: f64) -> Decision {
        if !sample.is_finite() {
            return match self.state {
                MonitorState::Stopped => Decision::Inactive,
                _ => Decision::Dropped,
            };
        }

        match self.state {
            MonitorState::Stopped => Decision::Inactive,
            MonitorState::WarmingUp => {
                debug!("Warm-up reading {} becomes baseline", sample);
                self.state = MonitorState::Armed { baseline: sample };
                Decision::Baseline(sample)
            }
            MonitorState::Armed { baseline } => {
                let delta = (sample - baseline).abs();
                if delta >= self.threshold {
                    self.state = MonitorState::Armed { baseline: sample };
                    Decision::Alert {
                        previous: baseline,
                        delta,
                    }
                } else {
                    Decision::Suppressed { delta }
                }
            }
        }
    }
}
