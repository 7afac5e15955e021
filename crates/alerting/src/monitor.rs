//! Temperature Monitor
//!
//! Runs one monitoring session at a time as a background task: readings
//! from a [`SensorSampler`] pass through a [`DeadBand`], and qualifying
//! changes are handed to an [`AlertSink`].

use crate::config::MonitorConfig;
use crate::deadband::{DeadBand, Decision, MonitorState};
use crate::sampler::SensorSampler;
use crate::sink::{AlertSink, NotifyError, TemperatureAlert};
use crate::MonitorError;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// State shared between the monitor handle and its evaluation task
struct Shared {
    band: Mutex<DeadBand>,
    sink: Arc<dyn AlertSink>,
    delivered: AtomicU64,
    missed: AtomicU64,
}

impl Shared {
    fn with_band<R>(&self, f: impl FnOnce(&mut DeadBand) -> R) -> R {
        let mut band = self.band.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut band)
    }
}

struct Session {
    id: Uuid,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
    sampler: Box<dyn SensorSampler>,
}

/// Ambient temperature monitor
pub struct TemperatureMonitor {
    config: MonitorConfig,
    shared: Arc<Shared>,
    session: Option<Session>,
}

impl TemperatureMonitor {
    /// Create a stopped monitor that reports to `sink`
    pub fn new(config: MonitorConfig, sink: Arc<dyn AlertSink>) -> Self {
        info!(
            "Creating temperature monitor (threshold {} °C)",
            config.threshold_celsius
        );
        Self {
            shared: Arc::new(Shared {
                band: Mutex::new(DeadBand::new(config.threshold_celsius)),
                sink,
                delivered: AtomicU64::new(0),
                missed: AtomicU64::new(0),
            }),
            config,
            session: None,
        }
    }

    /// Start a session on `sampler`.
    ///
    /// Fails with [`MonitorError::SensorUnavailable`] (monitor stays
    /// stopped) when the sampler has no sensor, or with
    /// [`MonitorError::AlreadyRunning`] while a session is live.
    pub async fn start(&mut self, mut sampler: Box<dyn SensorSampler>) -> Result<Uuid, MonitorError> {
        if let Some(session) = &self.session {
            if !session.task.is_finished() {
                return Err(MonitorError::AlreadyRunning(session.id));
            }
        }
        // A previous session whose sensor stream ended is cleaned up first.
        self.finish(false).await?;

        let readings = match sampler.attach() {
            Ok(readings) => readings,
            Err(e) => {
                warn!("Cannot start temperature monitoring on {}: {}", sampler.name(), e);
                return Err(e);
            }
        };

        let id = Uuid::new_v4();
        self.shared.with_band(|band| band.start());

        let (stop, stop_rx) = oneshot::channel();
        let task = tokio::spawn(evaluate(id, readings, stop_rx, Arc::clone(&self.shared)));

        info!("Monitoring ambient temperature on {} (session {})", sampler.name(), id);
        self.session = Some(Session {
            id,
            stop,
            task,
            sampler,
        });
        Ok(id)
    }

    /// Stop the session. No alert is delivered after this returns.
    pub async fn stop(&mut self) -> Result<(), MonitorError> {
        self.finish(true).await
    }

    /// Wait for the session to end on its own (sensor stream closed)
    pub async fn join(&mut self) -> Result<(), MonitorError> {
        self.finish(false).await
    }

    /// Current decision state
    pub fn state(&self) -> MonitorState {
        self.shared.with_band(|band| band.state())
    }

    /// Whether a session is live
    pub fn is_running(&self) -> bool {
        self.session
            .as_ref()
            .map(|s| !s.task.is_finished())
            .unwrap_or(false)
    }

    /// Id of the current session
    pub fn session_id(&self) -> Option<Uuid> {
        self.session.as_ref().map(|s| s.id)
    }

    /// Alerts accepted by the sink since creation
    pub fn alerts_sent(&self) -> u64 {
        self.shared.delivered.load(Ordering::Relaxed)
    }

    /// Qualifying changes the sink refused since creation
    pub fn alerts_missed(&self) -> u64 {
        self.shared.missed.load(Ordering::Relaxed)
    }

    /// Configuration in use
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    async fn finish(&mut self, signal: bool) -> Result<(), MonitorError> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };

        if signal {
            // Err means the task already exited.
            let _ = session.stop.send(());
        }
        let joined = (&mut session.task).await;
        session.sampler.detach();
        self.shared.with_band(|band| band.stop());
        info!("Temperature monitoring stopped (session {})", session.id);

        joined.map_err(|e| MonitorError::TaskFailed(e.to_string()))
    }
}

async fn evaluate(
    session: Uuid,
    mut readings: mpsc::Receiver<f64>,
    mut stop: oneshot::Receiver<()>,
    shared: Arc<Shared>,
) {
    loop {
        tokio::select! {
            biased;
            _ = &mut stop => break,
            reading = readings.recv() => match reading {
                Some(celsius) => handle_reading(session, celsius, &shared),
                None => {
                    info!("Sensor stream ended (session {})", session);
                    break;
                }
            },
        }
    }
    debug!("Evaluation task exiting (session {})", session);
}

fn handle_reading(session: Uuid, celsius: f64, shared: &Shared) {
    match shared.with_band(|band| band.observe(celsius)) {
        Decision::Inactive => {}
        Decision::Dropped => debug!("Dropping non-finite reading {}", celsius),
        Decision::Baseline(value) => info!("Baseline temperature {} °C", value),
        Decision::Suppressed { delta } => {
            debug!("Reading {} °C within dead-band (Δ {:.3})", celsius, delta)
        }
        Decision::Alert { previous, delta } => {
            let alert = TemperatureAlert {
                celsius,
                previous,
                delta,
                session,
                observed_at: Utc::now(),
            };
            match shared.sink.notify(&alert) {
                Ok(()) => {
                    shared.delivered.fetch_add(1, Ordering::Relaxed);
                    info!("Alert delivered: {}", alert);
                }
                // Baseline already moved; this opportunity is not retried.
                Err(NotifyError::PermissionDenied) => {
                    shared.missed.fetch_add(1, Ordering::Relaxed);
                    warn!("Alert not shown, notification permission denied: {}", alert);
                }
                Err(e) => {
                    shared.missed.fetch_add(1, Ordering::Relaxed);
                    warn!("Alert delivery failed: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::{ManualSampler, SimulatedSampler};
    use crate::sink::HistorySink;
    use std::time::Duration;

    fn monitor(sink: &Arc<HistorySink>) -> TemperatureMonitor {
        TemperatureMonitor::new(MonitorConfig::default(), Arc::clone(sink) as Arc<dyn AlertSink>)
    }

    fn celsius(sink: &HistorySink) -> Vec<f64> {
        let mut values: Vec<f64> = sink.recent(usize::MAX).iter().map(|a| a.celsius).collect();
        values.reverse();
        values
    }

    fn assert_shareable<T: Send + Sync>() {}

    #[test]
    fn test_monitor_is_shareable_across_tasks() {
        assert_shareable::<TemperatureMonitor>();
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_session_keeps_running() {
        let sink = Arc::new(HistorySink::new(16, true));
        let mut monitor = monitor(&sink);
        let sampler = SimulatedSampler::new(21.0, 2.0, Duration::ZERO);

        monitor.start(Box::new(sampler)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(monitor.is_running());

        monitor.stop().await.unwrap();
        assert!(!monitor.is_running());
    }

    #[tokio::test]
    async fn test_warm_up_sample_does_not_alert() {
        let sink = Arc::new(HistorySink::new(16, true));
        let mut monitor = monitor(&sink);
        let (sampler, feed) = ManualSampler::new(8);

        monitor.start(Box::new(sampler)).await.unwrap();
        assert_eq!(monitor.state(), MonitorState::WarmingUp);
        feed.push(20.0).await;
        drop(feed);
        monitor.join().await.unwrap();

        assert!(sink.is_empty());
        assert_eq!(monitor.alerts_sent(), 0);
    }

    #[tokio::test]
    async fn test_dead_band_then_rebaseline() {
        let sink = Arc::new(HistorySink::new(16, true));
        let mut monitor = monitor(&sink);
        let (sampler, feed) = ManualSampler::new(8);

        let session = monitor.start(Box::new(sampler)).await.unwrap();
        feed.push_all(&[20.0, 20.3, 20.6, 20.7]).await;
        drop(feed);
        monitor.join().await.unwrap();

        assert_eq!(celsius(&sink), vec![20.6]);
        let alert = &sink.recent(1)[0];
        assert_eq!(alert.previous, 20.0);
        assert_eq!(alert.session, session);
        assert_eq!(monitor.alerts_sent(), 1);
        assert_eq!(monitor.state(), MonitorState::Stopped);
    }

    #[tokio::test]
    async fn test_non_finite_readings_are_missed_samples() {
        let sink = Arc::new(HistorySink::new(16, true));
        let mut monitor = monitor(&sink);
        let (sampler, feed) = ManualSampler::new(8);

        monitor.start(Box::new(sampler)).await.unwrap();
        feed.push_all(&[f64::NAN, 20.0, f64::INFINITY, 21.0]).await;
        drop(feed);
        monitor.join().await.unwrap();

        assert_eq!(celsius(&sink), vec![21.0]);
    }

    #[tokio::test]
    async fn test_permission_denied_still_moves_baseline() {
        let sink = Arc::new(HistorySink::new(16, false));
        let mut monitor = monitor(&sink);
        let (sampler, feed) = ManualSampler::new(8);

        monitor.start(Box::new(sampler)).await.unwrap();
        feed.push_all(&[20.0, 21.0]).await;
        // Wait until the denied alert has been evaluated before granting.
        while monitor.alerts_missed() == 0 {
            tokio::task::yield_now().await;
        }
        sink.set_permitted(true);

        // Within the band of 21.0, so the earlier transition does not re-fire
        feed.push_all(&[21.2, 21.8]).await;
        drop(feed);
        monitor.join().await.unwrap();

        assert_eq!(monitor.alerts_missed(), 1);
        assert_eq!(celsius(&sink), vec![21.8]);
    }

    #[tokio::test]
    async fn test_no_alerts_after_stop() {
        let sink = Arc::new(HistorySink::new(16, true));
        let mut monitor = monitor(&sink);
        let (sampler, feed) = ManualSampler::new(8);

        monitor.start(Box::new(sampler)).await.unwrap();
        feed.push(20.0).await;
        monitor.stop().await.unwrap();

        assert!(!feed.push(30.0).await);
        assert!(sink.is_empty());
        assert!(!monitor.is_running());
        assert_eq!(monitor.state(), MonitorState::Stopped);
    }

    #[tokio::test]
    async fn test_unavailable_sensor_keeps_monitor_stopped() {
        let sink = Arc::new(HistorySink::new(16, true));
        let mut monitor = monitor(&sink);

        let result = monitor.start(Box::new(SimulatedSampler::absent())).await;

        assert!(matches!(result, Err(MonitorError::SensorUnavailable(_))));
        assert_eq!(monitor.state(), MonitorState::Stopped);
        assert!(monitor.session_id().is_none());
    }

    #[tokio::test]
    async fn test_second_start_rejected_while_running() {
        let sink = Arc::new(HistorySink::new(16, true));
        let mut monitor = monitor(&sink);
        let (first, _feed) = ManualSampler::new(8);
        let (second, _other) = ManualSampler::new(8);

        let id = monitor.start(Box::new(first)).await.unwrap();
        let result = monitor.start(Box::new(second)).await;

        assert!(matches!(result, Err(MonitorError::AlreadyRunning(running)) if running == id));
        monitor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_restart_begins_new_warm_up() {
        let sink = Arc::new(HistorySink::new(16, true));
        let mut monitor = monitor(&sink);

        let (sampler, feed) = ManualSampler::new(8);
        let first = monitor.start(Box::new(sampler)).await.unwrap();
        feed.push(20.0).await;
        monitor.stop().await.unwrap();

        let (sampler, feed) = ManualSampler::new(8);
        let second = monitor.start(Box::new(sampler)).await.unwrap();
        assert_ne!(first, second);
        // Far from the old baseline, but it is the new session's warm-up reading
        feed.push(35.0).await;
        drop(feed);
        monitor.join().await.unwrap();

        assert!(sink.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_drift_raises_alerts() {
        let sink = Arc::new(HistorySink::new(64, true));
        let mut monitor = monitor(&sink);
        let sampler = SimulatedSampler::new(21.0, 2.0, Duration::from_millis(100)).with_period(20);

        monitor.start(Box::new(sampler)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(4)).await;
        monitor.stop().await.unwrap();

        assert!(monitor.alerts_sent() > 0);
        let values = celsius(&sink);
        assert!(values.windows(2).all(|w| (w[1] - w[0]).abs() >= 0.5));
    }
}
