//! Monitor Routes

use axum::{extract::State, Json};
use alerting::MonitorState;
use serde::Serialize;

use crate::SharedState;

/// Monitor status
#[derive(Debug, Serialize)]
pub struct MonitorStatus {
    pub running: bool,
    pub session: Option<String>,
    pub state: MonitorState,
    pub threshold_celsius: f64,
    pub alerts_sent: u64,
    pub alerts_missed: u64,
}

/// Get the temperature monitor status
pub async fn get_status(State(state): State<SharedState>) -> Json<MonitorStatus> {
    let state = state.read().await;
    let monitor = &state.monitor;

    Json(MonitorStatus {
        running: monitor.is_running(),
        session: monitor.session_id().map(|id| id.to_string()),
        state: monitor.state(),
        threshold_celsius: monitor.config().threshold_celsius,
        alerts_sent: monitor.alerts_sent(),
        alerts_missed: monitor.alerts_missed(),
    })
}
