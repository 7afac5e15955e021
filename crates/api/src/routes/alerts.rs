//! Alert Routes

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use alerting::TemperatureAlert;

use crate::SharedState;

/// Query parameters for alerts endpoint
#[derive(Debug, Deserialize)]
pub struct AlertQuery {
    /// Maximum number of records
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// Response for alerts endpoint
#[derive(Debug, Serialize)]
pub struct AlertResponse {
    /// Most recent first
    pub data: Vec<TemperatureAlert>,
    pub count: usize,
    /// Qualifying changes not shown because notifications were refused
    pub missed_count: u64,
    pub notifications_allowed: bool,
}

/// Get recently delivered temperature alerts
pub async fn get_alerts(
    State(state): State<SharedState>,
    Query(params): Query<AlertQuery>,
) -> Json<AlertResponse> {
    let state = state.read().await;
    let data = state.alerts.recent(params.limit.min(1000));

    Json(AlertResponse {
        count: data.len(),
        missed_count: state.monitor.alerts_missed(),
        notifications_allowed: state.alerts.is_permitted(),
        data,
    })
}
