//! Profile Routes

use axum::{extract::State, Json};
use tracing::info;

use crate::preferences::{Preferences, PreferencesUpdate};
use crate::{ApiError, SharedState};

/// Get the current preferences
pub async fn get_profile(State(state): State<SharedState>) -> Json<Preferences> {
    Json(state.read().await.preferences.clone())
}

/// Update preferences, starting or stopping the monitor to match
pub async fn update_profile(
    State(state): State<SharedState>,
    Json(update): Json<PreferencesUpdate>,
) -> Result<Json<Preferences>, ApiError> {
    let mut state = state.write().await;
    state.preferences.apply(update);
    info!(
        "Preferences updated: monitoring={}, notifications={}",
        state.preferences.monitoring_enabled, state.preferences.notifications_allowed
    );

    state.apply_preferences().await?;
    Ok(Json(state.preferences.clone()))
}
