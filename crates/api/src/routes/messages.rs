//! Message Routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use storage::Message;
use tracing::debug;

use crate::{ApiError, SharedState};

/// Body for posting a message
#[derive(Debug, Deserialize)]
pub struct NewMessageRequest {
    /// Defaults to the profile username
    pub author: Option<String>,
    pub body: String,
}

/// Response for a created message
#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub id: i64,
    pub author: String,
}

/// Response for the message list
#[derive(Debug, Serialize)]
pub struct MessageListResponse {
    pub data: Vec<Message>,
    pub count: usize,
}

/// List every message, ascending by id
pub async fn list_messages(State(state): State<SharedState>) -> Json<MessageListResponse> {
    let state = state.read().await;
    let data = state.messages.snapshot();

    Json(MessageListResponse {
        count: data.len(),
        data,
    })
}

/// Post a message
pub async fn add_message(
    State(state): State<SharedState>,
    Json(request): Json<NewMessageRequest>,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    let state = state.read().await;
    let author = request
        .author
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| state.preferences.display_name())
        .to_string();

    let id = state.messages.add(&author, &request.body).await?;
    metrics::counter!("rendezvous_messages_added_total").increment(1);
    debug!("Message {} posted by {}", id, author);

    Ok((StatusCode::CREATED, Json(CreatedResponse { id, author })))
}

/// Delete a message. Unknown and malformed ids succeed as a no-op.
pub async fn delete_message(
    State(state): State<SharedState>,
    Path(raw_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let Ok(id) = raw_id.trim().parse::<i64>() else {
        debug!("Ignoring delete of malformed id {:?}", raw_id);
        return Ok(StatusCode::NO_CONTENT);
    };

    let state = state.read().await;
    state.messages.delete(id).await?;
    metrics::counter!("rendezvous_messages_deleted_total").increment(1);

    Ok(StatusCode::NO_CONTENT)
}
