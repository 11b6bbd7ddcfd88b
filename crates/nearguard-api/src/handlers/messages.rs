//! /messages handlers: the conversation stream.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::{coordinator_error, ApiError, ApiState};

// ── /messages (GET) ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct MessagesQuery {
    #[serde(default)]
    pub since: u64,
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<MessageJson>,
}

#[derive(Debug, Serialize)]
pub struct MessageJson {
    pub id: String,
    pub seq: u64,
    pub from: String,
    pub from_name: String,
    pub mine: bool,
    pub text: String,
    pub timestamp: u64,
}

pub async fn handle_get_messages(
    State(state): State<ApiState>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<MessagesResponse>, ApiError> {
    let messages = state
        .coordinator
        .messages(query.since)
        .await
        .map_err(coordinator_error)?
        .into_iter()
        .map(|m| MessageJson {
            mine: m.is_from(&state.local),
            id: m.id,
            seq: m.seq,
            from: m.sender.id.to_string(),
            from_name: m.sender.name,
            text: m.text,
            timestamp: m.timestamp,
        })
        .collect();

    Ok(Json(MessagesResponse { messages }))
}

// ── /messages/send (POST) ─────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub id: String,
    pub seq: u64,
    pub timestamp: u64,
}

pub async fn handle_send_message(
    State(state): State<ApiState>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, ApiError> {
    if req.text.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "text must not be empty".to_string()));
    }
    let message = state
        .coordinator
        .send(req.text)
        .await
        .map_err(coordinator_error)?;
    Ok(Json(SendMessageResponse {
        id: message.id,
        seq: message.seq,
        timestamp: message.timestamp,
    }))
}
