//! /permission handlers: the pending inbound invitation.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use nearguard_services::PendingView;

use super::{coordinator_error, ApiError, ApiState};

// ── /permission (GET) ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct PermissionResponse {
    pub pending: Option<PendingView>,
}

pub async fn handle_permission_get(
    State(state): State<ApiState>,
) -> Result<Json<PermissionResponse>, ApiError> {
    let status = state.coordinator.status().await.map_err(coordinator_error)?;
    Ok(Json(PermissionResponse {
        pending: status.pending,
    }))
}

// ── /permission (POST) ────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct PermissionDecision {
    pub accept: bool,
}

#[derive(Debug, Serialize)]
pub struct DecisionResponse {
    pub peer: String,
    pub name: String,
    pub accepted: bool,
}

pub async fn handle_permission_respond(
    State(state): State<ApiState>,
    Json(req): Json<PermissionDecision>,
) -> Result<Json<DecisionResponse>, ApiError> {
    let peer = state
        .coordinator
        .respond(req.accept)
        .await
        .map_err(coordinator_error)?;
    Ok(Json(DecisionResponse {
        peer: peer.id.to_string(),
        name: peer.name,
        accepted: req.accept,
    }))
}
