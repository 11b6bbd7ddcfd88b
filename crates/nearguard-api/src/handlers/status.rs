//! /status, /daemon/shutdown handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use nearguard_services::StatusSnapshot;

use super::{coordinator_error, ApiState};

// ── /status ──────────────────────────────────────────────────────────────────

pub async fn handle_status(
    State(state): State<ApiState>,
) -> Result<Json<StatusSnapshot>, (StatusCode, String)> {
    let status = state.coordinator.status().await.map_err(coordinator_error)?;
    Ok(Json(status))
}

// ── /daemon/shutdown ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ShutdownResponse {
    pub message: String,
}

pub async fn handle_shutdown(State(state): State<ApiState>) -> Json<ShutdownResponse> {
    tracing::info!("shutdown requested via API");
    // Every receiver already gone means shutdown is underway.
    let _ = state.shutdown_tx.send(());
    Json(ShutdownResponse {
        message: "Shutdown initiated".to_string(),
    })
}
