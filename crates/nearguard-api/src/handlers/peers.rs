//! /peers and /discovery handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use nearguard_services::{PeerState, SelectOutcome};

use super::{coordinator_error, parse_endpoint_id, ApiError, ApiState};

// ── /peers (GET) ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct PeersResponse {
    pub peers: Vec<PeerInfo>,
}

#[derive(Debug, Serialize)]
pub struct PeerInfo {
    pub id: String,
    pub name: String,
    pub first_seen: u64,
    pub state: PeerState,
    pub active: bool,
}

pub async fn handle_peers(State(state): State<ApiState>) -> Result<Json<PeersResponse>, ApiError> {
    let status = state.coordinator.status().await.map_err(coordinator_error)?;

    let peers = status
        .directory
        .iter()
        .map(|p| {
            let session_state = status
                .sessions
                .iter()
                .find(|s| s.endpoint == p.endpoint)
                .map(|s| s.state)
                .unwrap_or(PeerState::Idle);
            PeerInfo {
                id: p.endpoint.id.to_string(),
                name: p.endpoint.name.clone(),
                first_seen: p.first_seen,
                state: session_state,
                active: status.active.as_ref() == Some(&p.endpoint),
            }
        })
        .collect();

    Ok(Json(PeersResponse { peers }))
}

// ── /peers/{id}/invite (POST) ─────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct InviteResponse {
    pub peer: String,
    pub outcome: SelectOutcome,
}

pub async fn handle_invite(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<InviteResponse>, ApiError> {
    let peer = parse_endpoint_id(&id)?;
    let outcome = state
        .coordinator
        .select(peer)
        .await
        .map_err(coordinator_error)?;
    Ok(Json(InviteResponse { peer: id, outcome }))
}

// ── /peers/{id}/disconnect (POST) ─────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct DisconnectResponse {
    pub peer: String,
}

pub async fn handle_disconnect(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<DisconnectResponse>, ApiError> {
    let peer = parse_endpoint_id(&id)?;
    state
        .coordinator
        .disconnect(peer)
        .await
        .map_err(coordinator_error)?;
    Ok(Json(DisconnectResponse { peer: id }))
}

// ── /discovery/{side}/{action} (POST) ─────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct DiscoveryResponse {
    pub advertising: bool,
    pub browsing: bool,
}

pub async fn handle_discovery(
    State(state): State<ApiState>,
    Path((side, action)): Path<(String, String)>,
) -> Result<Json<DiscoveryResponse>, ApiError> {
    let c = &state.coordinator;
    let result = match (side.as_str(), action.as_str()) {
        ("advertising", "start") => c.start_advertising().await,
        ("advertising", "stop") => c.stop_advertising().await,
        ("browsing", "start") => c.start_browsing().await,
        ("browsing", "stop") => c.stop_browsing().await,
        _ => {
            return Err((
                StatusCode::NOT_FOUND,
                format!("unknown discovery operation {side}/{action}"),
            ))
        }
    };
    result.map_err(coordinator_error)?;

    let status = c.status().await.map_err(coordinator_error)?;
    Ok(Json(DiscoveryResponse {
        advertising: status.advertising,
        browsing: status.browsing,
    }))
}
