//! /blocklist handlers: the stored domain list.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use nearguard_core::normalize_domain;

use super::{store_error, ApiError, ApiState};

// ── /blocklist (GET) ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct BlocklistResponse {
    /// Built into the daemon, not editable.
    pub defaults: Vec<String>,
    /// Stored entries in stored order. Indices are what DELETE takes.
    pub stored: Vec<String>,
}

fn current(state: &ApiState) -> Result<BlocklistResponse, ApiError> {
    Ok(BlocklistResponse {
        defaults: state.default_domains.as_ref().clone(),
        stored: state.policy.read_blocked_domains().map_err(store_error)?,
    })
}

pub async fn handle_blocklist_get(
    State(state): State<ApiState>,
) -> Result<Json<BlocklistResponse>, ApiError> {
    current(&state).map(Json)
}

// ── /blocklist (PUT) ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ReplaceRequest {
    pub domains: Vec<String>,
}

pub async fn handle_blocklist_replace(
    State(state): State<ApiState>,
    Json(req): Json<ReplaceRequest>,
) -> Result<Json<BlocklistResponse>, ApiError> {
    state
        .policy
        .write_blocked_domains(&req.domains)
        .map_err(store_error)?;
    tracing::info!(entries = req.domains.len(), "blocklist replaced");
    current(&state).map(Json)
}

// ── /blocklist/add (POST) ─────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct AddRequest {
    pub domain: String,
}

#[derive(Debug, Serialize)]
pub struct AddResponse {
    pub domain: String,
    /// False when the domain was already listed.
    pub added: bool,
}

pub async fn handle_blocklist_add(
    State(state): State<ApiState>,
    Json(req): Json<AddRequest>,
) -> Result<Json<AddResponse>, ApiError> {
    let domain = normalize_domain(&req.domain)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("invalid domain entry: {e}")))?;
    let added = state.policy.add_domain(&domain).map_err(store_error)?;
    if added {
        tracing::info!(domain = %domain, "domain blocked");
    }
    Ok(Json(AddResponse { domain, added }))
}

// ── /blocklist/{index} (DELETE) ───────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct RemoveResponse {
    pub removed: String,
}

pub async fn handle_blocklist_remove(
    State(state): State<ApiState>,
    Path(index): Path<usize>,
) -> Result<Json<RemoveResponse>, ApiError> {
    match state.policy.remove_domain_at(index).map_err(store_error)? {
        Some(removed) => {
            tracing::info!(domain = %removed, index, "domain unblocked");
            Ok(Json(RemoveResponse { removed }))
        }
        None => Err((StatusCode::NOT_FOUND, format!("no entry at index {index}"))),
    }
}
