//! HTTP API handlers: exposes coordinator and policy state as JSON.

pub mod blocklist;
pub mod filter;
pub mod messages;
pub mod peers;
pub mod permission;
pub mod status;

use std::sync::Arc;

use axum::http::StatusCode;

use nearguard_core::{Endpoint, EndpointId};
use nearguard_services::{CoordinatorError, CoordinatorHandle, PolicyStore, SendFailure, StoreError};

#[derive(Clone)]
pub struct ApiState {
    pub coordinator: CoordinatorHandle,
    pub policy: PolicyStore,
    /// Built-in domains blocked regardless of store contents.
    pub default_domains: Arc<Vec<String>>,
    /// The daemon's own endpoint, for mine/theirs in message listings.
    pub local: Endpoint,
    /// Fires graceful daemon shutdown.
    pub shutdown_tx: tokio::sync::broadcast::Sender<()>,
}

// ── Shared helpers ────────────────────────────────────────────────────────────

pub type ApiError = (StatusCode, String);

/// Parse a hex-encoded endpoint id.
fn parse_endpoint_id(s: &str) -> Result<EndpointId, ApiError> {
    s.parse()
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("invalid endpoint id: {e}")))
}

fn coordinator_error(e: CoordinatorError) -> ApiError {
    let status = match &e {
        CoordinatorError::UnknownPeer(_) | CoordinatorError::NoPendingRequest => {
            StatusCode::NOT_FOUND
        }
        CoordinatorError::AwaitingApproval(_)
        | CoordinatorError::AlreadyRunning(_)
        | CoordinatorError::SendFailed(SendFailure::NoConnectedPeers)
        | CoordinatorError::SendFailed(SendFailure::NoActivePeer) => StatusCode::CONFLICT,
        CoordinatorError::TransportUnavailable(_)
        | CoordinatorError::SendFailed(SendFailure::Transport(_)) => StatusCode::BAD_GATEWAY,
        CoordinatorError::InviteTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        CoordinatorError::Stopped => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, e.to_string())
}

fn store_error(e: StoreError) -> ApiError {
    tracing::warn!(error = %e, "policy store error");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

// Re-export handler functions for use in router setup.
pub use blocklist::{
    handle_blocklist_add, handle_blocklist_get, handle_blocklist_remove, handle_blocklist_replace,
};
pub use filter::{handle_filter_check, handle_filter_get, handle_filter_set};
pub use messages::{handle_get_messages, handle_send_message};
pub use peers::{handle_disconnect, handle_discovery, handle_invite, handle_peers};
pub use permission::{handle_permission_get, handle_permission_respond};
pub use status::{handle_shutdown, handle_status};
