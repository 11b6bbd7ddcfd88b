//! Error taxonomy for the transport seam and the session coordinator.
//!
//! Every variant is local to the operation that raised it. None of them
//! stop the coordinator task.

use nearguard_core::{Endpoint, EndpointId};
use serde::Serialize;

/// Failures reported by a [`crate::Transport`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("transport unavailable: {0}")]
    Unavailable(String),
    #[error("peer {0} is not reachable")]
    Unreachable(EndpointId),
    #[error("peer {0} is not connected")]
    NotConnected(EndpointId),
    #[error("payload of {0} bytes is too large")]
    PayloadTooLarge(usize),
    #[error("i/o error: {0}")]
    Io(String),
}

/// Why a send did not go out.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendFailure {
    #[error("no connected peers")]
    NoConnectedPeers,
    #[error("no active conversation")]
    NoActivePeer,
    #[error(transparent)]
    Transport(TransportError),
}

/// Why an inbound invitation was declined without asking the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclineReason {
    /// Another request was already awaiting a decision.
    Busy,
    /// A newer request took this one's place.
    Replaced,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinatorError {
    #[error("transport unavailable: {0}")]
    TransportUnavailable(TransportError),
    #[error("invitation to {0} timed out")]
    InviteTimeout(Endpoint),
    #[error("send failed: {0}")]
    SendFailed(SendFailure),
    #[error("unknown peer {0}")]
    UnknownPeer(EndpointId),
    #[error("{0} is waiting for our decision")]
    AwaitingApproval(Endpoint),
    #[error("no invitation is waiting for a decision")]
    NoPendingRequest,
    #[error("{0} already running")]
    AlreadyRunning(&'static str),
    #[error("coordinator is not running")]
    Stopped,
}

impl From<SendFailure> for CoordinatorError {
    fn from(f: SendFailure) -> Self {
        CoordinatorError::SendFailed(f)
    }
}

impl From<crate::discovery::DiscoveryError> for CoordinatorError {
    fn from(e: crate::discovery::DiscoveryError) -> Self {
        match e {
            crate::discovery::DiscoveryError::AlreadyRunning(side) => {
                CoordinatorError::AlreadyRunning(side)
            }
            crate::discovery::DiscoveryError::Transport(t) => {
                CoordinatorError::TransportUnavailable(t)
            }
        }
    }
}
