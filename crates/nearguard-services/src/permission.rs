//! Inbound invitation awaiting a local decision.

use nearguard_core::message::now_millis;
use nearguard_core::Endpoint;
use serde::Serialize;

use crate::transport::InvitationReply;

/// The single live invitation the user has to accept or reject.
#[derive(Debug)]
pub struct PermissionRequest {
    pub id: u64,
    pub from: Endpoint,
    /// Unix timestamp in milliseconds.
    pub received_at: u64,
    reply: InvitationReply,
}

/// Serializable view of a pending request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingView {
    pub id: u64,
    pub from: Endpoint,
    pub received_at: u64,
}

impl PermissionRequest {
    pub fn new(id: u64, from: Endpoint, reply: InvitationReply) -> Self {
        Self {
            id,
            from,
            received_at: now_millis(),
            reply,
        }
    }

    /// Hand the decision to the transport. Returns the requesting endpoint.
    pub fn resolve(self, accept: bool) -> Endpoint {
        self.reply.resolve(accept);
        self.from
    }

    pub fn view(&self) -> PendingView {
        PendingView {
            id: self.id,
            from: self.from.clone(),
            received_at: self.received_at,
        }
    }
}
