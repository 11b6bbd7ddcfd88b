//! Transport seam.
//!
//! The coordinator consumes a nearby-peer transport through [`Transport`]
//! and never touches sockets itself. Everything the transport wants to tell
//! the coordinator (sightings, invitations, state changes, payloads) arrives
//! as a [`TransportEvent`] on one channel, whatever thread produced it.

pub mod memory;

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use nearguard_core::Endpoint;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::error::TransportError;

/// Session state as the transport reports it for one remote endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Connected,
    NotConnected,
}

/// The transport's half of an inbound invitation. Consumed by the decision.
///
/// Dropping it undecided reads as a rejection on the transport side.
pub struct InvitationReply {
    tx: oneshot::Sender<bool>,
}

impl InvitationReply {
    /// Create a reply handle and the receiver the transport waits on.
    pub fn channel() -> (Self, oneshot::Receiver<bool>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    pub fn resolve(self, accept: bool) {
        // Receiver gone means the transport already gave up on this invite.
        let _ = self.tx.send(accept);
    }

    pub fn accept(self) {
        self.resolve(true);
    }

    pub fn reject(self) {
        self.resolve(false);
    }
}

impl fmt::Debug for InvitationReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvitationReply")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

/// Everything a transport reports, funneled onto one queue.
#[derive(Debug)]
pub enum TransportEvent {
    PeerFound(Endpoint),
    PeerLost(Endpoint),
    InvitationReceived {
        from: Endpoint,
        reply: InvitationReply,
    },
    PeerStateChanged {
        peer: Endpoint,
        state: ConnectionState,
    },
    DataReceived {
        from: Endpoint,
        data: Bytes,
    },
}

pub type EventSender = mpsc::UnboundedSender<TransportEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Create the channel a transport reports into.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Nearby-peer transport capability.
///
/// Calls never block on the network. Outcomes of `invite` arrive later as
/// `PeerStateChanged` events; `send` is fire-and-forget with at-most-once
/// delivery.
pub trait Transport: Send + Sync {
    /// The local endpoint this transport speaks for.
    fn local(&self) -> &Endpoint;

    fn start_advertising(&self) -> Result<(), TransportError>;

    fn stop_advertising(&self);

    fn start_browsing(&self) -> Result<(), TransportError>;

    fn stop_browsing(&self);

    /// Ask `peer` to open a session. The transport may give up on its own
    /// after `timeout`; the coordinator enforces the same bound regardless.
    fn invite(&self, peer: &Endpoint, timeout: Duration) -> Result<(), TransportError>;

    fn send(&self, data: Bytes, recipients: &[Endpoint]) -> Result<(), TransportError>;

    /// Tear down the session with `peer`, or abandon a pending invite.
    fn disconnect(&self, peer: &Endpoint);
}
