//! In-process transport hub.
//!
//! Every node joined to a [`MemoryHub`] sees the others as nearby devices.
//! Advertising, browsing, invitations, sessions and payload delivery behave
//! as the LAN transport does, minus sockets, so whole conversations can run
//! inside one test process.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use nearguard_core::{Endpoint, EndpointId};

use super::{
    event_channel, ConnectionState, EventReceiver, EventSender, InvitationReply, Transport,
    TransportEvent,
};
use crate::error::TransportError;

/// The hub stops waiting for an answer this long after the inviter's own
/// deadline, so the inviter is always the one to report the timeout.
const INVITE_GRACE: Duration = Duration::from_secs(1);

struct Node {
    endpoint: Endpoint,
    events: EventSender,
    advertising: bool,
    browsing: bool,
}

#[derive(Default)]
struct HubState {
    nodes: HashMap<EndpointId, Node>,
    /// Established sessions, stored with the smaller id first.
    links: HashSet<(EndpointId, EndpointId)>,
    /// Outstanding invitations as (inviter, invitee).
    pending: HashSet<(EndpointId, EndpointId)>,
}

fn link_key(a: EndpointId, b: EndpointId) -> (EndpointId, EndpointId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

impl HubState {
    fn emit(&self, to: &EndpointId, event: TransportEvent) {
        if let Some(node) = self.nodes.get(to) {
            // A node whose receiver is gone has left the conversation.
            let _ = node.events.send(event);
        }
    }

    fn emit_state(&self, to: &EndpointId, peer: &Endpoint, state: ConnectionState) {
        self.emit(
            to,
            TransportEvent::PeerStateChanged {
                peer: peer.clone(),
                state,
            },
        );
    }

    fn is_linked(&self, a: EndpointId, b: EndpointId) -> bool {
        self.links.contains(&link_key(a, b))
    }
}

/// Shared medium for a set of [`MemoryTransport`]s.
#[derive(Clone, Default)]
pub struct MemoryHub {
    state: Arc<Mutex<HubState>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach a device. Returns its transport and the event queue the
    /// coordinator consumes.
    pub fn join(&self, endpoint: Endpoint) -> (MemoryTransport, EventReceiver) {
        let (tx, rx) = event_channel();
        self.lock().nodes.insert(
            endpoint.id,
            Node {
                endpoint: endpoint.clone(),
                events: tx,
                advertising: false,
                browsing: false,
            },
        );
        let transport = MemoryTransport {
            local: endpoint,
            hub: self.clone(),
        };
        (transport, rx)
    }

    /// Remove a device as if it walked out of range.
    pub fn vanish(&self, id: &EndpointId) {
        let mut state = self.lock();
        let Some(node) = state.nodes.remove(id) else {
            return;
        };
        let linked: Vec<EndpointId> = state
            .links
            .iter()
            .filter_map(|(a, b)| match (*a == *id, *b == *id) {
                (true, _) => Some(*b),
                (_, true) => Some(*a),
                _ => None,
            })
            .collect();
        state.links.retain(|(a, b)| a != id && b != id);
        state.pending.retain(|(a, b)| a != id && b != id);
        for other in linked {
            state.emit_state(&other, &node.endpoint, ConnectionState::NotConnected);
        }
        if node.advertising {
            let browsers: Vec<EndpointId> = state
                .nodes
                .values()
                .filter(|n| n.browsing)
                .map(|n| n.endpoint.id)
                .collect();
            for other in browsers {
                state.emit(&other, TransportEvent::PeerLost(node.endpoint.clone()));
            }
        }
    }

    pub fn is_linked(&self, a: &EndpointId, b: &EndpointId) -> bool {
        self.lock().is_linked(*a, *b)
    }

    fn finish_invite(&self, inviter: &Endpoint, invitee: &Endpoint, accepted: bool) {
        let mut state = self.lock();
        if !state.pending.remove(&(inviter.id, invitee.id)) {
            // Abandoned by the inviter in the meantime.
            return;
        }
        if accepted && state.nodes.contains_key(&invitee.id) {
            state.links.insert(link_key(inviter.id, invitee.id));
            state.emit_state(&inviter.id, invitee, ConnectionState::Connected);
            state.emit_state(&invitee.id, inviter, ConnectionState::Connected);
        } else {
            state.emit_state(&inviter.id, invitee, ConnectionState::NotConnected);
        }
    }
}

/// One device's view of a [`MemoryHub`].
pub struct MemoryTransport {
    local: Endpoint,
    hub: MemoryHub,
}

impl MemoryTransport {
    fn update_local(&self, f: impl FnOnce(&mut Node)) -> Result<(), TransportError> {
        let mut state = self.hub.lock();
        let node = state
            .nodes
            .get_mut(&self.local.id)
            .ok_or_else(|| TransportError::Unavailable("left the hub".into()))?;
        f(node);
        Ok(())
    }

    fn announce(&self, event: impl Fn(Endpoint) -> TransportEvent) {
        let state = self.hub.lock();
        for node in state.nodes.values() {
            if node.browsing && node.endpoint.id != self.local.id {
                let _ = node.events.send(event(self.local.clone()));
            }
        }
    }
}

impl Transport for MemoryTransport {
    fn local(&self) -> &Endpoint {
        &self.local
    }

    fn start_advertising(&self) -> Result<(), TransportError> {
        self.update_local(|n| n.advertising = true)?;
        self.announce(TransportEvent::PeerFound);
        Ok(())
    }

    fn stop_advertising(&self) {
        if self.update_local(|n| n.advertising = false).is_ok() {
            self.announce(TransportEvent::PeerLost);
        }
    }

    fn start_browsing(&self) -> Result<(), TransportError> {
        self.update_local(|n| n.browsing = true)?;
        let state = self.hub.lock();
        for node in state.nodes.values() {
            if node.advertising && node.endpoint.id != self.local.id {
                state.emit(&self.local.id, TransportEvent::PeerFound(node.endpoint.clone()));
            }
        }
        Ok(())
    }

    fn stop_browsing(&self) {
        let _ = self.update_local(|n| n.browsing = false);
    }

    fn invite(&self, peer: &Endpoint, timeout: Duration) -> Result<(), TransportError> {
        let rx = {
            let mut state = self.hub.lock();
            match state.nodes.get(&peer.id) {
                Some(node) if node.advertising => {}
                _ => return Err(TransportError::Unreachable(peer.id)),
            }
            state.pending.insert((self.local.id, peer.id));
            state.emit_state(&self.local.id, peer, ConnectionState::Connecting);
            let (reply, rx) = InvitationReply::channel();
            state.emit(
                &peer.id,
                TransportEvent::InvitationReceived {
                    from: self.local.clone(),
                    reply,
                },
            );
            rx
        };

        let hub = self.hub.clone();
        let inviter = self.local.clone();
        let invitee = peer.clone();
        tokio::spawn(async move {
            let answer = tokio::time::timeout(timeout + INVITE_GRACE, rx).await;
            let accepted = matches!(answer, Ok(Ok(true)));
            tracing::debug!(from = %inviter, to = %invitee, accepted, "memory invite settled");
            hub.finish_invite(&inviter, &invitee, accepted);
        });
        Ok(())
    }

    fn send(&self, data: Bytes, recipients: &[Endpoint]) -> Result<(), TransportError> {
        let state = self.hub.lock();
        if let Some(missing) = recipients
            .iter()
            .find(|r| !state.is_linked(self.local.id, r.id))
        {
            return Err(TransportError::NotConnected(missing.id));
        }
        for recipient in recipients {
            state.emit(
                &recipient.id,
                TransportEvent::DataReceived {
                    from: self.local.clone(),
                    data: data.clone(),
                },
            );
        }
        Ok(())
    }

    fn disconnect(&self, peer: &Endpoint) {
        let mut state = self.hub.lock();
        state.pending.remove(&(self.local.id, peer.id));
        if state.links.remove(&link_key(self.local.id, peer.id)) {
            state.emit_state(&self.local.id, peer, ConnectionState::NotConnected);
            state.emit_state(&peer.id, &self.local, ConnectionState::NotConnected);
        }
    }
}
