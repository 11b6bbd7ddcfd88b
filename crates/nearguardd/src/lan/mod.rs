//! LAN transport: nearby peers over link-local UDP.
//!
//! Presence is a periodic multicast `Announce` frame; a peer not heard from
//! within `PEER_TTL_SECS` is reported lost. Invitations, replies, payloads
//! and teardown travel as unicast JSON frames to the port a peer announced.
//!
//! Per-peer link state lives in `links`. The coordinator owns the real
//! session lifecycle; this table only decides which frames are accepted.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;
use tokio::net::UdpSocket;

use nearguard_core::wire::{Frame, WireError};
use nearguard_core::{Endpoint, EndpointId};
use nearguard_services::transport::EventSender;
use nearguard_services::{ConnectionState, InvitationReply, Transport, TransportError, TransportEvent};

pub mod announce;
pub mod listener;
pub mod session;

/// How long an inbound invitation may wait for the local decision.
const INBOUND_DECISION_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Link {
    /// We sent an invite and wait for the reply.
    Inviting,
    /// They invited us; the local decision is pending.
    Invited,
    Connected,
}

/// A peer heard on the announcement channel.
#[derive(Debug, Clone)]
struct Sighting {
    endpoint: Endpoint,
    last_seen: Instant,
}

pub struct LanTransport {
    local: Endpoint,
    service: String,
    socket: Arc<UdpSocket>,
    events: EventSender,
    advertising: AtomicBool,
    browsing: AtomicBool,
    /// Unicast address per peer, from announcements and inbound frames.
    addrs: DashMap<EndpointId, SocketAddr>,
    visible: DashMap<EndpointId, Sighting>,
    links: DashMap<EndpointId, Link>,
}

impl LanTransport {
    pub fn new(
        local: Endpoint,
        service: impl Into<String>,
        socket: Arc<UdpSocket>,
        events: EventSender,
    ) -> Self {
        Self {
            local,
            service: service.into(),
            socket,
            events,
            advertising: AtomicBool::new(false),
            browsing: AtomicBool::new(false),
            addrs: DashMap::new(),
            visible: DashMap::new(),
            links: DashMap::new(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn is_advertising(&self) -> bool {
        self.advertising.load(Ordering::Relaxed)
    }

    fn is_browsing(&self) -> bool {
        self.browsing.load(Ordering::Relaxed)
    }

    /// Unicast port peers should send frames to.
    pub fn session_port(&self) -> std::io::Result<u16> {
        Ok(self.socket.local_addr()?.port())
    }

    fn emit(&self, event: TransportEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("coordinator gone, transport event dropped");
        }
    }

    fn emit_state(&self, peer: &Endpoint, state: ConnectionState) {
        self.emit(TransportEvent::PeerStateChanged {
            peer: peer.clone(),
            state,
        });
    }

    fn send_frame(&self, frame: &Frame, to: SocketAddr) -> Result<(), TransportError> {
        let bytes = frame.encode().map_err(|e| match e {
            WireError::TooLarge(n) => TransportError::PayloadTooLarge(n),
            WireError::Malformed(e) => TransportError::Io(e.to_string()),
        })?;
        self.socket
            .try_send_to(&bytes, to)
            .map_err(|e| TransportError::Io(e.to_string()))?;
        tracing::trace!(to = %to, bytes = bytes.len(), "frame sent");
        Ok(())
    }

    fn addr_of(&self, id: &EndpointId) -> Option<SocketAddr> {
        self.addrs.get(id).map(|a| *a)
    }

    // ── Presence ─────────────────────────────────────────────────────────────

    /// Record an announcement from `endpoint` reachable at `addr`.
    pub fn observe_announcement(&self, endpoint: Endpoint, addr: SocketAddr) {
        if endpoint.id == self.local.id {
            return;
        }
        self.addrs.insert(endpoint.id, addr);
        let is_new = self
            .visible
            .insert(
                endpoint.id,
                Sighting {
                    endpoint: endpoint.clone(),
                    last_seen: Instant::now(),
                },
            )
            .is_none();
        if is_new {
            tracing::debug!(peer = %endpoint, addr = %addr, "peer discovered");
            if self.is_browsing() {
                self.emit(TransportEvent::PeerFound(endpoint));
            }
        }
    }

    /// Drop sightings older than `ttl`. Returns how many expired.
    pub fn expire_sightings(&self, ttl: Duration) -> usize {
        let stale: Vec<Endpoint> = self
            .visible
            .iter()
            .filter(|s| s.last_seen.elapsed() >= ttl)
            .map(|s| s.endpoint.clone())
            .collect();
        for endpoint in &stale {
            self.visible.remove(&endpoint.id);
            tracing::debug!(peer = %endpoint, "peer expired");
            if self.is_browsing() {
                self.emit(TransportEvent::PeerLost(endpoint.clone()));
            }
        }
        stale.len()
    }

    // ── Inbound frames ───────────────────────────────────────────────────────

    /// Apply one unicast frame received from `src`.
    pub fn handle_frame(self: &Arc<Self>, frame: Frame, src: SocketAddr) {
        let from = frame.sender().clone();
        if from.id == self.local.id {
            return;
        }
        self.addrs.insert(from.id, src);

        match frame {
            Frame::Invite { service, .. } => {
                if service != self.service {
                    tracing::debug!(peer = %from, service = %service, "invite for another service ignored");
                    return;
                }
                self.on_invite(from);
            }
            Frame::InviteReply { accepted, .. } => {
                let inviting = self
                    .links
                    .get(&from.id)
                    .is_some_and(|l| *l == Link::Inviting);
                if !inviting {
                    tracing::debug!(peer = %from, "reply to abandoned invite ignored");
                    return;
                }
                if accepted {
                    self.links.insert(from.id, Link::Connected);
                    self.emit_state(&from, ConnectionState::Connected);
                } else {
                    self.links.remove(&from.id);
                    self.emit_state(&from, ConnectionState::NotConnected);
                }
            }
            Frame::Data { payload, .. } => {
                let connected = self
                    .links
                    .get(&from.id)
                    .is_some_and(|l| *l == Link::Connected);
                if connected {
                    self.emit(TransportEvent::DataReceived {
                        from,
                        data: Bytes::from(payload),
                    });
                } else {
                    tracing::debug!(peer = %from, "data outside a session dropped");
                }
            }
            Frame::Bye { .. } => {
                if self.links.remove(&from.id).is_some() {
                    self.emit_state(&from, ConnectionState::NotConnected);
                }
            }
            Frame::Announce { .. } => {
                tracing::trace!(peer = %from, "announcement on session socket ignored");
            }
        }
    }

    fn on_invite(self: &Arc<Self>, from: Endpoint) {
        match self.links.get(&from.id).map(|l| *l) {
            None => {}
            // Crossed invites: the lower id's invite stands.
            Some(Link::Inviting) if from.id < self.local.id => {
                tracing::info!(peer = %from, "crossed invites, yielding to peer");
            }
            Some(Link::Inviting) => {
                tracing::info!(peer = %from, "crossed invites, keeping ours");
                return;
            }
            Some(_) => {
                tracing::debug!(peer = %from, "duplicate invite ignored");
                return;
            }
        }
        self.links.insert(from.id, Link::Invited);
        let (reply, rx) = InvitationReply::channel();
        self.emit(TransportEvent::InvitationReceived {
            from: from.clone(),
            reply,
        });

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let accepted = matches!(
                tokio::time::timeout(INBOUND_DECISION_TIMEOUT, rx).await,
                Ok(Ok(true))
            );
            this.finish_inbound(from, accepted);
        });
    }

    fn finish_inbound(&self, from: Endpoint, accepted: bool) {
        let still_invited = self
            .links
            .get(&from.id)
            .is_some_and(|l| *l == Link::Invited);
        if !still_invited {
            return;
        }
        if accepted {
            self.links.insert(from.id, Link::Connected);
        } else {
            self.links.remove(&from.id);
        }
        let reply = Frame::InviteReply {
            from: self.local.clone(),
            accepted,
        };
        if let Some(addr) = self.addr_of(&from.id) {
            if let Err(e) = self.send_frame(&reply, addr) {
                tracing::warn!(peer = %from, error = %e, "failed to answer invite");
            }
        }
        if accepted {
            self.emit_state(&from, ConnectionState::Connected);
        }
    }
}

impl Transport for LanTransport {
    fn local(&self) -> &Endpoint {
        &self.local
    }

    fn start_advertising(&self) -> Result<(), TransportError> {
        self.advertising.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn stop_advertising(&self) {
        self.advertising.store(false, Ordering::Relaxed);
    }

    fn start_browsing(&self) -> Result<(), TransportError> {
        self.browsing.store(true, Ordering::Relaxed);
        let current: Vec<Endpoint> = self.visible.iter().map(|s| s.endpoint.clone()).collect();
        for endpoint in current {
            self.emit(TransportEvent::PeerFound(endpoint));
        }
        Ok(())
    }

    fn stop_browsing(&self) {
        self.browsing.store(false, Ordering::Relaxed);
    }

    fn invite(&self, peer: &Endpoint, _timeout: Duration) -> Result<(), TransportError> {
        let addr = self
            .addr_of(&peer.id)
            .ok_or(TransportError::Unreachable(peer.id))?;
        let frame = Frame::Invite {
            from: self.local.clone(),
            service: self.service.clone(),
        };
        self.send_frame(&frame, addr)?;
        self.links.insert(peer.id, Link::Inviting);
        self.emit_state(peer, ConnectionState::Connecting);
        Ok(())
    }

    fn send(&self, data: Bytes, recipients: &[Endpoint]) -> Result<(), TransportError> {
        let mut targets = Vec::with_capacity(recipients.len());
        for r in recipients {
            let connected = self.links.get(&r.id).is_some_and(|l| *l == Link::Connected);
            match self.addr_of(&r.id) {
                Some(addr) if connected => targets.push(addr),
                _ => return Err(TransportError::NotConnected(r.id)),
            }
        }
        let frame = Frame::Data {
            from: self.local.clone(),
            payload: data.to_vec(),
        };
        for addr in targets {
            self.send_frame(&frame, addr)?;
        }
        Ok(())
    }

    fn disconnect(&self, peer: &Endpoint) {
        let Some((_, link)) = self.links.remove(&peer.id) else {
            return;
        };
        if let Some(addr) = self.addr_of(&peer.id) {
            let bye = Frame::Bye {
                from: self.local.clone(),
            };
            if let Err(e) = self.send_frame(&bye, addr) {
                tracing::debug!(peer = %peer, error = %e, "bye not sent");
            }
        }
        if link == Link::Connected {
            self.emit_state(peer, ConnectionState::NotConnected);
        }
    }
}
