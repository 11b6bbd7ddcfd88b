//! Session coordinator: the single owner of peer lifecycle state.
//!
//! Per endpoint: `Idle → Inviting → PendingApproval (inbound only) →
//! Connecting → Connected → Disconnected`. The coordinator is a plain state
//! machine: [`crate::task::CoordinatorTask`] feeds it transport events,
//! user commands and invite deadlines one at a time, so nothing here locks.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use nearguard_core::config::{BusyPolicy, SendMode, SessionConfig};
use nearguard_core::{ChatMessage, Endpoint, EndpointId};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::directory::{DiscoveredPeer, PeerDirectory};
use crate::discovery::Discovery;
use crate::error::{CoordinatorError, DeclineReason, SendFailure};
use crate::learning::{LearnOutcome, LearningPipeline};
use crate::message_store::MessageStore;
use crate::permission::{PendingView, PermissionRequest};
use crate::session::{PeerState, SessionTable, SessionView};
use crate::transport::{ConnectionState, InvitationReply, Transport, TransportEvent};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorSettings {
    pub invite_timeout: Duration,
    pub send_mode: SendMode,
    pub busy_policy: BusyPolicy,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default())
    }
}

impl CoordinatorSettings {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            invite_timeout: Duration::from_secs(config.invite_timeout_secs),
            send_mode: config.send_mode,
            busy_policy: config.busy_policy,
        }
    }
}

/// Result of selecting a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectOutcome {
    /// Already connected; the peer is now the active conversation.
    Joined,
    /// An invitation went out.
    Inviting,
    /// An invitation or connection attempt was already in flight.
    AlreadyInviting,
}

/// Observable changes, for UI-facing subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoordinatorEvent {
    PeerFound { peer: Endpoint },
    PeerLost { peer: Endpoint },
    StateChanged { peer: Endpoint, state: PeerState },
    PermissionRequested { request: PendingView },
    InvitationDeclined { from: Endpoint, reason: DeclineReason },
    PermissionReplaced { previous: Endpoint, by: Endpoint },
    Joined { peer: Endpoint },
    ActiveCleared { peer: Endpoint },
    Message { message: ChatMessage },
    DomainLearned { domain: String },
    Failure { error: String },
}

/// Point-in-time view of the coordinator for the control API.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub local: Endpoint,
    pub send_mode: SendMode,
    pub busy_policy: BusyPolicy,
    pub invite_timeout_secs: u64,
    pub advertising: bool,
    pub browsing: bool,
    pub directory: Vec<DiscoveredPeer>,
    pub sessions: Vec<SessionView>,
    pub joined: Vec<Endpoint>,
    pub active: Option<Endpoint>,
    pub selected: Option<Endpoint>,
    pub pending: Option<PendingView>,
    pub message_count: usize,
}

pub struct SessionCoordinator {
    transport: Arc<dyn Transport>,
    settings: CoordinatorSettings,
    discovery: Discovery,
    directory: PeerDirectory,
    sessions: SessionTable,
    /// The peer the user most recently picked or accepted.
    selected: Option<Endpoint>,
    /// Peers the user opened a conversation with, in order.
    joined: Vec<Endpoint>,
    /// Recipient of outbound messages in `SendMode::Active`.
    active: Option<Endpoint>,
    pending: Option<PermissionRequest>,
    next_request_id: u64,
    messages: MessageStore,
    learning: Option<LearningPipeline>,
    events: broadcast::Sender<CoordinatorEvent>,
}

impl SessionCoordinator {
    pub fn new(
        transport: Arc<dyn Transport>,
        settings: CoordinatorSettings,
        learning: Option<LearningPipeline>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            transport,
            settings,
            discovery: Discovery::new(),
            directory: PeerDirectory::new(),
            sessions: SessionTable::new(),
            selected: None,
            joined: Vec::new(),
            active: None,
            pending: None,
            next_request_id: 1,
            messages: MessageStore::new(),
            learning,
            events,
        }
    }

    pub fn local(&self) -> &Endpoint {
        self.transport.local()
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.events.subscribe()
    }

    pub fn event_sender(&self) -> broadcast::Sender<CoordinatorEvent> {
        self.events.clone()
    }

    fn emit(&self, event: CoordinatorEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn set_state(&mut self, peer: &Endpoint, state: PeerState) {
        let previous = self.sessions.transition(peer, state);
        if previous != state {
            tracing::debug!(peer = %peer, from = ?previous, to = ?state, "session state");
            self.emit(CoordinatorEvent::StateChanged {
                peer: peer.clone(),
                state,
            });
        }
    }

    // ── Discovery ────────────────────────────────────────────────────────────

    pub fn start_advertising(&mut self) -> Result<(), CoordinatorError> {
        self.discovery.start_advertising(self.transport.as_ref())?;
        Ok(())
    }

    pub fn stop_advertising(&mut self) {
        self.discovery.stop_advertising(self.transport.as_ref());
    }

    /// Start browsing with an empty directory.
    pub fn start_browsing(&mut self) -> Result<(), CoordinatorError> {
        self.discovery.start_browsing(self.transport.as_ref())?;
        self.directory.clear();
        Ok(())
    }

    pub fn stop_browsing(&mut self) {
        self.discovery.stop_browsing(self.transport.as_ref());
    }

    // ── User operations ──────────────────────────────────────────────────────

    /// Open a conversation with a visible peer.
    pub fn select(&mut self, id: &EndpointId) -> Result<SelectOutcome, CoordinatorError> {
        let peer = self
            .directory
            .get(id)
            .map(|p| p.endpoint.clone())
            .ok_or(CoordinatorError::UnknownPeer(*id))?;

        match self.sessions.state(id) {
            PeerState::Connected => {
                self.join(peer);
                Ok(SelectOutcome::Joined)
            }
            PeerState::Inviting | PeerState::Connecting => {
                self.selected = Some(peer);
                Ok(SelectOutcome::AlreadyInviting)
            }
            PeerState::PendingApproval => Err(CoordinatorError::AwaitingApproval(peer)),
            PeerState::Idle | PeerState::Disconnected => {
                let timeout = self.settings.invite_timeout;
                self.transport
                    .invite(&peer, timeout)
                    .map_err(CoordinatorError::TransportUnavailable)?;
                self.sessions.begin_invite(peer.clone(), Instant::now() + timeout);
                tracing::info!(peer = %peer, timeout_secs = timeout.as_secs(), "invitation sent");
                self.emit(CoordinatorEvent::StateChanged {
                    peer: peer.clone(),
                    state: PeerState::Inviting,
                });
                self.selected = Some(peer);
                Ok(SelectOutcome::Inviting)
            }
        }
    }

    /// Decide the pending inbound invitation. Returns the requester.
    pub fn respond(&mut self, accept: bool) -> Result<Endpoint, CoordinatorError> {
        let request = self
            .pending
            .take()
            .ok_or(CoordinatorError::NoPendingRequest)?;
        let from = request.resolve(accept);
        if accept {
            tracing::info!(peer = %from, "invitation accepted");
            self.set_state(&from, PeerState::Connecting);
            self.selected = Some(from.clone());
        } else {
            tracing::info!(peer = %from, "invitation rejected");
            self.teardown(&from);
        }
        Ok(from)
    }

    /// Send `text` per the configured send mode and echo it locally.
    pub fn send(&mut self, text: &str) -> Result<ChatMessage, CoordinatorError> {
        let connected = self.sessions.connected();
        if connected.is_empty() {
            return Err(SendFailure::NoConnectedPeers.into());
        }
        let recipients = match self.settings.send_mode {
            SendMode::Broadcast => connected,
            SendMode::Active => match &self.active {
                Some(active) if self.sessions.is_connected(&active.id) => vec![active.clone()],
                _ => return Err(SendFailure::NoActivePeer.into()),
            },
        };

        if let Err(e) = self
            .transport
            .send(Bytes::copy_from_slice(text.as_bytes()), &recipients)
        {
            tracing::warn!(error = %e, recipients = recipients.len(), "send failed");
            return Err(SendFailure::Transport(e).into());
        }

        let local = self.transport.local().clone();
        Ok(self.record(local, text.to_string()))
    }

    /// Tear down the session with `id`, whatever state it is in.
    pub fn disconnect(&mut self, id: &EndpointId) -> Result<(), CoordinatorError> {
        let peer = self
            .sessions
            .get(id)
            .map(|s| s.endpoint.clone())
            .ok_or(CoordinatorError::UnknownPeer(*id))?;
        self.transport.disconnect(&peer);
        tracing::info!(peer = %peer, "disconnected");
        self.teardown(&peer);
        Ok(())
    }

    // ── Transport events ─────────────────────────────────────────────────────

    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::PeerFound(peer) => self.on_peer_found(peer),
            TransportEvent::PeerLost(peer) => {
                if self.discovery.is_browsing() && self.directory.lost(&peer) {
                    tracing::debug!(peer = %peer, "peer lost");
                    self.emit(CoordinatorEvent::PeerLost { peer });
                }
            }
            TransportEvent::InvitationReceived { from, reply } => self.on_invitation(from, reply),
            TransportEvent::PeerStateChanged { peer, state } => self.on_state_changed(peer, state),
            TransportEvent::DataReceived { from, data } => self.on_data(from, data),
        }
    }

    fn on_peer_found(&mut self, peer: Endpoint) {
        if !self.discovery.is_browsing() {
            tracing::trace!(peer = %peer, "sighting while not browsing");
            return;
        }
        if self.directory.found(peer.clone()) {
            tracing::debug!(peer = %peer, "peer found");
            self.emit(CoordinatorEvent::PeerFound { peer });
        }
    }

    fn on_invitation(&mut self, from: Endpoint, reply: InvitationReply) {
        if self.sessions.is_connected(&from.id) {
            tracing::debug!(peer = %from, "invitation from connected peer, declining");
            reply.reject();
            return;
        }

        if let Some(current) = self.pending.take() {
            match self.settings.busy_policy {
                BusyPolicy::Reject => {
                    self.pending = Some(current);
                    reply.reject();
                    tracing::info!(peer = %from, "invitation declined, another is pending");
                    self.emit(CoordinatorEvent::InvitationDeclined {
                        from,
                        reason: DeclineReason::Busy,
                    });
                    return;
                }
                BusyPolicy::Replace => {
                    let previous = current.resolve(false);
                    self.teardown(&previous);
                    tracing::info!(previous = %previous, by = %from, "pending invitation replaced");
                    self.emit(CoordinatorEvent::InvitationDeclined {
                        from: previous.clone(),
                        reason: DeclineReason::Replaced,
                    });
                    self.emit(CoordinatorEvent::PermissionReplaced {
                        previous,
                        by: from.clone(),
                    });
                }
            }
        }

        let id = self.next_request_id;
        self.next_request_id += 1;
        self.set_state(&from, PeerState::PendingApproval);
        let request = PermissionRequest::new(id, from.clone(), reply);
        tracing::info!(peer = %from, request = id, "invitation awaiting decision");
        self.emit(CoordinatorEvent::PermissionRequested {
            request: request.view(),
        });
        self.pending = Some(request);
    }

    fn on_state_changed(&mut self, peer: Endpoint, state: ConnectionState) {
        match state {
            ConnectionState::Connecting => {
                // Outbound attempts stay `Inviting` so their deadline holds.
                if self.sessions.state(&peer.id) == PeerState::PendingApproval {
                    self.set_state(&peer, PeerState::Connecting);
                }
            }
            ConnectionState::Connected => {
                self.set_state(&peer, PeerState::Connected);
                tracing::info!(peer = %peer, "connected");
                if self.selected.as_ref() == Some(&peer) {
                    self.join(peer);
                }
            }
            ConnectionState::NotConnected => {
                if self.sessions.get(&peer.id).is_none() {
                    tracing::trace!(peer = %peer, "not connected, no session");
                    return;
                }
                if self.sessions.state(&peer.id) == PeerState::Inviting {
                    tracing::info!(peer = %peer, "invitation declined by peer");
                } else {
                    tracing::info!(peer = %peer, "peer disconnected");
                }
                self.teardown(&peer);
            }
        }
    }

    fn on_data(&mut self, from: Endpoint, data: Bytes) {
        if !self.sessions.is_connected(&from.id) {
            tracing::debug!(peer = %from, bytes = data.len(), "data from unconnected peer dropped");
            return;
        }
        match String::from_utf8(data.to_vec()) {
            Ok(text) => {
                tracing::debug!(peer = %from, bytes = data.len(), "message received");
                self.record(from, text);
            }
            Err(e) => tracing::warn!(peer = %from, error = %e, "non-utf8 payload dropped"),
        }
    }

    // ── Deadlines ────────────────────────────────────────────────────────────

    pub fn next_invite_deadline(&self) -> Option<Instant> {
        self.sessions.next_deadline()
    }

    /// Abandon invitations whose deadline is at or before `now`. Each is
    /// reported once. Returns the abandoned peers.
    pub fn expire_invites(&mut self, now: Instant) -> Vec<Endpoint> {
        let expired = self.sessions.expired_invites(now);
        for peer in &expired {
            self.transport.disconnect(peer);
            self.teardown(peer);
            let error = CoordinatorError::InviteTimeout(peer.clone());
            tracing::warn!(peer = %peer, "{error}");
            self.emit(CoordinatorEvent::Failure {
                error: error.to_string(),
            });
        }
        expired
    }

    // ── Shutdown ─────────────────────────────────────────────────────────────

    pub fn shutdown(&mut self) {
        self.stop_advertising();
        self.stop_browsing();
        if let Some(request) = self.pending.take() {
            request.resolve(false);
        }
        for view in self.sessions.views() {
            self.transport.disconnect(&view.endpoint);
        }
        self.sessions.clear();
        self.active = None;
        self.selected = None;
        tracing::info!("coordinator shut down");
    }

    // ── Views ────────────────────────────────────────────────────────────────

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            local: self.local().clone(),
            send_mode: self.settings.send_mode,
            busy_policy: self.settings.busy_policy,
            invite_timeout_secs: self.settings.invite_timeout.as_secs(),
            advertising: self.discovery.is_advertising(),
            browsing: self.discovery.is_browsing(),
            directory: self.directory.peers().to_vec(),
            sessions: self.sessions.views(),
            joined: self.joined.clone(),
            active: self.active.clone(),
            selected: self.selected.clone(),
            pending: self.pending.as_ref().map(PermissionRequest::view),
            message_count: self.messages.len(),
        }
    }

    pub fn messages(&self, since: u64) -> Vec<ChatMessage> {
        self.messages.since(since)
    }

    pub fn directory(&self) -> &PeerDirectory {
        &self.directory
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    pub fn joined(&self) -> &[Endpoint] {
        &self.joined
    }

    pub fn active(&self) -> Option<&Endpoint> {
        self.active.as_ref()
    }

    pub fn pending(&self) -> Option<PendingView> {
        self.pending.as_ref().map(PermissionRequest::view)
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn join(&mut self, peer: Endpoint) {
        if self.joined.last() != Some(&peer) {
            self.joined.push(peer.clone());
        }
        self.active = Some(peer.clone());
        self.selected = Some(peer.clone());
        tracing::info!(peer = %peer, "conversation active");
        self.emit(CoordinatorEvent::Joined { peer });
    }

    /// Drop every trace of a session with `peer`.
    fn teardown(&mut self, peer: &Endpoint) {
        if self.sessions.remove(&peer.id).is_some() {
            self.emit(CoordinatorEvent::StateChanged {
                peer: peer.clone(),
                state: PeerState::Disconnected,
            });
        }
        if self.pending.as_ref().is_some_and(|r| r.from == *peer) {
            if let Some(request) = self.pending.take() {
                request.resolve(false);
            }
        }
        if self.active.as_ref() == Some(peer) {
            self.active = None;
            self.emit(CoordinatorEvent::ActiveCleared { peer: peer.clone() });
        }
        if self.selected.as_ref() == Some(peer) {
            self.selected = None;
        }
    }

    fn record(&mut self, sender: Endpoint, text: String) -> ChatMessage {
        let message = self.messages.append(sender, text);
        self.emit(CoordinatorEvent::Message {
            message: message.clone(),
        });
        self.learn(&message.text);
        message
    }

    fn learn(&self, text: &str) {
        let Some(learning) = &self.learning else {
            return;
        };
        match learning.observe(text) {
            Ok(LearnOutcome::Learned(domain)) => {
                self.emit(CoordinatorEvent::DomainLearned { domain });
            }
            Ok(LearnOutcome::AlreadyKnown | LearnOutcome::NotADomain) => {}
            Err(e) => {
                tracing::warn!(error = %e, "failed to persist learned domain");
                self.emit(CoordinatorEvent::Failure {
                    error: e.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::error::TransportError;
    use crate::policy_store::PolicyStore;

    /// Records every call; sends fail on demand.
    struct RecordingTransport {
        local: Endpoint,
        invites: Mutex<Vec<EndpointId>>,
        sent: Mutex<Vec<(Bytes, Vec<EndpointId>)>>,
        disconnects: Mutex<Vec<EndpointId>>,
        fail_send: bool,
    }

    impl RecordingTransport {
        fn new() -> Self {
            Self {
                local: Endpoint::new(EndpointId([0; 16]), "local"),
                invites: Mutex::new(Vec::new()),
                sent: Mutex::new(Vec::new()),
                disconnects: Mutex::new(Vec::new()),
                fail_send: false,
            }
        }

        fn invites(&self) -> Vec<EndpointId> {
            self.invites.lock().unwrap().clone()
        }

        fn sent(&self) -> Vec<(Bytes, Vec<EndpointId>)> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Transport for RecordingTransport {
        fn local(&self) -> &Endpoint {
            &self.local
        }
        fn start_advertising(&self) -> Result<(), TransportError> {
            Ok(())
        }
        fn stop_advertising(&self) {}
        fn start_browsing(&self) -> Result<(), TransportError> {
            Ok(())
        }
        fn stop_browsing(&self) {}
        fn invite(&self, peer: &Endpoint, _: Duration) -> Result<(), TransportError> {
            self.invites.lock().unwrap().push(peer.id);
            Ok(())
        }
        fn send(&self, data: Bytes, recipients: &[Endpoint]) -> Result<(), TransportError> {
            if self.fail_send {
                return Err(TransportError::Io("link down".into()));
            }
            let ids = recipients.iter().map(|r| r.id).collect();
            self.sent.lock().unwrap().push((data, ids));
            Ok(())
        }
        fn disconnect(&self, peer: &Endpoint) {
            self.disconnects.lock().unwrap().push(peer.id);
        }
    }

    fn peer(n: u8) -> Endpoint {
        Endpoint::new(EndpointId([n; 16]), format!("peer-{n}"))
    }

    fn coordinator_with(
        transport: RecordingTransport,
        settings: CoordinatorSettings,
    ) -> (SessionCoordinator, Arc<RecordingTransport>) {
        let transport = Arc::new(transport);
        let mut c = SessionCoordinator::new(transport.clone(), settings, None);
        c.start_browsing().unwrap();
        (c, transport)
    }

    fn coordinator() -> (SessionCoordinator, Arc<RecordingTransport>) {
        coordinator_with(RecordingTransport::new(), CoordinatorSettings::default())
    }

    fn found(c: &mut SessionCoordinator, p: &Endpoint) {
        c.handle_transport_event(TransportEvent::PeerFound(p.clone()));
    }

    fn connect(c: &mut SessionCoordinator, p: &Endpoint) {
        found(c, p);
        c.select(&p.id).unwrap();
        c.handle_transport_event(TransportEvent::PeerStateChanged {
            peer: p.clone(),
            state: ConnectionState::Connected,
        });
    }

    fn invitation(c: &mut SessionCoordinator, from: &Endpoint) -> tokio::sync::oneshot::Receiver<bool> {
        let (reply, rx) = InvitationReply::channel();
        c.handle_transport_event(TransportEvent::InvitationReceived {
            from: from.clone(),
            reply,
        });
        rx
    }

    #[test]
    fn sightings_ignored_when_not_browsing() {
        let (mut c, _) = coordinator();
        c.stop_browsing();
        found(&mut c, &peer(1));
        assert!(c.directory().is_empty());
    }

    #[test]
    fn restart_browsing_clears_directory() {
        let (mut c, _) = coordinator();
        found(&mut c, &peer(1));
        assert_eq!(c.directory().len(), 1);
        c.stop_browsing();
        c.start_browsing().unwrap();
        assert!(c.directory().is_empty());
    }

    #[test]
    fn select_unknown_peer_fails() {
        let (mut c, t) = coordinator();
        assert_eq!(
            c.select(&peer(9).id),
            Err(CoordinatorError::UnknownPeer(peer(9).id))
        );
        assert!(t.invites().is_empty());
    }

    #[test]
    fn select_sends_one_invite() {
        let (mut c, t) = coordinator();
        found(&mut c, &peer(1));
        assert_eq!(c.select(&peer(1).id), Ok(SelectOutcome::Inviting));
        assert_eq!(c.select(&peer(1).id), Ok(SelectOutcome::AlreadyInviting));
        assert_eq!(t.invites(), vec![peer(1).id]);
        assert_eq!(c.sessions().state(&peer(1).id), PeerState::Inviting);
        // The directory keeps the peer while the invite is out.
        assert!(c.directory().contains(&peer(1).id));
    }

    #[test]
    fn transport_connecting_keeps_invite_deadline() {
        let (mut c, _) = coordinator();
        found(&mut c, &peer(1));
        c.select(&peer(1).id).unwrap();
        c.handle_transport_event(TransportEvent::PeerStateChanged {
            peer: peer(1),
            state: ConnectionState::Connecting,
        });
        assert_eq!(c.sessions().state(&peer(1).id), PeerState::Inviting);
        assert!(c.next_invite_deadline().is_some());
    }

    #[test]
    fn connected_selected_peer_becomes_active() {
        let (mut c, _) = coordinator();
        connect(&mut c, &peer(1));
        assert_eq!(c.sessions().state(&peer(1).id), PeerState::Connected);
        assert_eq!(c.active(), Some(&peer(1)));
        assert_eq!(c.joined(), &[peer(1)]);
        assert!(c.next_invite_deadline().is_none());
    }

    #[test]
    fn selecting_connected_peer_is_idempotent() {
        let (mut c, t) = coordinator();
        connect(&mut c, &peer(1));
        assert_eq!(c.select(&peer(1).id), Ok(SelectOutcome::Joined));
        assert_eq!(c.select(&peer(1).id), Ok(SelectOutcome::Joined));
        assert_eq!(c.joined(), &[peer(1)]);
        assert_eq!(c.sessions().len(), 1);
        assert_eq!(t.invites().len(), 1);
    }

    #[test]
    fn invite_timeout_reported_once() {
        let (mut c, t) = coordinator();
        let mut events = c.subscribe();
        found(&mut c, &peer(3));
        c.select(&peer(3).id).unwrap();
        assert_eq!(c.sessions().state(&peer(3).id), PeerState::Inviting);

        let deadline = c.next_invite_deadline().unwrap();
        assert!(c.expire_invites(deadline - Duration::from_secs(1)).is_empty());
        assert_eq!(c.expire_invites(deadline), vec![peer(3)]);
        assert!(c.expire_invites(deadline + Duration::from_secs(60)).is_empty());

        assert_eq!(c.sessions().state(&peer(3).id), PeerState::Idle);
        assert_eq!(*t.disconnects.lock().unwrap(), vec![peer(3).id]);

        let mut failures = 0;
        let mut saw_disconnected = false;
        while let Ok(event) = events.try_recv() {
            match event {
                CoordinatorEvent::Failure { error } => {
                    assert!(error.contains("timed out"));
                    failures += 1;
                }
                CoordinatorEvent::StateChanged {
                    state: PeerState::Disconnected,
                    ..
                } => saw_disconnected = true,
                _ => {}
            }
        }
        assert_eq!(failures, 1);
        assert!(saw_disconnected);

        // Re-selecting retries.
        assert_eq!(c.select(&peer(3).id), Ok(SelectOutcome::Inviting));
        assert_eq!(t.invites().len(), 2);
    }

    #[test]
    fn send_without_connected_peers_leaves_stream_unchanged() {
        let (mut c, t) = coordinator();
        assert_eq!(
            c.send("hello"),
            Err(CoordinatorError::SendFailed(SendFailure::NoConnectedPeers))
        );
        assert!(c.messages(0).is_empty());
        assert!(t.sent().is_empty());
    }

    #[test]
    fn send_goes_to_active_peer_and_echoes() {
        let (mut c, t) = coordinator();
        connect(&mut c, &peer(1));
        connect(&mut c, &peer(2));

        let message = c.send("hello").unwrap();
        assert!(message.is_from(c.local()));
        assert_eq!(t.sent(), vec![(Bytes::from_static(b"hello"), vec![peer(2).id])]);
        assert_eq!(c.messages(0), vec![message]);
    }

    #[test]
    fn broadcast_mode_reaches_every_connected_peer() {
        let settings = CoordinatorSettings {
            send_mode: SendMode::Broadcast,
            ..CoordinatorSettings::default()
        };
        let (mut c, t) = coordinator_with(RecordingTransport::new(), settings);
        connect(&mut c, &peer(2));
        connect(&mut c, &peer(1));
        c.send("all").unwrap();
        assert_eq!(t.sent()[0].1, vec![peer(1).id, peer(2).id]);
    }

    #[test]
    fn transport_send_error_does_not_echo() {
        let failing = RecordingTransport {
            fail_send: true,
            ..RecordingTransport::new()
        };
        let (mut c, _) = coordinator_with(failing, CoordinatorSettings::default());
        connect(&mut c, &peer(1));
        assert!(matches!(
            c.send("hello"),
            Err(CoordinatorError::SendFailed(SendFailure::Transport(_)))
        ));
        assert!(c.messages(0).is_empty());
    }

    #[test]
    fn disconnect_of_active_peer_clears_target() {
        let (mut c, _) = coordinator();
        connect(&mut c, &peer(1));
        connect(&mut c, &peer(2));
        c.handle_transport_event(TransportEvent::PeerStateChanged {
            peer: peer(2),
            state: ConnectionState::NotConnected,
        });
        assert_eq!(c.active(), None);
        assert_eq!(
            c.send("hello"),
            Err(CoordinatorError::SendFailed(SendFailure::NoActivePeer))
        );
        // Peer 1 is still connected; selecting it makes it active again.
        assert_eq!(c.select(&peer(1).id), Ok(SelectOutcome::Joined));
        assert_eq!(c.joined(), &[peer(1), peer(2), peer(1)]);
        assert!(c.send("back").is_ok());
    }

    #[test]
    fn explicit_disconnect_tells_transport() {
        let (mut c, t) = coordinator();
        connect(&mut c, &peer(1));
        c.disconnect(&peer(1).id).unwrap();
        assert_eq!(*t.disconnects.lock().unwrap(), vec![peer(1).id]);
        assert_eq!(c.sessions().state(&peer(1).id), PeerState::Idle);
        assert_eq!(
            c.disconnect(&peer(1).id),
            Err(CoordinatorError::UnknownPeer(peer(1).id))
        );
    }

    #[tokio::test]
    async fn accepted_invitation_selects_requester() {
        let (mut c, _) = coordinator();
        let rx = invitation(&mut c, &peer(4));
        assert_eq!(c.sessions().state(&peer(4).id), PeerState::PendingApproval);
        assert_eq!(c.pending().map(|p| p.from), Some(peer(4)));

        found(&mut c, &peer(4));
        assert_eq!(
            c.select(&peer(4).id),
            Err(CoordinatorError::AwaitingApproval(peer(4)))
        );

        assert_eq!(c.respond(true), Ok(peer(4)));
        assert_eq!(rx.await, Ok(true));
        assert_eq!(c.sessions().state(&peer(4).id), PeerState::Connecting);

        c.handle_transport_event(TransportEvent::PeerStateChanged {
            peer: peer(4),
            state: ConnectionState::Connected,
        });
        assert_eq!(c.active(), Some(&peer(4)));
        assert_eq!(c.respond(true), Err(CoordinatorError::NoPendingRequest));
    }

    #[tokio::test]
    async fn rejected_invitation_removes_session() {
        let (mut c, _) = coordinator();
        let rx = invitation(&mut c, &peer(4));
        c.respond(false).unwrap();
        assert_eq!(rx.await, Ok(false));
        assert!(c.sessions().is_empty());
    }

    #[tokio::test]
    async fn busy_reject_declines_newcomer() {
        let (mut c, _) = coordinator();
        let mut events = c.subscribe();
        let _first = invitation(&mut c, &peer(1));
        let second = invitation(&mut c, &peer(2));

        assert_eq!(second.await, Ok(false));
        assert_eq!(c.pending().map(|p| p.from), Some(peer(1)));
        assert_eq!(c.sessions().state(&peer(2).id), PeerState::Idle);

        let declined = std::iter::from_fn(|| events.try_recv().ok()).any(|e| {
            matches!(e, CoordinatorEvent::InvitationDeclined { from, reason: DeclineReason::Busy } if from == peer(2))
        });
        assert!(declined);
    }

    #[tokio::test]
    async fn busy_replace_swaps_pending_request() {
        let settings = CoordinatorSettings {
            busy_policy: BusyPolicy::Replace,
            ..CoordinatorSettings::default()
        };
        let (mut c, _) = coordinator_with(RecordingTransport::new(), settings);
        let mut events = c.subscribe();
        let first = invitation(&mut c, &peer(1));
        let _second = invitation(&mut c, &peer(2));

        assert_eq!(first.await, Ok(false));
        assert_eq!(c.pending().map(|p| p.from), Some(peer(2)));
        assert_eq!(c.sessions().state(&peer(1).id), PeerState::Idle);

        let seen: Vec<CoordinatorEvent> = std::iter::from_fn(|| events.try_recv().ok()).collect();
        assert!(seen.iter().any(|e| matches!(
            e,
            CoordinatorEvent::InvitationDeclined { from, reason: DeclineReason::Replaced } if *from == peer(1)
        )));
        assert!(seen.iter().any(
            |e| matches!(e, CoordinatorEvent::PermissionReplaced { previous, .. } if *previous == peer(1))
        ));
    }

    #[test]
    fn inbound_messages_keep_receipt_order() {
        let (mut c, _) = coordinator();
        connect(&mut c, &peer(1));
        for text in ["one", "two", "three"] {
            c.handle_transport_event(TransportEvent::DataReceived {
                from: peer(1),
                data: Bytes::from(text),
            });
        }
        let texts: Vec<String> = c.messages(0).into_iter().map(|m| m.text).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
        assert!(!c.messages(0)[0].is_from(c.local()));
    }

    #[test]
    fn data_from_unconnected_peer_is_dropped() {
        let (mut c, _) = coordinator();
        c.handle_transport_event(TransportEvent::DataReceived {
            from: peer(1),
            data: Bytes::from_static(b"hi"),
        });
        assert!(c.messages(0).is_empty());
    }

    #[test]
    fn inbound_domain_is_learned_once() {
        let store = PolicyStore::in_memory();
        let learning = LearningPipeline::new(store.clone(), &[".com".to_string()]);
        let transport = Arc::new(RecordingTransport::new());
        let mut c = SessionCoordinator::new(transport, CoordinatorSettings::default(), Some(learning));
        c.start_browsing().unwrap();
        connect(&mut c, &peer(1));

        for _ in 0..2 {
            c.handle_transport_event(TransportEvent::DataReceived {
                from: peer(1),
                data: Bytes::from_static(b"spam.com"),
            });
        }
        assert_eq!(store.read_blocked_domains().unwrap(), vec!["spam.com"]);
        assert_eq!(c.messages(0).len(), 2);
    }

    #[test]
    fn shutdown_disconnects_everything() {
        let (mut c, t) = coordinator();
        connect(&mut c, &peer(1));
        c.shutdown();
        assert!(c.sessions().is_empty());
        assert_eq!(c.active(), None);
        assert!(!c.status().browsing);
        assert_eq!(*t.disconnects.lock().unwrap(), vec![peer(1).id]);
    }
}
