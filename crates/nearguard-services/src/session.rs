//! Session management: per-endpoint lifecycle state.
//!
//! A session exists for every endpoint we invited or that invited us, until
//! it disconnects, is declined, or its invitation expires. Absence from the
//! table means `Idle`.

use std::collections::HashMap;

use nearguard_core::{Endpoint, EndpointId};
use serde::Serialize;
use tokio::time::Instant;

/// Lifecycle state of one remote endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerState {
    Idle,
    Inviting,
    PendingApproval,
    Connecting,
    Connected,
    Disconnected,
}

/// An entry in the session table.
#[derive(Debug, Clone)]
pub struct Session {
    pub endpoint: Endpoint,
    pub state: PeerState,
    /// Set while `Inviting`. The invite is abandoned once this passes.
    pub invite_deadline: Option<Instant>,
    /// When the session entered its current state.
    pub since: Instant,
}

/// Serializable view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub endpoint: Endpoint,
    pub state: PeerState,
    pub state_secs: u64,
}

#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: HashMap<EndpointId, Session>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &EndpointId) -> Option<&Session> {
        self.sessions.get(id)
    }

    /// Current state, `Idle` when there is no session.
    pub fn state(&self, id: &EndpointId) -> PeerState {
        self.sessions
            .get(id)
            .map(|s| s.state)
            .unwrap_or(PeerState::Idle)
    }

    /// Start an invitation that expires at `deadline`.
    pub fn begin_invite(&mut self, endpoint: Endpoint, deadline: Instant) {
        self.sessions.insert(
            endpoint.id,
            Session {
                endpoint,
                state: PeerState::Inviting,
                invite_deadline: Some(deadline),
                since: Instant::now(),
            },
        );
    }

    /// Move `endpoint` to `state`, creating the session if needed.
    /// Returns the previous state.
    pub fn transition(&mut self, endpoint: &Endpoint, state: PeerState) -> PeerState {
        let now = Instant::now();
        match self.sessions.get_mut(&endpoint.id) {
            Some(session) => {
                let previous = session.state;
                session.state = state;
                session.since = now;
                if state != PeerState::Inviting {
                    session.invite_deadline = None;
                }
                previous
            }
            None => {
                self.sessions.insert(
                    endpoint.id,
                    Session {
                        endpoint: endpoint.clone(),
                        state,
                        invite_deadline: None,
                        since: now,
                    },
                );
                PeerState::Idle
            }
        }
    }

    pub fn remove(&mut self, id: &EndpointId) -> Option<Session> {
        self.sessions.remove(id)
    }

    /// Connected endpoints, ordered by id so fan-out is deterministic.
    pub fn connected(&self) -> Vec<Endpoint> {
        let mut peers: Vec<Endpoint> = self
            .sessions
            .values()
            .filter(|s| s.state == PeerState::Connected)
            .map(|s| s.endpoint.clone())
            .collect();
        peers.sort_by_key(|e| e.id);
        peers
    }

    pub fn is_connected(&self, id: &EndpointId) -> bool {
        self.state(id) == PeerState::Connected
    }

    /// Earliest outstanding invite deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.sessions
            .values()
            .filter_map(|s| s.invite_deadline)
            .min()
    }

    /// Endpoints whose invitation deadline is at or before `now`.
    pub fn expired_invites(&self, now: Instant) -> Vec<Endpoint> {
        self.sessions
            .values()
            .filter(|s| s.state == PeerState::Inviting)
            .filter(|s| s.invite_deadline.is_some_and(|d| d <= now))
            .map(|s| s.endpoint.clone())
            .collect()
    }

    pub fn views(&self) -> Vec<SessionView> {
        let mut views: Vec<SessionView> = self
            .sessions
            .values()
            .map(|s| SessionView {
                endpoint: s.endpoint.clone(),
                state: s.state,
                state_secs: s.since.elapsed().as_secs(),
            })
            .collect();
        views.sort_by_key(|v| v.endpoint.id);
        views
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn clear(&mut self) {
        self.sessions.clear();
    }
}
