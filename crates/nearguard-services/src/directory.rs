//! Peer directory: the endpoints currently visible nearby.
//!
//! Fed by discovery sightings. Ordered by first sighting so listings are
//! stable. Identity is the endpoint id; a renamed peer is the same peer.

use nearguard_core::message::now_millis;
use nearguard_core::{Endpoint, EndpointId};
use serde::Serialize;

/// A visible endpoint and when it was first seen in this browse run.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredPeer {
    pub endpoint: Endpoint,
    /// Unix timestamp in milliseconds.
    pub first_seen: u64,
}

#[derive(Debug, Default)]
pub struct PeerDirectory {
    peers: Vec<DiscoveredPeer>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sighting. Returns true if the peer was not already listed.
    pub fn found(&mut self, endpoint: Endpoint) -> bool {
        if self.contains(&endpoint.id) {
            return false;
        }
        self.peers.push(DiscoveredPeer {
            endpoint,
            first_seen: now_millis(),
        });
        true
    }

    /// Forget a peer. Returns true if it was listed.
    pub fn lost(&mut self, endpoint: &Endpoint) -> bool {
        let before = self.peers.len();
        self.peers.retain(|p| p.endpoint != *endpoint);
        self.peers.len() != before
    }

    pub fn get(&self, id: &EndpointId) -> Option<&DiscoveredPeer> {
        self.peers.iter().find(|p| p.endpoint.id == *id)
    }

    pub fn contains(&self, id: &EndpointId) -> bool {
        self.get(id).is_some()
    }

    pub fn peers(&self) -> &[DiscoveredPeer] {
        &self.peers
    }

    pub fn clear(&mut self) {
        self.peers.clear();
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
