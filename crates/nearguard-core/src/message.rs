//! Chat messages as they appear on the coordinator's message stream.

use serde::{Deserialize, Serialize};

use crate::endpoint::Endpoint;

/// One entry on the message stream, inbound or locally sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `hex(blake3(sender_id || timestamp_le || seq_le || text))`.
    pub id: String,
    /// Position on the stream. Strictly increasing in receipt order.
    pub seq: u64,
    pub sender: Endpoint,
    pub text: String,
    /// Unix timestamp in milliseconds.
    pub timestamp: u64,
}

impl ChatMessage {
    pub fn new(seq: u64, sender: Endpoint, text: String) -> Self {
        let timestamp = now_millis();
        let id = Self::generate_id(&sender, timestamp, seq, &text);
        Self {
            id,
            seq,
            sender,
            text,
            timestamp,
        }
    }

    /// Mine vs theirs is decided by identity, never by content.
    pub fn is_from(&self, endpoint: &Endpoint) -> bool {
        self.sender == *endpoint
    }

    fn generate_id(sender: &Endpoint, timestamp: u64, seq: u64, text: &str) -> String {
        let mut h = blake3::Hasher::new();
        h.update(&sender.id.0);
        h.update(&timestamp.to_le_bytes());
        h.update(&seq.to_le_bytes());
        h.update(text.as_bytes());
        hex::encode(h.finalize().as_bytes())
    }
}

/// Milliseconds since the Unix epoch. Clamps to 0 on a clock before 1970.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
