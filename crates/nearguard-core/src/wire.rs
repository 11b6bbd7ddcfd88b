//! Nearguard LAN wire format.
//!
//! Every datagram is one JSON-encoded [`Frame`]. Announcements go to the
//! link-local multicast group; everything else is unicast to the address an
//! announcement came from. Frames larger than [`MAX_FRAME_BYTES`] are never
//! sent and are dropped on receipt.

use serde::{Deserialize, Serialize};

use crate::endpoint::Endpoint;

/// Link-local all-nodes multicast group.
pub const MULTICAST_ADDR: &str = "ff02::1";

/// How often presence is re-announced.
pub const ANNOUNCE_INTERVAL_SECS: u64 = 2;

/// A peer not heard from for this long is reported lost.
pub const PEER_TTL_SECS: u64 = 10;

/// Upper bound on an encoded frame.
pub const MAX_FRAME_BYTES: usize = 16 * 1024;

/// Wire format version. Announcements with another version are ignored.
pub const WIRE_VERSION: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Periodic presence. `port` is the sender's unicast session port.
    Announce {
        version: u8,
        service: String,
        endpoint: Endpoint,
        port: u16,
    },
    /// Ask the receiver to open a session.
    Invite { from: Endpoint, service: String },
    /// Decision on a previous `Invite`.
    InviteReply { from: Endpoint, accepted: bool },
    /// Application payload on an established session.
    Data {
        from: Endpoint,
        #[serde(with = "hex_payload")]
        payload: Vec<u8>,
    },
    /// Session teardown.
    Bye { from: Endpoint },
}

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("frame is {0} bytes, over the frame size limit")]
    TooLarge(usize),
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl Frame {
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let bytes = serde_json::to_vec(self)?;
        if bytes.len() > MAX_FRAME_BYTES {
            return Err(WireError::TooLarge(bytes.len()));
        }
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() > MAX_FRAME_BYTES {
            return Err(WireError::TooLarge(bytes.len()));
        }
        Ok(serde_json::from_slice(bytes)?)
    }

    /// The endpoint that produced this frame.
    pub fn sender(&self) -> &Endpoint {
        match self {
            Frame::Announce { endpoint, .. } => endpoint,
            Frame::Invite { from, .. }
            | Frame::InviteReply { from, .. }
            | Frame::Data { from, .. }
            | Frame::Bye { from } => from,
        }
    }
}

mod hex_payload {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}
