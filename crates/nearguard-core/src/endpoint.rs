//! Endpoint identity.
//!
//! An endpoint is a remote (or the local) node as the transport sees it: a
//! stable 16-byte id plus the display name it announced. Two endpoints are
//! the same node iff their ids match; the name is presentation only.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Opaque endpoint identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId(pub [u8; 16]);

impl EndpointId {
    pub fn random() -> Self {
        Self(rand::random())
    }

    /// First 8 hex characters, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EndpointId({})", self.short())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EndpointIdError {
    #[error("invalid hex")]
    InvalidHex,
    #[error("endpoint id must be 16 bytes, got {0}")]
    WrongLength(usize),
}

impl FromStr for EndpointId {
    type Err = EndpointIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim()).map_err(|_| EndpointIdError::InvalidHex)?;
        let arr: [u8; 16] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| EndpointIdError::WrongLength(bytes.len()))?;
        Ok(Self(arr))
    }
}

impl Serialize for EndpointId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for EndpointId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A node on the local network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: EndpointId,
    pub name: String,
}

impl Endpoint {
    pub fn new(id: EndpointId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    /// Fresh endpoint with a random id.
    pub fn generate(name: impl Into<String>) -> Self {
        Self::new(EndpointId::random(), name)
    }

    /// Load the endpoint id kept at `path`, or create and persist one.
    ///
    /// The display name always comes from the caller so a rename in config
    /// takes effect without changing identity.
    pub fn load_or_create(path: &Path, name: &str) -> Result<Self, IdentityError> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let id = text
                    .parse()
                    .map_err(|e| IdentityError::Corrupt(path.to_path_buf(), e))?;
                Ok(Self::new(id, name))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let endpoint = Self::generate(name);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| IdentityError::WriteFailed(path.to_path_buf(), e))?;
                }
                std::fs::write(path, endpoint.id.to_string())
                    .map_err(|e| IdentityError::WriteFailed(path.to_path_buf(), e))?;
                Ok(endpoint)
            }
            Err(e) => Err(IdentityError::ReadFailed(path.to_path_buf(), e)),
        }
    }
}

impl PartialEq for Endpoint {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Endpoint {}

impl Hash for Endpoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id.short())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("corrupt endpoint id in {0}: {1}")]
    Corrupt(PathBuf, EndpointIdError),
}
