//! nearguard-core: shared types, wire format, configuration, and the
//! filter decision engine. All other Nearguard crates depend on this one.

pub mod config;
pub mod endpoint;
pub mod filter;
pub mod message;
pub mod wire;

pub use endpoint::{Endpoint, EndpointId};
pub use filter::{decide, normalize_domain, DomainError, PolicySnapshot, Verdict};
pub use message::ChatMessage;
