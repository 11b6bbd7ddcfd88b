//! nearguard-services: the peer lifecycle state machine, the shared policy
//! store, and the learning loop between them.

pub mod coordinator;
pub mod directory;
pub mod discovery;
pub mod error;
pub mod learning;
pub mod message_store;
pub mod permission;
pub mod policy_store;
pub mod session;
pub mod task;
pub mod transport;

pub use coordinator::{
    CoordinatorEvent, CoordinatorSettings, SelectOutcome, SessionCoordinator, StatusSnapshot,
};
pub use directory::{DiscoveredPeer, PeerDirectory};
pub use discovery::{Discovery, DiscoveryError};
pub use error::{CoordinatorError, DeclineReason, SendFailure, TransportError};
pub use learning::{LearnOutcome, LearningPipeline};
pub use message_store::MessageStore;
pub use permission::{PendingView, PermissionRequest};
pub use policy_store::{FileKvStore, KvStore, MemoryKvStore, PolicyStore, StoreError};
pub use session::{PeerState, Session, SessionTable, SessionView};
pub use task::{Command, CoordinatorHandle, CoordinatorTask};
pub use transport::memory::{MemoryHub, MemoryTransport};
pub use transport::{ConnectionState, InvitationReply, Transport, TransportEvent};
