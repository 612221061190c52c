//! The secure session layer: wire codecs, counter primitives, session
//! tables, collaborator boundaries, and the session manager itself.

pub mod codec;
pub mod collaborators;
pub mod counters;
pub mod delegate;
pub mod mgr;
pub mod plain_hdr;
pub mod proto_hdr;
pub mod session;

pub use collaborators::{CounterSyncService, FabricTable, PairingSession, SystemLayer, Transport};
pub use delegate::SessionManagerDelegate;
pub use mgr::SessionManager;
pub use plain_hdr::PlainHdr;
pub use proto_hdr::ProtoHdr;
pub use session::{AuthenticatedHandle, PeerConnectionState, SessionHandle, UnauthenticatedSession};
