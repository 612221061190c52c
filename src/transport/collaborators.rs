//! Plain trait boundaries to the components spec.md §1 lists as out of
//! scope: the transport multiplexer, the system/timer layer, the
//! message-counter synchronization service, the pairing engine, and the
//! fabric table. All five are consumed as `&dyn Trait`/`Box<dyn Trait>`
//! with no `async fn`, matching this crate's single-threaded cooperative
//! model (spec.md §5) and the teacher's own trait-object collaborator
//! pattern (`Box<dyn proto_demux::HandleProto>` in
//! `matter/src/transport/mgr.rs`).

use crate::crypto::{SecureSession, SessionRole};
use crate::error::Result;
use crate::transport::counters::PeerCounter;
use crate::types::{FabricIndex, PeerAddress, SessionId};

/// Sends and tears down raw datagrams. Owned out of scope (UDP/TCP/BLE);
/// the session manager never inspects the underlying transport kind except
/// through `PeerAddress`.
pub trait Transport {
    fn send(&self, addr: PeerAddress, bytes: &[u8]) -> Result<()>;
    fn disconnect(&self, addr: PeerAddress);
}

/// The embedder's event loop, exposed just far enough for the expiry sweep
/// to schedule itself.
///
/// Spec.md §6 describes `start_timer(interval_ms, callback, context)`; this
/// redesign drops the callback/context pair (see DESIGN.md) — the embedder
/// is expected to call [`crate::transport::mgr::SessionManager::run_expiry_sweep`]
/// directly when the timer it requested fires, consistent with the
/// dispatch-tick model spec.md §9 calls for ("threading is the embedder's
/// responsibility").
pub trait SystemLayer {
    fn start_timer(&mut self, interval_ms: u64) -> Result<()>;
    fn cancel_timer(&mut self);
    fn monotonic_time_ms(&self) -> u64;
}

/// Queues ciphertexts that arrived before a session's peer counter was
/// synchronized, and drives the sync handshake. The session manager hands
/// off and returns (spec.md §1): it never inspects what happens after.
pub trait CounterSyncService {
    fn queue_received_message_and_start_sync(
        &mut self,
        local_session_id: SessionId,
        peer_addr: PeerAddress,
        bytes: Vec<u8>,
    ) -> Result<()>;
}

/// Output of a completed PASE/CASE exchange, consumed only through this
/// adapter (spec.md §1: "the session manager consumes these only via a
/// `PairingSession` adapter").
pub trait PairingSession {
    fn peer_session_id(&self) -> SessionId;
    fn local_session_id(&self) -> SessionId;
    fn peer_counter(&self) -> PeerCounter;
    fn derive_secure_session(&self, role: SessionRole) -> Result<SecureSession>;
}

/// Read-only membership check against the provisioned fabric directory.
pub trait FabricTable {
    fn contains(&self, fabric_index: FabricIndex) -> bool;
}
