//! The secure session manager: state machine, public API, and the
//! prepare/send/dispatch algorithms of spec.md §4.4.
//!
//! Dispatch shape (decode header → look up session → verify → decrypt →
//! commit → deliver) follows the teacher's `Mgr::recv`/`Mgr::handle_rxtx`
//! (`matter/src/transport/mgr.rs`), generalized to the plaintext/secure
//! split and counter-sync deferral this spec adds; the Matter-specific
//! exchange manager, MRP, and proto-demux layers the teacher's `Mgr` also
//! carries are out of scope here (they belong to the interaction-model
//! layer, not the secure session layer) and are not reimplemented.

use log::{info, warn};

use crate::config;
use crate::crypto::SessionRole;
use crate::error::{Error, Result};
use crate::transport::codec;
use crate::transport::collaborators::{CounterSyncService, FabricTable, PairingSession, SystemLayer, Transport};
use crate::transport::counters::{LocalCounter, Verify};
use crate::transport::delegate::SessionManagerDelegate;
use crate::transport::plain_hdr::{PlainHdr, SecurityFlags};
use crate::transport::proto_hdr::ProtoHdr;
use crate::transport::session::{
    AuthenticatedHandle, PeerConnectionState, PeerConnections, SessionHandle, UnauthenticatedSessions,
};
use crate::types::{FabricIndex, NodeId, PeerAddress, FABRIC_INDEX_NONE};
use crate::utils::{ParseBuf, WriteBuf};

/// `NotReady` ⇄ `Initialized`, per spec.md §4.4. Transitions are total and
/// synchronous; every public operation but `init`/`shutdown` requires
/// `Initialized`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum State {
    NotReady,
    Initialized,
}

/// The secure session manager.
///
/// Single-threaded cooperative (spec.md §5): no internal locking, no
/// reentrancy, every method runs to completion. The embedder's event loop
/// is responsible for calling [`Self::on_datagram`] when the transport has
/// a datagram, and [`Self::run_expiry_sweep`] when the timer it requested
/// via [`SystemLayer::start_timer`] fires.
pub struct SessionManager {
    state: State,
    sessions: PeerConnections,
    unauth_sessions: UnauthenticatedSessions,
    /// The single global unencrypted send counter shared by all
    /// unauthenticated traffic (spec.md §3) — distinct from each
    /// authenticated session's own `send_counter`.
    global_send_counter: LocalCounter,
    local_node_id: NodeId,
    transport: Option<Box<dyn Transport>>,
    system_layer: Option<Box<dyn SystemLayer>>,
    fabrics: Option<Box<dyn FabricTable>>,
    counter_sync: Option<Box<dyn CounterSyncService>>,
    delegate: Option<Box<dyn SessionManagerDelegate>>,
}

impl SessionManager {
    pub fn new(local_node_id: NodeId) -> Self {
        SessionManager {
            state: State::NotReady,
            sessions: PeerConnections::new(),
            unauth_sessions: UnauthenticatedSessions::new(),
            global_send_counter: LocalCounter::new(),
            local_node_id,
            transport: None,
            system_layer: None,
            fabrics: None,
            counter_sync: None,
            delegate: None,
        }
    }

    pub fn set_delegate(&mut self, delegate: Box<dyn SessionManagerDelegate>) {
        self.delegate = Some(delegate);
    }

    fn require_initialized(&self) -> Result<()> {
        if self.state != State::Initialized {
            return Err(Error::IncorrectState);
        }
        Ok(())
    }

    fn now_ms(&self) -> u64 {
        self.system_layer.as_ref().map_or(0, |s| s.monotonic_time_ms())
    }

    /// Registers collaborators, transitions to `Initialized`, and schedules
    /// the first expiry tick. Initial timer scheduling failure is treated
    /// as a `VerifyOrDie` fatal condition (spec.md §7): it indicates a
    /// misconfigured embedder, not a network condition.
    pub fn init(
        &mut self,
        system_layer: Box<dyn SystemLayer>,
        transport: Box<dyn Transport>,
        fabrics: Box<dyn FabricTable>,
        counter_sync: Box<dyn CounterSyncService>,
    ) -> Result<()> {
        if self.state == State::Initialized {
            return Err(Error::IncorrectState);
        }
        self.system_layer = Some(system_layer);
        self.transport = Some(transport);
        self.fabrics = Some(fabrics);
        self.counter_sync = Some(counter_sync);
        self.state = State::Initialized;

        self.system_layer
            .as_mut()
            .expect("just assigned above")
            .start_timer(config::PEER_CONNECTION_TIMEOUT_CHECK_FREQUENCY_MS)
            .expect("initial expiry timer scheduling must not fail");

        info!("session manager initialized for node {:?}", self.local_node_id);
        Ok(())
    }

    pub fn shutdown(&mut self) {
        if let Some(mut system_layer) = self.system_layer.take() {
            system_layer.cancel_timer();
        }
        self.transport = None;
        self.fabrics = None;
        self.counter_sync = None;
        self.state = State::NotReady;
    }

    /// Builds the fully framed wire form of `plaintext` for `session`:
    /// encrypted for an authenticated session, clear for an unauthenticated
    /// one. Spec.md §4.4, "Prepare-message algorithm".
    pub fn prepare_message(
        &mut self,
        session: SessionHandle,
        payload_header: &ProtoHdr,
        plaintext: &[u8],
    ) -> Result<Vec<u8>> {
        self.require_initialized()?;
        let is_control = payload_header.is_control_message();

        match session {
            SessionHandle::Authenticated(handle) => {
                let idx = self.sessions.resolve(&handle).ok_or(Error::NotConnected)?;
                let state = self.sessions.get_mut(idx).ok_or(Error::NotConnected)?;
                let counter = state.send_counter.advance()?;

                let packet_header = PlainHdr {
                    version: 0,
                    security_flags: SecurityFlags {
                        encrypted: true,
                        control_message: is_control,
                    },
                    session_id: state.peer_session_id,
                    message_counter: counter,
                    source_node_id: None,
                    destination_node_id: None,
                };

                let framed = codec::encrypt(
                    &state.secure_session,
                    state.role,
                    self.local_node_id,
                    payload_header,
                    &packet_header,
                    plaintext,
                    counter,
                )?;

                let mut hdr_buf = [0u8; crate::transport::plain_hdr::max_plain_hdr_len()];
                let hdr_buf_len = hdr_buf.len();
                let mut hw = WriteBuf::new(&mut hdr_buf, hdr_buf_len);
                packet_header.encode(&mut hw)?;

                let mut out = Vec::with_capacity(hw.as_borrow_slice().len() + framed.len());
                out.extend_from_slice(hw.as_slice());
                out.extend_from_slice(&framed);
                Ok(out)
            }
            SessionHandle::Unauthenticated { peer_address } => {
                self.unauth_sessions.resolve(&peer_address).ok_or(Error::NotConnected)?;
                let counter = self.global_send_counter.advance()?;

                let packet_header = PlainHdr {
                    version: 0,
                    security_flags: SecurityFlags {
                        encrypted: false,
                        control_message: is_control,
                    },
                    session_id: 0,
                    message_counter: counter,
                    source_node_id: None,
                    destination_node_id: None,
                };

                let mut hdr_buf = [0u8; crate::transport::plain_hdr::max_plain_hdr_len()];
                let hdr_buf_len = hdr_buf.len();
                let mut hw = WriteBuf::new(&mut hdr_buf, hdr_buf_len);
                packet_header.encode(&mut hw)?;

                let mut proto_buf = [0u8; crate::transport::proto_hdr::max_proto_hdr_len()];
                let proto_buf_len = proto_buf.len();
                let mut pw = WriteBuf::new(&mut proto_buf, proto_buf_len);
                payload_header.encode(&mut pw)?;

                let mut out = Vec::with_capacity(
                    hw.as_borrow_slice().len() + pw.as_borrow_slice().len() + plaintext.len(),
                );
                out.extend_from_slice(hw.as_slice());
                out.extend_from_slice(pw.as_slice());
                out.extend_from_slice(plaintext);
                Ok(out)
            }
        }
    }

    /// Resolves `session` to a destination, marks it active, and hands the
    /// buffer to the transport. Spec.md §4.4, "Send-prepared algorithm".
    /// `buf` is a plain slice and so can never be a chained/scatter buffer
    /// by construction (see DESIGN.md for the simplification this allows
    /// over the source's explicit chained-buffer rejection).
    pub fn send_prepared(&mut self, session: SessionHandle, buf: &[u8]) -> Result<()> {
        self.require_initialized()?;
        let now = self.now_ms();
        let (addr, peer_node_id) = match session {
            SessionHandle::Authenticated(handle) => {
                let idx = self.sessions.resolve(&handle).ok_or(Error::NotConnected)?;
                self.sessions.mark_active(idx, now);
                let s = self.sessions.get(idx).ok_or(Error::NotConnected)?;
                (s.peer_address, Some(s.peer_node_id))
            }
            SessionHandle::Unauthenticated { peer_address } => {
                let idx = self.unauth_sessions.resolve(&peer_address).ok_or(Error::NotConnected)?;
                self.unauth_sessions.mark_active(idx, now);
                (peer_address, None)
            }
        };
        let transport = self.transport.as_ref().ok_or(Error::IncorrectState)?;
        info!(
            "send: {} bytes to {:?} (peer node {:?}) at {}ms",
            buf.len(),
            addr,
            peer_node_id,
            now
        );
        transport.send(addr, buf)
    }

    /// Installs a new authenticated session, replacing any existing one at
    /// the same local session id (spec.md §3 invariant). Spec.md §4.4,
    /// `new_pairing`.
    pub fn new_pairing(
        &mut self,
        peer_addr: Option<PeerAddress>,
        peer_node_id: NodeId,
        pairing: &dyn PairingSession,
        role: SessionRole,
        fabric: FabricIndex,
    ) -> Result<SessionHandle> {
        self.require_initialized()?;

        let addr = peer_addr.unwrap_or(PeerAddress::Undefined);
        if !config::ALLOW_UDP_TCP_PEER_ADDR_ON_PAIRING
            && matches!(addr, PeerAddress::Udp(_) | PeerAddress::Tcp(_))
        {
            return Err(Error::InvalidArgument);
        }
        if fabric != FABRIC_INDEX_NONE {
            let known = self.fabrics.as_ref().is_some_and(|f| f.contains(fabric));
            if !known {
                return Err(Error::InvalidArgument);
            }
        }

        let secure_session = pairing.derive_secure_session(role)?;
        let state = PeerConnectionState::new(
            peer_node_id,
            addr,
            fabric,
            pairing.local_session_id(),
            pairing.peer_session_id(),
            secure_session,
            role,
            pairing.peer_counter(),
            self.now_ms(),
        );

        let (idx, evicted) = self.sessions.create(state)?;
        if let Some(evicted) = evicted {
            self.notify_expired(&evicted);
        }

        let handle = self.sessions.handle_for(idx).expect("slot just populated");
        if let Some(delegate) = self.delegate.as_mut() {
            delegate.on_new_connection(handle);
        }
        info!("new pairing with node {:?} on fabric {}", peer_node_id, fabric);
        Ok(handle)
    }

    /// Silent no-op if `session` does not resolve to a live authenticated
    /// session.
    pub fn expire_pairing(&mut self, session: SessionHandle) {
        if let SessionHandle::Authenticated(handle) = session {
            if let Some(idx) = self.sessions.resolve(&handle) {
                if let Some(state) = self.sessions.remove(idx) {
                    self.notify_expired(&state);
                }
            }
        }
    }

    pub fn expire_all_pairings(&mut self, node_id: NodeId, fabric: FabricIndex) {
        while let Some(idx) = self
            .sessions
            .find_index_where(0, |s| s.peer_node_id == node_id && s.fabric_index == fabric)
        {
            if let Some(state) = self.sessions.remove(idx) {
                self.notify_expired(&state);
            }
        }
    }

    /// Bulk revocation. Restarts the scan from slot `0` after each removal
    /// (spec.md §4.3 tie-break rule) rather than trying to resume a cursor
    /// across a mutating removal.
    pub fn expire_all_pairings_for_fabric(&mut self, fabric: FabricIndex) {
        while let Some(idx) = self.sessions.find_index_by_fabric(fabric, 0) {
            if let Some(state) = self.sessions.remove(idx) {
                self.notify_expired(&state);
            }
        }
    }

    fn notify_expired(&mut self, state: &PeerConnectionState) {
        let handle = SessionHandle::Authenticated(AuthenticatedHandle {
            peer_node_id: state.peer_node_id,
            local_session_id: state.local_session_id,
            peer_session_id: state.peer_session_id,
            fabric_index: state.fabric_index,
        });
        if let Some(delegate) = self.delegate.as_mut() {
            delegate.on_connection_expired(handle);
        }
        if let Some(transport) = self.transport.as_ref() {
            transport.disconnect(state.peer_address);
        }
    }

    /// The expiry-timer callback body (spec.md §4.4, "Expiry timer"):
    /// sweeps idle authenticated sessions and reschedules itself.
    /// Unauthenticated sessions are never swept; control messages and
    /// rekeying are excluded per spec.md §9.
    pub fn run_expiry_sweep(&mut self) {
        let now = self.now_ms();
        let mut expired = Vec::new();
        self.sessions
            .expire_inactive(now, config::PEER_CONNECTION_TIMEOUT_MS, |s| {
                expired.push((
                    SessionHandle::Authenticated(AuthenticatedHandle {
                        peer_node_id: s.peer_node_id,
                        local_session_id: s.local_session_id,
                        peer_session_id: s.peer_session_id,
                        fabric_index: s.fabric_index,
                    }),
                    s.peer_address,
                ));
            });
        for (handle, peer_address) in expired {
            if let Some(delegate) = self.delegate.as_mut() {
                delegate.on_connection_expired(handle);
            }
            if let Some(transport) = self.transport.as_ref() {
                transport.disconnect(peer_address);
            }
        }
        if let Some(system_layer) = self.system_layer.as_mut() {
            if let Err(e) = system_layer.start_timer(config::PEER_CONNECTION_TIMEOUT_CHECK_FREQUENCY_MS) {
                warn!("failed to reschedule expiry timer: {}", e);
            }
        }
    }

    /// Forces `session`'s peer counter to `counter`, marking it
    /// synchronized. The counter-sync service calls this once its
    /// handshake completes, then the embedder re-delivers the original
    /// datagram through [`Self::on_datagram`] (spec.md §8, scenario 6).
    pub fn force_counter_sync(&mut self, session: SessionHandle, counter: u32) {
        if let SessionHandle::Authenticated(handle) = session {
            if let Some(idx) = self.sessions.resolve(&handle) {
                if let Some(s) = self.sessions.get_mut(idx) {
                    s.peer_counter.set_counter(counter);
                }
            }
        }
    }

    fn report_receive_error(&mut self, error: Error, peer_addr: PeerAddress) {
        if let Some(delegate) = self.delegate.as_mut() {
            delegate.on_receive_error(error, peer_addr);
        }
    }

    /// Entry point the transport multiplexer calls on every inbound
    /// datagram. Spec.md §4.4, "Inbound-dispatch algorithm".
    pub fn on_datagram(&mut self, peer_addr: PeerAddress, bytes: &[u8]) {
        if self.state != State::Initialized {
            return;
        }
        let mut parse_buf = ParseBuf::new(bytes, bytes.len());
        let packet_header = match PlainHdr::decode_and_consume(&mut parse_buf) {
            Ok(h) => h,
            Err(e) => {
                warn!("dropping malformed datagram from {:?}: {}", peer_addr, e);
                self.report_receive_error(e, peer_addr);
                return;
            }
        };
        let rest = parse_buf.take_rest();

        if packet_header.is_encrypted() {
            self.secure_dispatch(peer_addr, &packet_header, rest);
        } else {
            self.plaintext_dispatch(peer_addr, &packet_header, rest);
        }
    }

    fn plaintext_dispatch(&mut self, peer_addr: PeerAddress, packet_header: &PlainHdr, rest: &[u8]) {
        let now = self.now_ms();
        let idx = self.unauth_sessions.find_or_allocate(peer_addr, now);

        let mut parse_buf = ParseBuf::new(rest, rest.len());
        let payload_header = match ProtoHdr::decode_and_consume(&mut parse_buf) {
            Ok(h) => h,
            Err(e) => {
                self.report_receive_error(e, peer_addr);
                return;
            }
        };
        let plaintext = parse_buf.take_rest();

        let verify = match self.unauth_sessions.get(idx) {
            Some(s) => s.peer_counter.verify_or_trust_first(packet_header.message_counter),
            None => return,
        };
        let verify = match verify {
            Ok(v) => v,
            Err(e) => {
                self.report_receive_error(e, peer_addr);
                return;
            }
        };

        self.unauth_sessions.mark_active(idx, now);
        if let Some(s) = self.unauth_sessions.get_mut(idx) {
            match verify {
                Verify::AcceptAndAdoptBaseline => s.peer_counter.set_counter(packet_header.message_counter),
                Verify::Accept => s.peer_counter.commit(packet_header.message_counter),
            }
        }

        let handle = match self.unauth_sessions.handle_for(idx) {
            Some(h) => h,
            None => return,
        };
        if let Some(delegate) = self.delegate.as_mut() {
            delegate.on_message_received(packet_header, &payload_header, handle, peer_addr, false, plaintext);
        }
    }

    fn secure_dispatch(&mut self, peer_addr: PeerAddress, packet_header: &PlainHdr, rest: &[u8]) {
        let idx = match self.sessions.find_index_by_session_id(packet_header.session_id) {
            Some(idx) => idx,
            None => {
                warn!("unknown session id {} from {:?}", packet_header.session_id, peer_addr);
                self.report_receive_error(Error::KeyNotFoundFromPeer, peer_addr);
                return;
            }
        };

        let synchronized = self
            .sessions
            .get(idx)
            .is_some_and(|s| s.peer_counter.is_synchronized());
        if !synchronized && !packet_header.is_control_message() {
            let queued = self.counter_sync.as_mut().map(|svc| {
                svc.queue_received_message_and_start_sync(packet_header.session_id, peer_addr, rest.to_vec())
            });
            match queued {
                Some(Ok(())) => {}
                Some(Err(e)) => warn!("counter-sync queuing failed, dropping datagram: {}", e),
                None => warn!("no counter-sync service configured, dropping datagram from {:?}", peer_addr),
            }
            return;
        }

        let verify = match self.sessions.get(idx) {
            Some(s) => s.peer_counter.verify(packet_header.message_counter),
            None => return,
        };
        let is_duplicate = match verify {
            Ok(Verify::Accept) => false,
            Ok(Verify::AcceptAndAdoptBaseline) => {
                unreachable!("a synchronized peer counter never requests baseline adoption")
            }
            Err(Error::DuplicateMessageReceived) => true,
            Err(e) => {
                warn!("dropping datagram from {:?}: {}", peer_addr, e);
                self.report_receive_error(e, peer_addr);
                return;
            }
        };

        let now = self.now_ms();
        self.sessions.mark_active(idx, now);

        let (secure_session, role, peer_node_id) = match self.sessions.get(idx) {
            Some(s) => (s.secure_session.clone(), s.role, s.peer_node_id),
            None => return,
        };
        let decoded = codec::decrypt(&secure_session, role, peer_node_id, packet_header, rest);
        let (payload_header, plaintext) = match decoded {
            Ok(v) => v,
            Err(e) => {
                warn!("decrypt failed from {:?}: {}", peer_addr, e);
                self.report_receive_error(e, peer_addr);
                return;
            }
        };

        if is_duplicate && !payload_header.flags.needs_ack {
            return;
        }

        if let Some(s) = self.sessions.get_mut(idx) {
            s.peer_counter.commit(packet_header.message_counter);
        }

        if let Some(s) = self.sessions.get_mut(idx) {
            if s.peer_address != peer_addr {
                info!(
                    "session {} roamed from {:?} to {:?}",
                    packet_header.session_id, s.peer_address, peer_addr
                );
                s.peer_address = peer_addr;
            }
        }

        let handle = match self.sessions.handle_for(idx) {
            Some(h) => h,
            None => return,
        };
        if let Some(delegate) = self.delegate.as_mut() {
            delegate.on_message_received(
                packet_header,
                &payload_header,
                handle,
                peer_addr,
                is_duplicate,
                &plaintext,
            );
        }
    }
}
