//! Session tables: fixed-capacity collections of authenticated peer
//! connections (keyed by local session id) and unauthenticated sessions
//! (keyed by peer address), per spec.md §4.3.
//!
//! Generalizes the teacher's `SessionMgr` (`matter/src/transport/session.rs`,
//! `sessions: [Option<Session>; 16]`) into two differently-sized
//! instantiations of the same fixed-array-plus-linear-scan shape, one per
//! table. `SessionHandle` no longer borrows the table the way the teacher's
//! `SessionHandle<'a>` does — see its doc comment below.

use crate::config;
use crate::crypto::{SecureSession, SessionRole};
use crate::error::{Error, Result};
use crate::transport::counters::{LocalCounter, PeerCounter};
use crate::types::{FabricIndex, NodeId, PeerAddress, SessionId};

/// An authenticated, keyed session produced by a completed pairing.
#[derive(Debug)]
pub struct PeerConnectionState {
    pub peer_node_id: NodeId,
    pub peer_address: PeerAddress,
    pub fabric_index: FabricIndex,
    pub local_session_id: SessionId,
    pub peer_session_id: SessionId,
    pub secure_session: SecureSession,
    /// Which side of the pairing we are — fixes the AEAD nonce direction
    /// for every send/receive on this session (spec.md §4.1: nonce derived
    /// from "session role, counter, peer node id").
    pub role: SessionRole,
    pub send_counter: LocalCounter,
    pub peer_counter: PeerCounter,
    pub last_activity_time_ms: u64,
    /// Structural hook for a per-session control-message counter. Never
    /// consulted while `config::SESSION_REKEYING_ENABLED` is `false`
    /// (spec.md §9, control-message counter open question).
    pub control_counter: Option<LocalCounter>,
}

impl PeerConnectionState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        peer_node_id: NodeId,
        peer_address: PeerAddress,
        fabric_index: FabricIndex,
        local_session_id: SessionId,
        peer_session_id: SessionId,
        secure_session: SecureSession,
        role: SessionRole,
        peer_counter: PeerCounter,
        now_ms: u64,
    ) -> Self {
        PeerConnectionState {
            peer_node_id,
            peer_address,
            fabric_index,
            local_session_id,
            peer_session_id,
            secure_session,
            role,
            send_counter: LocalCounter::new(),
            peer_counter,
            last_activity_time_ms: now_ms,
            control_counter: None,
        }
    }
}

/// A pre-authentication session, allocated lazily on first traffic from a
/// peer address. Carries no key material.
///
/// No `send_counter` of its own: spec.md §3 gives unauthenticated traffic a
/// single global unencrypted send counter shared across every peer address
/// (one per authenticated session is the exception, not the rule) — that
/// counter lives on [`super::mgr::SessionManager`], not here.
#[derive(Debug)]
pub struct UnauthenticatedSession {
    pub peer_address: PeerAddress,
    pub peer_counter: PeerCounter,
    pub last_activity_time_ms: u64,
}

impl UnauthenticatedSession {
    fn new(peer_address: PeerAddress, now_ms: u64) -> Self {
        UnauthenticatedSession {
            peer_address,
            peer_counter: PeerCounter::new(),
            last_activity_time_ms: now_ms,
        }
    }
}

/// The fields needed to re-resolve an authenticated session through the
/// table, per spec.md §3.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AuthenticatedHandle {
    pub peer_node_id: NodeId,
    pub local_session_id: SessionId,
    pub peer_session_id: SessionId,
    pub fabric_index: FabricIndex,
}

/// A small, `Copy` value passed across the delegate boundary in place of a
/// live reference.
///
/// The teacher's `SessionHandle<'a>` (`matter/src/transport/session.rs`) is
/// a `&'a mut SessionMgr` plus an index — a live borrow that makes the
/// handle inseparable from the table's borrow checker scope, and whose
/// `Deref`/`DerefMut` panic if the slot has since been freed. Per REDESIGN
/// FLAGS (spec.md §9, "Pointer-returning table lookups"), this version
/// carries no reference at all: every use must go back through
/// [`PeerConnections::resolve`] / [`UnauthenticatedSessions::resolve`],
/// which return `None` rather than a dangling or wrong-generation slot if
/// the session has been replaced or expired (spec.md §8 invariant 5,
/// "handle liveness").
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SessionHandle {
    Authenticated(AuthenticatedHandle),
    Unauthenticated { peer_address: PeerAddress },
}

/// Fixed-capacity table of authenticated sessions, keyed by
/// `local_session_id`. `N` is bound to [`config::MAX_AUTHENTICATED_SESSIONS`]
/// via the [`PeerConnections`] alias.
#[derive(Debug)]
pub struct PeerConnectionTable<const N: usize> {
    slots: [Option<PeerConnectionState>; N],
}

impl<const N: usize> Default for PeerConnectionTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> PeerConnectionTable<N> {
    pub fn new() -> Self {
        PeerConnectionTable {
            slots: [(); N].map(|_| None),
        }
    }

    pub fn capacity(&self) -> usize {
        N
    }

    pub fn get(&self, index: usize) -> Option<&PeerConnectionState> {
        self.slots.get(index)?.as_ref()
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut PeerConnectionState> {
        self.slots.get_mut(index)?.as_mut()
    }

    fn empty_slot(&self) -> Option<usize> {
        self.slots.iter().position(|s| s.is_none())
    }

    fn lru_slot(&self) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|s| (i, s.last_activity_time_ms)))
            .min_by_key(|&(_, t)| t)
            .map(|(i, _)| i)
    }

    /// First slot at or after `cursor` satisfying `pred`. Underpins
    /// `find_by_node_id`/`find_by_fabric`/`find_by_local_key`: tie-breaks
    /// resume from the next slot, in table order, per spec.md §4.3.
    pub fn find_index_where(&self, cursor: usize, pred: impl Fn(&PeerConnectionState) -> bool) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .skip(cursor)
            .find(|(_, s)| s.as_ref().is_some_and(&pred))
            .map(|(i, _)| i)
    }

    pub fn find_index_by_session_id(&self, session_id: SessionId) -> Option<usize> {
        self.find_index_where(0, |s| s.local_session_id == session_id)
    }

    pub fn find_by_session_id(&mut self, session_id: SessionId) -> Option<&mut PeerConnectionState> {
        let idx = self.find_index_by_session_id(session_id)?;
        self.get_mut(idx)
    }

    pub fn find_index_by_node_id(&self, node_id: NodeId, cursor: usize) -> Option<usize> {
        self.find_index_where(cursor, |s| s.peer_node_id == node_id)
    }

    pub fn find_index_by_fabric(&self, fabric_index: FabricIndex, cursor: usize) -> Option<usize> {
        self.find_index_where(cursor, |s| s.fabric_index == fabric_index)
    }

    pub fn find_index_by_local_key(
        &self,
        node_id: Option<NodeId>,
        local_session_id: SessionId,
        cursor: usize,
    ) -> Option<usize> {
        self.find_index_where(cursor, |s| {
            s.local_session_id == local_session_id && node_id.map_or(true, |n| s.peer_node_id == n)
        })
    }

    /// Insert `state`, evicting to make room per spec.md §4.3:
    /// `state.local_session_id` already present → replace it (the per-local-id
    /// invariant); else an empty slot if one exists; else the
    /// least-recently-active slot. Returns the assigned index and whatever
    /// session was evicted, if any — the caller fires `on_connection_expired`
    /// for it.
    pub fn create(&mut self, state: PeerConnectionState) -> Result<(usize, Option<PeerConnectionState>)> {
        if let Some(idx) = self.find_index_by_session_id(state.local_session_id) {
            let evicted = self.slots[idx].take();
            self.slots[idx] = Some(state);
            return Ok((idx, evicted));
        }
        if let Some(idx) = self.empty_slot() {
            self.slots[idx] = Some(state);
            return Ok((idx, None));
        }
        let idx = self.lru_slot().ok_or(Error::NoMemory)?;
        let evicted = self.slots[idx].take();
        self.slots[idx] = Some(state);
        Ok((idx, evicted))
    }

    pub fn mark_active(&mut self, index: usize, now_ms: u64) {
        if let Some(s) = self.get_mut(index) {
            s.last_activity_time_ms = now_ms;
        }
    }

    /// Free the slot at `index` and return what was in it, if anything.
    /// Callers invoke `on_connection_expired`/`disconnect` themselves —
    /// `mark_expired` below is the synchronous convenience wrapper spec.md
    /// §4.3 names directly.
    pub fn remove(&mut self, index: usize) -> Option<PeerConnectionState> {
        self.slots.get_mut(index)?.take()
    }

    pub fn mark_expired(&mut self, index: usize, mut on_expire: impl FnMut(&PeerConnectionState)) {
        if let Some(state) = self.remove(index) {
            on_expire(&state);
        }
    }

    /// Sweep sessions idle longer than `max_idle_ms`, invoking `on_expire`
    /// synchronously for each before freeing its slot.
    pub fn expire_inactive(&mut self, now_ms: u64, max_idle_ms: u64, mut on_expire: impl FnMut(&PeerConnectionState)) {
        for slot in self.slots.iter_mut() {
            let idle = slot
                .as_ref()
                .is_some_and(|s| now_ms.saturating_sub(s.last_activity_time_ms) > max_idle_ms);
            if idle {
                if let Some(state) = slot.take() {
                    on_expire(&state);
                }
            }
        }
    }

    pub fn handle_for(&self, index: usize) -> Option<SessionHandle> {
        let s = self.get(index)?;
        Some(SessionHandle::Authenticated(AuthenticatedHandle {
            peer_node_id: s.peer_node_id,
            local_session_id: s.local_session_id,
            peer_session_id: s.peer_session_id,
            fabric_index: s.fabric_index,
        }))
    }

    /// Re-resolve a handle to a live slot index, or `None` if the slot has
    /// since been recycled for a different session.
    pub fn resolve(&self, handle: &AuthenticatedHandle) -> Option<usize> {
        let idx = self.find_index_by_session_id(handle.local_session_id)?;
        let s = self.get(idx)?;
        (s.peer_node_id == handle.peer_node_id
            && s.peer_session_id == handle.peer_session_id
            && s.fabric_index == handle.fabric_index)
            .then_some(idx)
    }
}

/// Fixed-capacity table of unauthenticated sessions, keyed by `PeerAddress`.
/// `N` is bound to [`config::MAX_UNAUTHENTICATED_SESSIONS`] via the
/// [`UnauthenticatedSessions`] alias.
#[derive(Debug)]
pub struct UnauthenticatedSessionTable<const N: usize> {
    slots: [Option<UnauthenticatedSession>; N],
}

impl<const N: usize> Default for UnauthenticatedSessionTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> UnauthenticatedSessionTable<N> {
    pub fn new() -> Self {
        UnauthenticatedSessionTable {
            slots: [(); N].map(|_| None),
        }
    }

    pub fn get(&self, index: usize) -> Option<&UnauthenticatedSession> {
        self.slots.get(index)?.as_ref()
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut UnauthenticatedSession> {
        self.slots.get_mut(index)?.as_mut()
    }

    fn find_index(&self, addr: PeerAddress) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.as_ref().map(|s| s.peer_address) == Some(addr))
    }

    fn empty_slot(&self) -> Option<usize> {
        self.slots.iter().position(|s| s.is_none())
    }

    fn lru_slot(&self) -> usize {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|s| (i, s.last_activity_time_ms)))
            .min_by_key(|&(_, t)| t)
            .map(|(i, _)| i)
            .expect("table has nonzero capacity and is full")
    }

    /// Return the existing entry for `addr`, or allocate one — evicting the
    /// least-recently-active entry silently if the table is full (spec.md
    /// §4.3: "eviction is silent").
    pub fn find_or_allocate(&mut self, addr: PeerAddress, now_ms: u64) -> usize {
        if let Some(idx) = self.find_index(addr) {
            return idx;
        }
        let idx = self.empty_slot().unwrap_or_else(|| self.lru_slot());
        self.slots[idx] = Some(UnauthenticatedSession::new(addr, now_ms));
        idx
    }

    pub fn mark_active(&mut self, index: usize, now_ms: u64) {
        if let Some(s) = self.get_mut(index) {
            s.last_activity_time_ms = now_ms;
        }
    }

    pub fn handle_for(&self, index: usize) -> Option<SessionHandle> {
        let s = self.get(index)?;
        Some(SessionHandle::Unauthenticated {
            peer_address: s.peer_address,
        })
    }

    pub fn resolve(&self, peer_address: &PeerAddress) -> Option<usize> {
        self.find_index(*peer_address)
    }
}

pub type PeerConnections = PeerConnectionTable<{ config::MAX_AUTHENTICATED_SESSIONS }>;
pub type UnauthenticatedSessions = UnauthenticatedSessionTable<{ config::MAX_UNAUTHENTICATED_SESSIONS }>;
