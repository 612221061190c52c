//! Upward callbacks the embedder implements and registers with the session
//! manager (spec.md §4.5). Object-safe, matching the teacher's
//! `Box<dyn InteractionConsumer>` pattern in `matter/src/data_model/core.rs`.
//!
//! All callbacks run synchronously on the dispatch thread (spec.md §4.5):
//! implementations must not perform long-running work inline.

use crate::error::Error;
use crate::transport::plain_hdr::PlainHdr;
use crate::transport::proto_hdr::ProtoHdr;
use crate::transport::session::SessionHandle;
use crate::types::PeerAddress;

pub trait SessionManagerDelegate {
    fn on_message_received(
        &mut self,
        packet_header: &PlainHdr,
        payload_header: &ProtoHdr,
        session_handle: SessionHandle,
        peer_addr: PeerAddress,
        is_duplicate: bool,
        msg: &[u8],
    );

    fn on_new_connection(&mut self, session_handle: SessionHandle);

    fn on_connection_expired(&mut self, session_handle: SessionHandle);

    fn on_receive_error(&mut self, error: Error, peer_addr: PeerAddress);
}
