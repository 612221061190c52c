//! Ties the packet/payload headers and the AEAD primitive together into the
//! `encrypt`/`decrypt` operations spec.md §4.1 describes.

use crate::crypto::{self, SecureSession, SessionRole, MIC_LEN};
use crate::error::{Error, Result};
use crate::transport::plain_hdr::PlainHdr;
use crate::transport::proto_hdr::ProtoHdr;
use crate::types::NodeId;
use crate::utils::{ParseBuf, WriteBuf};

/// Encrypt `plaintext` for transmission.
///
/// `payload_header` is encoded and prepended to `plaintext` before AEAD is
/// applied, so it is authenticated and confidential rather than clear
/// (spec.md §4.1: "produced after the packet header on the wire but
/// logically inside the ciphertext"). `packet_header` bytes are the
/// associated data. Returns the ciphertext with the 16-byte MIC appended.
///
/// `source_node_id` is the node id of whoever is sending this datagram —
/// the caller's own identity, not the recipient's — since the nonce must
/// be keyed by the sender (see [`crypto::derive_nonce`]).
pub fn encrypt(
    session: &SecureSession,
    role: SessionRole,
    source_node_id: NodeId,
    payload_header: &ProtoHdr,
    packet_header: &PlainHdr,
    plaintext: &[u8],
    counter: u32,
) -> Result<Vec<u8>> {
    let mut hdr_buf = [0u8; crate::transport::proto_hdr::max_proto_hdr_len()];
    let hdr_buf_len = hdr_buf.len();
    let mut hdr_w = WriteBuf::new(&mut hdr_buf, hdr_buf_len);
    let hdr_len = payload_header.encode(&mut hdr_w)?;
    let hdr_bytes = hdr_w.as_slice();

    let mut body = Vec::with_capacity(hdr_len + plaintext.len() + MIC_LEN);
    body.extend_from_slice(hdr_bytes);
    body.extend_from_slice(plaintext);

    let mut aad_buf = [0u8; crate::transport::plain_hdr::max_plain_hdr_len()];
    let aad_buf_len = aad_buf.len();
    let mut aad_w = WriteBuf::new(&mut aad_buf, aad_buf_len);
    packet_header.encode(&mut aad_w)?;
    let aad = aad_w.as_slice();

    let nonce = crypto::derive_nonce(role, counter, source_node_id.0);
    let mic = crypto::encrypt_in_place(&session.encrypt_key, &nonce, aad, &mut body)?;
    body.extend_from_slice(&mic);
    Ok(body)
}

/// Decrypt a datagram body (everything after the packet header) back into
/// its payload header and plaintext.
///
/// `source_node_id` is the node id of whoever sent this datagram — the
/// remote peer, as recorded on the local session (`peer_node_id` from the
/// receiver's point of view legitimately *is* the sender).
pub fn decrypt(
    session: &SecureSession,
    role: SessionRole,
    source_node_id: NodeId,
    packet_header: &PlainHdr,
    ciphertext_with_mic: &[u8],
) -> Result<(ProtoHdr, Vec<u8>)> {
    if ciphertext_with_mic.len() < MIC_LEN {
        return Err(Error::TruncatedPacket);
    }
    let (ciphertext, mic_bytes) =
        ciphertext_with_mic.split_at(ciphertext_with_mic.len() - MIC_LEN);
    let mut mic = [0u8; MIC_LEN];
    mic.copy_from_slice(mic_bytes);

    let mut aad_buf = [0u8; crate::transport::plain_hdr::max_plain_hdr_len()];
    let aad_buf_len = aad_buf.len();
    let mut aad_w = WriteBuf::new(&mut aad_buf, aad_buf_len);
    packet_header.encode(&mut aad_w)?;
    let aad = aad_w.as_slice();

    let nonce = crypto::derive_nonce(role, packet_header.message_counter, source_node_id.0);
    let mut body = ciphertext.to_vec();
    crypto::decrypt_in_place(&session.decrypt_key, &nonce, aad, &mut body, &mic)?;

    let mut p = ParseBuf::new(&body, body.len());
    let payload_header = ProtoHdr::decode_and_consume(&mut p)?;
    let plaintext = p.take_rest().to_vec();
    Ok((payload_header, plaintext))
}
