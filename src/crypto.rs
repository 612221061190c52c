//! Authenticated encryption for the secure channel.
//!
//! AES-128-CCM with a 16-byte MIC, as the wire format requires. This module
//! only handles the symmetric AEAD step; key derivation and the PASE/CASE
//! handshake that produces `SecureSession` key material are out of scope
//! (owned by the pairing engine, consumed here only as opaque bytes).

use crate::error::{Error, Result};
use aes::Aes128;
use ccm::aead::generic_array::GenericArray;
use ccm::aead::AeadInPlace;
use ccm::{
    consts::{U13, U16},
    Ccm, KeyInit,
};

/// AES-128 key size in bytes.
pub const KEY_LEN: usize = 16;
/// Nonce size in bytes.
pub const NONCE_LEN: usize = 13;
/// MIC (authentication tag) size in bytes, fixed by the wire format.
pub const MIC_LEN: usize = 16;

type MatterCcm = Ccm<Aes128, U16, U13>;

/// Opaque symmetric key material produced by the pairing engine for one
/// session. Holds separate encrypt/decrypt keys because Matter derives
/// distinct initiator->responder and responder->initiator keys.
#[derive(Clone, Debug)]
pub struct SecureSession {
    pub encrypt_key: [u8; KEY_LEN],
    pub decrypt_key: [u8; KEY_LEN],
    /// Attestation challenge, carried alongside the session keys but not
    /// consumed by this module (used by higher protocol layers).
    pub attestation_challenge: [u8; KEY_LEN],
}

impl SecureSession {
    pub fn new(
        encrypt_key: [u8; KEY_LEN],
        decrypt_key: [u8; KEY_LEN],
        attestation_challenge: [u8; KEY_LEN],
    ) -> Self {
        Self {
            encrypt_key,
            decrypt_key,
            attestation_challenge,
        }
    }
}

/// Which direction a nonce is being derived for — the nonce differs by role
/// so that the two peers' counters never collide in the same keystream.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SessionRole {
    Initiator,
    Responder,
}

/// Derive the 13-byte CCM nonce from session role, message counter, and the
/// source node id, per spec.md §4.1.
pub fn derive_nonce(role: SessionRole, counter: u32, source_node_id: u64) -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    nonce[0] = match role {
        SessionRole::Initiator => 0,
        SessionRole::Responder => 1,
    };
    nonce[1..5].copy_from_slice(&counter.to_le_bytes());
    nonce[5..13].copy_from_slice(&source_node_id.to_le_bytes());
    nonce
}

/// Encrypt `buf` in place and return the detached 16-byte MIC to append to
/// the wire frame. `aad` is the packet header bytes (clear-text, per
/// spec.md §4.1).
pub fn encrypt_in_place(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    aad: &[u8],
    buf: &mut [u8],
) -> Result<[u8; MIC_LEN]> {
    let cipher = MatterCcm::new(GenericArray::from_slice(key));
    let tag = cipher
        .encrypt_in_place_detached(GenericArray::from_slice(nonce), aad, buf)
        .map_err(|_| Error::DecryptFailed)?;
    let mut out = [0u8; MIC_LEN];
    out.copy_from_slice(tag.as_slice());
    Ok(out)
}

/// Decrypt `buf` (ciphertext only, MIC passed separately) in place,
/// verifying against `mic`. On failure `buf` is left in an unspecified
/// state and must not be trusted.
pub fn decrypt_in_place(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    aad: &[u8],
    buf: &mut [u8],
    mic: &[u8; MIC_LEN],
) -> Result<()> {
    let cipher = MatterCcm::new(GenericArray::from_slice(key));
    cipher
        .decrypt_in_place_detached(
            GenericArray::from_slice(nonce),
            aad,
            buf,
            GenericArray::from_slice(mic),
        )
        .map_err(|_| Error::DecryptFailed)
}
