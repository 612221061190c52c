//! Packet header: the portion of every datagram that is always cleartext.
//!
//! Named `plain_hdr` after the teacher's own `transport::plain_hdr` module
//! (referenced throughout `matter/src/transport/{session,mgr}.rs` as
//! `plain_hdr::PlainHdr`) — "plain" as in not-yet-decrypted, to distinguish
//! it from [`proto_hdr`](super::proto_hdr), which is cleartext only for
//! unencrypted messages.

use crate::error::Result;
use crate::types::{NodeId, SessionId};
use crate::utils::{ParseBuf, WriteBuf};

/// Bit layout for the security-flags byte: which encryption scheme (if any)
/// applies, and whether this is a secure-channel control message.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct SecurityFlags {
    pub encrypted: bool,
    pub control_message: bool,
}

impl SecurityFlags {
    const ENCRYPTED_BIT: u8 = 0b0000_0001;
    const CONTROL_BIT: u8 = 0b0000_0010;

    fn to_byte(self) -> u8 {
        let mut b = 0u8;
        if self.encrypted {
            b |= Self::ENCRYPTED_BIT;
        }
        if self.control_message {
            b |= Self::CONTROL_BIT;
        }
        b
    }

    fn from_byte(b: u8) -> Self {
        SecurityFlags {
            encrypted: b & Self::ENCRYPTED_BIT != 0,
            control_message: b & Self::CONTROL_BIT != 0,
        }
    }
}

/// Packet header fields, per spec.md §4.1.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PlainHdr {
    pub version: u8,
    pub security_flags: SecurityFlags,
    pub session_id: SessionId,
    pub message_counter: u32,
    pub source_node_id: Option<NodeId>,
    pub destination_node_id: Option<NodeId>,
}

impl Default for PlainHdr {
    fn default() -> Self {
        PlainHdr {
            version: 0,
            security_flags: SecurityFlags::default(),
            session_id: 0,
            message_counter: 0,
            source_node_id: None,
            destination_node_id: None,
        }
    }
}

/// Largest possible encoded size: message-flags byte, session id,
/// security-flags byte, counter, both optional node ids.
pub const fn max_plain_hdr_len() -> usize {
    1 + 2 + 1 + 4 + 8 + 8
}

impl PlainHdr {
    pub fn is_encrypted(&self) -> bool {
        self.security_flags.encrypted
    }

    pub fn is_control_message(&self) -> bool {
        self.security_flags.control_message
    }

    /// Encode this header into `buf`, returning the number of bytes
    /// written. Matches the teacher's `encode(&mut WriteBuf)` shape.
    pub fn encode(&self, buf: &mut WriteBuf) -> Result<usize> {
        let before = buf.get_tail();
        let message_flags = (self.version & 0x0f)
            | ((self.source_node_id.is_some() as u8) << 4)
            | ((self.destination_node_id.is_some() as u8) << 5);
        buf.le_u8(message_flags)?;
        buf.le_u16(self.session_id)?;
        buf.le_u8(self.security_flags.to_byte())?;
        buf.le_u32(self.message_counter)?;
        if let Some(src) = self.source_node_id {
            buf.le_u64(src.0)?;
        }
        if let Some(dst) = self.destination_node_id {
            buf.le_u64(dst.0)?;
        }
        Ok(buf.get_tail() - before)
    }

    /// Decode a header from the front of `buf`, consuming exactly the bytes
    /// that belong to it.
    pub fn decode_and_consume(buf: &mut ParseBuf) -> Result<PlainHdr> {
        let message_flags = buf.le_u8()?;
        let version = message_flags & 0x0f;
        let source_present = message_flags & (1 << 4) != 0;
        let destination_present = message_flags & (1 << 5) != 0;
        let session_id = buf.le_u16()?;
        let security_flags = SecurityFlags::from_byte(buf.le_u8()?);
        let message_counter = buf.le_u32()?;
        let source_node_id = if source_present {
            Some(NodeId(buf.le_u64()?))
        } else {
            None
        };
        let destination_node_id = if destination_present {
            Some(NodeId(buf.le_u64()?))
        } else {
            None
        };
        Ok(PlainHdr {
            version,
            security_flags,
            session_id,
            message_counter,
            source_node_id,
            destination_node_id,
        })
    }
}
