//! Payload (protocol) header: exchange id, protocol id, message type, and
//! the reliability flags.
//!
//! Named `proto_hdr` after the teacher's own `transport::proto_hdr` module
//! (`matter/src/transport/session.rs` imports `proto_hdr::{max_proto_hdr_len,
//! encrypt_in_place}`). Produced after the packet header on the wire, but
//! logically inside the ciphertext for encrypted messages (spec.md §4.1).

use crate::error::Result;
use crate::utils::{ParseBuf, WriteBuf};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct PayloadFlags {
    pub is_initiator: bool,
    pub needs_ack: bool,
    pub ack_present: bool,
}

impl PayloadFlags {
    const INITIATOR_BIT: u8 = 0b0000_0001;
    const NEEDS_ACK_BIT: u8 = 0b0000_0010;
    const ACK_PRESENT_BIT: u8 = 0b0000_0100;

    fn to_byte(self) -> u8 {
        let mut b = 0u8;
        if self.is_initiator {
            b |= Self::INITIATOR_BIT;
        }
        if self.needs_ack {
            b |= Self::NEEDS_ACK_BIT;
        }
        if self.ack_present {
            b |= Self::ACK_PRESENT_BIT;
        }
        b
    }

    fn from_byte(b: u8) -> Self {
        PayloadFlags {
            is_initiator: b & Self::INITIATOR_BIT != 0,
            needs_ack: b & Self::NEEDS_ACK_BIT != 0,
            ack_present: b & Self::ACK_PRESENT_BIT != 0,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ProtoHdr {
    pub exchange_id: u16,
    pub protocol_vendor_id: u16,
    pub protocol_id: u16,
    pub message_type: u8,
    pub flags: PayloadFlags,
    pub ack_counter: Option<u32>,
}

impl Default for ProtoHdr {
    fn default() -> Self {
        ProtoHdr {
            exchange_id: 0,
            protocol_vendor_id: 0,
            protocol_id: 0,
            message_type: 0,
            flags: PayloadFlags::default(),
            ack_counter: None,
        }
    }
}

pub const fn max_proto_hdr_len() -> usize {
    1 + 2 + 2 + 2 + 1 + 4
}

/// The Secure Channel protocol's well-known protocol id. Messages on it are
/// secure-channel control traffic (handshakes, status reports, MRP acks),
/// not application data — the session manager reflects this into the
/// packet header's control-message bit (spec.md §4.4, prepare-message
/// algorithm).
pub const SECURE_CHANNEL_PROTOCOL_ID: u16 = 0x0000;

impl ProtoHdr {
    pub fn is_control_message(&self) -> bool {
        self.protocol_id == SECURE_CHANNEL_PROTOCOL_ID
    }
}

impl ProtoHdr {
    pub fn encode(&self, buf: &mut WriteBuf) -> Result<usize> {
        let before = buf.get_tail();
        let mut flags = self.flags;
        flags.ack_present = self.ack_counter.is_some();
        buf.le_u8(flags.to_byte())?;
        buf.le_u16(self.exchange_id)?;
        buf.le_u16(self.protocol_vendor_id)?;
        buf.le_u16(self.protocol_id)?;
        buf.le_u8(self.message_type)?;
        if let Some(ack) = self.ack_counter {
            buf.le_u32(ack)?;
        }
        Ok(buf.get_tail() - before)
    }

    pub fn decode_and_consume(buf: &mut ParseBuf) -> Result<ProtoHdr> {
        let flags = PayloadFlags::from_byte(buf.le_u8()?);
        let exchange_id = buf.le_u16()?;
        let protocol_vendor_id = buf.le_u16()?;
        let protocol_id = buf.le_u16()?;
        let message_type = buf.le_u8()?;
        let ack_counter = if flags.ack_present {
            Some(buf.le_u32()?)
        } else {
            None
        };
        Ok(ProtoHdr {
            exchange_id,
            protocol_vendor_id,
            protocol_id,
            message_type,
            flags,
            ack_counter,
        })
    }
}
