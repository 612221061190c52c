//! Secure session manager for a Matter-style smart-home networking stack.
//!
//! Owns the wire framing, message-counter replay protection, and the
//! fixed-capacity session tables that sit between a raw datagram transport
//! and the interaction-model/exchange layers above it. Pairing (PASE/CASE),
//! the exchange manager, MRP, and the data/interaction models are out of
//! scope — this crate consumes them only through the traits in
//! [`transport::collaborators`].

pub mod config;
pub mod crypto;
pub mod error;
pub mod transport;
pub mod types;
pub mod utils;

pub use error::{Error, Result};
pub use transport::{SessionHandle, SessionManager, SessionManagerDelegate};
pub use types::{FabricIndex, MessageCounter, NodeId, PeerAddress, SessionId};
