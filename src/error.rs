use core::fmt;

/// All fallible operations in this crate return this error type.
///
/// Modeled as a single flat enum rather than a per-layer error hierarchy,
/// matching the rest of this codebase's convention of one `Error` for the
/// whole crate.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Error {
    /// A public API was called while the manager was not in the state it
    /// requires (e.g. anything but `init` before `Initialized`).
    IncorrectState,
    /// A caller-supplied argument was invalid (null transport, mismatched
    /// transport kind, chained buffer, etc).
    InvalidArgument,
    /// The authenticated session table is full and no slot could be
    /// reclaimed.
    NoMemory,
    /// `send`/`prepare_message` was asked to operate on a handle that does
    /// not resolve to a live session.
    NotConnected,
    /// An inbound encrypted datagram named a `session_id` with no matching
    /// authenticated session.
    KeyNotFoundFromPeer,
    /// `send_prepared` was given a buffer that cannot be sent as a single
    /// contiguous chunk.
    InvalidMessageLength,
    /// The peer counter rejected a counter it had already committed.
    DuplicateMessageReceived,
    /// The peer counter rejected a counter below the replay window floor.
    MessageCounterOutOfWindow,
    /// AEAD tag verification failed while decrypting an inbound message.
    DecryptFailed,
    /// The wire buffer did not contain a complete, well-formed header.
    InvalidData,
    /// A write would have overrun the destination buffer.
    NoSpace,
    /// A read would have run past the end of the source buffer.
    TruncatedPacket,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::IncorrectState => "operation invalid in current state",
            Error::InvalidArgument => "invalid argument",
            Error::NoMemory => "session table full",
            Error::NotConnected => "no session for handle",
            Error::KeyNotFoundFromPeer => "unknown session id on inbound datagram",
            Error::InvalidMessageLength => "message length invalid for transport",
            Error::DuplicateMessageReceived => "duplicate message counter",
            Error::MessageCounterOutOfWindow => "message counter outside replay window",
            Error::DecryptFailed => "AEAD authentication failed",
            Error::InvalidData => "malformed wire data",
            Error::NoSpace => "buffer exhausted",
            Error::TruncatedPacket => "packet shorter than header requires",
        };
        write!(f, "{}", msg)
    }
}

impl std::error::Error for Error {}

pub type Result<T> = core::result::Result<T, Error>;
