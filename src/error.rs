//! The crate's single public error surface.
//!
//! Every public operation returns `Result<_, Error>` (or a narrower alias
//! below); there are no panics on external failure paths. Parse errors
//! encountered inside the receive loop are logged and swallowed rather
//! than propagated — see [`crate::client::ClientNode::run_loop`].

use std::sync::Arc;

use thiserror::Error;

/// The taxonomy of failures this crate can surface.
///
/// Clonable so that a single delivered reply's `Result` can be handed both
/// to the caller-supplied `on_complete` and to the future that resolves
/// from the same delivery (see [`crate::client::ClientNode::write_async`]).
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// An operation that requires a connection was attempted before
    /// `connect` succeeded, or after `shutdown`.
    #[error("not connected")]
    NotConnected,

    /// `connect` was called while already connected.
    #[error("already connected")]
    AlreadyConnected,

    /// The connection was torn down while transactions were outstanding;
    /// they are completed with this error rather than left to hang.
    #[error("connection aborted")]
    ConnectionAborted,

    /// A `connect`/`send`/`recv` deadline elapsed.
    #[error("operation timed out")]
    Timeout,

    /// The caller-supplied buffer is smaller than `size(config)`.
    #[error("destination buffer too small: need {needed}, have {available}")]
    BufferTooSmall {
        /// Bytes `encode` would need to write.
        needed: usize,
        /// Bytes actually available in the caller's buffer.
        available: usize,
    },

    /// An SSDTP2 frame had an invalid flag, a non-zero pad byte, or a
    /// malformed time-code envelope.
    #[error("bad SSDTP2 framing: {0}")]
    BadMessage(&'static str),

    /// `Fixed` buffer policy and the incoming frame does not fit.
    #[error("no buffer space for incoming frame")]
    NoBufferSpace,

    /// Fewer bytes were available than the packet variant requires.
    #[error("incomplete RMAP packet")]
    IncompletePacket,

    /// The header CRC trailer did not validate.
    #[error("RMAP header CRC error")]
    HeaderCRCError,

    /// The data CRC trailer did not validate.
    #[error("RMAP data CRC error")]
    DataCRCError,

    /// The protocol identifier byte was not `0x01`.
    #[error("unknown RMAP protocol identifier")]
    UnknownProtocolIdentifier,

    /// The packet could not be classified into one of the four variants.
    #[error("invalid RMAP packet")]
    InvalidPacket,

    /// The transaction table has no free identifiers in `[id_min, id_max)`.
    #[error("transaction table exhausted, try again")]
    TryAgain,

    /// A caller-supplied argument (e.g. a negative timeout) is invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The requested address/length window exceeds the remote memory
    /// (surfaced by the loopback responder).
    #[error("address range out of bounds")]
    OutOfRange,

    /// An underlying OS-level I/O failure. Wrapped in `Arc` (rather than
    /// `std::io::Error` directly) purely so the whole enum can be `Clone`.
    #[error("{0}")]
    Io(Arc<std::io::Error>),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(Arc::new(e))
    }
}

/// Convenience alias used throughout the crate's public API.
pub type Result<T> = std::result::Result<T, Error>;
