//! The one-byte RMAP reply status code, as defined by ECSS-E-ST-50-52C
//! table 8. This is not a transport-level error: a non-zero status is
//! delivered to the caller through the completion packet, never as an
//! `Err` (see the status open question in the crate's design notes).

use num_derive::{FromPrimitive, ToPrimitive};

/// Closed set of RMAP reply status codes known to the protocol. Any other
/// byte value is still valid on the wire (future extensions, vendor
/// codes); callers that only care about success should compare the raw
/// byte against zero rather than match on this enum exhaustively.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum RmapReplyStatus {
    Success = 0,
    GeneralError = 1,
    UnusedRmapPacketType = 2,
    InvalidKey = 3,
    InvalidDataCrc = 4,
    EarlyEop = 5,
    TooMuchData = 6,
    EepSymbol = 7,
    VerifyBufferOverrun = 9,
    CommandNotImplemented = 10,
    RmwDataLengthError = 11,
    InvalidTargetLogicalAddress = 12,
}
