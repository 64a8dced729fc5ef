//! RMAP packet wire codec: the four command/reply variants defined by
//! ECSS-E-ST-50-52C, each carrying a split header/data CRC-8 trailer
//! (see [`crate::crc`]).
//!
//! Encoding is driven by [`PacketConfig`]; decoding by [`parse`], which
//! returns a [`ParsedPacket`] borrowing views into the caller's buffer.

pub mod config;
pub mod parse;
pub mod status;

pub use config::{
    PacketConfig, ReadCommandConfig, ReadReplyConfig, WriteCommandConfig, WriteReplyConfig,
};
pub use parse::{
    parse, OwnedReply, ParsedPacket, ReadCommand, ReadReply, WriteCommand, WriteReply,
};
pub use status::RmapReplyStatus;
