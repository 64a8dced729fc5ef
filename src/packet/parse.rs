//! The RMAP packet parser: classifies a byte slice into one of the four
//! packet variants, validates the header and data CRCs, and exposes a
//! zero-copy decoded view borrowed from the input.

use byteorder::{BigEndian, ReadBytesExt};

use crate::crc;
use crate::error::{Error, Result};

const BIT_COMMAND: u8 = 0b0100_0000;
const BIT_WRITE: u8 = 0b0010_0000;
const BIT_VERIFY: u8 = 0b0001_0000;
const BIT_REPLY: u8 = 0b0000_1000;
const BIT_INCREMENT: u8 = 0b0000_0100;

/// A decoded Read-Command.
#[derive(Debug, Clone, Copy)]
pub struct ReadCommand<'a> {
    pub target_path: &'a [u8],
    pub target_logical_address: u8,
    pub key: u8,
    pub reply_path: &'a [u8],
    pub initiator_logical_address: u8,
    pub transaction_id: u16,
    pub extended_address: u8,
    pub memory_address: u32,
    pub data_length: u32,
    pub increment: bool,
}

/// A decoded Write-Command.
#[derive(Debug, Clone, Copy)]
pub struct WriteCommand<'a> {
    pub target_path: &'a [u8],
    pub target_logical_address: u8,
    pub key: u8,
    pub reply_path: &'a [u8],
    pub initiator_logical_address: u8,
    pub transaction_id: u16,
    pub extended_address: u8,
    pub memory_address: u32,
    pub data: &'a [u8],
    pub increment: bool,
    pub reply: bool,
    pub verify: bool,
}

/// A decoded Read-Reply.
#[derive(Debug, Clone, Copy)]
pub struct ReadReply<'a> {
    pub reply_path: &'a [u8],
    pub initiator_logical_address: u8,
    pub status: u8,
    pub target_logical_address: u8,
    pub transaction_id: u16,
    pub data: &'a [u8],
    pub increment: bool,
}

/// A decoded Write-Reply.
#[derive(Debug, Clone, Copy)]
pub struct WriteReply<'a> {
    pub reply_path: &'a [u8],
    pub initiator_logical_address: u8,
    pub status: u8,
    pub target_logical_address: u8,
    pub transaction_id: u16,
    pub increment: bool,
    pub verify: bool,
}

/// An owned copy of the reply-bearing fields of a [`ParsedPacket`].
///
/// The receive loop hands a `ParsedPacket` to the transaction table only
/// long enough to build one of these; the borrowed view cannot outlive the
/// receive buffer it's sliced from, but the owned copy can cross into a
/// worker-pool task and out through a caller's future.
#[derive(Debug, Clone)]
pub struct OwnedReply {
    pub transaction_id: u16,
    /// The raw RMAP status byte. Non-zero is not a transport error — it is
    /// handed to the caller to interpret (see the crate's design notes on
    /// write-reply status handling).
    pub status: u8,
    /// The read payload; empty for a write reply.
    pub data: Vec<u8>,
}

/// The decoded view produced by [`parse`]. Borrows from the input slice,
/// so it is valid for as long as that slice is — there is no hidden
/// mutable parser state to invalidate it on a subsequent call.
#[derive(Debug, Clone, Copy)]
pub enum ParsedPacket<'a> {
    ReadCommand(ReadCommand<'a>),
    WriteCommand(WriteCommand<'a>),
    ReadReply(ReadReply<'a>),
    WriteReply(WriteReply<'a>),
}

impl<'a> ParsedPacket<'a> {
    /// The transaction identifier, present on every variant.
    pub fn transaction_id(&self) -> u16 {
        match self {
            ParsedPacket::ReadCommand(p) => p.transaction_id,
            ParsedPacket::WriteCommand(p) => p.transaction_id,
            ParsedPacket::ReadReply(p) => p.transaction_id,
            ParsedPacket::WriteReply(p) => p.transaction_id,
        }
    }

    /// `true` for Read-Reply / Write-Reply packets.
    pub fn is_reply(&self) -> bool {
        matches!(self, ParsedPacket::ReadReply(_) | ParsedPacket::WriteReply(_))
    }

    /// The RMAP status byte, for reply packets only.
    pub fn status(&self) -> Option<u8> {
        match self {
            ParsedPacket::ReadReply(p) => Some(p.status),
            ParsedPacket::WriteReply(p) => Some(p.status),
            _ => None,
        }
    }

    /// The data payload, empty for variants that carry none.
    pub fn data(&self) -> &'a [u8] {
        match self {
            ParsedPacket::WriteCommand(p) => p.data,
            ParsedPacket::ReadReply(p) => p.data,
            _ => &[],
        }
    }

    /// Copies the reply-bearing fields out into an owned value, or `None` if
    /// this packet is a command rather than a reply.
    pub fn to_owned_reply(&self) -> Option<OwnedReply> {
        match self {
            ParsedPacket::ReadReply(p) => Some(OwnedReply {
                transaction_id: p.transaction_id,
                status: p.status,
                data: p.data.to_vec(),
            }),
            ParsedPacket::WriteReply(p) => Some(OwnedReply {
                transaction_id: p.transaction_id,
                status: p.status,
                data: Vec::new(),
            }),
            _ => None,
        }
    }
}

/// Strips a leading run of zero bytes, as the wire format zero-pads the
/// reply address field at the front up to a 4-byte boundary.
fn strip_leading_zero_padding(padded: &[u8]) -> &[u8] {
    let first_nonzero = padded.iter().position(|&b| b != 0).unwrap_or(padded.len());
    &padded[first_nonzero..]
}

/// Parses `bytes` into one of the four RMAP packet variants.
pub fn parse(bytes: &[u8]) -> Result<ParsedPacket<'_>> {
    let mut path_len = 0;
    while path_len < bytes.len() && bytes[path_len] < 0x20 {
        path_len += 1;
    }
    if path_len == bytes.len() {
        return Err(Error::IncompletePacket);
    }
    let path = &bytes[..path_len];
    let header = &bytes[path_len..];

    if header.len() < 4 {
        return Err(Error::IncompletePacket);
    }
    let instruction = header[2];
    let is_command = instruction & BIT_COMMAND != 0;
    let is_write = instruction & BIT_WRITE != 0;
    let increment = instruction & BIT_INCREMENT != 0;

    match (is_command, is_write) {
        (true, false) => parse_read_command(path, header, instruction, increment),
        (true, true) => parse_write_command(path, header, instruction, increment),
        (false, false) => parse_read_reply(path, header, increment),
        (false, true) => parse_write_reply(path, header, increment),
    }
}

fn check_header_crc(header: &[u8], len: usize) -> Result<()> {
    if crc::crc(&header[..len], 0) != 0 {
        return Err(Error::HeaderCRCError);
    }
    Ok(())
}

fn check_data_crc(header: &[u8], data_start: usize, data_len: usize) -> Result<()> {
    if crc::crc(&header[data_start..data_start + data_len + 1], 0) != 0 {
        return Err(Error::DataCRCError);
    }
    Ok(())
}

fn parse_read_command<'a>(
    path: &'a [u8],
    header: &'a [u8],
    instruction: u8,
    increment: bool,
) -> Result<ParsedPacket<'a>> {
    let reply_address_size = (instruction & 0b11) as usize * 4;
    let required = 16 + reply_address_size;
    if header.len() != required {
        return Err(Error::IncompletePacket);
    }
    check_header_crc(header, required)?;
    if header[1] != 0x01 {
        return Err(Error::UnknownProtocolIdentifier);
    }

    let target_logical_address = header[0];
    let key = header[3];
    let reply_path = strip_leading_zero_padding(&header[4..4 + reply_address_size]);

    let mut cursor = &header[4 + reply_address_size..];
    let initiator_logical_address = cursor.read_u8().unwrap();
    let transaction_id = cursor.read_u16::<BigEndian>().unwrap();
    let extended_address = cursor.read_u8().unwrap();
    let memory_address = cursor.read_u32::<BigEndian>().unwrap();
    let data_length = cursor.read_uint::<BigEndian>(3).unwrap() as u32;

    Ok(ParsedPacket::ReadCommand(ReadCommand {
        target_path: path,
        target_logical_address,
        key,
        reply_path,
        initiator_logical_address,
        transaction_id,
        extended_address,
        memory_address,
        data_length,
        increment,
    }))
}

fn parse_write_command<'a>(
    path: &'a [u8],
    header: &'a [u8],
    instruction: u8,
    increment: bool,
) -> Result<ParsedPacket<'a>> {
    let reply_address_size = (instruction & 0b11) as usize * 4;
    let fixed_header_len = 16 + reply_address_size;
    if header.len() <= fixed_header_len {
        return Err(Error::IncompletePacket);
    }
    check_header_crc(header, fixed_header_len)?;
    if header[1] != 0x01 {
        return Err(Error::UnknownProtocolIdentifier);
    }

    let target_logical_address = header[0];
    let key = header[3];
    let reply_path = strip_leading_zero_padding(&header[4..4 + reply_address_size]);

    let mut cursor = &header[4 + reply_address_size..fixed_header_len];
    let initiator_logical_address = cursor.read_u8().unwrap();
    let transaction_id = cursor.read_u16::<BigEndian>().unwrap();
    let extended_address = cursor.read_u8().unwrap();
    let memory_address = cursor.read_u32::<BigEndian>().unwrap();
    let data_length = cursor.read_uint::<BigEndian>(3).unwrap() as usize;

    if header.len() != fixed_header_len + data_length + 1 {
        return Err(Error::IncompletePacket);
    }
    check_data_crc(header, fixed_header_len, data_length)?;

    let data = &header[fixed_header_len..fixed_header_len + data_length];

    Ok(ParsedPacket::WriteCommand(WriteCommand {
        target_path: path,
        target_logical_address,
        key,
        reply_path,
        initiator_logical_address,
        transaction_id,
        extended_address,
        memory_address,
        data,
        increment,
        reply: instruction & BIT_REPLY != 0,
        verify: instruction & BIT_VERIFY != 0,
    }))
}

fn parse_read_reply<'a>(
    path: &'a [u8],
    header: &'a [u8],
    increment: bool,
) -> Result<ParsedPacket<'a>> {
    if header.len() < 12 {
        return Err(Error::IncompletePacket);
    }
    check_header_crc(header, 12)?;
    if header[1] != 0x01 {
        return Err(Error::UnknownProtocolIdentifier);
    }

    let initiator_logical_address = header[0];
    let status = header[3];
    let target_logical_address = header[4];
    let transaction_id = u16::from_be_bytes([header[5], header[6]]);
    // header[7] is reserved.
    let data_length = u32::from_be_bytes([0, header[8], header[9], header[10]]) as usize;

    if header.len() != 12 + data_length + 1 {
        return Err(Error::IncompletePacket);
    }
    check_data_crc(header, 12, data_length)?;

    let data = &header[12..12 + data_length];

    Ok(ParsedPacket::ReadReply(ReadReply {
        reply_path: path,
        initiator_logical_address,
        status,
        target_logical_address,
        transaction_id,
        data,
        increment,
    }))
}

fn parse_write_reply<'a>(
    path: &'a [u8],
    header: &'a [u8],
    increment: bool,
) -> Result<ParsedPacket<'a>> {
    if header.len() != 8 {
        return Err(Error::IncompletePacket);
    }
    check_header_crc(header, 8)?;
    if header[1] != 0x01 {
        return Err(Error::UnknownProtocolIdentifier);
    }

    let initiator_logical_address = header[0];
    let instruction = header[2];
    let status = header[3];
    let target_logical_address = header[4];
    let transaction_id = u16::from_be_bytes([header[5], header[6]]);

    Ok(ParsedPacket::WriteReply(WriteReply {
        reply_path: path,
        initiator_logical_address,
        status,
        target_logical_address,
        transaction_id,
        increment,
        verify: instruction & BIT_VERIFY != 0,
    }))
}
