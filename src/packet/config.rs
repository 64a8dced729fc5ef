//! Encoders for the four RMAP packet variants: Read-Command,
//! Write-Command, Read-Reply and Write-Reply.

use byteorder::{BigEndian, WriteBytesExt};

use crate::error::{Error, Result};
use crate::target::Target;

const RMAP_PROTOCOL_IDENTIFIER: u8 = 0x01;

const BIT_COMMAND: u8 = 0b0100_0000;
const BIT_WRITE: u8 = 0b0010_0000;
const BIT_VERIFY: u8 = 0b0001_0000;
const BIT_REPLY: u8 = 0b0000_1000;
const BIT_INCREMENT: u8 = 0b0000_0100;

/// Rounds a reply-path length up to a multiple of 4 bytes, capped by the
/// protocol at 12 (three 4-byte words encoded in the instruction byte's
/// low 2 bits).
fn padded_reply_address_len(raw_len: usize) -> usize {
    if raw_len == 0 {
        0
    } else {
        raw_len.div_ceil(4) * 4
    }
}

/// Writes `reply_path`, zero-padded at the front to a multiple of 4 bytes.
fn write_padded_reply_address(out: &mut Vec<u8>, reply_path: &[u8]) {
    let padded = padded_reply_address_len(reply_path.len());
    out.resize(out.len() + (padded - reply_path.len()), 0x00);
    out.extend_from_slice(reply_path);
}

/// Configuration for a Read-Command packet.
pub struct ReadCommandConfig<'a> {
    pub target: &'a dyn Target,
    pub transaction_id: u16,
    pub extended_address: u8,
    pub memory_address: u32,
    pub data_length: u32,
    pub key: u8,
    pub increment: bool,
}

/// Configuration for a Write-Command packet.
pub struct WriteCommandConfig<'a> {
    pub target: &'a dyn Target,
    pub transaction_id: u16,
    pub extended_address: u8,
    pub memory_address: u32,
    pub data: &'a [u8],
    pub key: u8,
    pub increment: bool,
    pub reply: bool,
    pub verify: bool,
}

/// Configuration for a Read-Reply packet.
pub struct ReadReplyConfig<'a> {
    pub reply_path: &'a [u8],
    pub initiator_logical_address: u8,
    pub target_logical_address: u8,
    pub transaction_id: u16,
    pub status: u8,
    pub data: &'a [u8],
    pub increment: bool,
}

/// Configuration for a Write-Reply packet.
pub struct WriteReplyConfig<'a> {
    pub reply_path: &'a [u8],
    pub initiator_logical_address: u8,
    pub target_logical_address: u8,
    pub transaction_id: u16,
    pub status: u8,
    pub increment: bool,
    pub verify: bool,
}

/// One of the four packet variants this client can build.
pub enum PacketConfig<'a> {
    ReadCommand(ReadCommandConfig<'a>),
    WriteCommand(WriteCommandConfig<'a>),
    ReadReply(ReadReplyConfig<'a>),
    WriteReply(WriteReplyConfig<'a>),
}

impl PacketConfig<'_> {
    /// Exact number of bytes `encode` will write.
    pub fn size(&self) -> usize {
        match self {
            PacketConfig::ReadCommand(c) => {
                c.target.target_path().len()
                    + 4
                    + padded_reply_address_len(c.target.reply_path().len())
                    + 12
            }
            PacketConfig::WriteCommand(c) => {
                c.target.target_path().len()
                    + 4
                    + padded_reply_address_len(c.target.reply_path().len())
                    + 12
                    + c.data.len()
                    + 1
            }
            PacketConfig::ReadReply(c) => c.reply_path.len() + 12 + c.data.len() + 1,
            PacketConfig::WriteReply(c) => c.reply_path.len() + 8,
        }
    }

    /// Encodes this configuration into `out`, returning the number of
    /// bytes written. Fails with `Error::BufferTooSmall` if `out` is
    /// smaller than `self.size()`.
    pub fn encode(&self, out: &mut [u8]) -> Result<usize> {
        let needed = self.size();
        if out.len() < needed {
            return Err(Error::BufferTooSmall { needed, available: out.len() });
        }
        let mut buf = Vec::with_capacity(needed);
        match self {
            PacketConfig::ReadCommand(c) => encode_read_command(c, &mut buf),
            PacketConfig::WriteCommand(c) => encode_write_command(c, &mut buf),
            PacketConfig::ReadReply(c) => encode_read_reply(c, &mut buf),
            PacketConfig::WriteReply(c) => encode_write_reply(c, &mut buf),
        }
        debug_assert_eq!(buf.len(), needed);
        out[..buf.len()].copy_from_slice(&buf);
        Ok(buf.len())
    }
}

fn encode_read_command(config: &ReadCommandConfig<'_>, buf: &mut Vec<u8>) {
    buf.extend_from_slice(config.target.target_path());
    let header_start = buf.len();
    buf.push(config.target.target_logical_address());
    buf.push(RMAP_PROTOCOL_IDENTIFIER);

    let reply_path = config.target.reply_path();
    let padded_len = padded_reply_address_len(reply_path.len());
    let mut instruction = BIT_COMMAND | BIT_REPLY;
    if config.increment {
        instruction |= BIT_INCREMENT;
    }
    instruction |= (padded_len / 4) as u8;
    buf.push(instruction);
    buf.push(config.key);

    write_padded_reply_address(buf, reply_path);

    buf.push(config.target.initiator_logical_address());
    buf.write_u16::<BigEndian>(config.transaction_id).unwrap();
    buf.push(config.extended_address);
    buf.write_u32::<BigEndian>(config.memory_address).unwrap();
    buf.write_uint::<BigEndian>(config.data_length as u64, 3).unwrap();

    let crc = crate::crc::crc(&buf[header_start..], 0);
    buf.push(crc);
}

fn encode_write_command(config: &WriteCommandConfig<'_>, buf: &mut Vec<u8>) {
    buf.extend_from_slice(config.target.target_path());
    let header_start = buf.len();
    buf.push(config.target.target_logical_address());
    buf.push(RMAP_PROTOCOL_IDENTIFIER);

    let reply_path = config.target.reply_path();
    let padded_len = padded_reply_address_len(reply_path.len());
    let mut instruction = BIT_COMMAND | BIT_WRITE;
    if config.reply {
        instruction |= BIT_REPLY;
    }
    if config.verify {
        instruction |= BIT_VERIFY;
    }
    if config.increment {
        instruction |= BIT_INCREMENT;
    }
    instruction |= (padded_len / 4) as u8;
    buf.push(instruction);
    buf.push(config.key);

    write_padded_reply_address(buf, reply_path);

    buf.push(config.target.initiator_logical_address());
    buf.write_u16::<BigEndian>(config.transaction_id).unwrap();
    buf.push(config.extended_address);
    buf.write_u32::<BigEndian>(config.memory_address).unwrap();
    buf.write_uint::<BigEndian>(config.data.len() as u64, 3).unwrap();

    let crc = crate::crc::crc(&buf[header_start..], 0);
    buf.push(crc);

    buf.extend_from_slice(config.data);
    let data_crc = crate::crc::crc(config.data, 0);
    buf.push(data_crc);
}

fn encode_write_reply(config: &WriteReplyConfig<'_>, buf: &mut Vec<u8>) {
    buf.extend_from_slice(config.reply_path);
    let header_start = buf.len();
    buf.push(config.initiator_logical_address);
    buf.push(RMAP_PROTOCOL_IDENTIFIER);

    let mut instruction = BIT_WRITE | BIT_REPLY;
    if config.verify {
        instruction |= BIT_VERIFY;
    }
    if config.increment {
        instruction |= BIT_INCREMENT;
    }
    buf.push(instruction);
    buf.push(config.status);
    buf.push(config.target_logical_address);
    buf.write_u16::<BigEndian>(config.transaction_id).unwrap();

    let crc = crate::crc::crc(&buf[header_start..], 0);
    buf.push(crc);
}

fn encode_read_reply(config: &ReadReplyConfig<'_>, buf: &mut Vec<u8>) {
    buf.extend_from_slice(config.reply_path);
    let header_start = buf.len();
    buf.push(config.initiator_logical_address);
    buf.push(RMAP_PROTOCOL_IDENTIFIER);

    let mut instruction = BIT_REPLY;
    if config.increment {
        instruction |= BIT_INCREMENT;
    }
    buf.push(instruction);
    buf.push(config.status);
    buf.push(config.target_logical_address);
    buf.write_u16::<BigEndian>(config.transaction_id).unwrap();
    buf.push(0x00); // reserved
    buf.write_uint::<BigEndian>(config.data.len() as u64, 3).unwrap();

    let crc = crate::crc::crc(&buf[header_start..], 0);
    buf.push(crc);

    buf.extend_from_slice(config.data);
    let data_crc = crate::crc::crc(config.data, 0);
    buf.push(data_crc);
}
