//! An in-process loopback responder (§4.10): a memory-backed RMAP target
//! used only to exercise [`crate::client::ClientNode`] in tests. It speaks
//! the same SSDTP2 framing and RMAP wire format as a real SpaceWire bridge,
//! deliberately fragmenting its replies to exercise the client's
//! reassembly path (see [`ClientNode::run_loop`](crate::client::ClientNode::run_loop)).
//!
//! This is test-only plumbing, not part of the crate's public transaction
//! surface, so its glue code (connection acceptance, dispatch) returns
//! `anyhow::Result` rather than the crate's own [`crate::error::Error`] —
//! the same division the reference codebase draws between its typed
//! protocol errors and the `anyhow`-based socket-handling glue around them.

use std::ops::Range;
use std::sync::Mutex;

use rand::Rng;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::buffer::{BufferPolicy, FrameBuffer};
use crate::error::{Error, Result};
use crate::packet::{
    self, ParsedPacket, PacketConfig, ReadReplyConfig, RmapReplyStatus, WriteReplyConfig,
};
use crate::ssdtp2::{self, Received};
use crate::tcp::{ByteStream, TcpByteStream};

/// Backing store size (§4.10): 1 MiB.
pub const MEMORY_SIZE: usize = 1 << 20;

const RECV_BUFFER_SIZE: usize = 8192;
/// Default random fragment size range for replies.
const FRAGMENT_RANGE: std::ops::RangeInclusive<usize> = 5..=400;

/// A single-connection, memory-backed RMAP responder. Bind it, optionally
/// preload memory or pin the next reply's fragmentation, then `serve_one`
/// it against a connecting [`ClientNode`](crate::client::ClientNode).
pub struct LoopbackResponder {
    listener: TcpListener,
    memory: Mutex<Vec<u8>>,
    time_codes_seen: Mutex<Vec<u8>>,
    next_fragment_sizes: Mutex<Option<Vec<usize>>>,
}

impl LoopbackResponder {
    /// Binds a listener at `addr` (use `"127.0.0.1:0"` to let the OS pick a
    /// free port, then read it back with [`LoopbackResponder::local_addr`]).
    pub async fn bind(addr: &str) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            memory: Mutex::new(vec![0u8; MEMORY_SIZE]),
            time_codes_seen: Mutex::new(Vec::new()),
            next_fragment_sizes: Mutex::new(None),
        })
    }

    /// The address a client should `connect` to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Copies `data` into the backing store at `offset`, for tests that
    /// need a known pattern in place before the client reads it.
    pub fn preload(&self, offset: usize, data: &[u8]) {
        let mut memory = self.memory.lock().unwrap();
        memory[offset..offset + data.len()].copy_from_slice(data);
    }

    /// Pins the fragmentation of the *next* reply this responder sends to
    /// exactly these chunk sizes (which must sum to at least the encoded
    /// packet's length — any shortfall is absorbed by one trailing chunk,
    /// any surplus truncated). Reverts to random `5..400`-byte chunks for
    /// replies after that one.
    pub fn set_next_fragment_sizes(&self, sizes: Vec<usize>) {
        *self.next_fragment_sizes.lock().unwrap() = Some(sizes);
    }

    /// The time codes received so far, in arrival order.
    pub fn time_codes_seen(&self) -> Vec<u8> {
        self.time_codes_seen.lock().unwrap().clone()
    }

    /// Accepts exactly one connection and serves it until the peer
    /// disconnects (or sends something this responder can't make sense of).
    pub async fn serve_one(&self) -> anyhow::Result<()> {
        let (socket, peer) = self.listener.accept().await?;
        info!(%peer, "loopback responder accepted connection");
        let stream = TcpByteStream::from_connected(socket);
        let mut recv_buf = FrameBuffer::new(RECV_BUFFER_SIZE, BufferPolicy::AutoResize);
        loop {
            match ssdtp2::read_next(&stream, &mut recv_buf).await {
                Ok(Received::RmapPacket) => {
                    if let Err(e) = self.handle_packet(&stream, recv_buf.as_slice()).await {
                        warn!(error = %e, "loopback responder failed to answer command");
                    }
                }
                Ok(Received::TimeCode(tc)) => {
                    self.time_codes_seen.lock().unwrap().push(tc);
                }
                Err(Error::BadMessage(reason)) => {
                    debug!(reason, "loopback responder discarding bad frame");
                }
                Err(_) => break,
            }
        }
        Ok(())
    }

    async fn handle_packet(&self, stream: &dyn ByteStream, bytes: &[u8]) -> Result<()> {
        match packet::parse(bytes)? {
            ParsedPacket::WriteCommand(cmd) => {
                let status = self.write_memory(cmd.memory_address, cmd.data);
                if cmd.reply {
                    let config = PacketConfig::WriteReply(WriteReplyConfig {
                        reply_path: cmd.reply_path,
                        initiator_logical_address: cmd.initiator_logical_address,
                        target_logical_address: cmd.target_logical_address,
                        transaction_id: cmd.transaction_id,
                        status,
                        increment: cmd.increment,
                        verify: cmd.verify,
                    });
                    self.send_fragmented(stream, config).await?;
                }
                Ok(())
            }
            ParsedPacket::ReadCommand(cmd) => {
                let (data, status) = self.read_memory(cmd.memory_address, cmd.data_length);
                let config = PacketConfig::ReadReply(ReadReplyConfig {
                    reply_path: cmd.reply_path,
                    initiator_logical_address: cmd.initiator_logical_address,
                    target_logical_address: cmd.target_logical_address,
                    transaction_id: cmd.transaction_id,
                    status,
                    data: &data,
                    increment: cmd.increment,
                });
                self.send_fragmented(stream, config).await
            }
            ParsedPacket::ReadReply(_) | ParsedPacket::WriteReply(_) => Err(Error::InvalidPacket),
        }
    }

    fn write_memory(&self, address: u32, data: &[u8]) -> u8 {
        let mut memory = self.memory.lock().unwrap();
        match window(memory.len(), address, data.len() as u32) {
            Some(range) => {
                memory[range].copy_from_slice(data);
                RmapReplyStatus::Success as u8
            }
            None => RmapReplyStatus::GeneralError as u8,
        }
    }

    fn read_memory(&self, address: u32, length: u32) -> (Vec<u8>, u8) {
        let memory = self.memory.lock().unwrap();
        match window(memory.len(), address, length) {
            Some(range) => (memory[range].to_vec(), RmapReplyStatus::Success as u8),
            None => (Vec::new(), RmapReplyStatus::GeneralError as u8),
        }
    }

    /// Encodes `config`, then writes it out as a run of SSDTP2 frames sized
    /// per [`LoopbackResponder::set_next_fragment_sizes`] (or randomly,
    /// 5..400 bytes, by default), the last flagged EOP and every other
    /// flagged Continuation — exercising the client's reassembly path.
    async fn send_fragmented(&self, stream: &dyn ByteStream, config: PacketConfig<'_>) -> Result<()> {
        let mut packet = vec![0u8; config.size()];
        config.encode(&mut packet)?;

        let pinned = self.next_fragment_sizes.lock().unwrap().take();
        let chunk_sizes = plan_chunks(packet.len(), pinned);

        let mut offset = 0;
        for (i, &size) in chunk_sizes.iter().enumerate() {
            let flag = if i == chunk_sizes.len() - 1 { ssdtp2::FLAG_EOP } else { ssdtp2::FLAG_CONTINUATION };
            let mut frame = vec![0u8; 12 + size];
            ssdtp2::write_envelope(&mut frame[..12], flag, size as u64);
            frame[12..].copy_from_slice(&packet[offset..offset + size]);
            stream.send_all(&frame).await?;
            offset += size;
        }
        Ok(())
    }
}

fn window(memory_len: usize, address: u32, length: u32) -> Option<Range<usize>> {
    let start = address as usize;
    let end = start.checked_add(length as usize)?;
    (end <= memory_len).then_some(start..end)
}

/// Splits `total` bytes into a sequence of chunk sizes, either the pinned
/// `fixed` sizes (consumed in order, topped up or truncated to exactly
/// cover `total`) or, absent an override, random `5..400`-byte chunks. A
/// zero-length payload (a Write-Reply with no data) still yields one chunk,
/// so a single EOP frame is always emitted.
fn plan_chunks(total: usize, fixed: Option<Vec<usize>>) -> Vec<usize> {
    let mut out = Vec::new();
    let mut covered = 0;

    if let Some(sizes) = fixed {
        for size in sizes {
            if covered >= total {
                break;
            }
            let take = size.min(total - covered);
            out.push(take);
            covered += take;
        }
    } else {
        let mut rng = rand::thread_rng();
        while covered < total {
            let take = rng.gen_range(FRAGMENT_RANGE).min(total - covered);
            out.push(take);
            covered += take;
        }
    }

    if covered < total {
        out.push(total - covered);
    }
    if out.is_empty() {
        out.push(0);
    }
    out
}
