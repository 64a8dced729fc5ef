//! rmap-client - a host-side RMAP client over an SSDTP2 TCP tunnel to a
//! SpaceWire bridge.
//!
//! This library implements the Remote Memory Access Protocol (RMAP, per
//! ECSS-E-ST-50-52C) client role: issuing Read-Command/Write-Command
//! transactions against a remote SpaceWire target and matching their
//! replies, all carried over a TCP "SSDTP2" tunnel to a bridge device
//! rather than a real SpaceWire link.
//!
//! ## Main components
//!
//! - [`client`]: the public `connect`/`read`/`write`/`emit_time_code`
//!   surface — [`client::ClientNode`] ties everything else together.
//! - [`packet`]: the RMAP wire codec — encodes the four packet variants and
//!   parses them back, each guarded by the protocol's split header/data
//!   CRC-8 trailer (see [`crc`]).
//! - [`ssdtp2`]: the 12-byte envelope framing that carries RMAP packets (and
//!   time codes) over the TCP tunnel.
//! - [`transaction`]: the bounded transaction-id table matching outgoing
//!   commands to their eventual replies.
//! - [`worker`]: the bounded worker pool that runs completion callbacks off
//!   the receive loop.
//! - [`tcp`]: the `ByteStream` transport abstraction and its TCP
//!   implementation.
//! - [`target`]: the addressing record (`Target`) describing an RMAP peer.
//! - [`config`]: `ClientConfig`, the connection/buffer/transaction-id-range
//!   settings for a `ClientNode`.
//! - [`buffer`]: the sized byte buffer shared by the send and receive paths.
//! - [`error`]: the crate's single public error type.
//! - [`loopback`]: an in-process, memory-backed RMAP responder used to
//!   exercise the client end-to-end in tests.
//!
//! ## Standards followed
//!
//! - ECSS-E-ST-50-52C: RMAP protocol.
//! - SSDTP2: the vendor TCP tunnel framing RMAP packets travel over here.

pub mod buffer;
pub mod client;
pub mod config;
pub mod crc;
pub mod error;
pub mod loopback;
pub mod packet;
pub mod ssdtp2;
pub mod target;
pub mod tcp;
pub mod transaction;
pub mod worker;
