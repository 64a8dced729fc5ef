//! The client node: ties the packet codec, the SSDTP2 framing codec, the
//! transaction table, the worker pool, and a [`ByteStream`] transport
//! together into the public `connect`/`read`/`write`/`emit_time_code`
//! surface.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use tracing_attributes::instrument;

use crate::buffer::FrameBuffer;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::packet::{
    self, OwnedReply, ParsedPacket, PacketConfig, ReadCommandConfig, ReadReplyConfig,
    WriteCommandConfig, WriteReplyConfig,
};
use crate::ssdtp2::{self, Received};
use crate::target::Target;
use crate::tcp::{ByteStream, TcpByteStream};
use crate::transaction::TransactionTable;
use crate::worker::WorkerPool;

/// Connection lifecycle state (§4.9). `Closed` is terminal until a fresh
/// `connect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Unconnected,
    Connecting,
    Connected,
    Running,
    ShuttingDown,
    Closed,
}

/// Invoked synchronously from the receive loop when a Read-Command arrives
/// (server role): returns the data to answer with, and the RMAP status.
pub type ReadCommandHandler =
    Box<dyn Fn(&packet::ReadCommand) -> (Vec<u8>, u8) + Send + Sync>;
/// Invoked synchronously from the receive loop when a Write-Command arrives
/// (server role): returns the RMAP status to reply with.
pub type WriteCommandHandler = Box<dyn Fn(&packet::WriteCommand) -> u8 + Send + Sync>;

/// 12 bytes reserved at the front of the send buffer for the SSDTP2
/// envelope, so the packet encoder can write directly after it without a
/// second copy.
const ENVELOPE_PREFIX: usize = 12;

/// Wraps a caller-supplied [`Target`], substituting this node's own
/// registered initiator logical address (§4.9 `set_initiator_logical_address`)
/// for whatever the target itself carries. The node's identity is a
/// per-connection property set once, not something each call site should
/// have to repeat on every target it builds.
struct WithInitiator<'a> {
    inner: &'a dyn Target,
    initiator_logical_address: u8,
}

impl Target for WithInitiator<'_> {
    fn target_logical_address(&self) -> u8 {
        self.inner.target_logical_address()
    }

    fn initiator_logical_address(&self) -> u8 {
        self.initiator_logical_address
    }

    fn target_path(&self) -> &[u8] {
        self.inner.target_path()
    }

    fn reply_path(&self) -> &[u8] {
        self.inner.reply_path()
    }
}

/// The host-side RMAP client. Cheap to clone (internally `Arc`-shared state
/// lives behind the fields), but the idiomatic construction is a single
/// `Arc<ClientNode>` shared between the task running [`ClientNode::run_loop`]
/// and the tasks issuing requests.
pub struct ClientNode {
    stream: Arc<dyn ByteStream>,
    config: ClientConfig,
    send: Mutex<FrameBuffer>,
    transactions: TransactionTable,
    workers: WorkerPool,
    initiator_logical_address: AtomicU8,
    state: Mutex<ConnState>,
    shutting_down: AtomicBool,
    on_read: Mutex<Option<ReadCommandHandler>>,
    on_write: Mutex<Option<WriteCommandHandler>>,
}

impl ClientNode {
    /// Builds a client targeting the real TCP transport described by
    /// `config`.
    pub fn new(config: ClientConfig) -> Arc<Self> {
        let stream = Arc::new(TcpByteStream::new(config.ip_address.clone(), config.port.clone()));
        Self::with_stream(config, stream)
    }

    /// Builds a client over an arbitrary [`ByteStream`] (the loopback test
    /// harness uses this to connect against an in-process responder that
    /// still talks real TCP framing).
    pub fn with_stream(config: ClientConfig, stream: Arc<dyn ByteStream>) -> Arc<Self> {
        let transactions =
            TransactionTable::new(config.transaction_id_min, config.transaction_id_max);
        let workers = WorkerPool::new(config.worker_pool_size);
        let send = Mutex::new(FrameBuffer::new(config.send_buffer_size, config.buffer_policy));
        Arc::new(Self {
            stream,
            config,
            send,
            transactions,
            workers,
            initiator_logical_address: AtomicU8::new(0),
            state: Mutex::new(ConnState::Unconnected),
            shutting_down: AtomicBool::new(false),
            on_read: Mutex::new(None),
            on_write: Mutex::new(None),
        })
    }

    /// Sets the initiator logical address placed on outgoing commands.
    pub fn set_initiator_logical_address(&self, address: u8) {
        self.initiator_logical_address.store(address, Ordering::SeqCst);
    }

    fn initiator_logical_address(&self) -> u8 {
        self.initiator_logical_address.load(Ordering::SeqCst)
    }

    /// Registers the handler invoked (server role) for incoming Read-Commands.
    pub fn set_on_read(&self, handler: ReadCommandHandler) {
        *self.on_read.lock().unwrap() = Some(handler);
    }

    /// Registers the handler invoked (server role) for incoming Write-Commands.
    pub fn set_on_write(&self, handler: WriteCommandHandler) {
        *self.on_write.lock().unwrap() = Some(handler);
    }

    fn state(&self) -> ConnState {
        *self.state.lock().unwrap()
    }

    /// Opens the connection. Returns `Error::AlreadyConnected` if called
    /// while the node is anywhere other than `Unconnected`/`Closed` — the
    /// crate's resolved answer to the open question of §9, rather than
    /// silently disconnecting and reconnecting.
    #[instrument(skip(self), fields(ip = %self.config.ip_address, port = %self.config.port))]
    pub async fn connect(&self, timeout: Duration) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            if !matches!(*state, ConnState::Unconnected | ConnState::Closed) {
                return Err(Error::AlreadyConnected);
            }
            *state = ConnState::Connecting;
        }
        match self.stream.connect(timeout).await {
            Ok(()) => {
                self.shutting_down.store(false, Ordering::SeqCst);
                *self.state.lock().unwrap() = ConnState::Connected;
                info!(ip = %self.config.ip_address, port = %self.config.port, "connected");
                Ok(())
            }
            Err(e) => {
                *self.state.lock().unwrap() = ConnState::Unconnected;
                Err(e)
            }
        }
    }

    /// Idempotent. Marks the node as shutting down and shuts the socket down
    /// for read/write, which causes a running `run_loop` to observe EOF and
    /// return. Calling this twice, or before connecting, both succeed.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<()> {
        self.shutting_down.store(true, Ordering::SeqCst);
        {
            let mut state = self.state.lock().unwrap();
            if *state == ConnState::Closed {
                return Ok(());
            }
            *state = ConnState::ShuttingDown;
        }
        self.stream.shutdown().await?;
        info!("shutdown requested");
        Ok(())
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.shutting_down.load(Ordering::SeqCst)
            || matches!(self.state(), ConnState::Unconnected | ConnState::Closed)
        {
            return Err(Error::NotConnected);
        }
        Ok(())
    }

    async fn send_packet(&self, config: PacketConfig<'_>) -> Result<()> {
        let mut send = self.send.lock().unwrap_or_else(|e| e.into_inner());
        send.reset();
        let body_len = config.size();
        let tail = send.reserve_tail(ENVELOPE_PREFIX + body_len)?;
        ssdtp2::write_rmap_envelope(&mut tail[..ENVELOPE_PREFIX], body_len as u64);
        config.encode(&mut tail[ENVELOPE_PREFIX..])?;
        let frame = send.as_slice().to_vec();
        drop(send);
        self.stream.send_all(&frame).await
    }

    /// Encodes and sends a time-code frame; the low 6 bits of `tc` are the
    /// time code value.
    pub async fn emit_time_code(&self, tc: u8) -> Result<()> {
        self.ensure_connected()?;
        let frame = ssdtp2::encode_time_code_frame(tc);
        self.stream.send_all(&frame).await
    }

    /// Issues a Write-Command and returns a future resolved by the reply
    /// callback once the matching Write-Reply arrives (§4.9 algorithm).
    /// `on_complete` runs (on a worker-pool task) immediately before the
    /// future resolves.
    pub async fn write_async(
        &self,
        target: &dyn Target,
        memory_address: u32,
        data: &[u8],
        on_complete: impl FnOnce(Result<OwnedReply>) + Send + 'static,
    ) -> oneshot::Receiver<Result<OwnedReply>> {
        let (tx, rx) = oneshot::channel();
        if let Err(e) = self.ensure_connected() {
            on_complete(Err(e.clone()));
            let _ = tx.send(Err(e));
            return rx;
        }
        let id = match self.transactions.allocate() {
            Ok(id) => id,
            Err(e) => {
                on_complete(Err(e.clone()));
                let _ = tx.send(Err(e));
                return rx;
            }
        };

        let target = WithInitiator { inner: target, initiator_logical_address: self.initiator_logical_address() };
        let config = PacketConfig::WriteCommand(WriteCommandConfig {
            target: &target,
            transaction_id: id,
            extended_address: 0,
            memory_address,
            data,
            key: 0x00,
            increment: true,
            reply: true,
            verify: false,
        });

        self.transactions.install(
            id,
            Box::new(move |reply| {
                on_complete(reply.clone());
                let _ = tx.send(reply);
            }),
        );

        if let Err(e) = self.send_packet(config).await {
            self.transactions.deliver(id, Err(e));
        }
        rx
    }

    /// Issues a Read-Command for `length` bytes and returns a future
    /// resolved by the matching Read-Reply.
    pub async fn read_async(
        &self,
        target: &dyn Target,
        memory_address: u32,
        length: u32,
        on_complete: impl FnOnce(Result<OwnedReply>) + Send + 'static,
    ) -> oneshot::Receiver<Result<OwnedReply>> {
        let (tx, rx) = oneshot::channel();
        if let Err(e) = self.ensure_connected() {
            on_complete(Err(e.clone()));
            let _ = tx.send(Err(e));
            return rx;
        }
        let id = match self.transactions.allocate() {
            Ok(id) => id,
            Err(e) => {
                on_complete(Err(e.clone()));
                let _ = tx.send(Err(e));
                return rx;
            }
        };

        let target = WithInitiator { inner: target, initiator_logical_address: self.initiator_logical_address() };
        let config = PacketConfig::ReadCommand(ReadCommandConfig {
            target: &target,
            transaction_id: id,
            extended_address: 0,
            memory_address,
            data_length: length,
            key: 0x00,
            increment: true,
        });

        self.transactions.install(
            id,
            Box::new(move |reply| {
                on_complete(reply.clone());
                let _ = tx.send(reply);
            }),
        );

        if let Err(e) = self.send_packet(config).await {
            self.transactions.deliver(id, Err(e));
        }
        rx
    }

    /// Blocking wrapper around [`ClientNode::write_async`].
    pub async fn write(&self, target: &dyn Target, memory_address: u32, data: &[u8]) -> Result<OwnedReply> {
        let rx = self.write_async(target, memory_address, data, |_| {}).await;
        rx.await.map_err(|_| Error::ConnectionAborted)?
    }

    /// Blocking wrapper around [`ClientNode::read_async`]; `out_buf` must be
    /// exactly `length` bytes and is filled from the resolved reply.
    pub async fn read(
        &self,
        target: &dyn Target,
        memory_address: u32,
        out_buf: &mut [u8],
    ) -> Result<()> {
        let rx = self
            .read_async(target, memory_address, out_buf.len() as u32, |_| {})
            .await;
        let reply = rx.await.map_err(|_| Error::ConnectionAborted)??;
        if reply.data.len() != out_buf.len() {
            return Err(Error::InvalidArgument("reply data length did not match request"));
        }
        out_buf.copy_from_slice(&reply.data);
        Ok(())
    }

    /// Runs the receive loop until `shutdown` breaks it (by shutting down
    /// the socket, which surfaces as a recv error here). Safe to run on a
    /// single dedicated task only — it is the sole reader of the socket.
    pub async fn run_loop(self: &Arc<Self>) {
        *self.state.lock().unwrap() = ConnState::Running;
        let mut recv_buf = FrameBuffer::new(self.config.recv_buffer_size, self.config.buffer_policy);
        loop {
            match ssdtp2::read_next(&*self.stream, &mut recv_buf).await {
                Ok(Received::RmapPacket) => Self::dispatch_packet(self, recv_buf.as_slice()).await,
                Ok(Received::TimeCode(_tc)) => {
                    debug!("time code received");
                }
                Err(Error::BadMessage(reason)) => {
                    warn!(reason, "discarding bad SSDTP2 frame");
                }
                Err(_e) => break,
            }
        }
        self.transactions.drain_cancel();
        *self.state.lock().unwrap() = ConnState::Closed;
        info!("run_loop exited; outstanding transactions cancelled");
    }

    async fn dispatch_packet(node: &Arc<Self>, bytes: &[u8]) {
        let parsed = match packet::parse(bytes) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "discarding unparseable RMAP packet");
                return;
            }
        };

        if parsed.is_reply() {
            if let Some(reply) = parsed.to_owned_reply() {
                let id = reply.transaction_id;
                let node = node.clone();
                node.workers.post(move || {
                    node.transactions.deliver(id, Ok(reply));
                });
            }
            return;
        }

        match &parsed {
            ParsedPacket::ReadCommand(cmd) => node.handle_read_command(cmd).await,
            ParsedPacket::WriteCommand(cmd) => node.handle_write_command(cmd).await,
            _ => unreachable!("replies handled above"),
        }
    }

    async fn handle_read_command(&self, cmd: &packet::ReadCommand<'_>) {
        let handler = self.on_read.lock().unwrap();
        let Some(handler) = handler.as_ref() else {
            warn!("received Read-Command with no on_read handler registered");
            return;
        };
        let (data, status) = handler(cmd);
        let config = PacketConfig::ReadReply(ReadReplyConfig {
            reply_path: cmd.reply_path,
            initiator_logical_address: cmd.initiator_logical_address,
            target_logical_address: cmd.target_logical_address,
            transaction_id: cmd.transaction_id,
            status,
            data: &data,
            increment: cmd.increment,
        });
        drop(handler);
        if let Err(e) = self.send_packet(config).await {
            warn!(error = %e, "failed to send Read-Reply");
        }
    }

    async fn handle_write_command(&self, cmd: &packet::WriteCommand<'_>) {
        let handler = self.on_write.lock().unwrap();
        let Some(handler) = handler.as_ref() else {
            warn!("received Write-Command with no on_write handler registered");
            return;
        };
        let status = handler(cmd);
        drop(handler);
        if !cmd.reply {
            return;
        }
        let config = PacketConfig::WriteReply(WriteReplyConfig {
            reply_path: cmd.reply_path,
            initiator_logical_address: cmd.initiator_logical_address,
            target_logical_address: cmd.target_logical_address,
            transaction_id: cmd.transaction_id,
            status,
            increment: cmd.increment,
            verify: cmd.verify,
        });
        if let Err(e) = self.send_packet(config).await {
            warn!(error = %e, "failed to send Write-Reply");
        }
    }
}

