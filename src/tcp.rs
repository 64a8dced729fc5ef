//! The `ByteStream` transport abstraction and its real-socket implementation.
//!
//! `ByteStream` is deliberately narrow — `connect`/`send_all`/`recv_some`/
//! `shutdown`/`disconnect`, each with a per-call or per-connection deadline —
//! so that [`crate::client::ClientNode`] never depends on `tokio::net::TcpStream`
//! directly. The loopback test harness (`crate::loopback`) talks real TCP to
//! exercise this same implementation rather than swapping in a fake, but a
//! future transport (a UNIX socket for co-located testing, say) only needs to
//! implement this trait.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::{Error, Result};

/// A connected, bidirectional byte stream with per-operation deadlines.
///
/// Implementations must allow `send_all` to be called concurrently with
/// `recv_some` from different tasks (the client node's run loop is the sole
/// caller of `recv_some`; callers of `write_async`/`read_async` call
/// `send_all` under their own serialization). `&self` methods rather than
/// `&mut self` reflect that: connection state lives behind interior
/// mutability so the trait object can be shared as `Arc<dyn ByteStream>`.
#[async_trait]
pub trait ByteStream: Send + Sync {
    /// Opens the connection, failing with `Error::Timeout` if `timeout` elapses.
    async fn connect(&self, timeout: Duration) -> Result<()>;

    /// Sets the deadline applied to subsequent `recv_some` calls. `None` waits
    /// indefinitely.
    fn set_recv_timeout(&self, timeout: Option<Duration>);

    /// Sets the deadline applied to subsequent `send_all` calls.
    fn set_send_timeout(&self, timeout: Option<Duration>);

    /// Writes all of `bytes`, retrying on partial writes until either the
    /// buffer is exhausted or the send deadline elapses.
    async fn send_all(&self, bytes: &[u8]) -> Result<()>;

    /// Reads at least one byte into `buf`, returning the count read.
    /// Returns `Error::Timeout` if the recv deadline elapses first.
    async fn recv_some(&self, buf: &mut [u8]) -> Result<usize>;

    /// Shuts the socket down for both reads and writes; a blocked `recv_some`
    /// observes this as a clean EOF rather than an error.
    async fn shutdown(&self) -> Result<()>;

    /// Drops the underlying socket so a later `connect` starts fresh.
    async fn disconnect(&self) -> Result<()>;
}

/// Real TCP transport. Holds the connected socket behind an `Arc` so reads
/// (driven exclusively by the client node's run loop) and writes (serialized
/// by callers via their own mutex) never contend with each other for a lock —
/// only for the OS-level socket itself, which supports concurrent read/write.
pub struct TcpByteStream {
    ip_address: String,
    port: String,
    stream: AsyncMutex<Option<Arc<TcpStream>>>,
    recv_timeout: Mutex<Option<Duration>>,
    send_timeout: Mutex<Option<Duration>>,
}

impl TcpByteStream {
    /// Builds a stream targeting `ip_address:port`. No socket is opened until
    /// `connect` is called.
    pub fn new(ip_address: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            ip_address: ip_address.into(),
            port: port.into(),
            stream: AsyncMutex::new(None),
            recv_timeout: Mutex::new(None),
            send_timeout: Mutex::new(None),
        }
    }

    async fn current(&self) -> Result<Arc<TcpStream>> {
        self.stream.lock().await.clone().ok_or(Error::NotConnected)
    }

    /// Wraps an already-accepted socket (the loopback responder's server
    /// role: it never dials out, so [`ByteStream::connect`] is never called
    /// on the result — the socket is simply ready to `send_all`/`recv_some`
    /// from the moment this returns).
    pub fn from_connected(stream: TcpStream) -> Self {
        let _ = stream.set_nodelay(true);
        Self {
            ip_address: String::new(),
            port: String::new(),
            stream: AsyncMutex::new(Some(Arc::new(stream))),
            recv_timeout: Mutex::new(None),
            send_timeout: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ByteStream for TcpByteStream {
    async fn connect(&self, timeout: Duration) -> Result<()> {
        let addr = format!("{}:{}", self.ip_address, self.port);
        let stream = tokio::time::timeout(timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| Error::Timeout)??;
        let _ = stream.set_nodelay(true);
        *self.stream.lock().await = Some(Arc::new(stream));
        Ok(())
    }

    fn set_recv_timeout(&self, timeout: Option<Duration>) {
        *self.recv_timeout.lock().unwrap() = timeout;
    }

    fn set_send_timeout(&self, timeout: Option<Duration>) {
        *self.send_timeout.lock().unwrap() = timeout;
    }

    async fn send_all(&self, bytes: &[u8]) -> Result<()> {
        let stream = self.current().await?;
        let timeout = *self.send_timeout.lock().unwrap();
        let mut remaining = bytes;
        let write = async {
            while !remaining.is_empty() {
                let n = (&*stream).write(remaining).await?;
                if n == 0 {
                    return Err(Error::ConnectionAborted);
                }
                remaining = &remaining[n..];
            }
            Ok(())
        };
        match timeout {
            Some(d) => tokio::time::timeout(d, write).await.map_err(|_| Error::Timeout)?,
            None => write.await,
        }
    }

    async fn recv_some(&self, buf: &mut [u8]) -> Result<usize> {
        let stream = self.current().await?;
        let timeout = *self.recv_timeout.lock().unwrap();
        let read = async {
            let n = (&*stream).read(buf).await?;
            if n == 0 {
                return Err(Error::ConnectionAborted);
            }
            Ok(n)
        };
        match timeout {
            Some(d) => tokio::time::timeout(d, read).await.map_err(|_| Error::Timeout)?,
            None => read.await,
        }
    }

    async fn shutdown(&self) -> Result<()> {
        if let Some(stream) = self.stream.lock().await.as_ref() {
            let _ = stream.shutdown().await;
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        *self.stream.lock().await = None;
        Ok(())
    }
}
