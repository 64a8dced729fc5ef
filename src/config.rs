//! The transport endpoint configuration record (§6.3): a handful of
//! in-process parameters, not a deployment-time config file, so a plain
//! struct with a `Default` impl and a small builder is all this needs.

use crate::buffer::BufferPolicy;

/// Default start of the transaction id range.
pub const DEFAULT_TRANSACTION_ID_MIN: u16 = 0x0020;
/// Default (exclusive) end of the transaction id range.
pub const DEFAULT_TRANSACTION_ID_MAX: u16 = 0x0040;
/// Default send/receive buffer size in bytes.
pub const DEFAULT_BUFFER_SIZE: usize = 4096;
/// Default number of worker-pool threads running completion callbacks.
pub const DEFAULT_WORKER_POOL_SIZE: usize = 4;

/// Connection + buffer + transaction-id-range configuration for a
/// [`crate::client::ClientNode`].
///
/// Connect, send, and receive timeouts are supplied per-call rather than
/// stored here (§6.3).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub ip_address: String,
    pub port: String,
    pub send_buffer_size: usize,
    pub recv_buffer_size: usize,
    pub transaction_id_min: u16,
    pub transaction_id_max: u16,
    pub buffer_policy: BufferPolicy,
    pub worker_pool_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ip_address: String::new(),
            port: String::new(),
            send_buffer_size: DEFAULT_BUFFER_SIZE,
            recv_buffer_size: DEFAULT_BUFFER_SIZE,
            transaction_id_min: DEFAULT_TRANSACTION_ID_MIN,
            transaction_id_max: DEFAULT_TRANSACTION_ID_MAX,
            buffer_policy: BufferPolicy::AutoResize,
            worker_pool_size: DEFAULT_WORKER_POOL_SIZE,
        }
    }
}

impl ClientConfig {
    /// Starts a builder targeting `ip_address:port`; every other field takes
    /// its `Default`.
    pub fn builder(ip_address: impl Into<String>, port: impl Into<String>) -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: Self { ip_address: ip_address.into(), port: port.into(), ..Self::default() },
        }
    }
}

/// Fluent builder for [`ClientConfig`] — set only the fields that differ
/// from the defaults.
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn send_buffer_size(mut self, size: usize) -> Self {
        self.config.send_buffer_size = size;
        self
    }

    pub fn recv_buffer_size(mut self, size: usize) -> Self {
        self.config.recv_buffer_size = size;
        self
    }

    pub fn transaction_id_range(mut self, min: u16, max: u16) -> Self {
        self.config.transaction_id_min = min;
        self.config.transaction_id_max = max;
        self
    }

    pub fn buffer_policy(mut self, policy: BufferPolicy) -> Self {
        self.config.buffer_policy = policy;
        self
    }

    pub fn worker_pool_size(mut self, size: usize) -> Self {
        self.config.worker_pool_size = size;
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}
