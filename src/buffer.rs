//! Byte buffers sized at construction, with a policy governing what
//! happens when a write would exceed that size.

use crate::error::{Error, Result};

/// What happens when a buffer would need to grow past its configured
/// capacity.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum BufferPolicy {
    /// Reject the write with `Error::NoBufferSpace`.
    Fixed,
    /// Grow the buffer to fit.
    #[default]
    AutoResize,
}

/// A growable byte buffer with a configured starting capacity and a
/// [`BufferPolicy`] governing growth past it. Used both for the transmit
/// side (`SendBuffer`) and the receive/reassembly side (`RecvBuffer`) of
/// the SSDTP2 codec.
#[derive(Debug)]
pub struct FrameBuffer {
    data: Vec<u8>,
    capacity: usize,
    policy: BufferPolicy,
}

impl FrameBuffer {
    /// Builds a new buffer pre-allocated to `capacity` bytes.
    pub fn new(capacity: usize, policy: BufferPolicy) -> Self {
        Self { data: Vec::with_capacity(capacity), capacity, policy }
    }

    /// Clears accumulated content without releasing the backing storage.
    pub fn reset(&mut self) {
        self.data.clear();
    }

    /// Appends `bytes`, growing (or rejecting) per policy if the result
    /// would exceed the configured capacity.
    pub fn extend(&mut self, bytes: &[u8]) -> Result<()> {
        let required = self.data.len() + bytes.len();
        if required > self.capacity {
            match self.policy {
                BufferPolicy::Fixed => return Err(Error::NoBufferSpace),
                BufferPolicy::AutoResize => self.capacity = required,
            }
        }
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    /// Grows the buffer with `len` zero bytes and returns a mutable slice
    /// over them, for callers that want to write in place (e.g. the
    /// packet encoder).
    pub fn reserve_tail(&mut self, len: usize) -> Result<&mut [u8]> {
        let required = self.data.len() + len;
        if required > self.capacity {
            match self.policy {
                BufferPolicy::Fixed => return Err(Error::NoBufferSpace),
                BufferPolicy::AutoResize => self.capacity = required,
            }
        }
        let start = self.data.len();
        self.data.resize(required, 0);
        Ok(&mut self.data[start..required])
    }

    /// The accumulated bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Truncates to `len` bytes (used to drop a reserved-but-unused tail).
    pub fn truncate(&mut self, len: usize) {
        self.data.truncate(len);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_policy_rejects_overflow() {
        let mut buf = FrameBuffer::new(4, BufferPolicy::Fixed);
        assert!(buf.extend(&[1, 2, 3, 4]).is_ok());
        assert!(matches!(buf.extend(&[5]), Err(Error::NoBufferSpace)));
    }

    #[test]
    fn auto_resize_grows_past_initial_capacity() {
        let mut buf = FrameBuffer::new(2, BufferPolicy::AutoResize);
        assert!(buf.extend(&[1, 2, 3, 4, 5]).is_ok());
        assert_eq!(buf.as_slice(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn reset_clears_without_losing_capacity_policy() {
        let mut buf = FrameBuffer::new(4, BufferPolicy::Fixed);
        buf.extend(&[1, 2, 3, 4]).unwrap();
        buf.reset();
        assert!(buf.is_empty());
        assert!(buf.extend(&[1, 2, 3, 4]).is_ok());
    }
}
