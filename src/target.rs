//! The addressing record a transaction needs: target/initiator logical
//! addresses and the SpaceWire router paths used to reach the target and
//! route the reply back.

use smallvec::SmallVec;

/// Inline capacity for path storage. RMAP reply paths are capped at 12
/// bytes by the protocol (three 4-byte words); target paths are usually
/// shorter still, so this avoids a heap allocation for the common case.
const INLINE_PATH_LEN: usize = 12;

/// Accessor-level interface for an RMAP target.
///
/// Implementations may back `target_path`/`reply_path` with inline arrays,
/// a `SmallVec`, or a heap-allocated `Vec` — callers only ever see the four
/// accessors, so the packet encoder is polymorphic over storage.
pub trait Target {
    /// The 8-bit logical address of the target node.
    fn target_logical_address(&self) -> u8;

    /// The 8-bit logical address of the initiator (this client).
    fn initiator_logical_address(&self) -> u8;

    /// SpaceWire router ports leading from the initiator to the target.
    /// Each byte must be `< 0x20`.
    fn target_path(&self) -> &[u8];

    /// SpaceWire router ports that carry the reply back to the initiator.
    /// At most 12 bytes.
    fn reply_path(&self) -> &[u8];
}

/// Immutable target descriptor backed by inline small-vector storage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetDescriptor {
    target_logical_address: u8,
    initiator_logical_address: u8,
    target_path: SmallVec<[u8; INLINE_PATH_LEN]>,
    reply_path: SmallVec<[u8; INLINE_PATH_LEN]>,
}

impl TargetDescriptor {
    /// Builds a new descriptor. `target_path` and `reply_path` are copied
    /// into inline storage; `reply_path` must not exceed 12 bytes (the
    /// packet encoder will reject it at encode time rather than here, so
    /// that callers never need to handle a `Result` just to describe a
    /// target).
    pub fn new(
        target_logical_address: u8,
        initiator_logical_address: u8,
        target_path: impl Into<SmallVec<[u8; INLINE_PATH_LEN]>>,
        reply_path: impl Into<SmallVec<[u8; INLINE_PATH_LEN]>>,
    ) -> Self {
        Self {
            target_logical_address,
            initiator_logical_address,
            target_path: target_path.into(),
            reply_path: reply_path.into(),
        }
    }
}

impl Target for TargetDescriptor {
    fn target_logical_address(&self) -> u8 {
        self.target_logical_address
    }

    fn initiator_logical_address(&self) -> u8 {
        self.initiator_logical_address
    }

    fn target_path(&self) -> &[u8] {
        &self.target_path
    }

    fn reply_path(&self) -> &[u8] {
        &self.reply_path
    }
}
