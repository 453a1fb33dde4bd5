//! B+tree Module
//!
//! Read-only access to the on-disk index trees a header points at.
//!
//! ## Node Format
//! ```text
//! ┌──────────────────────┬───────────────┬─────────────────────────────┐
//! │ Len (4, bit31=comp.) │ CRC32 (4)     │ Data                        │
//! └──────────────────────┴───────────────┴─────────────────────────────┘
//! Data:
//! ┌──────────┬──────────────────────────────────────────────────────────┐
//! │ Kind (1) │ [KeyLen:12 | ValLen:28 (5)][Key][Value] ... repeated      │
//! └──────────┴──────────────────────────────────────────────────────────┘
//!   Kind 0 = KP (interior), 1 = KV (leaf)
//!   KP value = [Pointer: u48][SubtreeSize: u48][Reduce value]
//!   KP key   = greatest key stored under that child
//! ```

mod collate;
mod node;
mod traversal;

pub use collate::{KeyComparator, RawCollator, ViewKey, ViewKeyCollator};
pub use node::{Node, NodeEntries, NodeEntry, NodeKind};
pub use traversal::{
    traverse, KeySelection, Outcome, Step, TraversalRequest, TraversalState, MAX_TREE_DEPTH,
};

use crate::error::{FoldError, Result};

/// Largest key a node entry can hold (12-bit length)
pub const MAX_KEY_LEN: usize = (1 << 12) - 1;

/// Largest value a node entry can hold (28-bit length)
pub const MAX_VALUE_LEN: usize = (1 << 28) - 1;

/// Size of the packed key/value length prefix
pub(crate) const KV_LENGTH_SIZE: usize = 5;

/// Size of the pointer + subtree size pair in a pointer value
pub(crate) const POINTER_SIZE: usize = 12;

/// Chunk length flag marking a compressed payload
pub(crate) const COMPRESSED_FLAG: u32 = 0x8000_0000;

/// Reference to the top of a subtree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePointer {
    /// File offset of the node chunk
    pub pointer: u64,
    /// Bytes on disk used by the subtree
    pub subtree_size: u64,
    /// Opaque reduction over the subtree
    pub reduce_value: Vec<u8>,
}

impl NodePointer {
    pub fn new(pointer: u64, subtree_size: u64) -> Self {
        Self {
            pointer,
            subtree_size,
            reduce_value: Vec::new(),
        }
    }

    /// Serialize as `[pointer: u48][subtree_size: u48][reduce value]`
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(POINTER_SIZE + self.reduce_value.len());
        put_u48(&mut out, self.pointer);
        put_u48(&mut out, self.subtree_size);
        out.extend_from_slice(&self.reduce_value);
        out
    }

    /// Parse a serialized pointer; the caller maps the error to its context
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < POINTER_SIZE {
            return Err(FoldError::MalformedHeader(format!(
                "node pointer needs {} bytes, got {}",
                POINTER_SIZE,
                bytes.len()
            )));
        }

        Ok(Self {
            pointer: get_u48(&bytes[0..6]),
            subtree_size: get_u48(&bytes[6..12]),
            reduce_value: bytes[POINTER_SIZE..].to_vec(),
        })
    }
}

/// Append the low 48 bits of `value`, big-endian
pub(crate) fn put_u48(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_be_bytes()[2..8]);
}

/// Read a big-endian 48-bit integer from a 6-byte slice
pub(crate) fn get_u48(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf[2..8].copy_from_slice(&bytes[..6]);
    u64::from_be_bytes(buf)
}

/// Pack key and value lengths into the 5-byte entry prefix
pub(crate) fn encode_kv_length(key_len: usize, value_len: usize) -> [u8; KV_LENGTH_SIZE] {
    let packed = ((key_len as u64) << 28) | value_len as u64;
    let bytes = packed.to_be_bytes();
    let mut out = [0u8; KV_LENGTH_SIZE];
    out.copy_from_slice(&bytes[3..8]);
    out
}

/// Unpack the 5-byte entry prefix into (key length, value length)
pub(crate) fn decode_kv_length(bytes: &[u8]) -> (usize, usize) {
    let mut buf = [0u8; 8];
    buf[3..8].copy_from_slice(&bytes[..KV_LENGTH_SIZE]);
    let packed = u64::from_be_bytes(buf);
    ((packed >> 28) as usize, (packed & MAX_VALUE_LEN as u64) as usize)
}
