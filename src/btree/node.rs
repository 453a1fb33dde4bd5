//! B+tree nodes
//!
//! Loading, checksumming, and walking the entries of one node chunk.

use crate::error::{FoldError, Result};
use crate::storage::{StorageFile, CHUNK_PREFIX_SIZE};

use super::{
    decode_kv_length, encode_kv_length, COMPRESSED_FLAG, KV_LENGTH_SIZE, MAX_KEY_LEN,
    MAX_VALUE_LEN,
};

/// Node kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NodeKind {
    /// Interior node, values point at children
    Pointer = 0x00,
    /// Leaf node, values are user data
    Leaf = 0x01,
}

/// A decoded node; entries are borrowed out of its buffer
#[derive(Debug)]
pub struct Node {
    kind: NodeKind,
    data: Vec<u8>,
}

/// One key/value record inside a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeEntry<'a> {
    pub key: &'a [u8],
    pub value: &'a [u8],
}

impl Node {
    /// Load and verify the node chunk at `pointer`
    pub fn read(file: &StorageFile, pointer: u64) -> Result<Self> {
        if pointer >= file.len() {
            return Err(FoldError::TraversalFailure(format!(
                "node pointer {} beyond file extent {}",
                pointer,
                file.len()
            )));
        }

        let (prefix, data_pos) = file.read_skipping_prefixes(pointer, CHUNK_PREFIX_SIZE)?;
        let raw_len = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
        let expected_crc = u32::from_be_bytes([prefix[4], prefix[5], prefix[6], prefix[7]]);

        if raw_len & COMPRESSED_FLAG != 0 {
            return Err(FoldError::TraversalFailure(format!(
                "node at {} is compressed; no decompressor is available",
                pointer
            )));
        }

        let len = raw_len as usize;
        if data_pos + len as u64 > file.len() {
            return Err(FoldError::TraversalFailure(format!(
                "node at {} declares {} bytes, past file extent {}",
                pointer,
                len,
                file.len()
            )));
        }

        let (data, _) = file.read_skipping_prefixes(data_pos, len)?;

        let actual_crc = crc32fast::hash(&data);
        if actual_crc != expected_crc {
            return Err(FoldError::ChecksumMismatch {
                offset: pointer,
                expected: expected_crc,
                actual: actual_crc,
            });
        }

        file.note_chunk_read();
        tracing::trace!("Loaded node at {} ({} bytes)", pointer, len);

        Self::decode(data)
    }

    /// Interpret a verified chunk payload
    pub fn decode(data: Vec<u8>) -> Result<Self> {
        let kind = match data.first().copied() {
            Some(0x00) => NodeKind::Pointer,
            Some(0x01) => NodeKind::Leaf,
            Some(other) => {
                return Err(FoldError::TraversalFailure(format!(
                    "unknown node kind 0x{:02x}",
                    other
                )))
            }
            None => {
                return Err(FoldError::TraversalFailure(
                    "empty node chunk".to_string(),
                ))
            }
        };

        Ok(Self { kind, data })
    }

    /// Serialize a node payload (kind byte + entries)
    pub fn encode(kind: NodeKind, entries: &[(&[u8], &[u8])]) -> Result<Vec<u8>> {
        let body: usize = entries
            .iter()
            .map(|(k, v)| KV_LENGTH_SIZE + k.len() + v.len())
            .sum();

        let mut out = Vec::with_capacity(1 + body);
        out.push(kind as u8);

        for (key, value) in entries {
            if key.len() > MAX_KEY_LEN || value.len() > MAX_VALUE_LEN {
                return Err(FoldError::TraversalFailure(format!(
                    "entry too large: key {} bytes (max {}), value {} bytes (max {})",
                    key.len(),
                    MAX_KEY_LEN,
                    value.len(),
                    MAX_VALUE_LEN
                )));
            }
            out.extend_from_slice(&encode_kv_length(key.len(), value.len()));
            out.extend_from_slice(key);
            out.extend_from_slice(value);
        }

        Ok(out)
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_leaf(&self) -> bool {
        self.kind == NodeKind::Leaf
    }

    /// Iterate entries in stored order
    pub fn entries(&self) -> NodeEntries<'_> {
        NodeEntries {
            data: &self.data,
            pos: 1,
        }
    }
}

/// Iterator over the entries of a node
pub struct NodeEntries<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> NodeEntries<'a> {
    fn truncated(&mut self, what: &str) -> FoldError {
        let at = self.pos;
        // Nothing after a truncated entry is trustworthy
        self.pos = self.data.len();
        FoldError::TraversalFailure(format!("truncated node entry {} at byte {}", what, at))
    }
}

impl<'a> Iterator for NodeEntries<'a> {
    type Item = Result<NodeEntry<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.data.len() {
            return None;
        }

        if self.pos + KV_LENGTH_SIZE > self.data.len() {
            return Some(Err(self.truncated("length prefix")));
        }

        let (key_len, value_len) = decode_kv_length(&self.data[self.pos..]);
        let key_start = self.pos + KV_LENGTH_SIZE;
        let value_start = key_start + key_len;
        let end = value_start + value_len;

        if end > self.data.len() {
            return Some(Err(self.truncated("body")));
        }

        self.pos = end;

        Some(Ok(NodeEntry {
            key: &self.data[key_start..value_start],
            value: &self.data[value_start..end],
        }))
    }
}
