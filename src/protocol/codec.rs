//! Row codec
//!
//! Turns stored view entries into framed text rows, and back (clients, tests).

use bytes::{BufMut, Bytes, BytesMut};

use crate::btree::ViewKey;
use crate::error::{FoldError, Result};

/// Partition id prefix on every stored row value
const PARTITION_SIZE: usize = 2;

/// One view row borrowed from a node entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Row<'a> {
    pub key: &'a [u8],
    pub doc_id: &'a [u8],
    pub partition: u16,
    pub value: &'a [u8],
}

/// A row parsed back from its framed form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedRow {
    pub key: Vec<u8>,
    pub doc_id: Vec<u8>,
    pub value: Vec<u8>,
}

impl<'a> Row<'a> {
    /// Split a stored (key, value) pair into its row fields
    pub fn from_entry(key: &'a [u8], value: &'a [u8]) -> Result<Self> {
        let view_key = ViewKey::parse(key).ok_or_else(|| {
            FoldError::Protocol(format!("entry key of {} bytes is not a view key", key.len()))
        })?;

        if value.len() < PARTITION_SIZE {
            return Err(FoldError::Protocol(format!(
                "entry value of {} bytes lacks a partition id",
                value.len()
            )));
        }

        Ok(Self {
            key: view_key.json,
            doc_id: view_key.doc_id,
            partition: u16::from_be_bytes([value[0], value[1]]),
            value: &value[PARTITION_SIZE..],
        })
    }

    /// Append the framed row to `buf`
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.reserve(self.key.len() + self.doc_id.len() + self.value.len() + 3);
        buf.put_slice(self.key);
        buf.put_u8(b'\t');
        buf.put_slice(self.doc_id);
        buf.put_u8(b'\t');
        buf.put_slice(self.value);
        buf.put_u8(b'\n');
    }
}

/// Frame a stored entry as one row chunk
pub fn encode_row(key: &[u8], value: &[u8]) -> Result<Bytes> {
    let row = Row::from_entry(key, value)?;
    let mut buf = BytesMut::new();
    row.encode_into(&mut buf);
    Ok(buf.freeze())
}

/// Parse one framed row (trailing newline optional)
pub fn decode_row(line: &[u8]) -> Result<OwnedRow> {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    let mut fields = line.splitn(3, |b| *b == b'\t');

    match (fields.next(), fields.next(), fields.next()) {
        (Some(key), Some(doc_id), Some(value)) => Ok(OwnedRow {
            key: key.to_vec(),
            doc_id: doc_id.to_vec(),
            value: value.to_vec(),
        }),
        _ => Err(FoldError::Protocol(format!(
            "row of {} bytes does not have three fields",
            line.len()
        ))),
    }
}

/// Build a stored row value: `[partition][json value]`
pub fn encode_view_value(partition: u16, json: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(PARTITION_SIZE + json.len());
    out.extend_from_slice(&partition.to_be_bytes());
    out.extend_from_slice(json);
    out
}
