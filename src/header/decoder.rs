//! Header Decoder
//!
//! Turns the chunk behind a header marker into an `IndexHeader`.

use crate::btree::NodePointer;
use crate::error::{FoldError, Result};
use crate::storage::{StorageFile, CHUNK_PREFIX_SIZE};

use super::{IndexHeader, ViewState, HEADER_VERSION};

/// The declared header length also counts the checksum
const CRC_SIZE: u32 = 4;

/// Decode the header whose marker byte sits at `header_offset`
///
/// The declared length is checked against `max_header_size` before any
/// payload byte is read.
pub fn decode(file: &StorageFile, header_offset: u64, max_header_size: usize) -> Result<IndexHeader> {
    let (prefix, payload_pos) = file.read_skipping_prefixes(header_offset + 1, CHUNK_PREFIX_SIZE)?;
    let declared = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
    let expected_crc = u32::from_be_bytes([prefix[4], prefix[5], prefix[6], prefix[7]]);

    if declared < CRC_SIZE {
        return Err(FoldError::MalformedHeader(format!(
            "declared length {} is smaller than its checksum",
            declared
        )));
    }

    let payload_len = (declared - CRC_SIZE) as usize;
    if payload_len > max_header_size {
        return Err(FoldError::HeaderTooLarge {
            declared: payload_len,
            max: max_header_size,
        });
    }

    if payload_pos + payload_len as u64 > file.len() {
        return Err(FoldError::MalformedHeader(format!(
            "header at {} runs past end of file ({} payload bytes declared)",
            header_offset, payload_len
        )));
    }

    let (payload, _) = file.read_skipping_prefixes(payload_pos, payload_len)?;

    let actual_crc = crc32fast::hash(&payload);
    if actual_crc != expected_crc {
        return Err(FoldError::ChecksumMismatch {
            offset: header_offset,
            expected: expected_crc,
            actual: actual_crc,
        });
    }

    let header = parse_payload(&payload, file.len())?;
    tracing::debug!(
        "Decoded header at {}: {} views, {} partitions",
        header_offset,
        header.num_views(),
        header.num_partitions
    );

    Ok(header)
}

/// Frame a header payload as `[len][crc][payload]` (marker not included)
pub fn encode_chunk(header: &IndexHeader) -> Vec<u8> {
    let payload = header.encode();
    let mut out = Vec::with_capacity(CHUNK_PREFIX_SIZE + payload.len());
    out.extend_from_slice(&(payload.len() as u32 + CRC_SIZE).to_be_bytes());
    out.extend_from_slice(&crc32fast::hash(&payload).to_be_bytes());
    out.extend_from_slice(&payload);
    out
}

fn parse_payload(payload: &[u8], file_len: u64) -> Result<IndexHeader> {
    let mut cursor = Cursor::new(payload);

    let version = cursor.u8("version")?;
    if version != HEADER_VERSION {
        return Err(FoldError::MalformedHeader(format!(
            "unsupported header version {}",
            version
        )));
    }

    let num_partitions = cursor.u16("partition count")?;
    let id_root = cursor.state("id tree state")?;

    let num_views = cursor.u8("view count")? as usize;
    if num_views == 0 {
        return Err(FoldError::MalformedHeader(
            "header declares no views".to_string(),
        ));
    }

    let mut views = Vec::with_capacity(num_views);
    for _ in 0..num_views {
        views.push(ViewState::new(cursor.state("view state")?));
    }

    if cursor.remaining() != 0 {
        return Err(FoldError::MalformedHeader(format!(
            "{} trailing bytes after view table",
            cursor.remaining()
        )));
    }

    let roots = id_root.iter().chain(views.iter().filter_map(|v| v.root.as_ref()));
    for root in roots {
        if root.pointer >= file_len {
            return Err(FoldError::MalformedHeader(format!(
                "root pointer {} outside file extent {}",
                root.pointer, file_len
            )));
        }
    }

    Ok(IndexHeader {
        version,
        num_partitions,
        id_root,
        views,
    })
}

/// Bounds-checked reader over the payload
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(FoldError::MalformedHeader(format!(
                "payload too short for {}: need {} bytes at {}, have {}",
                what,
                n,
                self.pos,
                self.remaining()
            )));
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn u8(&mut self, what: &str) -> Result<u8> {
        Ok(self.take(1, what)?[0])
    }

    fn u16(&mut self, what: &str) -> Result<u16> {
        let b = self.take(2, what)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Length-prefixed tree state; zero length means no tree
    fn state(&mut self, what: &str) -> Result<Option<NodePointer>> {
        let len = self.u16(what)? as usize;
        if len == 0 {
            return Ok(None);
        }
        NodePointer::decode(self.take(len, what)?).map(Some)
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}
