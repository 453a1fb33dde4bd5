//! View File Builder
//!
//! Writes brand-new view index files in the on-disk layout the readers
//! expect. Used to produce fixtures; it never reopens an existing file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::btree::{Node, NodeKind, NodePointer, COMPRESSED_FLAG};
use crate::error::{FoldError, Result};
use crate::header::{encode_chunk, IndexHeader};

use super::{BLOCK_SIZE, MARKER_EMPTY, MARKER_HEADER};

/// Builder for fresh view index files
pub struct ViewFileBuilder {
    /// Output file path
    path: PathBuf,
    /// Buffered writer for performance
    writer: BufWriter<File>,
    /// Current file offset
    pos: u64,
    /// Max entries per node
    fanout: usize,
}

impl ViewFileBuilder {
    /// Entries per node unless overridden
    pub const DEFAULT_FANOUT: usize = 64;

    /// Create (or truncate) the file at `path`
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            pos: 0,
            fanout: Self::DEFAULT_FANOUT,
        })
    }

    /// Set the max entries per node (at least 2)
    pub fn fanout(mut self, fanout: usize) -> Self {
        self.fanout = fanout.max(2);
        self
    }

    /// Current file offset
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Write data bytes, emitting a `0` marker at every block boundary
    pub fn write_data(&mut self, bytes: &[u8]) -> Result<()> {
        let mut rest = bytes;
        while !rest.is_empty() {
            self.skip_boundary()?;
            let room = (BLOCK_SIZE - self.pos % BLOCK_SIZE) as usize;
            let take = room.min(rest.len());
            self.writer.write_all(&rest[..take])?;
            self.pos += take as u64;
            rest = &rest[take..];
        }
        Ok(())
    }

    /// Write `[len][crc][data]` and return the chunk offset
    pub fn write_chunk(&mut self, data: &[u8]) -> Result<u64> {
        if data.len() as u64 >= COMPRESSED_FLAG as u64 {
            return Err(FoldError::ChunkTooLarge {
                size: data.len(),
                max: COMPRESSED_FLAG as usize - 1,
            });
        }

        self.skip_boundary()?;
        let offset = self.pos;

        let mut framed = Vec::with_capacity(8 + data.len());
        framed.extend_from_slice(&(data.len() as u32).to_be_bytes());
        framed.extend_from_slice(&crc32fast::hash(data).to_be_bytes());
        framed.extend_from_slice(data);
        self.write_data(&framed)?;

        Ok(offset)
    }

    /// Write one node; returns its offset and on-disk size
    pub fn write_node<K, V>(&mut self, kind: NodeKind, entries: &[(K, V)]) -> Result<(u64, u64)>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let pairs: Vec<(&[u8], &[u8])> = entries
            .iter()
            .map(|(k, v)| (k.as_ref(), v.as_ref()))
            .collect();
        let data = Node::encode(kind, &pairs)?;
        let offset = self.write_chunk(&data)?;
        Ok((offset, self.pos - offset))
    }

    /// Build a tree bottom-up from entries already sorted in collation order
    ///
    /// Returns `None` for an empty entry list.
    pub fn write_tree<K, V>(&mut self, entries: &[(K, V)]) -> Result<Option<NodePointer>>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let mut level: Vec<(Vec<u8>, NodePointer)> = Vec::new();

        for chunk in entries.chunks(self.fanout) {
            let (pointer, size) = self.write_node(NodeKind::Leaf, chunk)?;
            let last_key = chunk[chunk.len() - 1].0.as_ref().to_vec();
            level.push((last_key, NodePointer::new(pointer, size)));
        }

        while level.len() > 1 {
            let mut next = Vec::with_capacity(level.len() / self.fanout + 1);

            for group in level.chunks(self.fanout) {
                let pairs: Vec<(&[u8], Vec<u8>)> = group
                    .iter()
                    .map(|(k, p)| (k.as_slice(), p.encode()))
                    .collect();
                let (pointer, size) = self.write_node(NodeKind::Pointer, &pairs)?;
                let subtree: u64 = size + group.iter().map(|(_, p)| p.subtree_size).sum::<u64>();
                let last_key = group[group.len() - 1].0.clone();
                next.push((last_key, NodePointer::new(pointer, subtree)));
            }

            level = next;
        }

        Ok(level.pop().map(|(_, root)| root))
    }

    /// Append a block-aligned commit header; returns its offset
    pub fn commit(&mut self, header: &IndexHeader) -> Result<u64> {
        let offset = self.write_marker(MARKER_HEADER)?;
        self.write_data(&encode_chunk(header))?;
        Ok(offset)
    }

    /// Pad to the next block and start it with an arbitrary marker byte
    ///
    /// Lets fixtures plant empty or corrupt header candidates.
    pub fn write_marker(&mut self, marker: u8) -> Result<u64> {
        self.pad_to_block()?;
        let offset = self.pos;
        self.writer.write_all(&[marker])?;
        self.pos += 1;
        Ok(offset)
    }

    /// Flush and sync; returns the path written
    pub fn finish(self) -> Result<PathBuf> {
        let file = self.writer.into_inner().map_err(|e| {
            FoldError::Io(std::io::Error::new(
                e.error().kind(),
                format!("Failed to flush view file: {}", e.error()),
            ))
        })?;
        file.sync_all()?;

        tracing::debug!("Wrote {} ({} bytes)", self.path.display(), self.pos);
        Ok(self.path)
    }

    fn pad_to_block(&mut self) -> Result<()> {
        let within = self.pos % BLOCK_SIZE;
        if within != 0 {
            let pad = (BLOCK_SIZE - within) as usize;
            self.writer.write_all(&vec![0u8; pad])?;
            self.pos += pad as u64;
        }
        Ok(())
    }

    fn skip_boundary(&mut self) -> Result<()> {
        if self.pos % BLOCK_SIZE == 0 {
            self.writer.write_all(&[MARKER_EMPTY])?;
            self.pos += 1;
        }
        Ok(())
    }
}
