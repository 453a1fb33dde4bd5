//! Storage File
//!
//! Read-only handle over a view index file with a positional read primitive.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{FoldError, Result};

use super::BLOCK_SIZE;

/// Shared read-only view index file
///
/// ## Concurrency:
/// - Reads are positional (`pread`), so there is no shared cursor
/// - Any number of threads may read through one `Arc<StorageFile>`
/// - Counters are atomics, used for diagnostics and tests
pub struct StorageFile {
    /// Path the file was opened from
    path: PathBuf,
    /// Underlying OS handle (never written)
    file: File,
    /// File length at open time, the extent every pointer is checked against
    len: u64,
    /// Number of positional reads issued
    reads: AtomicU64,
    /// Number of node chunks loaded
    chunks: AtomicU64,
}

impl StorageFile {
    /// Open a view index file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();

        tracing::debug!("Opened {} ({} bytes)", path.display(), len);

        Ok(Self {
            path: path.to_path_buf(),
            file,
            len,
            reads: AtomicU64::new(0),
            chunks: AtomicU64::new(0),
        })
    }

    /// Fill `buf` from `offset`
    ///
    /// Anything short of a full buffer is a `ReadFailure`.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<()> {
        self.reads.fetch_add(1, Ordering::Relaxed);

        let mut filled = 0;
        while filled < buf.len() {
            match pread(&self.file, &mut buf[filled..], offset + filled as u64) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(FoldError::Io(e)),
            }
        }

        if filled != buf.len() {
            return Err(FoldError::ReadFailure {
                offset,
                expected: buf.len(),
                actual: filled,
            });
        }

        Ok(())
    }

    /// Read `len` logical bytes starting at `offset`, dropping the marker
    /// byte of every block boundary the range crosses.
    ///
    /// Returns the bytes and the file offset just past them.
    pub fn read_skipping_prefixes(&self, offset: u64, len: usize) -> Result<(Vec<u8>, u64)> {
        let mut out = vec![0u8; len];
        let mut pos = offset;
        let mut filled = 0;

        while filled < len {
            let block_offset = pos % BLOCK_SIZE;
            if block_offset == 0 {
                pos += 1;
                continue;
            }

            let room = (BLOCK_SIZE - block_offset) as usize;
            let take = room.min(len - filled);
            self.read_at(&mut out[filled..filled + take], pos)?;

            filled += take;
            pos += take as u64;
        }

        Ok((out, pos))
    }

    pub(crate) fn note_chunk_read(&self) {
        self.chunks.fetch_add(1, Ordering::Relaxed);
    }

    /// File length captured at open
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Positional reads issued so far
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Node chunks loaded so far
    pub fn chunk_read_count(&self) -> u64 {
        self.chunks.load(Ordering::Relaxed)
    }
}

#[cfg(unix)]
fn pread(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

#[cfg(windows)]
fn pread(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}
