//! Storage Module
//!
//! Block-structured, append-only view index files.
//!
//! ## Responsibilities
//! - Positional reads against a shared read-only handle
//! - Skipping block prefix bytes inside byte ranges
//! - Writing fresh fixture files in the same layout (tests, benches, tooling)
//!
//! ## File Layout
//! ```text
//! ┌────────────────────────── block (4096) ──────────────────────────┐
//! │ Marker (1) │                    data ...                         │
//! └────────────┴─────────────────────────────────────────────────────┘
//!   Marker 0 = data block, 1 = commit header starts here, other = corrupt
//!
//! Chunks (nodes, headers) are written back to back and may span blocks;
//! the marker byte at each crossed block boundary is not part of the chunk.
//! ```

mod builder;
mod file;

pub use builder::ViewFileBuilder;
pub use file::StorageFile;

/// Size of one block in bytes
pub const BLOCK_SIZE: u64 = 4096;

/// Marker byte: block holds no header
pub const MARKER_EMPTY: u8 = 0;

/// Marker byte: block starts with a commit header
pub const MARKER_HEADER: u8 = 1;

/// Chunk prefix: length (4) + CRC32 (4)
pub(crate) const CHUNK_PREFIX_SIZE: usize = 8;

/// Round an offset down to the start of its block
pub fn align_down(offset: u64) -> u64 {
    offset - offset % BLOCK_SIZE
}
