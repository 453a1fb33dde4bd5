//! Index Module
//!
//! The recovery driver: opens a view index file, recovers its newest
//! commit, and runs traversals against the views it describes.
//!
//! ## Responsibilities
//! - Locate and decode the newest header at open
//! - Refuse to serve anything if recovery fails
//! - Resolve views to root pointers and run folds / lookups

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::btree::{
    traverse, KeyComparator, KeySelection, Outcome, Step, TraversalRequest, ViewKeyCollator,
};
use crate::config::Config;
use crate::error::{FoldError, Result};
use crate::header::{self, IndexHeader};
use crate::storage::StorageFile;

/// A recovered view index, ready for traversals
///
/// ## Concurrency:
/// - Immutable after `open`; share it through `Arc<ViewIndex>`
/// - Every traversal is independent and reads through the shared file
pub struct ViewIndex {
    /// Shared read-only file handle
    file: Arc<StorageFile>,
    /// Offset of the header block recovery settled on
    header_offset: u64,
    /// Decoded commit record
    header: IndexHeader,
    /// Blocks whose marker was read while locating the header
    blocks_scanned: u64,
    /// Data blocks passed over on the way
    empty_blocks: u64,
    /// Corrupt markers skipped while locating the header
    corrupt_blocks_skipped: u64,
    /// Ordering the view trees were built with
    comparator: Arc<dyn KeyComparator>,
}

/// Result of one traversal over a view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoldSummary {
    pub outcome: Outcome,
    /// Entries accepted by the consumer
    pub visited: u64,
}

impl ViewIndex {
    /// Open `path` and recover its newest header
    ///
    /// On startup:
    /// 1. Open the file read-only
    /// 2. Scan block markers backward from the tail
    /// 3. Decode and validate the header found
    pub fn open(path: &Path, max_header_size: usize) -> Result<Self> {
        let file = StorageFile::open(path)?;
        if file.is_empty() {
            return Err(FoldError::NoHeaderFound);
        }

        // The last byte's block is the newest possible header position
        let report = header::scan(&file, file.len() - 1);
        let (blocks_scanned, empty_blocks) = (report.blocks_scanned, report.empty_blocks);
        let corrupt_blocks_skipped = report.corrupt_blocks;
        let header_offset = report.result?;

        let header = header::decode(&file, header_offset, max_header_size)?;

        tracing::info!(
            "Recovered {} at header {} ({} views, {} corrupt blocks skipped)",
            path.display(),
            header_offset,
            header.num_views(),
            corrupt_blocks_skipped
        );

        Ok(Self {
            file: Arc::new(file),
            header_offset,
            header,
            blocks_scanned,
            empty_blocks,
            corrupt_blocks_skipped,
            comparator: Arc::new(ViewKeyCollator),
        })
    }

    /// Open the index named by a config
    pub fn open_with(config: &Config) -> Result<Self> {
        Self::open(&config.index_path, config.max_header_size)
    }

    /// Replace the key ordering used by traversals
    pub fn with_comparator(mut self, comparator: Arc<dyn KeyComparator>) -> Self {
        self.comparator = comparator;
        self
    }

    /// Root pointer of `view`; `None` when the view holds no rows
    pub fn view_root(&self, view: usize) -> Result<Option<u64>> {
        if view >= self.header.num_views() {
            return Err(FoldError::ViewOutOfRange {
                view,
                num_views: self.header.num_views(),
            });
        }
        Ok(self.header.root_pointer(view))
    }

    /// Run a traversal over `view`, feeding `callback`
    pub fn query<F>(&self, view: usize, selection: KeySelection, callback: F) -> Result<FoldSummary>
    where
        F: FnMut(&[u8], &[u8]) -> Step,
    {
        let root = match self.view_root(view)? {
            Some(root) => root,
            None => {
                return Ok(FoldSummary {
                    outcome: Outcome::Completed,
                    visited: 0,
                })
            }
        };

        let mut request = TraversalRequest::new(&*self.comparator, selection, callback);
        let outcome = traverse(&self.file, root, &mut request)?;

        Ok(FoldSummary {
            outcome,
            visited: request.visited(),
        })
    }

    /// Ordered fold over `view` between inclusive bounds
    pub fn fold<F>(
        &self,
        view: usize,
        start: Option<Vec<u8>>,
        end: Option<Vec<u8>>,
        callback: F,
    ) -> Result<FoldSummary>
    where
        F: FnMut(&[u8], &[u8]) -> Step,
    {
        self.query(view, KeySelection::Range { start, end }, callback)
    }

    /// Point lookups in `view`
    pub fn lookup<F>(&self, view: usize, keys: Vec<Vec<u8>>, callback: F) -> Result<FoldSummary>
    where
        F: FnMut(&[u8], &[u8]) -> Step,
    {
        self.query(view, KeySelection::Keys(keys), callback)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn header(&self) -> &IndexHeader {
        &self.header
    }

    pub fn header_offset(&self) -> u64 {
        self.header_offset
    }

    pub fn blocks_scanned(&self) -> u64 {
        self.blocks_scanned
    }

    pub fn empty_blocks(&self) -> u64 {
        self.empty_blocks
    }

    pub fn corrupt_blocks_skipped(&self) -> u64 {
        self.corrupt_blocks_skipped
    }

    pub fn file(&self) -> &Arc<StorageFile> {
        &self.file
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

impl fmt::Display for ViewIndex {
    /// Plain-text header summary
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "file: {}", self.path().display())?;
        writeln!(f, "file_size: {}", self.file.len())?;
        writeln!(f, "header_offset: {}", self.header_offset)?;
        writeln!(f, "version: {}", self.header.version)?;
        writeln!(f, "partitions: {}", self.header.num_partitions)?;
        writeln!(f, "num_views: {}", self.header.num_views())?;
        for (i, view) in self.header.views.iter().enumerate() {
            match &view.root {
                Some(root) => writeln!(
                    f,
                    "view {}: root {} (subtree {} bytes)",
                    i, root.pointer, root.subtree_size
                )?,
                None => writeln!(f, "view {}: empty", i)?,
            }
        }
        Ok(())
    }
}

/// The one wording every caller uses for a failed open
pub fn open_error_message(path: &Path, error: &FoldError) -> String {
    format!("failed to open view index {}: {}", path.display(), error)
}
