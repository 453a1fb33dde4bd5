//! Header Module
//!
//! Commit headers: finding the newest one and decoding it.
//!
//! ## Responsibilities
//! - Walk block markers backward to the newest commit (`locator`)
//! - Bound, checksum, and parse the header payload (`decoder`)
//!
//! ## Header Chunk
//! ```text
//! block start
//! ┌────────────┬───────────────────────┬─────────────┬──────────────────┐
//! │ Marker=1   │ Len (4) = payload + 4 │ CRC32 (4)   │ Payload          │
//! └────────────┴───────────────────────┴─────────────┴──────────────────┘
//! Payload:
//!   Version (1) | Partitions (2) | IdStateLen (2) | IdState
//!   | NumViews (1) | [StateLen (2) | State] * NumViews
//! State = [Pointer: u48][SubtreeSize: u48][Reduce value], empty = no tree
//! ```

mod decoder;
mod locator;

pub use decoder::{decode, encode_chunk};
pub use locator::{locate, scan, CandidateKind, HeaderCandidate, LocateReport};

use crate::btree::NodePointer;

/// Header payload version written and accepted
pub const HEADER_VERSION: u8 = 1;

/// Decoded commit record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexHeader {
    pub version: u8,
    /// Partitions covered by the index
    pub num_partitions: u16,
    /// Root of the back-index (document id) tree, if any
    pub id_root: Option<NodePointer>,
    /// One entry per view; never empty once decoded
    pub views: Vec<ViewState>,
}

/// Per-view state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewState {
    /// Root of the view tree; `None` for a view with no rows
    pub root: Option<NodePointer>,
}

impl ViewState {
    pub fn new(root: Option<NodePointer>) -> Self {
        Self { root }
    }
}

impl IndexHeader {
    /// Header with the given view roots and no id tree
    pub fn with_views(views: Vec<ViewState>) -> Self {
        Self {
            version: HEADER_VERSION,
            num_partitions: 0,
            id_root: None,
            views,
        }
    }

    pub fn num_views(&self) -> usize {
        self.views.len()
    }

    /// Root pointer of view `index`, if that view has one
    pub fn root_pointer(&self, index: usize) -> Option<u64> {
        self.views
            .get(index)
            .and_then(|v| v.root.as_ref())
            .map(|r| r.pointer)
    }

    /// Serialize the payload (no length, checksum, or marker)
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(self.version);
        out.extend_from_slice(&self.num_partitions.to_be_bytes());
        put_state(&mut out, self.id_root.as_ref());
        out.push(self.views.len() as u8);
        for view in &self.views {
            put_state(&mut out, view.root.as_ref());
        }
        out
    }
}

fn put_state(out: &mut Vec<u8>, root: Option<&NodePointer>) {
    let state = root.map(NodePointer::encode).unwrap_or_default();
    out.extend_from_slice(&(state.len() as u16).to_be_bytes());
    out.extend_from_slice(&state);
}
