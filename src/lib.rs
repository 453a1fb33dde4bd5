//! # viewfold
//!
//! Crash-safe reader for append-only view index files with:
//! - Backward header recovery that tolerates torn tail writes
//! - Checksummed, size-bounded header decoding
//! - Bounded, ordered B+tree folds the consumer can stop at any entry
//! - HTTP streaming of view rows with backpressure
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      HTTP Server                             │
//! │            (Worker pool, streamed row bodies)                │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                     ViewIndex                                │
//! │           (Recovered header, view roots)                     │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │   Header    │          │   B+tree    │
//!   │ (Locate +   │          │ (Traversal) │
//!   │  Decode)    │          └──────┬──────┘
//!   └──────┬──────┘                 │
//!          └────────────┬───────────┘
//!                       ▼
//!               ┌─────────────┐
//!               │   Storage   │
//!               │ (Blocks)    │
//!               └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod storage;
pub mod header;
pub mod btree;
pub mod index;
pub mod protocol;
pub mod network;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{FoldError, Result};
pub use config::Config;
pub use index::{FoldSummary, ViewIndex};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of viewfold
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
