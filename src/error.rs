//! Error types for viewfold
//!
//! Provides a unified error type for recovery, decoding, and traversal.

use thiserror::Error;

/// Result type alias using FoldError
pub type Result<T> = std::result::Result<T, FoldError>;

/// Unified error type for viewfold operations
#[derive(Debug, Error)]
pub enum FoldError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The read primitive delivered fewer bytes than requested
    #[error("Read failure at offset {offset}: expected {expected} bytes, got {actual}")]
    ReadFailure {
        offset: u64,
        expected: usize,
        actual: usize,
    },

    // -------------------------------------------------------------------------
    // Recovery Errors
    // -------------------------------------------------------------------------
    #[error("No header found")]
    NoHeaderFound,

    #[error("Corrupt header marker 0x{marker:02x} at offset {offset}")]
    CorruptHeader { offset: u64, marker: u8 },

    // -------------------------------------------------------------------------
    // Decode Errors
    // -------------------------------------------------------------------------
    #[error("Header too large: {declared} bytes (max {max})")]
    HeaderTooLarge { declared: usize, max: usize },

    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    #[error("Checksum mismatch at offset {offset}: expected 0x{expected:08x}, got 0x{actual:08x}")]
    ChecksumMismatch {
        offset: u64,
        expected: u32,
        actual: u32,
    },

    // -------------------------------------------------------------------------
    // Traversal Errors
    // -------------------------------------------------------------------------
    #[error("Traversal failure: {0}")]
    TraversalFailure(String),

    #[error("View {view} out of range (index has {num_views} views)")]
    ViewOutOfRange { view: usize, num_views: usize },

    // -------------------------------------------------------------------------
    // Write Errors
    // -------------------------------------------------------------------------
    #[error("Chunk of {size} bytes exceeds the {max} byte length field")]
    ChunkTooLarge { size: usize, max: usize },

    // -------------------------------------------------------------------------
    // Transport Errors
    // -------------------------------------------------------------------------
    #[error("Network error: {0}")]
    Network(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl FoldError {
    /// True for outcomes of locating or decoding a header.
    ///
    /// Any of these means no root pointer can be trusted.
    pub fn is_recovery_error(&self) -> bool {
        matches!(
            self,
            FoldError::NoHeaderFound
                | FoldError::CorruptHeader { .. }
                | FoldError::HeaderTooLarge { .. }
                | FoldError::MalformedHeader(_)
                | FoldError::ChecksumMismatch { .. }
                | FoldError::ReadFailure { .. }
                | FoldError::Io(_)
        )
    }

    /// True when the read primitive itself failed
    pub fn is_fatal_read(&self) -> bool {
        matches!(self, FoldError::ReadFailure { .. } | FoldError::Io(_))
    }
}
