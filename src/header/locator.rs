//! Header Locator
//!
//! Backward scan for the newest block carrying a valid header marker.
//!
//! Walking from the tail toward offset 0:
//! - marker 1 ends the scan: the first header met is the newest commit
//! - marker 0 is skipped silently
//! - any other marker is remembered as the last failure, the scan goes on
//!   because an older commit may still be intact
//! - a read that cannot deliver the marker byte aborts the scan

use crate::error::{FoldError, Result};
use crate::storage::{align_down, StorageFile, BLOCK_SIZE, MARKER_EMPTY, MARKER_HEADER};

/// One block offset and the marker byte found there
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderCandidate {
    pub offset: u64,
    pub marker: u8,
}

/// Classification of a candidate's marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    Empty,
    Header,
    Corrupt(u8),
}

impl HeaderCandidate {
    /// Read the marker byte of the block at `offset`
    pub fn read(file: &StorageFile, offset: u64) -> Result<Self> {
        debug_assert_eq!(offset % BLOCK_SIZE, 0);
        let mut marker = [0u8; 1];
        file.read_at(&mut marker, offset)?;
        Ok(Self {
            offset,
            marker: marker[0],
        })
    }

    pub fn kind(&self) -> CandidateKind {
        match self.marker {
            MARKER_EMPTY => CandidateKind::Empty,
            MARKER_HEADER => CandidateKind::Header,
            other => CandidateKind::Corrupt(other),
        }
    }
}

/// Outcome of a scan plus what it walked over
#[derive(Debug)]
pub struct LocateReport {
    /// Block the scan started from
    pub start_block: u64,
    pub blocks_scanned: u64,
    pub empty_blocks: u64,
    pub corrupt_blocks: u64,
    /// Offset of the newest header block, or why none was usable
    pub result: Result<u64>,
}

/// Find the newest header at or before `start_offset`
pub fn locate(file: &StorageFile, start_offset: u64) -> Result<u64> {
    scan(file, start_offset).result
}

/// Like [`locate`], keeping per-block counters
pub fn scan(file: &StorageFile, start_offset: u64) -> LocateReport {
    let start_block = align_down(start_offset);
    let mut report = LocateReport {
        start_block,
        blocks_scanned: 0,
        empty_blocks: 0,
        corrupt_blocks: 0,
        result: Err(FoldError::NoHeaderFound),
    };

    // Last-seen failure, overwritten by every corrupt marker
    let mut last_failure = FoldError::NoHeaderFound;
    let mut pos = start_block;

    loop {
        report.blocks_scanned += 1;

        let candidate = match HeaderCandidate::read(file, pos) {
            Ok(candidate) => candidate,
            Err(e) => {
                tracing::error!("Header scan aborted at block {}: {}", pos, e);
                report.result = Err(e);
                return report;
            }
        };

        match candidate.kind() {
            CandidateKind::Header => {
                tracing::debug!(
                    "Header found at {} after scanning {} blocks",
                    pos,
                    report.blocks_scanned
                );
                report.result = Ok(pos);
                return report;
            }
            CandidateKind::Empty => {
                report.empty_blocks += 1;
            }
            CandidateKind::Corrupt(marker) => {
                tracing::warn!("Corrupt header marker 0x{:02x} at block {}", marker, pos);
                report.corrupt_blocks += 1;
                last_failure = FoldError::CorruptHeader {
                    offset: pos,
                    marker,
                };
            }
        }

        if pos == 0 {
            break;
        }
        pos -= BLOCK_SIZE;
    }

    report.result = Err(last_failure);
    report
}
