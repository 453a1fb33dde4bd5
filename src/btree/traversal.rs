//! Bounded traversal
//!
//! Ordered walk of one tree, feeding matching entries to a consumer that
//! decides after every entry whether the walk goes on.
//!
//! ## Lifecycle
//! ```text
//! Idle ──▶ Scanning ◀──▶ Continuing
//!              │
//!              ├──▶ Completed        (no matching entries left)
//!              ├──▶ StoppedBySignal  (consumer returned StopSuccess / StopError)
//!              └──▶ Failed           (I/O or structural corruption)
//! ```
//!
//! A stop signal is honoured before anything else is read. Entries already
//! handed to the consumer stay delivered whatever happens afterwards.

use std::cmp::Ordering;

use crate::error::{FoldError, Result};
use crate::storage::StorageFile;

use super::collate::KeyComparator;
use super::node::{Node, NodeEntry};
use super::{get_u48, POINTER_SIZE};

/// Deepest tree the walker will descend into
pub const MAX_TREE_DEPTH: usize = 64;

/// Consumer verdict after each entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Keep going
    Continue,
    /// Consumer has what it needs (e.g. row budget spent)
    StopSuccess,
    /// Consumer cannot take more (e.g. downstream closed)
    StopError,
}

/// How a traversal that did not fail ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every matching entry was delivered
    Completed,
    /// Consumer returned `StopSuccess`
    Stopped,
    /// Consumer returned `StopError`
    Aborted,
}

/// Traversal lifecycle, observable on the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalState {
    Idle,
    Scanning,
    Continuing,
    Completed,
    StoppedBySignal,
    Failed,
}

/// Which entries a traversal visits
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySelection {
    /// Point lookups, sorted and de-duplicated with the request comparator
    Keys(Vec<Vec<u8>>),
    /// Ordered fold; `None` bounds are open, both bounds are inclusive
    Range {
        start: Option<Vec<u8>>,
        end: Option<Vec<u8>>,
    },
}

impl KeySelection {
    /// Fold over the whole tree
    pub fn all() -> Self {
        KeySelection::Range {
            start: None,
            end: None,
        }
    }

    pub fn is_fold(&self) -> bool {
        matches!(self, KeySelection::Range { .. })
    }
}

/// One traversal: comparator, selection, consumer, and its running counters
pub struct TraversalRequest<'c, F> {
    comparator: &'c dyn KeyComparator,
    selection: KeySelection,
    callback: F,
    visited: u64,
    state: TraversalState,
}

impl<'c, F> TraversalRequest<'c, F>
where
    F: FnMut(&[u8], &[u8]) -> Step,
{
    pub fn new(comparator: &'c dyn KeyComparator, selection: KeySelection, callback: F) -> Self {
        let selection = match selection {
            KeySelection::Keys(mut keys) => {
                keys.sort_by(|a, b| comparator.compare(a, b));
                keys.dedup_by(|a, b| comparator.compare(a, b) == Ordering::Equal);
                KeySelection::Keys(keys)
            }
            range => range,
        };

        Self {
            comparator,
            selection,
            callback,
            visited: 0,
            state: TraversalState::Idle,
        }
    }

    /// Ordered fold between two inclusive bounds
    pub fn fold(
        comparator: &'c dyn KeyComparator,
        start: Option<Vec<u8>>,
        end: Option<Vec<u8>>,
        callback: F,
    ) -> Self {
        Self::new(comparator, KeySelection::Range { start, end }, callback)
    }

    /// Point lookups for `keys`
    pub fn lookup(comparator: &'c dyn KeyComparator, keys: Vec<Vec<u8>>, callback: F) -> Self {
        Self::new(comparator, KeySelection::Keys(keys), callback)
    }

    /// Entries accepted by the consumer (`Continue` or `StopSuccess`)
    pub fn visited(&self) -> u64 {
        self.visited
    }

    pub fn state(&self) -> TraversalState {
        self.state
    }

    pub fn is_fold(&self) -> bool {
        self.selection.is_fold()
    }

    pub fn selection(&self) -> &KeySelection {
        &self.selection
    }
}

/// Walk the tree rooted at `root`, feeding the request's consumer
pub fn traverse<F>(
    file: &StorageFile,
    root: u64,
    request: &mut TraversalRequest<'_, F>,
) -> Result<Outcome>
where
    F: FnMut(&[u8], &[u8]) -> Step,
{
    let TraversalRequest {
        comparator,
        selection,
        callback,
        visited,
        state,
    } = request;

    *state = TraversalState::Scanning;

    let mut walk = Walk {
        file,
        cmp: *comparator,
        callback,
        visited,
        state,
        last_emitted: Vec::new(),
        emitted_any: false,
    };

    let flow = match selection {
        KeySelection::Range { start, end } => {
            walk.fold(root, start.as_deref(), end.as_deref(), 0)
        }
        KeySelection::Keys(keys) => walk.lookup(root, keys, 0),
    };

    match flow {
        Ok(Flow::Halt(outcome)) => {
            *walk.state = TraversalState::StoppedBySignal;
            tracing::debug!(
                "Traversal from {} stopped by consumer ({:?}) after {} entries",
                root,
                outcome,
                walk.visited
            );
            Ok(outcome)
        }
        Ok(Flow::Next) | Ok(Flow::RangeEnd) => {
            *walk.state = TraversalState::Completed;
            tracing::debug!("Traversal from {} completed, {} entries", root, walk.visited);
            Ok(Outcome::Completed)
        }
        Err(e) => {
            *walk.state = TraversalState::Failed;
            tracing::warn!(
                "Traversal from {} failed after {} entries: {}",
                root,
                walk.visited,
                e
            );
            Err(e)
        }
    }
}

/// Control flow between recursion levels
enum Flow {
    /// Keep walking siblings
    Next,
    /// Passed the end of the range
    RangeEnd,
    /// Consumer asked to stop
    Halt(Outcome),
}

struct Walk<'a, F> {
    file: &'a StorageFile,
    cmp: &'a dyn KeyComparator,
    callback: &'a mut F,
    visited: &'a mut u64,
    state: &'a mut TraversalState,
    last_emitted: Vec<u8>,
    emitted_any: bool,
}

impl<'a, F> Walk<'a, F>
where
    F: FnMut(&[u8], &[u8]) -> Step,
{
    fn fold(
        &mut self,
        pointer: u64,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        depth: usize,
    ) -> Result<Flow> {
        let node = self.load(pointer, depth)?;
        let cmp = self.cmp;
        let mut prev: Option<&[u8]> = None;

        for entry in node.entries() {
            let entry = entry?;
            check_order(cmp, prev, entry.key, pointer)?;
            prev = Some(entry.key);

            if let Some(start) = start {
                if cmp.compare(entry.key, start) == Ordering::Less {
                    continue;
                }
            }

            if node.is_leaf() {
                if let Some(end) = end {
                    if cmp.compare(entry.key, end) == Ordering::Greater {
                        return Ok(Flow::RangeEnd);
                    }
                }
                if let Some(outcome) = self.emit(entry)? {
                    return Ok(Flow::Halt(outcome));
                }
            } else {
                let child = child_pointer(entry.value, pointer)?;
                match self.fold(child, start, end, depth + 1)? {
                    Flow::Next => {}
                    flow => return Ok(flow),
                }
                // That child already held the greatest key in range
                if let Some(end) = end {
                    if cmp.compare(entry.key, end) != Ordering::Less {
                        return Ok(Flow::RangeEnd);
                    }
                }
            }
        }

        Ok(Flow::Next)
    }

    fn lookup(&mut self, pointer: u64, keys: &[Vec<u8>], depth: usize) -> Result<Flow> {
        let node = self.load(pointer, depth)?;
        let cmp = self.cmp;
        let mut rest = keys;
        let mut prev: Option<&[u8]> = None;

        for entry in node.entries() {
            if rest.is_empty() {
                break;
            }
            let entry = entry?;
            check_order(cmp, prev, entry.key, pointer)?;
            prev = Some(entry.key);

            if node.is_leaf() {
                // Lookup keys below this entry are absent from the tree
                while let Some(first) = rest.first() {
                    if cmp.compare(entry.key, first) == Ordering::Greater {
                        rest = &rest[1..];
                    } else {
                        break;
                    }
                }

                let hit = matches!(
                    rest.first(),
                    Some(first) if cmp.compare(entry.key, first) == Ordering::Equal
                );
                if hit {
                    rest = &rest[1..];
                    if let Some(outcome) = self.emit(entry)? {
                        return Ok(Flow::Halt(outcome));
                    }
                }
            } else {
                let covered = rest
                    .iter()
                    .take_while(|k| cmp.compare(entry.key, k) != Ordering::Less)
                    .count();
                if covered == 0 {
                    continue;
                }

                let child = child_pointer(entry.value, pointer)?;
                if let Flow::Halt(outcome) = self.lookup(child, &rest[..covered], depth + 1)? {
                    return Ok(Flow::Halt(outcome));
                }
                rest = &rest[covered..];
            }
        }

        Ok(Flow::Next)
    }

    fn load(&mut self, pointer: u64, depth: usize) -> Result<Node> {
        if depth >= MAX_TREE_DEPTH {
            return Err(FoldError::TraversalFailure(format!(
                "tree deeper than {} levels at node {}",
                MAX_TREE_DEPTH, pointer
            )));
        }
        *self.state = TraversalState::Scanning;
        Node::read(self.file, pointer)
    }

    /// Hand one entry to the consumer; `Some` means stop now
    fn emit(&mut self, entry: NodeEntry<'_>) -> Result<Option<Outcome>> {
        if self.emitted_any && self.cmp.compare(entry.key, &self.last_emitted) == Ordering::Less {
            return Err(FoldError::TraversalFailure(
                "entries out of key order across nodes".to_string(),
            ));
        }

        *self.state = TraversalState::Scanning;
        match (self.callback)(entry.key, entry.value) {
            Step::Continue => {
                *self.visited += 1;
                *self.state = TraversalState::Continuing;
            }
            Step::StopSuccess => {
                *self.visited += 1;
                return Ok(Some(Outcome::Stopped));
            }
            Step::StopError => return Ok(Some(Outcome::Aborted)),
        }

        self.last_emitted.clear();
        self.last_emitted.extend_from_slice(entry.key);
        self.emitted_any = true;

        Ok(None)
    }
}

fn check_order(
    cmp: &dyn KeyComparator,
    prev: Option<&[u8]>,
    key: &[u8],
    pointer: u64,
) -> Result<()> {
    match prev {
        Some(prev) if cmp.compare(prev, key) == Ordering::Greater => {
            Err(FoldError::TraversalFailure(format!(
                "node at {} has keys out of order",
                pointer
            )))
        }
        _ => Ok(()),
    }
}

fn child_pointer(value: &[u8], parent: u64) -> Result<u64> {
    if value.len() < POINTER_SIZE {
        return Err(FoldError::TraversalFailure(format!(
            "interior node at {} has a {}-byte child pointer",
            parent,
            value.len()
        )));
    }
    Ok(get_u48(value))
}
