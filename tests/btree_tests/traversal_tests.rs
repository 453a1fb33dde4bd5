//! Tests for the bounded traversal engine
//!
//! These tests verify:
//! - Full folds visit every entry once, in order
//! - Stop signals halt the walk with no further reads
//! - Range bounds and point lookups
//! - Structural corruption fails the walk without retracting earlier entries

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use viewfold::btree::{
    traverse, KeyComparator, KeySelection, NodeKind, NodePointer, Outcome, RawCollator, Step,
    TraversalRequest, TraversalState,
};
use viewfold::storage::{StorageFile, ViewFileBuilder};
use viewfold::{FoldError, Result};

const ENTRY_COUNT: usize = 50;
const FANOUT: usize = 4;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_file() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("test.index");
    (temp_dir, path)
}

fn key(i: usize) -> Vec<u8> {
    format!("key{:02}", i).into_bytes()
}

/// Three-level tree of `ENTRY_COUNT` entries (13 leaves of up to 4)
fn build_tree(path: &Path) -> u64 {
    let entries: Vec<(Vec<u8>, Vec<u8>)> = (0..ENTRY_COUNT)
        .map(|i| (key(i), format!("val{:02}", i).into_bytes()))
        .collect();

    let mut builder = ViewFileBuilder::create(path).unwrap().fanout(FANOUT);
    let root = builder.write_tree(&entries).unwrap().unwrap();
    builder.finish().unwrap();
    root.pointer
}

/// Everything a traversal left behind
struct Trace {
    result: Result<Outcome>,
    keys: Vec<Vec<u8>>,
    visited: u64,
    state: TraversalState,
}

/// Run a traversal; `decide(n)` answers for the n-th entry (1-based)
fn run_with(
    file: &StorageFile,
    root: u64,
    comparator: &dyn KeyComparator,
    selection: KeySelection,
    mut decide: impl FnMut(usize) -> Step,
) -> Trace {
    let mut keys = Vec::new();
    let mut request = TraversalRequest::new(comparator, selection, |k: &[u8], _v: &[u8]| {
        keys.push(k.to_vec());
        decide(keys.len())
    });

    assert_eq!(request.state(), TraversalState::Idle);
    let result = traverse(file, root, &mut request);
    let visited = request.visited();
    let state = request.state();
    drop(request);

    Trace {
        result,
        keys,
        visited,
        state,
    }
}

fn run(file: &StorageFile, root: u64, selection: KeySelection) -> Trace {
    run_with(file, root, &RawCollator, selection, |_| Step::Continue)
}

fn range(start: Option<usize>, end: Option<usize>) -> KeySelection {
    KeySelection::Range {
        start: start.map(key),
        end: end.map(key),
    }
}

fn assert_traversal_failure(result: &Result<Outcome>) {
    match result {
        Err(FoldError::TraversalFailure(_)) => {}
        other => panic!("expected TraversalFailure, got {:?}", other),
    }
}

// =============================================================================
// Full Fold Tests
// =============================================================================

#[test]
fn test_full_fold_visits_every_entry_in_order() {
    let (_temp, path) = setup_temp_file();
    let root = build_tree(&path);
    let file = StorageFile::open(&path).unwrap();

    let trace = run(&file, root, KeySelection::all());

    assert_eq!(trace.result.unwrap(), Outcome::Completed);
    assert_eq!(trace.state, TraversalState::Completed);
    assert_eq!(trace.visited, ENTRY_COUNT as u64);
    let expected: Vec<Vec<u8>> = (0..ENTRY_COUNT).map(key).collect();
    assert_eq!(trace.keys, expected);
}

#[test]
fn test_fold_delivers_values() {
    let (_temp, path) = setup_temp_file();
    let root = build_tree(&path);
    let file = StorageFile::open(&path).unwrap();

    let mut pairs = Vec::new();
    let mut request = TraversalRequest::fold(&RawCollator, None, None, |k: &[u8], v: &[u8]| {
        pairs.push((k.to_vec(), v.to_vec()));
        Step::Continue
    });
    traverse(&file, root, &mut request).unwrap();
    drop(request);

    assert_eq!(pairs.len(), ENTRY_COUNT);
    assert_eq!(pairs[17], (key(17), b"val17".to_vec()));
}

#[test]
fn test_single_leaf_tree() {
    let (_temp, path) = setup_temp_file();
    let mut builder = ViewFileBuilder::create(&path).unwrap();
    let root = builder
        .write_tree(&[(b"only", b"one")])
        .unwrap()
        .unwrap();
    builder.finish().unwrap();
    let file = StorageFile::open(&path).unwrap();

    let trace = run(&file, root.pointer, KeySelection::all());

    assert_eq!(trace.result.unwrap(), Outcome::Completed);
    assert_eq!(trace.keys, vec![b"only".to_vec()]);
    assert_eq!(file.chunk_read_count(), 1);
}

#[test]
fn test_values_spanning_blocks() {
    let (_temp, path) = setup_temp_file();
    let entries: Vec<(Vec<u8>, Vec<u8>)> = (0..30)
        .map(|i| (key(i), vec![i as u8; 1000]))
        .collect();

    let mut builder = ViewFileBuilder::create(&path).unwrap().fanout(8);
    let root = builder.write_tree(&entries).unwrap().unwrap();
    builder.finish().unwrap();
    let file = StorageFile::open(&path).unwrap();
    assert!(file.len() > 30_000);

    let mut values = Vec::new();
    let mut request = TraversalRequest::fold(&RawCollator, None, None, |_k: &[u8], v: &[u8]| {
        values.push(v.to_vec());
        Step::Continue
    });
    traverse(&file, root.pointer, &mut request).unwrap();
    drop(request);

    assert_eq!(values.len(), 30);
    for (i, value) in values.iter().enumerate() {
        assert_eq!(value, &vec![i as u8; 1000]);
    }
}

// =============================================================================
// Stop Signal Tests
// =============================================================================

#[test]
fn test_stop_success_after_n_entries() {
    let (_temp, path) = setup_temp_file();
    let root = build_tree(&path);
    let file = StorageFile::open(&path).unwrap();

    let trace = run_with(&file, root, &RawCollator, KeySelection::all(), |n| {
        if n == 7 {
            Step::StopSuccess
        } else {
            Step::Continue
        }
    });

    assert_eq!(trace.result.unwrap(), Outcome::Stopped);
    assert_eq!(trace.state, TraversalState::StoppedBySignal);
    assert_eq!(trace.visited, 7);
    assert_eq!(trace.keys.len(), 7);
    // Root, first interior node, first two leaves
    assert_eq!(file.chunk_read_count(), 4);
}

#[test]
fn test_stop_on_first_entry_reads_one_path() {
    let (_temp, path) = setup_temp_file();
    let root = build_tree(&path);
    let file = StorageFile::open(&path).unwrap();

    let trace = run_with(&file, root, &RawCollator, KeySelection::all(), |_| {
        Step::StopSuccess
    });

    assert_eq!(trace.visited, 1);
    assert_eq!(file.chunk_read_count(), 3);
}

#[test]
fn test_stop_at_end_of_leaf_does_not_load_next_leaf() {
    let (_temp, path) = setup_temp_file();
    let root = build_tree(&path);
    let file = StorageFile::open(&path).unwrap();

    let trace = run_with(&file, root, &RawCollator, KeySelection::all(), |n| {
        if n == FANOUT {
            Step::StopSuccess
        } else {
            Step::Continue
        }
    });

    assert_eq!(trace.visited, FANOUT as u64);
    assert_eq!(file.chunk_read_count(), 3);
}

#[test]
fn test_stop_error_does_not_count_entry() {
    let (_temp, path) = setup_temp_file();
    let root = build_tree(&path);
    let file = StorageFile::open(&path).unwrap();

    let trace = run_with(&file, root, &RawCollator, KeySelection::all(), |n| {
        if n == 3 {
            Step::StopError
        } else {
            Step::Continue
        }
    });

    assert_eq!(trace.result.unwrap(), Outcome::Aborted);
    assert_eq!(trace.state, TraversalState::StoppedBySignal);
    assert_eq!(trace.visited, 2);
    assert_eq!(trace.keys.len(), 3);
}

// =============================================================================
// Range Tests
// =============================================================================

#[test]
fn test_range_bounds_are_inclusive() {
    let (_temp, path) = setup_temp_file();
    let root = build_tree(&path);
    let file = StorageFile::open(&path).unwrap();

    let trace = run(&file, root, range(Some(5), Some(10)));

    assert_eq!(trace.result.unwrap(), Outcome::Completed);
    let expected: Vec<Vec<u8>> = (5..=10).map(key).collect();
    assert_eq!(trace.keys, expected);
    assert_eq!(trace.visited, 6);
}

#[test]
fn test_range_open_start_and_end() {
    let (_temp, path) = setup_temp_file();
    let root = build_tree(&path);
    let file = StorageFile::open(&path).unwrap();

    let head = run(&file, root, range(None, Some(2)));
    assert_eq!(head.keys, vec![key(0), key(1), key(2)]);

    let tail = run(&file, root, range(Some(47), None));
    assert_eq!(tail.keys, vec![key(47), key(48), key(49)]);
}

#[test]
fn test_range_bounds_between_keys() {
    let (_temp, path) = setup_temp_file();
    let root = build_tree(&path);
    let file = StorageFile::open(&path).unwrap();

    let selection = KeySelection::Range {
        start: Some(b"key20a".to_vec()),
        end: Some(b"key23a".to_vec()),
    };
    let trace = run(&file, root, selection);

    assert_eq!(trace.keys, vec![key(21), key(22), key(23)]);
}

#[test]
fn test_empty_range() {
    let (_temp, path) = setup_temp_file();
    let root = build_tree(&path);
    let file = StorageFile::open(&path).unwrap();

    let inverted = run(&file, root, range(Some(30), Some(10)));
    assert_eq!(inverted.result.unwrap(), Outcome::Completed);
    assert!(inverted.keys.is_empty());

    let past_end = run(
        &file,
        root,
        KeySelection::Range {
            start: Some(b"zzz".to_vec()),
            end: None,
        },
    );
    assert_eq!(past_end.result.unwrap(), Outcome::Completed);
    assert_eq!(past_end.visited, 0);
}

#[test]
fn test_range_skips_subtrees_before_start() {
    let (_temp, path) = setup_temp_file();
    let root = build_tree(&path);
    let file = StorageFile::open(&path).unwrap();

    let trace = run_with(&file, root, &RawCollator, range(Some(40), None), |_| {
        Step::StopSuccess
    });

    assert_eq!(trace.keys, vec![key(40)]);
    // One node per level: earlier leaves are never loaded
    assert_eq!(file.chunk_read_count(), 3);
}

#[test]
fn test_range_ending_on_subtree_max_skips_next_sibling() {
    let (_temp, path) = setup_temp_file();
    let root = build_tree(&path);
    let file = StorageFile::open(&path).unwrap();

    // key07 is the last key of the second leaf
    let trace = run(&file, root, range(None, Some(7)));

    assert_eq!(trace.result.unwrap(), Outcome::Completed);
    assert_eq!(trace.keys, (0..=7).map(key).collect::<Vec<_>>());
    // Root, interior node, two leaves; the third leaf is never loaded
    assert_eq!(file.chunk_read_count(), 4);
}

#[test]
fn test_range_ending_on_interior_max_stops_at_that_subtree() {
    let (_temp, path) = setup_temp_file();
    let root = build_tree(&path);
    let file = StorageFile::open(&path).unwrap();

    // key15 closes the first interior node (leaves 0..=3)
    let trace = run(&file, root, range(None, Some(15)));

    assert_eq!(trace.visited, 16);
    assert_eq!(file.chunk_read_count(), 6);
}

// =============================================================================
// Lookup Tests
// =============================================================================

#[test]
fn test_lookup_returns_present_keys_in_order() {
    let (_temp, path) = setup_temp_file();
    let root = build_tree(&path);
    let file = StorageFile::open(&path).unwrap();

    let keys = vec![key(10), key(3), b"key99".to_vec(), key(3), key(49)];
    let trace = run(&file, root, KeySelection::Keys(keys));

    assert_eq!(trace.result.unwrap(), Outcome::Completed);
    assert_eq!(trace.keys, vec![key(3), key(10), key(49)]);
    assert_eq!(trace.visited, 3);
}

#[test]
fn test_lookup_sorts_and_dedups_keys() {
    let request = TraversalRequest::lookup(
        &RawCollator,
        vec![b"c".to_vec(), b"a".to_vec(), b"c".to_vec(), b"b".to_vec()],
        |_k: &[u8], _v: &[u8]| Step::Continue,
    );

    assert!(!request.is_fold());
    assert_eq!(
        request.selection(),
        &KeySelection::Keys(vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()])
    );
}

#[test]
fn test_lookup_missing_keys() {
    let (_temp, path) = setup_temp_file();
    let root = build_tree(&path);
    let file = StorageFile::open(&path).unwrap();

    let keys = vec![b"aaa".to_vec(), b"key05x".to_vec(), b"zzz".to_vec()];
    let trace = run(&file, root, KeySelection::Keys(keys));

    assert_eq!(trace.result.unwrap(), Outcome::Completed);
    assert!(trace.keys.is_empty());
}

#[test]
fn test_lookup_without_keys() {
    let (_temp, path) = setup_temp_file();
    let root = build_tree(&path);
    let file = StorageFile::open(&path).unwrap();

    let trace = run(&file, root, KeySelection::Keys(Vec::new()));

    assert_eq!(trace.result.unwrap(), Outcome::Completed);
    assert_eq!(trace.visited, 0);
}

#[test]
fn test_lookup_stop_success() {
    let (_temp, path) = setup_temp_file();
    let root = build_tree(&path);
    let file = StorageFile::open(&path).unwrap();

    let keys = vec![key(1), key(20), key(40)];
    let trace = run_with(&file, root, &RawCollator, KeySelection::Keys(keys), |n| {
        if n == 2 {
            Step::StopSuccess
        } else {
            Step::Continue
        }
    });

    assert_eq!(trace.result.unwrap(), Outcome::Stopped);
    assert_eq!(trace.keys, vec![key(1), key(20)]);
    assert_eq!(trace.visited, 2);
}

// =============================================================================
// Comparator Tests
// =============================================================================

#[test]
fn test_custom_comparator() {
    let (_temp, path) = setup_temp_file();
    let entries: Vec<(Vec<u8>, Vec<u8>)> = ["e", "d", "c", "b", "a"]
        .iter()
        .map(|k| (k.as_bytes().to_vec(), b"v".to_vec()))
        .collect();

    let mut builder = ViewFileBuilder::create(&path).unwrap().fanout(2);
    let root = builder.write_tree(&entries).unwrap().unwrap();
    builder.finish().unwrap();
    let file = StorageFile::open(&path).unwrap();

    let descending = |a: &[u8], b: &[u8]| b.cmp(a);
    let selection = KeySelection::Range {
        start: Some(b"d".to_vec()),
        end: Some(b"b".to_vec()),
    };
    let trace = run_with(&file, root.pointer, &descending, selection, |_| Step::Continue);

    assert_eq!(trace.result.unwrap(), Outcome::Completed);
    assert_eq!(trace.keys, vec![b"d".to_vec(), b"c".to_vec(), b"b".to_vec()]);
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_child_pointer_outside_file_after_streamed_entries() {
    let (_temp, path) = setup_temp_file();
    let mut builder = ViewFileBuilder::create(&path).unwrap();
    let (left, left_size) = builder
        .write_node(NodeKind::Leaf, &[(b"a", b"1"), (b"b", b"2")])
        .unwrap();
    let good = NodePointer::new(left, left_size).encode();
    let bogus = NodePointer::new(1 << 40, 10).encode();
    let (root, _) = builder
        .write_node(NodeKind::Pointer, &[(b"b", &good), (b"d", &bogus)])
        .unwrap();
    builder.finish().unwrap();
    let file = StorageFile::open(&path).unwrap();

    let trace = run(&file, root, KeySelection::all());

    assert_traversal_failure(&trace.result);
    assert_eq!(trace.state, TraversalState::Failed);
    // Entries before the bad pointer stand
    assert_eq!(trace.keys, vec![b"a".to_vec(), b"b".to_vec()]);
    assert_eq!(trace.visited, 2);
}

#[test]
fn test_short_child_pointer() {
    let (_temp, path) = setup_temp_file();
    let mut builder = ViewFileBuilder::create(&path).unwrap();
    let (root, _) = builder
        .write_node(NodeKind::Pointer, &[(b"a", &[0u8; 5][..])])
        .unwrap();
    builder.finish().unwrap();
    let file = StorageFile::open(&path).unwrap();

    assert_traversal_failure(&run(&file, root, KeySelection::all()).result);
}

#[test]
fn test_keys_out_of_order_in_node() {
    let (_temp, path) = setup_temp_file();
    let mut builder = ViewFileBuilder::create(&path).unwrap();
    let (root, _) = builder
        .write_node(NodeKind::Leaf, &[(b"b", b"1"), (b"a", b"2")])
        .unwrap();
    builder.finish().unwrap();
    let file = StorageFile::open(&path).unwrap();

    let trace = run(&file, root, KeySelection::all());

    assert_traversal_failure(&trace.result);
    assert_eq!(trace.keys, vec![b"b".to_vec()]);
}

#[test]
fn test_keys_out_of_order_across_nodes() {
    let (_temp, path) = setup_temp_file();
    let mut builder = ViewFileBuilder::create(&path).unwrap();
    let (left, left_size) = builder
        .write_node(NodeKind::Leaf, &[(b"a", b"1"), (b"b", b"2")])
        .unwrap();
    let (right, right_size) = builder
        .write_node(NodeKind::Leaf, &[(b"a0", b"3")])
        .unwrap();
    let left_ptr = NodePointer::new(left, left_size).encode();
    let right_ptr = NodePointer::new(right, right_size).encode();
    let (root, _) = builder
        .write_node(NodeKind::Pointer, &[(b"b", &left_ptr), (b"z", &right_ptr)])
        .unwrap();
    builder.finish().unwrap();
    let file = StorageFile::open(&path).unwrap();

    let trace = run(&file, root, KeySelection::all());

    assert_traversal_failure(&trace.result);
    assert_eq!(trace.visited, 2);
}

#[test]
fn test_node_checksum_mismatch() {
    let (_temp, path) = setup_temp_file();
    let mut builder = ViewFileBuilder::create(&path).unwrap();
    let (root, _) = builder
        .write_node(NodeKind::Leaf, &[(b"key", b"value")])
        .unwrap();
    builder.finish().unwrap();

    // Chunk at 1: prefix 1..9, data from 9
    let mut raw = fs::read(&path).unwrap();
    raw[12] ^= 0xFF;
    fs::write(&path, &raw).unwrap();
    let file = StorageFile::open(&path).unwrap();

    let trace = run(&file, root, KeySelection::all());

    match trace.result {
        Err(FoldError::ChecksumMismatch { offset, .. }) => assert_eq!(offset, root),
        other => panic!("expected ChecksumMismatch, got {:?}", other),
    }
    assert!(trace.keys.is_empty());
    assert_eq!(trace.state, TraversalState::Failed);
}

#[test]
fn test_compressed_node_is_rejected() {
    let (_temp, path) = setup_temp_file();
    let data = [1u8, 0, 0, 0, 0, 0];
    let mut framed = Vec::new();
    framed.extend_from_slice(&(data.len() as u32 | 0x8000_0000).to_be_bytes());
    framed.extend_from_slice(&crc32fast::hash(&data).to_be_bytes());
    framed.extend_from_slice(&data);

    let mut builder = ViewFileBuilder::create(&path).unwrap();
    builder.write_marker(0).unwrap();
    let root = builder.position();
    builder.write_data(&framed).unwrap();
    builder.finish().unwrap();
    let file = StorageFile::open(&path).unwrap();

    assert_traversal_failure(&run(&file, root, KeySelection::all()).result);
}

#[test]
fn test_unknown_node_kind() {
    let (_temp, path) = setup_temp_file();
    let mut builder = ViewFileBuilder::create(&path).unwrap();
    let root = builder.write_chunk(&[7, 0, 0, 0, 0, 0]).unwrap();
    let empty = builder.write_chunk(&[]).unwrap();
    builder.finish().unwrap();
    let file = StorageFile::open(&path).unwrap();

    assert_traversal_failure(&run(&file, root, KeySelection::all()).result);
    assert_traversal_failure(&run(&file, empty, KeySelection::all()).result);
}

#[test]
fn test_truncated_entry() {
    let (_temp, path) = setup_temp_file();
    // Leaf claiming a 10-byte key with one byte present
    let data = [1u8, 0x00, 0xA0, 0x00, 0x00, 0x00, b'x'];
    let mut builder = ViewFileBuilder::create(&path).unwrap();
    let root = builder.write_chunk(&data).unwrap();
    builder.finish().unwrap();
    let file = StorageFile::open(&path).unwrap();

    assert_traversal_failure(&run(&file, root, KeySelection::all()).result);
}

#[test]
fn test_pointer_cycle_hits_depth_limit() {
    let (_temp, path) = setup_temp_file();
    let mut builder = ViewFileBuilder::create(&path).unwrap();
    builder.write_marker(0).unwrap();
    let own_offset = builder.position();
    let self_ptr = NodePointer::new(own_offset, 0).encode();
    let (root, _) = builder
        .write_node(NodeKind::Pointer, &[(b"k", &self_ptr)])
        .unwrap();
    builder.finish().unwrap();
    assert_eq!(root, own_offset);
    let file = StorageFile::open(&path).unwrap();

    let trace = run(&file, root, KeySelection::all());

    assert_traversal_failure(&trace.result);
    assert_eq!(file.chunk_read_count(), viewfold::btree::MAX_TREE_DEPTH as u64);
}

#[test]
fn test_root_outside_file() {
    let (_temp, path) = setup_temp_file();
    let root = build_tree(&path);
    let file = StorageFile::open(&path).unwrap();

    let trace = run(&file, file.len() + root, KeySelection::all());

    assert_traversal_failure(&trace.result);
    assert_eq!(file.read_count(), 0);
}

#[test]
fn test_comparator_trait_objects() {
    let raw: &dyn KeyComparator = &RawCollator;
    assert_eq!(raw.compare(b"a", b"b"), Ordering::Less);

    let reversed = |a: &[u8], b: &[u8]| b.cmp(a);
    let reversed: &dyn KeyComparator = &reversed;
    assert_eq!(reversed.compare(b"a", b"b"), Ordering::Greater);
}
