//! Integration tests for the B+ tree index

use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::thread_rng;

use stratum::buffer::BufferPoolManager;
use stratum::common::{PageId, RecordId, SlotId, INVALID_PAGE_ID};
use stratum::index::BPlusTree;
use stratum::storage::disk::DiskManager;
use tempfile::NamedTempFile;

fn create_bpm(pool_size: usize) -> (Arc<BufferPoolManager>, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let disk_manager = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let bpm = Arc::new(BufferPoolManager::new(pool_size, disk_manager));
    (bpm, temp_file)
}

/// Small fan-outs so a handful of keys already exercises splits and merges.
fn small_tree(name: &str, bpm: &Arc<BufferPoolManager>) -> BPlusTree<u32> {
    BPlusTree::with_max_sizes(name, Arc::clone(bpm), 4, 4).unwrap()
}

fn rid(key: u32) -> RecordId {
    RecordId::new(PageId::new(key), SlotId::new(0))
}

fn collect_keys(tree: &BPlusTree<u32>) -> Vec<u32> {
    tree.begin()
        .unwrap()
        .map(|entry| entry.unwrap().0)
        .collect()
}

#[test]
fn test_btree_insert_and_get() {
    let (bpm, _temp) = create_bpm(50);
    let mut tree = small_tree("t_basic", &bpm);

    assert!(tree.is_empty());

    assert!(tree.insert(10, rid(10), None).unwrap());
    assert!(tree.insert(20, rid(20), None).unwrap());
    assert!(tree.insert(30, rid(30), None).unwrap());
    assert!(!tree.is_empty());

    let mut found = Vec::new();
    assert!(tree.get(&20, &mut found, None).unwrap());
    assert_eq!(found, vec![rid(20)]);

    found.clear();
    assert!(!tree.get(&40, &mut found, None).unwrap());
    assert!(found.is_empty());
}

#[test]
fn test_btree_duplicate_insert_and_round_trip() {
    let (bpm, _temp) = create_bpm(50);
    let mut tree = small_tree("t_dup", &bpm);

    assert!(tree.insert(7, rid(7), None).unwrap());
    // Second insert of the same key reports a duplicate and changes nothing
    assert!(!tree.insert(7, rid(99), None).unwrap());

    let mut found = Vec::new();
    assert!(tree.get(&7, &mut found, None).unwrap());
    assert_eq!(found, vec![rid(7)]);

    tree.remove(&7, None).unwrap();
    found.clear();
    assert!(!tree.get(&7, &mut found, None).unwrap());

    // Removing a missing key is a silent no-op
    tree.remove(&7, None).unwrap();
}

#[test]
fn test_btree_sequential_insert_with_splits() {
    let (bpm, _temp) = create_bpm(50);
    let mut tree = small_tree("t_seq", &bpm);

    for key in 1..=10 {
        assert!(tree.insert(key, rid(key), None).unwrap());
        tree.check_integrity().unwrap();
    }

    // Ten keys at fan-out 4 force leaf splits and a root split
    assert_ne!(tree.root_page_id(), INVALID_PAGE_ID);
    assert_eq!(collect_keys(&tree), (1..=10).collect::<Vec<_>>());

    for key in 1..=10 {
        let mut found = Vec::new();
        assert!(tree.get(&key, &mut found, None).unwrap(), "key {}", key);
        assert_eq!(found, vec![rid(key)]);
    }
}

#[test]
fn test_btree_scan_from_key() {
    let (bpm, _temp) = create_bpm(50);
    let mut tree = small_tree("t_scan", &bpm);

    for key in 1..=10 {
        tree.insert(key, rid(key), None).unwrap();
    }

    let mut iter = tree.begin_at(&5).unwrap();
    let mut seen = Vec::new();
    while !iter.is_end() {
        let (key, value) = iter.entry().unwrap();
        assert_eq!(value, rid(key));
        seen.push(key);
        iter.advance().unwrap();
    }
    assert_eq!(seen, vec![5, 6, 7, 8, 9, 10]);
    assert!(iter.entry().is_none());

    // Positioning below the smallest key scans everything
    let all: Vec<u32> = tree
        .begin_at(&0)
        .unwrap()
        .map(|entry| entry.unwrap().0)
        .collect();
    assert_eq!(all, (1..=10).collect::<Vec<_>>());

    // Positioning past the largest key is already at the end
    assert!(tree.begin_at(&11).unwrap().is_end());
    assert!(tree.end().unwrap().is_end());
}

#[test]
fn test_btree_iterator_between_deleted_keys() {
    let (bpm, _temp) = create_bpm(50);
    let mut tree = small_tree("t_gap", &bpm);

    for key in 1..=10 {
        tree.insert(key, rid(key), None).unwrap();
    }
    tree.remove(&5, None).unwrap();
    tree.remove(&6, None).unwrap();

    let seen: Vec<u32> = tree
        .begin_at(&5)
        .unwrap()
        .map(|entry| entry.unwrap().0)
        .collect();
    assert_eq!(seen, vec![7, 8, 9, 10]);
}

#[test]
fn test_btree_remove_redistribute_and_coalesce() {
    let (bpm, _temp) = create_bpm(50);
    let mut tree = small_tree("t_del", &bpm);

    for key in 1..=10 {
        tree.insert(key, rid(key), None).unwrap();
    }

    // Draining the leftmost leaves forces both remedies: siblings first
    // merge, then the shrunken internal level borrows across the root
    for key in [1, 2, 3] {
        tree.remove(&key, None).unwrap();
        tree.check_integrity().unwrap();

        let remaining: Vec<u32> = ((key + 1)..=10).collect();
        assert_eq!(collect_keys(&tree), remaining);
    }

    let mut found = Vec::new();
    assert!(!tree.get(&3, &mut found, None).unwrap());
    assert!(tree.get(&4, &mut found, None).unwrap());
}

#[test]
fn test_btree_remove_until_empty() {
    let (bpm, _temp) = create_bpm(50);
    let mut tree = small_tree("t_drain", &bpm);

    for key in 1..=10 {
        tree.insert(key, rid(key), None).unwrap();
    }

    for key in 1..=10 {
        tree.remove(&key, None).unwrap();
        tree.check_integrity().unwrap();
        let remaining: Vec<u32> = ((key + 1)..=10).collect();
        assert_eq!(collect_keys(&tree), remaining);
    }

    // The root collapsed back to a leaf and finally disappeared
    assert!(tree.is_empty());
    assert_eq!(tree.root_page_id(), INVALID_PAGE_ID);
    assert!(tree.begin().unwrap().is_end());

    // The header page reflects the empty tree: reopening the same index
    // observes the invalid root
    let reopened = BPlusTree::<u32>::with_max_sizes("t_drain", Arc::clone(&bpm), 4, 4).unwrap();
    assert!(reopened.is_empty());

    // The tree grows back from empty
    drop(reopened);
    assert!(tree.insert(42, rid(42), None).unwrap());
    assert_eq!(collect_keys(&tree), vec![42]);
}

#[test]
fn test_btree_random_insert_remove() {
    let (bpm, _temp) = create_bpm(50);
    let mut tree = small_tree("t_rand", &bpm);

    let mut keys: Vec<u32> = (0..200).collect();
    keys.shuffle(&mut thread_rng());

    for (i, &key) in keys.iter().enumerate() {
        assert!(tree.insert(key, rid(key), None).unwrap());
        if i % 20 == 0 {
            tree.check_integrity().unwrap();
        }
    }
    tree.check_integrity().unwrap();
    assert_eq!(collect_keys(&tree), (0..200).collect::<Vec<_>>());

    let (removed, kept) = keys.split_at(100);
    for (i, &key) in removed.iter().enumerate() {
        tree.remove(&key, None).unwrap();
        if i % 20 == 0 {
            tree.check_integrity().unwrap();
        }
    }
    tree.check_integrity().unwrap();

    let mut expected: Vec<u32> = kept.to_vec();
    expected.sort_unstable();
    assert_eq!(collect_keys(&tree), expected);

    let mut found = Vec::new();
    for &key in removed {
        assert!(!tree.get(&key, &mut found, None).unwrap());
    }
    for &key in kept {
        assert!(tree.get(&key, &mut found, None).unwrap());
    }
}

#[test]
fn test_btree_pins_released_after_operations() {
    let (bpm, _temp) = create_bpm(50);
    let mut tree = small_tree("t_pins", &bpm);

    for key in 1..=20 {
        tree.insert(key, rid(key), None).unwrap();
    }
    for key in 1..=5 {
        tree.remove(&key, None).unwrap();
    }
    let _ = collect_keys(&tree);

    // Every page the tree touched must be unpinned again
    for raw in 0..bpm.pool_size() as u32 {
        let pin_count = bpm.get_pin_count(PageId::new(raw)).unwrap_or(0);
        assert_eq!(pin_count, 0, "page {} left pinned", raw);
    }

    // An outstanding iterator is the one legitimate pin holder
    let root = tree.root_page_id();
    let single_leaf_tree = {
        let mut t = small_tree("t_pins_leaf", &bpm);
        t.insert(1, rid(1), None).unwrap();
        t
    };
    let iter = single_leaf_tree.begin().unwrap();
    assert_eq!(bpm.get_pin_count(single_leaf_tree.root_page_id()), Some(1));
    drop(iter);
    assert_eq!(bpm.get_pin_count(single_leaf_tree.root_page_id()), Some(0));
    let _ = root;
}

#[test]
fn test_btree_reopen_from_header_page() {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_path_buf();

    {
        let disk_manager = Arc::new(DiskManager::new(&path).unwrap());
        let bpm = Arc::new(BufferPoolManager::new(50, disk_manager));
        let mut tree = BPlusTree::<u32>::with_max_sizes("t_persist", Arc::clone(&bpm), 4, 4).unwrap();

        for key in 0..50 {
            tree.insert(key, rid(key), None).unwrap();
        }

        bpm.flush_all_pages().unwrap();
    }

    {
        let disk_manager = Arc::new(DiskManager::new(&path).unwrap());
        let bpm = Arc::new(BufferPoolManager::new(50, disk_manager));
        // The root page id comes back from the header page
        let tree = BPlusTree::<u32>::with_max_sizes("t_persist", Arc::clone(&bpm), 4, 4).unwrap();

        assert!(!tree.is_empty());
        tree.check_integrity().unwrap();

        let mut found = Vec::new();
        for key in 0..50 {
            assert!(tree.get(&key, &mut found, None).unwrap(), "key {}", key);
        }
        assert_eq!(collect_keys(&tree), (0..50).collect::<Vec<_>>());
    }
}

#[test]
fn test_btree_operations_on_empty_tree() {
    let (bpm, _temp) = create_bpm(10);
    let mut tree = small_tree("t_empty", &bpm);

    let mut found = Vec::new();
    assert!(!tree.get(&1, &mut found, None).unwrap());
    tree.remove(&1, None).unwrap();
    assert!(tree.begin().unwrap().is_end());
    assert!(tree.begin_at(&1).unwrap().is_end());
    assert!(tree.end().unwrap().is_end());
    tree.check_integrity().unwrap();
}

#[test]
fn test_btree_two_indexes_share_header_page() {
    let (bpm, _temp) = create_bpm(50);

    let mut first = small_tree("t_first", &bpm);
    let mut second = small_tree("t_second", &bpm);

    for key in 0..20 {
        first.insert(key, rid(key), None).unwrap();
        second.insert(key * 2, rid(key * 2), None).unwrap();
    }

    assert_ne!(first.root_page_id(), second.root_page_id());
    assert_eq!(collect_keys(&first), (0..20).collect::<Vec<_>>());
    assert_eq!(
        collect_keys(&second),
        (0..20).map(|k| k * 2).collect::<Vec<_>>()
    );
}
