use std::io::Write;
use std::sync::Arc;

use bptree::buffer::BufferPoolManager;
use bptree::common::{
    BTreeOptions, IndexError, PageId, RecordId, SlotId, HEADER_PAGE_ID, INVALID_PAGE_ID,
};
use bptree::index::{encode_integer_key, BTreeIndex, BytewiseComparator, IntegerComparator};
use bptree::storage::disk::DiskManager;
use bptree::storage::page::{HeaderPage, InternalPage, LeafPage};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tempfile::NamedTempFile;

fn create_bpm(pool_size: usize) -> (Arc<BufferPoolManager>, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let disk_manager = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let bpm = Arc::new(BufferPoolManager::new(pool_size, 2, disk_manager));
    (bpm, temp_file)
}

fn create_index(
    bpm: &Arc<BufferPoolManager>,
    leaf_max: usize,
    internal_max: usize,
) -> BTreeIndex<IntegerComparator> {
    let options = BTreeOptions::default().with_max_sizes(leaf_max, internal_max);
    BTreeIndex::new("test_index", bpm.clone(), IntegerComparator, options).unwrap()
}

fn key(value: i64) -> Vec<u8> {
    encode_integer_key(value, 8).to_vec()
}

fn rid(value: i64) -> RecordId {
    RecordId::from_integer(value)
}

fn insert_all(index: &mut BTreeIndex<IntegerComparator>, values: impl IntoIterator<Item = i64>) {
    for v in values {
        assert!(index.insert(&key(v), rid(v)).unwrap(), "insert {v}");
    }
}

fn scan(index: &BTreeIndex<IntegerComparator>) -> Vec<i64> {
    index
        .begin()
        .unwrap()
        .map(|entry| IntegerComparator::decode(&entry.unwrap().0))
        .collect()
}

fn live_pages(bpm: &BufferPoolManager) -> u32 {
    bpm.disk_manager().get_num_live_pages()
}

#[test]
fn test_btree_insert_and_search() {
    let (bpm, _temp) = create_bpm(10);
    let mut index = create_index(&bpm, 4, 4);

    insert_all(&mut index, [10, 20, 30]);

    assert!(!index.is_empty());
    assert_eq!(index.get_value(&key(10)).unwrap(), Some(rid(10)));
    assert_eq!(index.get_value(&key(20)).unwrap(), Some(rid(20)));
    assert_eq!(index.get_value(&key(30)).unwrap(), Some(rid(30)));
    assert_eq!(index.get_value(&key(40)).unwrap(), None);
    assert_eq!(bpm.pinned_frame_count(), 0);
}

#[test]
fn test_btree_duplicate_insert_rejected() {
    let (bpm, _temp) = create_bpm(10);
    let mut index = create_index(&bpm, 4, 4);
    insert_all(&mut index, 1..=10);
    let before = index.verify_integrity().unwrap();
    let pages_before = live_pages(&bpm);

    assert!(!index.insert(&key(7), rid(700)).unwrap());

    assert_eq!(index.get_value(&key(7)).unwrap(), Some(rid(7)));
    assert_eq!(index.verify_integrity().unwrap(), before);
    assert_eq!(live_pages(&bpm), pages_before);
}

#[test]
fn test_btree_first_split_creates_root() {
    let (bpm, _temp) = create_bpm(10);
    let mut index = create_index(&bpm, 4, 4);

    insert_all(&mut index, 1..=4);
    assert_eq!(index.to_string_by_level(false).unwrap(), "L0: (1,2,3,4)");

    insert_all(&mut index, [5]);
    assert_eq!(
        index.to_string_by_level(false).unwrap(),
        "L0: (3)\nL1: (1,2) (3,4,5)"
    );

    let stats = index.verify_integrity().unwrap();
    assert_eq!(stats.height, 2);
    assert_eq!(stats.leaf_count, 2);
    assert_eq!(stats.internal_count, 1);
    // Header, two leaves and the new root.
    assert_eq!(live_pages(&bpm), 4);

    let root_id = index.root_page_id().unwrap();
    let (left_id, right_id) = {
        let guard = bpm.fetch_page_read(root_id).unwrap();
        let root = InternalPage::new(guard.data());
        assert_eq!(root.size(), 2);
        (root.value_at(0), root.value_at(1))
    };
    let guard = bpm.fetch_page_read(left_id).unwrap();
    let left = LeafPage::new(guard.data());
    assert_eq!(left.next_page_id(), Some(right_id));
    assert_eq!(left.parent_page_id(), Some(root_id));
    drop(guard);

    let guard = bpm.fetch_page_read(right_id).unwrap();
    assert_eq!(LeafPage::new(guard.data()).next_page_id(), None);
}

#[test]
fn test_btree_internal_redistribute_then_root_collapse() {
    let (bpm, _temp) = create_bpm(16);
    let mut index = create_index(&bpm, 3, 3);

    insert_all(&mut index, 1..=8);
    assert_eq!(
        index.to_string_by_level(false).unwrap(),
        "L0: (5)\nL1: (3) (7)\nL2: (1,2) (3,4) (5,6) (7,8)"
    );

    insert_all(&mut index, [9, 10]);
    assert_eq!(
        index.to_string_by_level(false).unwrap(),
        "L0: (5)\nL1: (3) (7,9)\nL2: (1,2) (3,4) (5,6) (7,8) (9,10)"
    );

    // Leaf merge leaves the left internal page short; its right sibling has a
    // child to spare, so the height stays at three.
    assert!(index.remove(&key(1)).unwrap());
    assert_eq!(
        index.to_string_by_level(false).unwrap(),
        "L0: (7)\nL1: (5) (9)\nL2: (2,3,4) (5,6) (7,8) (9,10)"
    );
    assert_eq!(index.verify_integrity().unwrap().height, 3);

    // Now neither internal page can spare a child: they merge and the root
    // collapses onto the survivor.
    let root_before = index.root_page_id();
    assert!(index.remove(&key(9)).unwrap());
    assert_eq!(
        index.to_string_by_level(false).unwrap(),
        "L0: (5,7)\nL1: (2,3,4) (5,6) (7,8,10)"
    );
    assert_ne!(index.root_page_id(), root_before);

    let stats = index.verify_integrity().unwrap();
    assert_eq!(stats.height, 2);
    assert_eq!(stats.key_count, 8);
    assert_eq!(live_pages(&bpm), 1 + 3 + 1);
    assert_eq!(scan(&index), vec![2, 3, 4, 5, 6, 7, 8, 10]);
}

#[test]
fn test_btree_leaf_redistribute_from_left() {
    let (bpm, _temp) = create_bpm(10);
    let mut index = create_index(&bpm, 4, 4);

    // (1,2) (3,4,5) then grow the left leaf to (0,1,2)
    insert_all(&mut index, 1..=5);
    insert_all(&mut index, [0]);
    // Drain the right leaf below its minimum of 2.
    assert!(index.remove(&key(3)).unwrap());
    assert!(index.remove(&key(4)).unwrap());

    assert_eq!(
        index.to_string_by_level(false).unwrap(),
        "L0: (2)\nL1: (0,1) (2,5)"
    );
    index.verify_integrity().unwrap();
}

#[test]
fn test_btree_leaf_redistribute_from_right() {
    let (bpm, _temp) = create_bpm(10);
    let mut index = create_index(&bpm, 4, 4);

    insert_all(&mut index, 1..=5);
    assert!(index.remove(&key(1)).unwrap());

    assert_eq!(
        index.to_string_by_level(false).unwrap(),
        "L0: (4)\nL1: (2,3) (4,5)"
    );
    index.verify_integrity().unwrap();
}

#[test]
fn test_btree_remove_absent_key_is_noop() {
    let (bpm, _temp) = create_bpm(16);
    let mut index = create_index(&bpm, 3, 3);
    insert_all(&mut index, (0..40).map(|v| v * 2));

    let dump_before = index.to_string_by_level(true).unwrap();
    let pages_before = bpm.disk_manager().get_num_pages();
    let live_before = live_pages(&bpm);
    let writes_before = {
        bpm.flush_all_pages().unwrap();
        bpm.disk_manager().get_num_writes()
    };

    assert!(!index.remove(&key(3)).unwrap());
    assert!(!index.remove(&key(1000)).unwrap());

    bpm.flush_all_pages().unwrap();
    assert_eq!(bpm.disk_manager().get_num_writes(), writes_before);
    assert_eq!(index.to_string_by_level(true).unwrap(), dump_before);
    assert_eq!(bpm.disk_manager().get_num_pages(), pages_before);
    assert_eq!(live_pages(&bpm), live_before);
}

#[test]
fn test_btree_remove_everything_leaks_nothing() {
    let (bpm, _temp) = create_bpm(16);
    let mut index = create_index(&bpm, 3, 3);
    insert_all(&mut index, 1..=100);
    assert!(index.verify_integrity().unwrap().height >= 3);

    for v in 1..=100 {
        assert!(index.remove(&key(v)).unwrap(), "remove {v}");
        index.verify_integrity().unwrap();
    }

    assert!(index.is_empty());
    assert_eq!(index.root_page_id(), None);
    assert_eq!(live_pages(&bpm), 1);
    assert_eq!(bpm.pinned_frame_count(), 0);

    let guard = bpm.fetch_page_read(HEADER_PAGE_ID).unwrap();
    let header = HeaderPage::new(guard.data());
    assert_eq!(header.get_root_id("test_index"), Some(INVALID_PAGE_ID));
}

#[test]
fn test_btree_single_key_insert_remove() {
    let (bpm, _temp) = create_bpm(10);
    let mut index = create_index(&bpm, 4, 4);

    assert!(index.insert(&key(42), rid(42)).unwrap());
    let root = index.root_page_id().unwrap();
    assert_eq!(live_pages(&bpm), 2);

    assert!(index.remove(&key(42)).unwrap());
    assert!(index.is_empty());
    assert_eq!(index.to_string_by_level(false).unwrap(), "Empty tree");
    assert_eq!(live_pages(&bpm), 1);

    // The old root page is free again and gets reused.
    assert!(index.insert(&key(7), rid(7)).unwrap());
    assert_eq!(index.root_page_id(), Some(root));
}

#[test]
fn test_btree_remove_on_empty_tree() {
    let (bpm, _temp) = create_bpm(10);
    let mut index = create_index(&bpm, 4, 4);
    assert!(!index.remove(&key(1)).unwrap());
    assert_eq!(live_pages(&bpm), 1);
}

#[test]
fn test_btree_allocation_failure_leaves_tree_intact() {
    let (bpm, _temp) = create_bpm(3);
    let mut index = create_index(&bpm, 2, 3);
    insert_all(&mut index, [1, 2]);

    // Pin two of the three frames so a split cannot get its pages.
    let p = bpm.new_page().unwrap();
    let q = bpm.new_page().unwrap();
    let pin_p = bpm.fetch_page_read(p).unwrap();
    let pin_q = bpm.fetch_page_read(q).unwrap();
    let live_before = live_pages(&bpm);

    let result = index.insert(&key(3), rid(3));
    assert!(matches!(result, Err(IndexError::AllocationFailure(_))));
    assert_eq!(bpm.pinned_frame_count(), 2);
    assert_eq!(live_pages(&bpm), live_before);
    assert_eq!(index.get_value(&key(1)).unwrap(), Some(rid(1)));
    assert_eq!(index.get_value(&key(2)).unwrap(), Some(rid(2)));
    assert_eq!(index.get_value(&key(3)).unwrap(), None);

    drop(pin_p);
    drop(pin_q);
    assert!(index.insert(&key(3), rid(3)).unwrap());
    assert_eq!(scan(&index), vec![1, 2, 3]);
    index.verify_integrity().unwrap();
}

#[test]
fn test_btree_empty_tree_start_fails_on_full_pool() {
    let (bpm, _temp) = create_bpm(2);
    let mut index = create_index(&bpm, 4, 4);

    let p = bpm.new_page().unwrap();
    let q = bpm.new_page().unwrap();
    let _pin_p = bpm.fetch_page_read(p).unwrap();
    let _pin_q = bpm.fetch_page_read(q).unwrap();

    let result = index.insert(&key(1), rid(1));
    assert!(matches!(result, Err(IndexError::AllocationFailure(_))));
    assert!(index.is_empty());
}

#[test]
fn test_btree_shuffled_workload() {
    let (bpm, _temp) = create_bpm(32);
    let mut index = create_index(&bpm, 4, 5);
    let mut rng = StdRng::seed_from_u64(0x5eed);

    let mut values: Vec<i64> = (0..1000).collect();
    values.shuffle(&mut rng);
    insert_all(&mut index, values.iter().copied());

    let stats = index.verify_integrity().unwrap();
    assert_eq!(stats.key_count, 1000);
    assert_eq!(scan(&index), (0..1000).collect::<Vec<_>>());
    for &v in &values {
        assert_eq!(index.get_value(&key(v)).unwrap(), Some(rid(v)));
    }

    values.shuffle(&mut rng);
    let (removed, kept) = values.split_at(500);
    for &v in removed {
        assert!(index.remove(&key(v)).unwrap());
    }
    let stats = index.verify_integrity().unwrap();
    assert_eq!(stats.key_count, 500);
    assert_eq!(
        live_pages(&bpm) as usize,
        1 + stats.leaf_count + stats.internal_count
    );
    for &v in removed {
        assert_eq!(index.get_value(&key(v)).unwrap(), None);
    }
    for &v in kept {
        assert_eq!(index.get_value(&key(v)).unwrap(), Some(rid(v)));
    }

    for &v in kept {
        assert!(index.remove(&key(v)).unwrap());
    }
    assert!(index.is_empty());
    assert_eq!(live_pages(&bpm), 1);
    assert_eq!(bpm.pinned_frame_count(), 0);
}

#[test]
fn test_btree_negative_keys_order() {
    let (bpm, _temp) = create_bpm(16);
    let mut index = create_index(&bpm, 3, 3);
    insert_all(&mut index, [5, -3, 0, -100, 42, -1]);

    assert_eq!(scan(&index), vec![-100, -3, -1, 0, 5, 42]);
}

#[test]
fn test_btree_iterator_begin_at() {
    let (bpm, _temp) = create_bpm(16);
    let mut index = create_index(&bpm, 3, 3);
    insert_all(&mut index, (1..=30).map(|v| v * 10));

    let from = |start: i64| -> Vec<i64> {
        index
            .begin_at(&key(start))
            .unwrap()
            .map(|entry| IntegerComparator::decode(&entry.unwrap().0))
            .collect()
    };

    assert_eq!(from(250), vec![250, 260, 270, 280, 290, 300]);
    assert_eq!(from(255), vec![260, 270, 280, 290, 300]);
    assert_eq!(from(-5).len(), 30);
    assert!(from(301).is_empty());

    let (first_key, first_rid) = index.begin().unwrap().next().unwrap().unwrap();
    assert_eq!(first_key, key(10));
    assert_eq!(first_rid, rid(10));
    assert_eq!(bpm.pinned_frame_count(), 0);
}

#[test]
fn test_btree_iterator_on_empty_tree() {
    let (bpm, _temp) = create_bpm(4);
    let index = create_index(&bpm, 4, 4);
    let mut iter = index.begin().unwrap();
    assert!(iter.is_end());
    assert!(iter.next().is_none());
}

#[test]
fn test_btree_reopen_from_header() {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_path_buf();
    let options = BTreeOptions::default().with_max_sizes(3, 3);

    let root = {
        let dm = Arc::new(DiskManager::new(&path).unwrap());
        let bpm = Arc::new(BufferPoolManager::new(16, 2, dm));
        let mut index = BTreeIndex::new("orders", bpm.clone(), IntegerComparator, options).unwrap();
        insert_all(&mut index, 1..=50);
        bpm.flush_all_pages().unwrap();
        index.root_page_id()
    };

    let dm = Arc::new(DiskManager::new(&path).unwrap());
    let bpm = Arc::new(BufferPoolManager::new(16, 2, dm));

    let index = BTreeIndex::new("orders", bpm.clone(), IntegerComparator, options).unwrap();
    assert_eq!(index.root_page_id(), root);
    assert_eq!(index.verify_integrity().unwrap().key_count, 50);
    for v in 1..=50 {
        assert_eq!(index.get_value(&key(v)).unwrap(), Some(rid(v)));
    }

    let other = BTreeIndex::new("customers", bpm.clone(), IntegerComparator, options).unwrap();
    assert!(other.is_empty());

    let wide = BTreeOptions::with_key_size(16).with_max_sizes(3, 3);
    let result = BTreeIndex::new("orders", bpm, IntegerComparator, wide);
    assert!(matches!(
        result,
        Err(IndexError::KeySizeMismatch { expected: 8, actual: 16 })
    ));
}

#[test]
fn test_btree_two_indexes_share_a_pool() {
    let (bpm, _temp) = create_bpm(16);
    let options = BTreeOptions::default().with_max_sizes(3, 3);
    let mut evens = BTreeIndex::new("evens", bpm.clone(), IntegerComparator, options).unwrap();
    let mut odds = BTreeIndex::new("odds", bpm.clone(), IntegerComparator, options).unwrap();

    for v in 0..40 {
        let target = if v % 2 == 0 { &mut evens } else { &mut odds };
        assert!(target.insert(&key(v), rid(v)).unwrap());
    }

    assert_eq!(scan(&evens), (0..40).filter(|v| v % 2 == 0).collect::<Vec<_>>());
    assert_eq!(scan(&odds), (0..40).filter(|v| v % 2 == 1).collect::<Vec<_>>());
    evens.verify_integrity().unwrap();
    odds.verify_integrity().unwrap();

    let guard = bpm.fetch_page_read(HEADER_PAGE_ID).unwrap();
    let header = HeaderPage::new(guard.data());
    assert_eq!(header.record_count(), 2);
    assert_eq!(header.get_root_id("evens"), evens.root_page_id());
    assert_eq!(header.get_root_id("odds"), odds.root_page_id());
}

#[test]
fn test_btree_bytewise_keys() {
    let (bpm, _temp) = create_bpm(16);
    let options = BTreeOptions::with_key_size(4).with_max_sizes(3, 3);
    let mut index = BTreeIndex::new("names", bpm, BytewiseComparator, options).unwrap();

    let words: [&[u8; 4]; 6] = [b"pear", b"fig_", b"kiwi", b"lime", b"date", b"plum"];
    for (i, word) in words.iter().enumerate() {
        let value = RecordId::new(PageId::new(i as u32), SlotId::new(0));
        assert!(index.insert(&word[..], value).unwrap());
    }

    let scanned: Vec<Vec<u8>> = index.begin().unwrap().map(|e| e.unwrap().0).collect();
    let mut expected: Vec<Vec<u8>> = words.iter().map(|w| w.to_vec()).collect();
    expected.sort();
    assert_eq!(scanned, expected);

    assert!(matches!(
        index.insert(b"toolong", RecordId::from_integer(0)),
        Err(IndexError::KeySizeMismatch { expected: 4, actual: 7 })
    ));
}

#[test]
fn test_btree_insert_and_remove_from_file() {
    let (bpm, _temp) = create_bpm(16);
    let mut index = create_index(&bpm, 3, 3);

    let mut keys_file = NamedTempFile::new().unwrap();
    writeln!(keys_file, "5 3 9\n1 7").unwrap();
    writeln!(keys_file, "3 11").unwrap();
    keys_file.flush().unwrap();

    assert_eq!(index.insert_from_file(keys_file.path()).unwrap(), 6);
    assert_eq!(scan(&index), vec![1, 3, 5, 7, 9, 11]);
    assert_eq!(index.get_value(&key(9)).unwrap(), Some(RecordId::from_integer(9)));

    let mut remove_file = NamedTempFile::new().unwrap();
    writeln!(remove_file, "3 4 5").unwrap();
    remove_file.flush().unwrap();
    assert_eq!(index.remove_from_file(remove_file.path()).unwrap(), 2);
    assert_eq!(scan(&index), vec![1, 7, 9, 11]);

    let mut bad_file = NamedTempFile::new().unwrap();
    writeln!(bad_file, "1 two 3").unwrap();
    bad_file.flush().unwrap();
    assert!(matches!(
        index.insert_from_file(bad_file.path()),
        Err(IndexError::Io(_))
    ));
}

#[test]
fn test_btree_verbose_dump_lists_pages() {
    let (bpm, _temp) = create_bpm(10);
    let mut index = create_index(&bpm, 4, 4);
    insert_all(&mut index, 1..=5);

    let dump = index.to_string_by_level(true).unwrap();
    let root = index.root_page_id().unwrap();
    assert!(dump.starts_with(&format!("L0: [page={} parent=none size=2/4] (3)", root.as_u32())));
    assert!(dump.contains("next=none] (3,4,5)"));
}

#[test]
fn test_btree_rejects_invalid_options() {
    let (bpm, _temp) = create_bpm(4);
    let result = BTreeIndex::new(
        "idx",
        bpm,
        IntegerComparator,
        BTreeOptions::default().with_max_sizes(1, 4),
    );
    assert!(matches!(result, Err(IndexError::InvalidOptions(_))));
}
