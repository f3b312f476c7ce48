//! Integration tests for the LRU-K replacer

use std::sync::Arc;
use std::thread;

use bptree::buffer::LruKReplacer;
use bptree::common::FrameId;

fn touch(replacer: &LruKReplacer, frame: u32, times: usize) {
    for _ in 0..times {
        replacer.record_access(FrameId::new(frame));
    }
}

fn evict_all(replacer: &LruKReplacer) -> Vec<u32> {
    std::iter::from_fn(|| replacer.evict())
        .map(|frame_id| frame_id.as_usize() as u32)
        .collect()
}

#[test]
fn test_lru_k_cold_frames_go_first_in_arrival_order() {
    let replacer = LruKReplacer::new(2, 8);

    touch(&replacer, 3, 1);
    touch(&replacer, 1, 2);
    touch(&replacer, 0, 1);
    touch(&replacer, 2, 2);
    for frame in 0..4 {
        replacer.set_evictable(FrameId::new(frame), true);
    }

    // 3 and 0 have one access each (infinite distance), then 1 before 2.
    assert_eq!(evict_all(&replacer), vec![3, 0, 1, 2]);
    assert_eq!(replacer.size(), 0);
}

#[test]
fn test_lru_k_uses_kth_most_recent_access() {
    let replacer = LruKReplacer::new(3, 8);

    touch(&replacer, 0, 3); // t0..t2
    touch(&replacer, 1, 3); // t3..t5
    touch(&replacer, 0, 2); // frame 0 window becomes t2, t6, t7
    replacer.set_evictable(FrameId::new(0), true);
    replacer.set_evictable(FrameId::new(1), true);

    // Frame 0's third most recent access (t2) is older than frame 1's (t3).
    assert_eq!(evict_all(&replacer), vec![0, 1]);
}

#[test]
fn test_lru_k_skips_pinned_frames() {
    let replacer = LruKReplacer::new(2, 8);
    for frame in 0..3 {
        touch(&replacer, frame, 1);
    }
    replacer.set_evictable(FrameId::new(2), true);
    replacer.set_evictable(FrameId::new(1), true);

    assert_eq!(replacer.size(), 2);
    assert_eq!(evict_all(&replacer), vec![1, 2]);

    // Frame 0 becomes a candidate only once unpinned.
    replacer.set_evictable(FrameId::new(0), true);
    assert_eq!(replacer.evict(), Some(FrameId::new(0)));
}

#[test]
fn test_lru_k_set_evictable_is_idempotent() {
    let replacer = LruKReplacer::new(2, 8);
    touch(&replacer, 5, 1);

    replacer.set_evictable(FrameId::new(5), true);
    replacer.set_evictable(FrameId::new(5), true);
    assert_eq!(replacer.size(), 1);

    replacer.set_evictable(FrameId::new(5), false);
    replacer.set_evictable(FrameId::new(5), false);
    assert_eq!(replacer.size(), 0);
    assert_eq!(replacer.evict(), None);
}

#[test]
fn test_lru_k_remove_forgets_history() {
    let replacer = LruKReplacer::new(2, 8);
    touch(&replacer, 0, 1);
    touch(&replacer, 1, 1);
    replacer.set_evictable(FrameId::new(0), true);
    replacer.set_evictable(FrameId::new(1), true);

    replacer.remove(FrameId::new(0));
    assert_eq!(replacer.size(), 1);

    // A re-used frame starts with a fresh history, so it is now the newest.
    touch(&replacer, 0, 1);
    replacer.set_evictable(FrameId::new(0), true);
    assert_eq!(evict_all(&replacer), vec![1, 0]);
}

#[test]
fn test_lru_k_ignores_out_of_range_frames() {
    let replacer = LruKReplacer::new(2, 4);
    touch(&replacer, 9, 2);
    replacer.set_evictable(FrameId::new(9), true);
    assert_eq!(replacer.size(), 0);
}

#[test]
fn test_lru_k_concurrent_access() {
    let replacer = Arc::new(LruKReplacer::new(2, 64));

    let handles: Vec<_> = (0..4u32)
        .map(|t| {
            let replacer = Arc::clone(&replacer);
            thread::spawn(move || {
                for i in 0..16 {
                    let frame_id = FrameId::new(t * 16 + i);
                    replacer.record_access(frame_id);
                    replacer.set_evictable(frame_id, true);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(replacer.size(), 64);
    let mut evicted = evict_all(&replacer);
    evicted.sort_unstable();
    assert_eq!(evicted, (0..64).collect::<Vec<_>>());
}
