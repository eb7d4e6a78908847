//! Integration tests for the LRU-K replacer

use bramble::buffer::LruKReplacer;
use bramble::common::FrameId;

#[test]
fn test_lru_k_history_eviction_order() {
    let replacer = LruKReplacer::new(2, 10);

    for i in 0..5 {
        replacer.record_access(FrameId::new(i));
        replacer.set_evictable(FrameId::new(i), true);
    }

    assert_eq!(replacer.size(), 5);

    // All below k accesses: FIFO on first access.
    for i in 0..5 {
        assert_eq!(replacer.evict(), Some(FrameId::new(i)));
    }
    assert_eq!(replacer.size(), 0);
    assert_eq!(replacer.evict(), None);
}

#[test]
fn test_lru_k_history_evicts_before_cache() {
    let replacer = LruKReplacer::new(2, 10);

    // Frame 0 is the coldest by recency but has reached k accesses.
    replacer.record_access(FrameId::new(0));
    replacer.record_access(FrameId::new(0));
    replacer.record_access(FrameId::new(1));
    replacer.record_access(FrameId::new(2));
    replacer.record_access(FrameId::new(2));

    for i in 0..3 {
        replacer.set_evictable(FrameId::new(i), true);
    }

    assert_eq!(replacer.evict(), Some(FrameId::new(1)));
    assert_eq!(replacer.evict(), Some(FrameId::new(0)));
    assert_eq!(replacer.evict(), Some(FrameId::new(2)));
}

#[test]
fn test_lru_k_cache_reorders_on_access() {
    let replacer = LruKReplacer::new(2, 10);

    for i in 0..3 {
        replacer.record_access(FrameId::new(i));
        replacer.record_access(FrameId::new(i));
    }

    // Cache order is 0, 1, 2; touching 0 and 1 moves them to the tail.
    replacer.record_access(FrameId::new(0));
    replacer.record_access(FrameId::new(1));

    for i in 0..3 {
        replacer.set_evictable(FrameId::new(i), true);
    }

    assert_eq!(replacer.evict(), Some(FrameId::new(2)));
    assert_eq!(replacer.evict(), Some(FrameId::new(0)));
    assert_eq!(replacer.evict(), Some(FrameId::new(1)));
}

#[test]
fn test_lru_k_pinned_frames_skipped() {
    let replacer = LruKReplacer::new(2, 10);

    replacer.record_access(FrameId::new(0));
    replacer.record_access(FrameId::new(1));
    replacer.record_access(FrameId::new(2));

    replacer.set_evictable(FrameId::new(1), true);
    replacer.set_evictable(FrameId::new(2), true);

    assert_eq!(replacer.size(), 2);
    assert_eq!(replacer.evict(), Some(FrameId::new(1)));
    assert_eq!(replacer.evict(), Some(FrameId::new(2)));
    assert_eq!(replacer.evict(), None);
}

#[test]
fn test_lru_k_size_tracks_evictable_only() {
    let replacer = LruKReplacer::new(3, 10);

    for i in 0..4 {
        replacer.record_access(FrameId::new(i));
    }
    assert_eq!(replacer.size(), 0);

    replacer.set_evictable(FrameId::new(0), true);
    replacer.set_evictable(FrameId::new(1), true);
    assert_eq!(replacer.size(), 2);

    replacer.set_evictable(FrameId::new(0), false);
    assert_eq!(replacer.size(), 1);

    replacer.remove(FrameId::new(1));
    assert_eq!(replacer.size(), 0);
}

#[test]
fn test_lru_k_concurrent_access() {
    use std::sync::Arc;
    use std::thread;

    let replacer = Arc::new(LruKReplacer::new(2, 100));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let replacer = Arc::clone(&replacer);
            thread::spawn(move || {
                for i in 0..25 {
                    let frame_id = FrameId::new((t * 25 + i) as u32);
                    replacer.record_access(frame_id);
                    replacer.set_evictable(frame_id, true);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(replacer.size(), 100);
    for _ in 0..100 {
        assert!(replacer.evict().is_some());
    }
    assert_eq!(replacer.size(), 0);
}
