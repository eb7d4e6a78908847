//! Integration tests for the extendible hash table

use bramble::container::ExtendibleHashTable;

#[test]
fn test_hash_table_grows_under_load() {
    let table = ExtendibleHashTable::new(2);

    for i in 0..1000u32 {
        table.insert(i, i * 2);
    }

    assert!(table.global_depth() > 0);
    assert!(table.num_buckets() > 1);

    for i in 0..1000u32 {
        assert_eq!(table.find(&i), Some(i * 2));
    }
}

#[test]
fn test_hash_table_directory_is_power_of_two() {
    let table: ExtendibleHashTable<u32, u32> = ExtendibleHashTable::new(1);

    for i in 0..128u32 {
        table.insert(i, i);
        let depth = table.global_depth();
        // Every slot of the 2^depth directory points at a bucket whose
        // local depth does not exceed the global depth.
        for slot in 0..(1usize << depth) {
            assert!(table.local_depth(slot) <= depth);
        }
    }
}

#[test]
fn test_hash_table_mixed_workload() {
    let table = ExtendibleHashTable::new(4);

    for i in 0..200u32 {
        table.insert(i, format!("value-{}", i));
    }
    for i in (0..200u32).step_by(2) {
        assert!(table.remove(&i));
    }
    for i in 0..200u32 {
        if i % 2 == 0 {
            assert_eq!(table.find(&i), None);
        } else {
            assert_eq!(table.find(&i), Some(format!("value-{}", i)));
        }
    }

    // Reinsert over the holes and overwrite survivors.
    for i in 0..200u32 {
        table.insert(i, format!("fresh-{}", i));
    }
    for i in 0..200u32 {
        assert_eq!(table.find(&i), Some(format!("fresh-{}", i)));
    }
}

#[test]
fn test_hash_table_concurrent_threads() {
    use std::sync::Arc;
    use std::thread;

    let table = Arc::new(ExtendibleHashTable::new(4));

    let handles: Vec<_> = (0..8u32)
        .map(|t| {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                for i in 0..500u32 {
                    let key = t * 500 + i;
                    table.insert(key, key + 1);
                    assert_eq!(table.find(&key), Some(key + 1));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    for key in 0..4000u32 {
        assert_eq!(table.find(&key), Some(key + 1));
    }
}
