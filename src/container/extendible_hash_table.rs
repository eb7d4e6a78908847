use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use parking_lot::Mutex;

/// A bucket of key-value pairs at a fixed local depth.
#[derive(Debug)]
struct Bucket<K, V> {
    depth: usize,
    items: Vec<(K, V)>,
}

impl<K: PartialEq, V> Bucket<K, V> {
    fn new(depth: usize, capacity: usize) -> Self {
        Self {
            depth,
            items: Vec::with_capacity(capacity),
        }
    }
}

/// Directory + bucket arena, guarded as a unit by the table's mutex.
/// Buckets are never freed; directory slots hold arena indices, so two
/// slots alias the same bucket exactly when their indices are equal.
struct Directory<K, V> {
    global_depth: usize,
    num_buckets: usize,
    dir: Vec<usize>,
    buckets: Vec<Bucket<K, V>>,
}

/// ExtendibleHashTable is a growable hash table: a directory of
/// 2^global_depth slots maps the low bits of the key hash to buckets, each
/// with its own local_depth <= global_depth. A full bucket splits on the
/// next untested hash bit; the directory doubles only when the splitting
/// bucket's local depth equals the global depth.
///
/// The buffer pool uses this as its page table (PageId -> FrameId), but the
/// table is generic over any hashable key.
pub struct ExtendibleHashTable<K, V> {
    bucket_size: usize,
    inner: Mutex<Directory<K, V>>,
}

impl<K, V> ExtendibleHashTable<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Creates a table with a single bucket holding up to `bucket_size`
    /// items and a one-slot directory.
    pub fn new(bucket_size: usize) -> Self {
        assert!(bucket_size > 0);
        Self {
            bucket_size,
            inner: Mutex::new(Directory {
                global_depth: 0,
                num_buckets: 1,
                dir: vec![0],
                buckets: vec![Bucket::new(0, bucket_size)],
            }),
        }
    }

    fn hash_of(key: &K) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish() as usize
    }

    fn index_of(inner: &Directory<K, V>, key: &K) -> usize {
        let mask = (1usize << inner.global_depth) - 1;
        Self::hash_of(key) & mask
    }

    /// Looks up the value for `key`.
    pub fn find(&self, key: &K) -> Option<V> {
        let inner = self.inner.lock();
        let slot = Self::index_of(&inner, key);
        let bucket = &inner.buckets[inner.dir[slot]];
        bucket
            .items
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// Inserts a key-value pair, overwriting the value if the key already
    /// exists. A full target bucket splits (doubling the directory when its
    /// local depth has caught up with the global depth) until there is room.
    pub fn insert(&self, key: K, value: V) {
        let mut inner = self.inner.lock();

        // Overwrite in place if the key is present.
        {
            let slot = Self::index_of(&inner, &key);
            let bucket_idx = inner.dir[slot];
            let bucket = &mut inner.buckets[bucket_idx];
            if let Some(item) = bucket.items.iter_mut().find(|(k, _)| *k == key) {
                item.1 = value;
                return;
            }
        }

        // A split may cascade: all items can land in the same half, leaving
        // the target bucket full again.
        loop {
            let slot = Self::index_of(&inner, &key);
            let old_idx = inner.dir[slot];
            if inner.buckets[old_idx].items.len() < self.bucket_size {
                break;
            }
            self.split_bucket(&mut inner, old_idx);
        }

        let slot = Self::index_of(&inner, &key);
        let target = inner.dir[slot];
        inner.buckets[target].items.push((key, value));
    }

    /// Removes the entry for `key`, reporting whether it was present.
    pub fn remove(&self, key: &K) -> bool {
        let mut inner = self.inner.lock();
        let slot = Self::index_of(&inner, key);
        let bucket_idx = inner.dir[slot];
        let bucket = &mut inner.buckets[bucket_idx];
        match bucket.items.iter().position(|(k, _)| k == key) {
            Some(pos) => {
                bucket.items.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Splits the bucket at `old_idx` into a pair one level deeper,
    /// doubling the directory first if the bucket's local depth equals the
    /// global depth. The old arena slot is reused as the "zero" bucket of
    /// the pair.
    fn split_bucket(&self, inner: &mut Directory<K, V>, old_idx: usize) {
        let old_depth = inner.buckets[old_idx].depth;

        if old_depth == inner.global_depth {
            // Double the directory; the upper half mirrors the lower half.
            inner.global_depth += 1;
            let len = inner.dir.len();
            for i in 0..len {
                let target = inner.dir[i];
                inner.dir.push(target);
            }
        }

        // Partition the old items on the next hash bit.
        let mask = 1usize << old_depth;
        let items = std::mem::take(&mut inner.buckets[old_idx].items);
        let mut zero_items = Vec::with_capacity(self.bucket_size);
        let mut one_items = Vec::with_capacity(self.bucket_size);
        for (k, v) in items {
            if Self::hash_of(&k) & mask == 0 {
                zero_items.push((k, v));
            } else {
                one_items.push((k, v));
            }
        }

        inner.buckets[old_idx].depth = old_depth + 1;
        inner.buckets[old_idx].items = zero_items;

        let one_idx = inner.buckets.len();
        let mut one_bucket = Bucket::new(old_depth + 1, self.bucket_size);
        one_bucket.items = one_items;
        inner.buckets.push(one_bucket);
        inner.num_buckets += 1;

        // Repoint every slot that referenced the old bucket to whichever
        // half matches its split bit.
        for i in 0..inner.dir.len() {
            if inner.dir[i] == old_idx && i & mask != 0 {
                inner.dir[i] = one_idx;
            }
        }
    }

    /// Returns the global depth of the directory.
    pub fn global_depth(&self) -> usize {
        self.inner.lock().global_depth
    }

    /// Returns the local depth of the bucket that directory slot
    /// `dir_index` points at.
    pub fn local_depth(&self, dir_index: usize) -> usize {
        let inner = self.inner.lock();
        inner.buckets[inner.dir[dir_index]].depth
    }

    /// Returns the number of buckets allocated so far.
    pub fn num_buckets(&self) -> usize {
        self.inner.lock().num_buckets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_table_new() {
        let table: ExtendibleHashTable<u32, u32> = ExtendibleHashTable::new(4);
        assert_eq!(table.global_depth(), 0);
        assert_eq!(table.num_buckets(), 1);
        assert_eq!(table.find(&1), None);
    }

    #[test]
    fn test_hash_table_insert_find() {
        let table = ExtendibleHashTable::new(4);

        for i in 0..100u32 {
            table.insert(i, i * 10);
        }

        for i in 0..100u32 {
            assert_eq!(table.find(&i), Some(i * 10), "missing key {}", i);
        }
        assert_eq!(table.find(&1000), None);
    }

    #[test]
    fn test_hash_table_overwrite() {
        let table = ExtendibleHashTable::new(2);

        table.insert(7u32, "a");
        table.insert(7u32, "b");
        assert_eq!(table.find(&7), Some("b"));
        assert_eq!(table.num_buckets(), 1);
    }

    #[test]
    fn test_hash_table_remove() {
        let table = ExtendibleHashTable::new(4);

        for i in 0..20u32 {
            table.insert(i, i);
        }
        for i in 0..20u32 {
            assert!(table.remove(&i));
        }
        for i in 0..20u32 {
            assert!(!table.remove(&i));
            assert_eq!(table.find(&i), None);
        }
    }

    #[test]
    fn test_hash_table_split_grows_directory() {
        let table = ExtendibleHashTable::new(1);

        for i in 0..32u32 {
            table.insert(i, i);
        }

        // With one-item buckets every collision forces a split.
        assert!(table.num_buckets() > 1);
        assert!(table.global_depth() >= 1);
        for i in 0..32u32 {
            assert_eq!(table.find(&i), Some(i));
        }
    }

    #[test]
    fn test_hash_table_local_depth_bounded() {
        let table = ExtendibleHashTable::new(2);

        for i in 0..64u32 {
            table.insert(i, i);
        }

        let global = table.global_depth();
        for slot in 0..(1usize << global) {
            assert!(table.local_depth(slot) <= global);
        }
    }

    #[test]
    fn test_hash_table_concurrent_insert() {
        use std::sync::Arc;
        use std::thread;

        let table = Arc::new(ExtendibleHashTable::new(4));

        let handles: Vec<_> = (0..4u32)
            .map(|t| {
                let table = Arc::clone(&table);
                thread::spawn(move || {
                    for i in 0..250u32 {
                        let key = t * 250 + i;
                        table.insert(key, key);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        for key in 0..1000u32 {
            assert_eq!(table.find(&key), Some(key));
        }
    }
}
