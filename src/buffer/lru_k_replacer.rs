use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::common::FrameId;

/// Tracking state for a single frame
#[derive(Debug)]
struct FrameRecord {
    access_count: usize,
    is_evictable: bool,
}

struct ReplacerInner {
    /// Frames with fewer than k accesses, FIFO by first access
    history: VecDeque<FrameId>,
    /// Frames with at least k accesses; front is least-recently k-used
    cache: VecDeque<FrameId>,
    records: HashMap<FrameId, FrameRecord>,
    /// Number of tracked frames currently evictable
    curr_size: usize,
}

impl ReplacerInner {
    fn detach(queue: &mut VecDeque<FrameId>, frame_id: FrameId) {
        if let Some(pos) = queue.iter().position(|&f| f == frame_id) {
            queue.remove(pos);
        }
    }
}

/// LRU-K replacement policy.
///
/// Frames with fewer than k recorded accesses live in a history queue and
/// are evicted first, oldest first access winning. Frames with k or more
/// accesses live in a cache queue ordered by most recent access; the least
/// recently used end is evicted first. Only frames marked evictable are
/// eviction candidates.
pub struct LruKReplacer {
    k: usize,
    /// Maximum number of frames the replacer can track
    replacer_size: usize,
    inner: Mutex<ReplacerInner>,
}

impl LruKReplacer {
    /// Creates a new LRU-K replacer tracking at most `replacer_size` frames.
    pub fn new(k: usize, replacer_size: usize) -> Self {
        assert!(k > 0);
        Self {
            k,
            replacer_size,
            inner: Mutex::new(ReplacerInner {
                history: VecDeque::new(),
                cache: VecDeque::new(),
                records: HashMap::new(),
                curr_size: 0,
            }),
        }
    }

    /// Evicts the frame with the largest backward k-distance: the first
    /// evictable frame in the history queue, else the first evictable frame
    /// in the cache queue. Returns None if nothing is evictable.
    pub fn evict(&self) -> Option<FrameId> {
        let mut inner = self.inner.lock();

        let victim = inner
            .history
            .iter()
            .chain(inner.cache.iter())
            .copied()
            .find(|f| inner.records[f].is_evictable)?;

        ReplacerInner::detach(&mut inner.history, victim);
        ReplacerInner::detach(&mut inner.cache, victim);
        inner.records.remove(&victim);
        inner.curr_size -= 1;
        Some(victim)
    }

    /// Records an access to the given frame. Unknown frames enter the
    /// history queue with one access; a frame whose count reaches k moves
    /// to the cache queue, and further accesses move it to the cache tail.
    /// Frames outside the tracked range are ignored.
    pub fn record_access(&self, frame_id: FrameId) {
        if frame_id.as_usize() >= self.replacer_size {
            return;
        }

        use std::collections::hash_map::Entry;

        let mut inner = self.inner.lock();
        let count = match inner.records.entry(frame_id) {
            Entry::Vacant(entry) => {
                entry.insert(FrameRecord {
                    access_count: 1,
                    is_evictable: false,
                });
                None
            }
            Entry::Occupied(entry) => {
                let record = entry.into_mut();
                record.access_count += 1;
                Some(record.access_count)
            }
        };

        match count {
            None => inner.history.push_back(frame_id),
            Some(count) if count == self.k => {
                ReplacerInner::detach(&mut inner.history, frame_id);
                inner.cache.push_back(frame_id);
            }
            Some(count) if count > self.k => {
                ReplacerInner::detach(&mut inner.cache, frame_id);
                inner.cache.push_back(frame_id);
            }
            // Below k the history queue keeps first-access order.
            Some(_) => {}
        }
    }

    /// Sets whether a frame may be evicted, adjusting the evictable count.
    /// Unknown frames are a no-op.
    pub fn set_evictable(&self, frame_id: FrameId, is_evictable: bool) {
        let mut inner = self.inner.lock();
        if let Some(record) = inner.records.get_mut(&frame_id) {
            if record.is_evictable != is_evictable {
                record.is_evictable = is_evictable;
                if is_evictable {
                    inner.curr_size += 1;
                } else {
                    inner.curr_size -= 1;
                }
            }
        }
    }

    /// Drops a frame from the replacer entirely. Callers must not remove
    /// pinned frames; unknown or non-evictable frames are left alone.
    pub fn remove(&self, frame_id: FrameId) {
        let mut inner = self.inner.lock();
        match inner.records.get(&frame_id) {
            Some(record) if record.is_evictable => {}
            _ => return,
        }
        ReplacerInner::detach(&mut inner.history, frame_id);
        ReplacerInner::detach(&mut inner.cache, frame_id);
        inner.records.remove(&frame_id);
        inner.curr_size -= 1;
    }

    /// Returns the number of evictable frames.
    pub fn size(&self) -> usize {
        self.inner.lock().curr_size
    }

    /// Returns the k value of this replacer.
    pub fn k(&self) -> usize {
        self.k
    }
}
