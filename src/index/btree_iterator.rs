use std::sync::Arc;

use crate::buffer::{BufferPoolManager, ReadPageGuard};
use crate::common::{RecordId, Result, INVALID_PAGE_ID};

use super::btree_page::LeafPageRef;
use super::key_comparator::GenericKey;

/// Forward iterator over the leaf chain.
///
/// Holds a read latch and pin on its current leaf. Advancing across a leaf
/// boundary latches the next leaf before the current one is released, so
/// the iterator always observes a consistent page. Dropping the iterator
/// releases the final leaf.
pub struct BPlusTreeIterator<const N: usize> {
    bpm: Arc<BufferPoolManager>,
    current: Option<ReadPageGuard>,
    index: usize,
}

impl<const N: usize> BPlusTreeIterator<N> {
    pub(crate) fn new(bpm: Arc<BufferPoolManager>, leaf: ReadPageGuard, index: usize) -> Self {
        Self {
            bpm,
            current: Some(leaf),
            index,
        }
    }

    pub(crate) fn empty(bpm: Arc<BufferPoolManager>) -> Self {
        Self {
            bpm,
            current: None,
            index: 0,
        }
    }

    /// Returns the next entry, hopping to the next leaf when the current
    /// one is exhausted. None once the chain ends.
    pub fn next(&mut self) -> Result<Option<(GenericKey<N>, RecordId)>> {
        loop {
            let next_page_id = {
                let guard = match self.current.as_ref() {
                    Some(guard) => guard,
                    None => return Ok(None),
                };
                let leaf = LeafPageRef::<'_, N>::new(guard.data());
                if self.index < leaf.size() {
                    let key = GenericKey::<N>::from_bytes(leaf.key_at(self.index));
                    let rid = leaf.rid_at(self.index);
                    self.index += 1;
                    return Ok(Some((key, rid)));
                }
                leaf.next_page_id()
            };

            if next_page_id == INVALID_PAGE_ID {
                self.current = None;
                return Ok(None);
            }

            // Latch the next leaf before releasing the current one. A
            // momentarily exhausted pool clears as other operations unpin.
            let next_guard = loop {
                match self.bpm.checked_read_page(next_page_id) {
                    Err(crate::common::BrambleError::BufferPoolFull) => std::thread::yield_now(),
                    other => break other?,
                }
            };
            self.current = Some(next_guard);
            self.index = 0;
        }
    }
}

impl<const N: usize> Iterator for BPlusTreeIterator<N> {
    type Item = Result<(GenericKey<N>, RecordId)>;

    fn next(&mut self) -> Option<Self::Item> {
        match BPlusTreeIterator::next(self) {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
