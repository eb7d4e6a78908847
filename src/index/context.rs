use std::collections::{HashSet, VecDeque};

use parking_lot::RwLockWriteGuard;

use crate::buffer::WritePageGuard;
use crate::common::PageId;

/// Per-operation latch context for write descents.
///
/// Holds the root-id write guard (the queue's sentinel) and the write
/// guards of every ancestor that is still unsafe for the operation in
/// flight, plus the set of pages emptied by a delete cascade. Dropping the
/// context releases whatever is still held, so every exit path unlatches
/// exactly once.
pub(crate) struct LatchContext<'a> {
    root_latch: Option<RwLockWriteGuard<'a, PageId>>,
    pages: VecDeque<WritePageGuard>,
    deleted: HashSet<PageId>,
}

impl<'a> LatchContext<'a> {
    pub fn new(root_latch: RwLockWriteGuard<'a, PageId>) -> Self {
        Self {
            root_latch: Some(root_latch),
            pages: VecDeque::new(),
            deleted: HashSet::new(),
        }
    }

    /// The root page id as protected by the held sentinel.
    pub fn root(&self) -> Option<PageId> {
        self.root_latch.as_ref().map(|guard| **guard)
    }

    /// Rewrites the root page id. Returns false if the sentinel was
    /// already released, which callers treat as corruption: the protocol
    /// only changes the root while the root latch is retained.
    pub fn set_root(&mut self, root: PageId) -> bool {
        match self.root_latch.as_mut() {
            Some(guard) => {
                **guard = root;
                true
            }
            None => false,
        }
    }

    /// Queues an ancestor whose latch must outlive the descent.
    pub fn push(&mut self, guard: WritePageGuard) {
        self.pages.push_back(guard);
    }

    /// Hands back the nearest retained ancestor (the current node's
    /// parent) for split or underflow handling.
    pub fn pop_deepest(&mut self) -> Option<WritePageGuard> {
        self.pages.pop_back()
    }

    /// Releases the sentinel and every queued latch in insertion order.
    pub fn release_ancestors(&mut self) {
        self.root_latch = None;
        while let Some(guard) = self.pages.pop_front() {
            drop(guard);
        }
    }

    /// Marks a page unreachable; it is deleted after all latches drop.
    pub fn mark_deleted(&mut self, page_id: PageId) {
        self.deleted.insert(page_id);
    }

    pub fn take_deleted(&mut self) -> HashSet<PageId> {
        std::mem::take(&mut self.deleted)
    }
}
