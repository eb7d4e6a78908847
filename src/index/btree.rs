use std::sync::Arc;

use parking_lot::RwLock;

use crate::buffer::{BufferPoolManager, ReadPageGuard, WritePageGuard};
use crate::common::{
    BrambleError, PageId, RecordId, Result, HEADER_PAGE_ID, INVALID_PAGE_ID,
};
use crate::storage::page::{HeaderPage, HeaderPageRef};

use super::btree_iterator::BPlusTreeIterator;
use super::btree_page::{
    internal_capacity, leaf_capacity, set_parent_page_id, BTreePageRef, InternalPage,
    InternalPageRef, LeafPage, LeafPageRef,
};
use super::context::LatchContext;
use super::key_comparator::{GenericKey, KeyComparator};

/// The structural operation a write descent is performing; decides when an
/// ancestor's latch can be released early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccessMode {
    Insert,
    Delete,
}

/// A disk-backed B+ tree over fixed-width keys, safe for concurrent use.
///
/// Readers descend with hand-over-hand read latches. Writers take the
/// root-id latch as a sentinel and keep write latches on every ancestor
/// that could be restructured, releasing the whole chain as soon as a
/// child is proven safe for the operation. Unique keys only.
pub struct BPlusTree<const N: usize, C: KeyComparator> {
    index_name: String,
    /// Guards the identity of the root, independent of any page latch
    root_page_id: RwLock<PageId>,
    bpm: Arc<BufferPoolManager>,
    comparator: C,
    leaf_max_size: usize,
    internal_max_size: usize,
}

impl<const N: usize, C: KeyComparator> BPlusTree<N, C> {
    /// Creates an empty tree. `leaf_max_size` and `internal_max_size`
    /// bound the entry counts of the two page kinds; small values are
    /// useful to force splits in tests.
    pub fn new(
        name: impl Into<String>,
        bpm: Arc<BufferPoolManager>,
        comparator: C,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Self {
        assert!(leaf_max_size >= 2 && leaf_max_size <= leaf_capacity(N));
        assert!(internal_max_size >= 3 && internal_max_size <= internal_capacity(N));
        Self {
            index_name: name.into(),
            root_page_id: RwLock::new(INVALID_PAGE_ID),
            bpm,
            comparator,
            leaf_max_size,
            internal_max_size,
        }
    }

    /// Creates an empty tree with page-capacity max sizes.
    pub fn with_default_sizes(
        name: impl Into<String>,
        bpm: Arc<BufferPoolManager>,
        comparator: C,
    ) -> Self {
        Self::new(name, bpm, comparator, leaf_capacity(N), internal_capacity(N))
    }

    /// Reattaches to the root recorded for `name` in the header page. A
    /// missing record yields an empty tree.
    pub fn open(
        name: impl Into<String>,
        bpm: Arc<BufferPoolManager>,
        comparator: C,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Self> {
        let name = name.into();
        let root = {
            let guard = bpm.checked_read_page(HEADER_PAGE_ID)?;
            HeaderPageRef::new(guard.data())
                .get_record(&name)
                .unwrap_or(INVALID_PAGE_ID)
        };
        let tree = Self::new(name, bpm, comparator, leaf_max_size, internal_max_size);
        *tree.root_page_id.write() = root;
        Ok(tree)
    }

    pub fn is_empty(&self) -> bool {
        *self.root_page_id.read() == INVALID_PAGE_ID
    }

    pub fn get_root_page_id(&self) -> PageId {
        *self.root_page_id.read()
    }

    /// Point lookup. Appends the value for `key` to `result` and reports
    /// whether the key was found.
    pub fn get_value(&self, key: &GenericKey<N>, result: &mut Vec<RecordId>) -> Result<bool> {
        let root_latch = self.root_page_id.read();
        if *root_latch == INVALID_PAGE_ID {
            return Ok(false);
        }
        let guard = self.fetch_read(*root_latch)?;
        drop(root_latch);

        let leaf_guard = self.descend_read(guard, key)?;
        let leaf = LeafPageRef::<'_, N>::new(leaf_guard.data());
        match leaf.lookup(key.as_bytes(), &self.comparator) {
            Some(rid) => {
                result.push(rid);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Inserts a key-value pair. Returns false (and changes nothing) if
    /// the key is already present.
    pub fn insert(&self, key: &GenericKey<N>, rid: RecordId) -> Result<bool> {
        let mut ctx = LatchContext::new(self.root_page_id.write());

        if ctx.root() == Some(INVALID_PAGE_ID) {
            self.start_new_tree(key, rid, &mut ctx)?;
            return Ok(true);
        }

        let mut leaf_guard = self.find_leaf_write(key, AccessMode::Insert, &mut ctx)?;

        {
            let leaf = LeafPageRef::<'_, N>::new(leaf_guard.data());
            if leaf.lookup(key.as_bytes(), &self.comparator).is_some() {
                ctx.release_ancestors();
                return Ok(false);
            }
        }

        let (needs_split, leaf_pid, parent_pid) = {
            let mut leaf = LeafPage::<'_, N>::new(leaf_guard.data_mut());
            leaf.insert(key.as_bytes(), rid, &self.comparator);
            (
                leaf.size() >= self.leaf_max_size,
                leaf.page_id(),
                leaf.parent_page_id(),
            )
        };

        if !needs_split {
            ctx.release_ancestors();
            return Ok(true);
        }

        // Split: upper half to a fresh leaf, spliced into the chain.
        let new_leaf_pid = self.allocate_page()?;
        let mut new_leaf_guard = self.fetch_write(new_leaf_pid)?;
        let separator = {
            let mut leaf = LeafPage::<'_, N>::new(leaf_guard.data_mut());
            let mut new_leaf = LeafPage::<'_, N>::new(new_leaf_guard.data_mut());
            new_leaf.init(new_leaf_pid, parent_pid, self.leaf_max_size);
            leaf.move_half_to(&mut new_leaf);
            GenericKey::<N>::from_bytes(new_leaf.key_at(0))
        };

        // The pair is consistent and unreachable from the parent chain
        // held in ctx, so their latches can drop before the parent is
        // updated.
        drop(new_leaf_guard);
        drop(leaf_guard);

        self.insert_into_parent(leaf_pid, new_leaf_pid, separator, parent_pid, &mut ctx)?;
        Ok(true)
    }

    /// Deletes `key` if present, rebalancing as needed. Absent keys are a
    /// silent no-op.
    pub fn remove(&self, key: &GenericKey<N>) -> Result<()> {
        let mut ctx = LatchContext::new(self.root_page_id.write());
        if ctx.root() == Some(INVALID_PAGE_ID) {
            return Ok(());
        }

        let mut leaf_guard = self.find_leaf_write(key, AccessMode::Delete, &mut ctx)?;

        {
            let leaf = LeafPageRef::<'_, N>::new(leaf_guard.data());
            if leaf.lookup(key.as_bytes(), &self.comparator).is_none() {
                ctx.release_ancestors();
                return Ok(());
            }
        }

        let underflow = {
            let mut leaf = LeafPage::<'_, N>::new(leaf_guard.data_mut());
            leaf.remove(key.as_bytes(), &self.comparator);
            leaf.size() < leaf.min_size()
        };

        if underflow {
            self.fix_underflow(leaf_guard, &mut ctx)?;
        } else {
            ctx.release_ancestors();
            drop(leaf_guard);
        }

        let deleted = ctx.take_deleted();
        drop(ctx);
        for page_id in deleted {
            // Best effort: a concurrent iterator may still pin the page,
            // in which case eviction reclaims it once unpinned.
            let _ = self.bpm.delete_page(page_id);
        }
        Ok(())
    }

    /// Iterator positioned at the leftmost entry.
    pub fn begin(&self) -> Result<BPlusTreeIterator<N>> {
        let root_latch = self.root_page_id.read();
        if *root_latch == INVALID_PAGE_ID {
            return Ok(BPlusTreeIterator::empty(Arc::clone(&self.bpm)));
        }
        let mut guard = self.fetch_read(*root_latch)?;
        drop(root_latch);

        loop {
            if BTreePageRef::new(guard.data()).is_leaf() {
                return Ok(BPlusTreeIterator::new(Arc::clone(&self.bpm), guard, 0));
            }
            let child = InternalPageRef::<'_, N>::new(guard.data()).child_at(0);
            guard = self.fetch_read(child)?;
        }
    }

    /// Iterator positioned at the first entry >= `key`.
    pub fn begin_at(&self, key: &GenericKey<N>) -> Result<BPlusTreeIterator<N>> {
        let root_latch = self.root_page_id.read();
        if *root_latch == INVALID_PAGE_ID {
            return Ok(BPlusTreeIterator::empty(Arc::clone(&self.bpm)));
        }
        let guard = self.fetch_read(*root_latch)?;
        drop(root_latch);

        let leaf_guard = self.descend_read(guard, key)?;
        let index = LeafPageRef::<'_, N>::new(leaf_guard.data())
            .find_index(key.as_bytes(), &self.comparator);
        Ok(BPlusTreeIterator::new(Arc::clone(&self.bpm), leaf_guard, index))
    }

    /// Read crabbing: latch the child, then release the parent by
    /// replacing the held guard.
    fn descend_read(&self, mut guard: ReadPageGuard, key: &GenericKey<N>) -> Result<ReadPageGuard> {
        loop {
            if BTreePageRef::new(guard.data()).is_leaf() {
                return Ok(guard);
            }
            let child = InternalPageRef::<'_, N>::new(guard.data())
                .lookup(key.as_bytes(), &self.comparator);
            guard = self.fetch_read(child)?;
        }
    }

    /// Write crabbing descent to the leaf owning `key`. Unsafe ancestors
    /// accumulate in `ctx`; a safe child releases the whole chain.
    fn find_leaf_write(
        &self,
        key: &GenericKey<N>,
        mode: AccessMode,
        ctx: &mut LatchContext<'_>,
    ) -> Result<WritePageGuard> {
        let root_pid = ctx
            .root()
            .ok_or_else(|| BrambleError::IndexCorrupted("root latch released early".into()))?;
        let mut guard = self.fetch_write(root_pid)?;

        if Self::root_is_safe(&BTreePageRef::new(guard.data()), mode) {
            ctx.release_ancestors();
        }

        loop {
            let child_pid = {
                let page = BTreePageRef::new(guard.data());
                if page.is_leaf() {
                    return Ok(guard);
                }
                InternalPageRef::<'_, N>::new(guard.data()).lookup(key.as_bytes(), &self.comparator)
            };

            let child_guard = self.fetch_write(child_pid)?;
            let child_safe = Self::is_safe(&BTreePageRef::new(child_guard.data()), mode);
            ctx.push(guard);
            if child_safe {
                ctx.release_ancestors();
            }
            guard = child_guard;
        }
    }

    /// Whether a child cannot propagate a structural change to its parent.
    fn is_safe(page: &BTreePageRef<'_>, mode: AccessMode) -> bool {
        match mode {
            AccessMode::Insert => {
                if page.is_leaf() {
                    page.size() + 1 < page.max_size()
                } else {
                    page.size() < page.max_size()
                }
            }
            AccessMode::Delete => page.size() > page.min_size(),
        }
    }

    /// The root uses a coarser delete bound: at size <= 2 it may collapse
    /// or promote its sole child, so the sentinel stays held.
    fn root_is_safe(page: &BTreePageRef<'_>, mode: AccessMode) -> bool {
        match mode {
            AccessMode::Insert => Self::is_safe(page, mode),
            AccessMode::Delete => page.size() > 2,
        }
    }

    /// First insert into an empty tree: a single leaf becomes the root.
    fn start_new_tree(
        &self,
        key: &GenericKey<N>,
        rid: RecordId,
        ctx: &mut LatchContext<'_>,
    ) -> Result<()> {
        let root_pid = self.allocate_page()?;
        {
            let mut guard = self.fetch_write(root_pid)?;
            let mut leaf = LeafPage::<'_, N>::new(guard.data_mut());
            leaf.init(root_pid, INVALID_PAGE_ID, self.leaf_max_size);
            leaf.insert(key.as_bytes(), rid, &self.comparator);
        }
        self.set_root(ctx, root_pid)?;
        ctx.release_ancestors();
        Ok(())
    }

    /// Registers `right_pid` (with separator `separator`) next to
    /// `left_pid` in their parent, growing a new root or splitting the
    /// parent as needed. The split pair's latches are already released;
    /// exclusion comes from the ancestor chain in `ctx`.
    fn insert_into_parent(
        &self,
        left_pid: PageId,
        right_pid: PageId,
        separator: GenericKey<N>,
        parent_pid: PageId,
        ctx: &mut LatchContext<'_>,
    ) -> Result<()> {
        if parent_pid == INVALID_PAGE_ID {
            // The split node was the root: grow a level.
            let new_root_pid = self.allocate_page()?;
            {
                let mut guard = self.fetch_write(new_root_pid)?;
                let mut root = InternalPage::<'_, N>::new(guard.data_mut());
                root.init(new_root_pid, INVALID_PAGE_ID, self.internal_max_size);
                root.populate_new_root(left_pid, separator.as_bytes(), right_pid);
            }
            for pid in [left_pid, right_pid] {
                let mut guard = self.fetch_write(pid)?;
                set_parent_page_id(guard.data_mut(), new_root_pid);
            }
            self.set_root(ctx, new_root_pid)?;
            ctx.release_ancestors();
            return Ok(());
        }

        let mut parent_guard = ctx.pop_deepest().ok_or_else(|| {
            BrambleError::IndexCorrupted("split propagated past the latched ancestors".into())
        })?;
        if parent_guard.page_id() != parent_pid {
            return Err(BrambleError::IndexCorrupted(
                "ancestor queue does not match parent pointer".into(),
            ));
        }

        let has_room =
            InternalPageRef::<'_, N>::new(parent_guard.data()).size() < self.internal_max_size;
        if has_room {
            let mut parent = InternalPage::<'_, N>::new(parent_guard.data_mut());
            parent.insert_node_after(left_pid, separator.as_bytes(), right_pid);
            ctx.release_ancestors();
            return Ok(());
        }

        // No room: insert anyway (momentarily overfull under the held
        // latch), then split the parent and recurse.
        let (grand_pid, new_parent_pid, new_separator) = {
            let mut parent = InternalPage::<'_, N>::new(parent_guard.data_mut());
            parent.insert_node_after(left_pid, separator.as_bytes(), right_pid);
            let grand_pid = parent.parent_page_id();

            let new_parent_pid = self.allocate_page()?;
            let mut new_guard = self.fetch_write(new_parent_pid)?;
            let mut new_parent = InternalPage::<'_, N>::new(new_guard.data_mut());
            new_parent.init(new_parent_pid, grand_pid, self.internal_max_size);
            parent.move_half_to(&mut new_parent, &self.bpm)?;
            let new_separator = GenericKey::<N>::from_bytes(new_parent.key_at(0));
            (grand_pid, new_parent_pid, new_separator)
        };

        drop(parent_guard);
        self.insert_into_parent(parent_pid, new_parent_pid, new_separator, grand_pid, ctx)
    }

    /// Restores the minimum-occupancy invariant for an underfull node,
    /// borrowing from or merging with a sibling and cascading upward.
    fn fix_underflow(&self, mut node_guard: WritePageGuard, ctx: &mut LatchContext<'_>) -> Result<()> {
        let (is_root, is_leaf, size, node_pid) = {
            let page = BTreePageRef::new(node_guard.data());
            (page.is_root(), page.is_leaf(), page.size(), page.page_id())
        };

        if is_root {
            if is_leaf && size == 0 {
                // The tree is empty again.
                self.set_root(ctx, INVALID_PAGE_ID)?;
                ctx.mark_deleted(node_pid);
                drop(node_guard);
                ctx.release_ancestors();
                return Ok(());
            }
            if !is_leaf && size == 1 {
                // Promote the sole child to root.
                let child_pid = InternalPageRef::<'_, N>::new(node_guard.data()).child_at(0);
                self.set_root(ctx, child_pid)?;
                ctx.mark_deleted(node_pid);
                drop(node_guard);
                {
                    let mut child_guard = self.fetch_write(child_pid)?;
                    set_parent_page_id(child_guard.data_mut(), INVALID_PAGE_ID);
                }
                ctx.release_ancestors();
                return Ok(());
            }
            return Ok(());
        }

        {
            let page = BTreePageRef::new(node_guard.data());
            if page.size() >= page.min_size() {
                ctx.release_ancestors();
                return Ok(());
            }
        }

        let mut parent_guard = ctx.pop_deepest().ok_or_else(|| {
            BrambleError::IndexCorrupted("underflow propagated past the latched ancestors".into())
        })?;
        let (node_index, parent_size) = {
            let parent = InternalPageRef::<'_, N>::new(parent_guard.data());
            let index = parent.find_child_index(node_pid).ok_or_else(|| {
                BrambleError::IndexCorrupted("node missing from its parent".into())
            })?;
            (index, parent.size())
        };

        // Borrow from the left sibling if it can spare an entry.
        if node_index > 0 {
            let left_pid = InternalPageRef::<'_, N>::new(parent_guard.data()).child_at(node_index - 1);
            let mut left_guard = self.fetch_write(left_pid)?;
            let can_borrow = {
                let page = BTreePageRef::new(left_guard.data());
                page.size() > page.min_size()
            };
            if can_borrow {
                self.redistribute_from_left(
                    &mut left_guard,
                    &mut node_guard,
                    &mut parent_guard,
                    node_index,
                )?;
                ctx.release_ancestors();
                return Ok(());
            }
        }

        // Borrow from the right sibling.
        if node_index + 1 < parent_size {
            let right_pid = InternalPageRef::<'_, N>::new(parent_guard.data()).child_at(node_index + 1);
            let mut right_guard = self.fetch_write(right_pid)?;
            let can_borrow = {
                let page = BTreePageRef::new(right_guard.data());
                page.size() > page.min_size()
            };
            if can_borrow {
                self.redistribute_from_right(
                    &mut right_guard,
                    &mut node_guard,
                    &mut parent_guard,
                    node_index,
                )?;
                ctx.release_ancestors();
                return Ok(());
            }
        }

        // No sibling can lend: merge, preferring the left sibling. The
        // merged pair's latches drop before the cascade continues.
        if node_index > 0 {
            let left_pid = InternalPageRef::<'_, N>::new(parent_guard.data()).child_at(node_index - 1);
            let mut left_guard = self.fetch_write(left_pid)?;
            self.merge(&mut left_guard, &mut node_guard, &mut parent_guard, node_index)?;
            ctx.mark_deleted(node_pid);
            drop(node_guard);
            drop(left_guard);
        } else if node_index + 1 < parent_size {
            let right_pid = InternalPageRef::<'_, N>::new(parent_guard.data()).child_at(node_index + 1);
            let mut right_guard = self.fetch_write(right_pid)?;
            self.merge(&mut node_guard, &mut right_guard, &mut parent_guard, node_index + 1)?;
            ctx.mark_deleted(right_pid);
            drop(right_guard);
            drop(node_guard);
        } else {
            return Err(BrambleError::IndexCorrupted(
                "underfull node has no siblings".into(),
            ));
        }

        self.fix_underflow(parent_guard, ctx)
    }

    /// Moves the left sibling's last entry to the front of `node` and
    /// refreshes the separator at `node_index`.
    fn redistribute_from_left(
        &self,
        left_guard: &mut WritePageGuard,
        node_guard: &mut WritePageGuard,
        parent_guard: &mut WritePageGuard,
        node_index: usize,
    ) -> Result<()> {
        let is_leaf = BTreePageRef::new(node_guard.data()).is_leaf();

        let borrowed_key = if is_leaf {
            let mut left = LeafPage::<'_, N>::new(left_guard.data_mut());
            let last = left.size() - 1;
            let key = GenericKey::<N>::from_bytes(left.key_at(last));
            let rid = left.rid_at(last);
            left.remove_at(last);

            let mut node = LeafPage::<'_, N>::new(node_guard.data_mut());
            node.insert(key.as_bytes(), rid, &self.comparator);
            key
        } else {
            let mut left = InternalPage::<'_, N>::new(left_guard.data_mut());
            let last = left.size() - 1;
            let key = GenericKey::<N>::from_bytes(left.key_at(last));
            let child = left.child_at(last);
            left.remove(last);

            let mut node = InternalPage::<'_, N>::new(node_guard.data_mut());
            node.insert_to_start(key.as_bytes(), child, &self.bpm)?;
            key
        };

        let mut parent = InternalPage::<'_, N>::new(parent_guard.data_mut());
        parent.set_key_at(node_index, borrowed_key.as_bytes());
        Ok(())
    }

    /// Moves the right sibling's first entry to the back of `node` and
    /// refreshes the separator at `node_index + 1` with the sibling's new
    /// first key.
    fn redistribute_from_right(
        &self,
        right_guard: &mut WritePageGuard,
        node_guard: &mut WritePageGuard,
        parent_guard: &mut WritePageGuard,
        node_index: usize,
    ) -> Result<()> {
        let is_leaf = BTreePageRef::new(node_guard.data()).is_leaf();

        let new_first = if is_leaf {
            let mut right = LeafPage::<'_, N>::new(right_guard.data_mut());
            let key = GenericKey::<N>::from_bytes(right.key_at(0));
            let rid = right.rid_at(0);
            right.remove_at(0);
            let new_first = GenericKey::<N>::from_bytes(right.key_at(0));

            let mut node = LeafPage::<'_, N>::new(node_guard.data_mut());
            node.insert(key.as_bytes(), rid, &self.comparator);
            new_first
        } else {
            let mut right = InternalPage::<'_, N>::new(right_guard.data_mut());
            let key = GenericKey::<N>::from_bytes(right.key_at(0));
            let child = right.child_at(0);
            right.remove(0);
            let new_first = GenericKey::<N>::from_bytes(right.key_at(0));

            let mut node = InternalPage::<'_, N>::new(node_guard.data_mut());
            node.insert_to_end(key.as_bytes(), child, &self.bpm)?;
            new_first
        };

        let mut parent = InternalPage::<'_, N>::new(parent_guard.data_mut());
        parent.set_key_at(node_index + 1, new_first.as_bytes());
        Ok(())
    }

    /// Folds `right` into `left` and drops the parent's separator entry
    /// at `right_index`.
    fn merge(
        &self,
        left_guard: &mut WritePageGuard,
        right_guard: &mut WritePageGuard,
        parent_guard: &mut WritePageGuard,
        right_index: usize,
    ) -> Result<()> {
        let is_leaf = BTreePageRef::new(right_guard.data()).is_leaf();
        if is_leaf {
            let mut right = LeafPage::<'_, N>::new(right_guard.data_mut());
            let mut left = LeafPage::<'_, N>::new(left_guard.data_mut());
            right.move_all_to(&mut left);
        } else {
            let mut right = InternalPage::<'_, N>::new(right_guard.data_mut());
            let mut left = InternalPage::<'_, N>::new(left_guard.data_mut());
            right.move_all_to(&mut left, &self.bpm)?;
        }

        let mut parent = InternalPage::<'_, N>::new(parent_guard.data_mut());
        parent.remove(right_index);
        Ok(())
    }

    /// Pool exhaustion is transient under concurrent descents: frames free
    /// up as other operations unpin. The tree is the caller the buffer
    /// pool expects to retry, so these wrappers spin on `BufferPoolFull`.
    fn fetch_read(&self, page_id: PageId) -> Result<ReadPageGuard> {
        loop {
            match self.bpm.checked_read_page(page_id) {
                Err(BrambleError::BufferPoolFull) => std::thread::yield_now(),
                other => return other,
            }
        }
    }

    fn fetch_write(&self, page_id: PageId) -> Result<WritePageGuard> {
        loop {
            match self.bpm.checked_write_page(page_id) {
                Err(BrambleError::BufferPoolFull) => std::thread::yield_now(),
                other => return other,
            }
        }
    }

    fn allocate_page(&self) -> Result<PageId> {
        loop {
            match self.bpm.new_page() {
                Err(BrambleError::BufferPoolFull) => std::thread::yield_now(),
                other => return other,
            }
        }
    }

    /// Rewrites the root id under the held sentinel and mirrors it into
    /// the header page record.
    fn set_root(&self, ctx: &mut LatchContext<'_>, root: PageId) -> Result<()> {
        if !ctx.set_root(root) {
            return Err(BrambleError::IndexCorrupted(
                "root changed without the root latch".into(),
            ));
        }
        let mut guard = self.fetch_write(HEADER_PAGE_ID)?;
        let mut header = HeaderPage::new(guard.data_mut());
        if !header.update_record(&self.index_name, root)
            && !header.insert_record(&self.index_name, root)
        {
            return Err(BrambleError::HeaderPageFull);
        }
        Ok(())
    }
}
