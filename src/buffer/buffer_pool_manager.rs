use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::{
    BrambleError, FrameId, PageId, Result, DEFAULT_HASH_BUCKET_SIZE, INVALID_PAGE_ID, PAGE_SIZE,
};
use crate::container::ExtendibleHashTable;
use crate::storage::disk::{DiskManager, DiskScheduler};

use super::{FrameHeader, LruKReplacer, ReadPageGuard, WritePageGuard};

/// Allocator state guarded by the pool latch.
struct PoolMeta {
    /// Frames not currently holding any page
    free_list: VecDeque<FrameId>,
    /// Next page id to hand out
    next_page_id: u32,
}

/// State shared between the manager and outstanding page guards.
struct PoolState {
    frames: Vec<Arc<FrameHeader>>,
    /// Page table: maps resident page ids to frame ids
    page_table: ExtendibleHashTable<PageId, FrameId>,
    /// LRU-K replacer for eviction decisions
    replacer: LruKReplacer,
    /// The pool latch. Held for the full duration of every operation that
    /// changes frame state, so allocation, eviction, pinning and unpinning
    /// are serialized. The page table and replacer have their own internal
    /// locks but are only touched while this latch is held.
    latch: Mutex<PoolMeta>,
}

impl PoolState {
    /// Guard release path: OR the dirty hint into the frame, unpin, and
    /// re-arm eviction when the pin count reaches zero. The caller has
    /// already released the page latch.
    fn complete_unpin(&self, page_id: PageId, is_dirty: bool) {
        let _meta = self.latch.lock();
        if let Some(frame_id) = self.page_table.find(&page_id) {
            let frame = &self.frames[frame_id.as_usize()];
            if is_dirty {
                frame.set_dirty(true);
            }
            if let Some(0) = frame.unpin() {
                self.replacer.set_evictable(frame_id, true);
            }
        }
    }
}

/// BufferPoolManager caches disk pages in a fixed set of frames. Page
/// residency is tracked in an extendible hash table, eviction follows the
/// LRU-K policy, and all access goes through pinned RAII guards.
pub struct BufferPoolManager {
    pool_size: usize,
    state: Arc<PoolState>,
    disk_scheduler: DiskScheduler,
}

impl BufferPoolManager {
    /// Creates a pool of `pool_size` frames with an LRU-`k` replacer over
    /// the given disk manager. Page id allocation resumes past any pages
    /// already in the file.
    pub fn new(pool_size: usize, k: usize, disk_manager: Arc<DiskManager>) -> Result<Self> {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);
        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(FrameHeader::new(frame_id)));
            free_list.push_back(frame_id);
        }

        let next_page_id = disk_manager.num_pages()?;

        let state = Arc::new(PoolState {
            frames,
            page_table: ExtendibleHashTable::new(DEFAULT_HASH_BUCKET_SIZE),
            replacer: LruKReplacer::new(k, pool_size),
            latch: Mutex::new(PoolMeta {
                free_list,
                next_page_id,
            }),
        });

        Ok(Self {
            pool_size,
            state,
            disk_scheduler: DiskScheduler::new(disk_manager),
        })
    }

    /// Allocates a fresh page in a free or evicted frame and returns its
    /// id. The page starts unpinned; take a guard to pin and access it.
    /// Fails with `BufferPoolFull` when every frame is pinned.
    pub fn new_page(&self) -> Result<PageId> {
        let mut meta = self.state.latch.lock();

        let frame_id = self.acquire_frame(&mut meta)?;
        let page_id = PageId::new(meta.next_page_id);
        meta.next_page_id += 1;

        // acquire_frame hands back a reset frame: clean, unpinned, zeroed.
        let frame = &self.state.frames[frame_id.as_usize()];
        frame.set_page_id(page_id);

        self.state.page_table.insert(page_id, frame_id);
        self.state.replacer.record_access(frame_id);
        self.state.replacer.set_evictable(frame_id, true);

        Ok(page_id)
    }

    /// Fetches a page for shared read access.
    pub fn checked_read_page(&self, page_id: PageId) -> Result<ReadPageGuard> {
        let frame = self.fetch_page(page_id)?;
        let state = Arc::clone(&self.state);
        let guard = unsafe {
            ReadPageGuard::new(
                page_id,
                frame,
                Box::new(move |pid, is_dirty| state.complete_unpin(pid, is_dirty)),
            )
        };
        Ok(guard)
    }

    /// Fetches a page for exclusive write access.
    pub fn checked_write_page(&self, page_id: PageId) -> Result<WritePageGuard> {
        let frame = self.fetch_page(page_id)?;
        let state = Arc::clone(&self.state);
        let guard = unsafe {
            WritePageGuard::new(
                page_id,
                frame,
                Box::new(move |pid, is_dirty| state.complete_unpin(pid, is_dirty)),
            )
        };
        Ok(guard)
    }

    /// Writes a page's bytes to disk and clears its dirty flag, pinned or
    /// not. Returns false if the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if page_id == INVALID_PAGE_ID {
            return Err(BrambleError::InvalidPageId(page_id));
        }

        let _meta = self.state.latch.lock();
        match self.state.page_table.find(&page_id) {
            Some(frame_id) => {
                let frame = &self.state.frames[frame_id.as_usize()];
                let mut data = [0u8; PAGE_SIZE];
                frame.copy_out(&mut data);
                self.disk_scheduler.schedule_write_sync(page_id, &data)?;
                frame.set_dirty(false);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Writes every dirty resident page to disk.
    pub fn flush_all_pages(&self) -> Result<()> {
        let _meta = self.state.latch.lock();
        for frame in &self.state.frames {
            if frame.is_dirty() && frame.page_id() != INVALID_PAGE_ID {
                let mut data = [0u8; PAGE_SIZE];
                frame.copy_out(&mut data);
                self.disk_scheduler
                    .schedule_write_sync(frame.page_id(), &data)?;
                frame.set_dirty(false);
            }
        }
        Ok(())
    }

    /// Removes a page from the pool, returning its frame to the free list.
    /// A non-resident page is nothing to do; a pinned page is an error the
    /// caller must resolve by dropping its guards first.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut meta = self.state.latch.lock();

        let frame_id = match self.state.page_table.find(&page_id) {
            Some(frame_id) => frame_id,
            None => return Ok(true),
        };

        let frame = &self.state.frames[frame_id.as_usize()];
        if frame.pin_count() != 0 {
            return Err(BrambleError::PageStillPinned(page_id));
        }

        if frame.is_dirty() {
            let mut data = [0u8; PAGE_SIZE];
            frame.copy_out(&mut data);
            self.disk_scheduler.schedule_write_sync(page_id, &data)?;
        }

        self.state.page_table.remove(&page_id);
        self.state.replacer.remove(frame_id);
        frame.reset();
        meta.free_list.push_back(frame_id);
        Ok(true)
    }

    /// Returns the pin count for a resident page.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let _meta = self.state.latch.lock();
        self.state
            .page_table
            .find(&page_id)
            .map(|frame_id| self.state.frames[frame_id.as_usize()].pin_count())
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn free_frame_count(&self) -> usize {
        self.state.latch.lock().free_list.len()
    }

    /// Pins the frame holding `page_id`, reading it in from disk first if
    /// it is not resident. Runs entirely under the pool latch.
    fn fetch_page(&self, page_id: PageId) -> Result<Arc<FrameHeader>> {
        if page_id == INVALID_PAGE_ID {
            return Err(BrambleError::InvalidPageId(page_id));
        }

        let mut meta = self.state.latch.lock();

        if let Some(frame_id) = self.state.page_table.find(&page_id) {
            let frame = &self.state.frames[frame_id.as_usize()];
            frame.pin();
            self.state.replacer.record_access(frame_id);
            self.state.replacer.set_evictable(frame_id, false);
            return Ok(Arc::clone(frame));
        }

        let frame_id = self.acquire_frame(&mut meta)?;
        let frame = &self.state.frames[frame_id.as_usize()];

        frame.set_page_id(page_id);
        frame.pin();

        // Populate from disk before the guard can observe the frame. The
        // frame is unreferenced here, so the data latch is uncontended.
        let buf = self.disk_scheduler.schedule_read_sync(page_id)?;
        frame.copy_in(&buf[..]);

        self.state.page_table.insert(page_id, frame_id);
        self.state.replacer.record_access(frame_id);
        self.state.replacer.set_evictable(frame_id, false);

        Ok(Arc::clone(frame))
    }

    /// Picks a victim frame: the free list first, then the replacer. An
    /// evicted dirty page is written back and unmapped.
    fn acquire_frame(&self, meta: &mut PoolMeta) -> Result<FrameId> {
        if let Some(frame_id) = meta.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = self
            .state
            .replacer
            .evict()
            .ok_or(BrambleError::BufferPoolFull)?;
        let frame = &self.state.frames[frame_id.as_usize()];
        let old_page_id = frame.page_id();

        if frame.is_dirty() {
            let mut data = [0u8; PAGE_SIZE];
            frame.copy_out(&mut data);
            self.disk_scheduler
                .schedule_write_sync(old_page_id, &data)?;
        }

        self.state.page_table.remove(&old_page_id);
        frame.reset();
        Ok(frame_id)
    }
}
