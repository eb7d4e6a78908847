use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{PageId, PAGE_SIZE};

use super::FrameHeader;

/// Callback invoked when a guard releases its page: (page_id, dirty hint).
/// The buffer pool uses it to unpin the frame and re-arm eviction.
pub(crate) type ReleaseCallback = Box<dyn FnOnce(PageId, bool) + Send + Sync>;

/// RAII guard for shared read access to a page. Holds the page latch and a
/// pin; dropping the guard releases the latch and unpins the page.
pub struct ReadPageGuard {
    page_id: PageId,
    /// Keeps the frame alive for the lifetime of the extended lock guard
    _frame: Arc<FrameHeader>,
    release: Option<ReleaseCallback>,
    data_guard: Option<RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>>>,
}

impl ReadPageGuard {
    /// # Safety
    /// The lock guard's lifetime is extended to 'static; the Arc keeps the
    /// frame (and so the lock) alive until the guard is dropped.
    pub(crate) unsafe fn new(
        page_id: PageId,
        frame: Arc<FrameHeader>,
        release: ReleaseCallback,
    ) -> Self {
        let data_guard = frame.data.read();
        let data_guard: RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>> =
            std::mem::transmute(data_guard);
        Self {
            page_id,
            _frame: frame,
            release: Some(release),
            data_guard: Some(data_guard),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data_guard.as_ref().unwrap()[..]
    }
}

impl Deref for ReadPageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        // Release the latch before the callback so the buffer pool latch is
        // never acquired while this page latch is held.
        self.data_guard.take();
        if let Some(release) = self.release.take() {
            release(self.page_id, false);
        }
    }
}

/// RAII guard for exclusive write access to a page. `data_mut` marks the
/// page dirty; dropping the guard releases the latch, then unpins with the
/// accumulated dirty hint.
pub struct WritePageGuard {
    page_id: PageId,
    _frame: Arc<FrameHeader>,
    release: Option<ReleaseCallback>,
    is_dirty: bool,
    data_guard: Option<RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>>>,
}

impl WritePageGuard {
    /// # Safety
    /// Same contract as [`ReadPageGuard::new`].
    pub(crate) unsafe fn new(
        page_id: PageId,
        frame: Arc<FrameHeader>,
        release: ReleaseCallback,
    ) -> Self {
        let data_guard = frame.data.write();
        let data_guard: RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>> =
            std::mem::transmute(data_guard);
        Self {
            page_id,
            _frame: frame,
            release: Some(release),
            is_dirty: false,
            data_guard: Some(data_guard),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data_guard.as_ref().unwrap()[..]
    }

    /// Mutable access to the page bytes; marks the page dirty.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.is_dirty = true;
        &mut self.data_guard.as_mut().unwrap()[..]
    }
}

impl Deref for WritePageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for WritePageGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        self.data_guard.take();
        if let Some(release) = self.release.take() {
            release(self.page_id, self.is_dirty);
        }
    }
}
