use crate::buffer_pool::BufferPoolManager;
use crate::frame::PageFrame;
use crate::typedef::{Lsn, PageId};
use core::fmt;
use std::ops::Deref;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A handle for a read-only `PageFrame`.
///
/// Holds the frame's content latch and one pin for its lifetime; dropping
/// the handle releases both, allowing the page to be evicted again.
pub struct PageFrameRefHandle<'a> {
    bpm: &'a Arc<RwLock<BufferPoolManager>>,
    page_frame: &'a PageFrame,
    /// Captured at construction; a pinned frame cannot change pages, and
    /// the unpin on drop must name the page this handle was issued for.
    page_id: PageId,
    #[allow(dead_code)]
    lock_guard: RwLockReadGuard<'a, ()>,
}

impl fmt::Debug for PageFrameRefHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageFrameRefHandle")
            .field("page_frame", &self.page_frame)
            .finish()
    }
}

impl<'a> PageFrameRefHandle<'a> {
    // Creates a new read-only page handle.
    pub(crate) fn new(bpm: &'a Arc<RwLock<BufferPoolManager>>, page_frame: &'a PageFrame) -> Self {
        let page_id = page_frame.page_id();
        let fp_ptr = &*page_frame as *const PageFrame;
        // SAFETY:
        // The latch guard borrows the frame, which the handle also stores.
        // Going through a raw pointer splits that borrow so both can live
        // in the same struct; the frame stays valid because the pool never
        // evicts a pinned frame, and the pin taken by fetch is released
        // only in our `drop`.
        let lock_guard = unsafe { (*fp_ptr).read_lock() };
        PageFrameRefHandle {
            bpm,
            page_frame,
            page_id,
            lock_guard,
        }
    }
}

impl<'a> Drop for PageFrameRefHandle<'a> {
    fn drop(&mut self) {
        // A reader cannot have changed the page, so never dirty it here.
        self.bpm.write().unwrap().unpin_page(self.page_id, false);
    }
}

/// Mutable page handle for write access.
///
/// Every mutation goes through the handle ([`write`](Self::write),
/// [`data_mut`](Self::data_mut), [`set_lsn`](Self::set_lsn)), which records
/// that the page changed. Dropping the handle unpins with exactly that
/// record: a page that was only inspected under the write latch stays
/// clean and is never pointlessly written back to disk.
pub struct PageFrameMutHandle<'a> {
    bpm: &'a Arc<RwLock<BufferPoolManager>>,
    page_frame: &'a mut PageFrame,
    /// See [`PageFrameRefHandle::page_id`].
    page_id: PageId,
    /// Whether this handle mutated the page contents or its LSN.
    dirtied: bool,
    #[allow(dead_code)]
    lock_guard: RwLockWriteGuard<'a, ()>,
}

impl fmt::Debug for PageFrameMutHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageFrameMutHandle")
            .field("page_frame", &self.page_frame)
            .field("dirtied", &self.dirtied)
            .finish()
    }
}

impl<'a> PageFrameMutHandle<'a> {
    pub(crate) fn new(
        bpm: &'a Arc<RwLock<BufferPoolManager>>,
        page_frame: &'a mut PageFrame,
    ) -> Self {
        let page_id = page_frame.page_id();
        let fp_ptr = &mut *page_frame as *mut PageFrame;
        // SAFETY: see `PageFrameRefHandle::new`
        let lock_guard = unsafe { (*fp_ptr).write_lock() };
        PageFrameMutHandle {
            bpm,
            page_frame,
            page_id,
            dirtied: false,
            lock_guard,
        }
    }

    /// Writes `data` into the page at `offset`.
    pub fn write(&mut self, offset: usize, data: &[u8]) {
        self.page_frame.write(offset, data);
        self.dirtied = true;
    }

    /// Provides mutable access to the page bytes. Taking it counts as a
    /// mutation, since the caller can change the contents through it.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.dirtied = true;
        self.page_frame.data_mut()
    }

    /// Records the LSN of a log record covering an update to this page.
    ///
    /// A logged update implies changed contents, so this dirties the page
    /// too; when the frame is later written back, the pool forces the log
    /// up to this LSN before the bytes reach disk.
    pub fn set_lsn(&mut self, lsn: Lsn) {
        self.page_frame.set_lsn(lsn);
        self.dirtied = true;
    }
}

impl<'a> Drop for PageFrameMutHandle<'a> {
    fn drop(&mut self) {
        self.bpm
            .write()
            .unwrap()
            .unpin_page(self.page_id, self.dirtied);
    }
}

/// Implement `Deref` for `PageFrameRefHandle` to provide transparent read
/// access to `PageFrame`.
impl<'a> Deref for PageFrameRefHandle<'a> {
    type Target = PageFrame;

    fn deref(&self) -> &Self::Target {
        self.page_frame
    }
}

/// Implement `Deref` for `PageFrameMutHandle` for read access. There is
/// deliberately no `DerefMut`: mutation must go through the handle's own
/// methods so the dirtied flag cannot be bypassed.
impl<'a> Deref for PageFrameMutHandle<'a> {
    type Target = PageFrame;

    fn deref(&self) -> &Self::Target {
        self.page_frame
    }
}
