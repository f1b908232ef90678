use core::fmt;
use std::sync::{
    atomic::{AtomicU16, Ordering},
    RwLock,
};

use crate::{
    page::{INVALID_PAGE_ID, PAGE_SIZE},
    typedef::{Lsn, PageId},
};

/// A buffer pool frame: storage for one resident page plus its metadata.
pub struct PageFrame {
    page_id: PageId,    // Page currently resident, or INVALID_PAGE_ID if empty
    is_dirty: bool,     // Tracks whether the contents diverged from disk
    lsn: Lsn,           // Newest log record covering this page's contents
    pin_cnt: AtomicU16, // Number of outstanding client references
    lock: RwLock<()>,   // Content latch held by page handles
    data: [u8; PAGE_SIZE],
}

impl fmt::Debug for PageFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageFrame")
            .field("page_id", &self.page_id)
            .field("is_dirty", &self.is_dirty)
            .field("lsn", &self.lsn)
            .field("pin_cnt", &self.pin_cnt.load(Ordering::SeqCst))
            .finish()
    }
}

impl PageFrame {
    /// Creates a new, empty frame.
    pub(crate) fn new() -> Self {
        Self {
            page_id: INVALID_PAGE_ID,
            is_dirty: false,
            lsn: 0,
            pin_cnt: AtomicU16::new(0),
            lock: RwLock::new(()),
            data: [0; PAGE_SIZE],
        }
    }

    /// Returns the resident page's id.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Checks if the frame contents diverged from disk.
    pub(crate) fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    /// Returns the current pin count.
    pub(crate) fn pin_count(&self) -> u16 {
        self.pin_cnt.load(Ordering::Acquire)
    }

    /// Returns the newest log sequence number recorded for this page.
    pub fn lsn(&self) -> Lsn {
        self.lsn
    }

    /// Records the log sequence number of the newest change to this page.
    pub fn set_lsn(&mut self, lsn: Lsn) {
        self.lsn = lsn;
    }

    /// Provides read-only access to the page bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Provides mutable access to the page bytes.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Sets the resident page id.
    pub(crate) fn set_page_id(&mut self, page_id: PageId) {
        self.page_id = page_id;
    }

    /// Marks the frame as dirty or clean.
    pub(crate) fn set_dirty(&mut self, dirty: bool) {
        self.is_dirty = dirty;
    }

    /// Sets the pin count directly (overwrites whatever was there).
    pub(crate) fn set_pin_count(&mut self, pin_cnt: u16) {
        self.pin_cnt.store(pin_cnt, Ordering::Release);
    }

    /// Increments the pin count by 1.
    pub(crate) fn increment_pin_count(&mut self) {
        self.pin_cnt.fetch_add(1, Ordering::SeqCst);
    }

    /// Decrements the pin count by 1, saturating at zero. Unpinning an
    /// already-unpinned page is a client bug the pool tolerates.
    pub(crate) fn decrement_pin_count(&mut self) {
        let pins = self.pin_cnt.load(Ordering::Acquire);
        if pins > 0 {
            self.pin_cnt.store(pins - 1, Ordering::Release);
        }
    }

    /// Resets the frame to its empty state.
    pub(crate) fn reset(&mut self) {
        self.page_id = INVALID_PAGE_ID;
        self.is_dirty = false;
        self.lsn = 0;
        self.pin_cnt.store(0, Ordering::Release);
        self.data.fill(0);
    }

    /// Writes data to the page at the given offset.
    pub fn write(&mut self, offset: usize, data: &[u8]) {
        if offset + data.len() > PAGE_SIZE {
            panic!("Write out of bounds");
        }
        self.data[offset..offset + data.len()].copy_from_slice(data);
    }

    /// Acquires a read latch on the page contents.
    pub(crate) fn read_lock(&self) -> std::sync::RwLockReadGuard<'_, ()> {
        self.lock.read().unwrap()
    }

    /// Acquires a write latch on the page contents.
    pub(crate) fn write_lock(&self) -> std::sync::RwLockWriteGuard<'_, ()> {
        self.lock.write().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shaledb_error::assert_errors;

    #[test]
    fn test_page_frame_reset_clears_metadata_and_data() {
        let mut frame = PageFrame::new();
        assert_eq!(frame.page_id(), INVALID_PAGE_ID);

        frame.set_page_id(7);
        frame.set_dirty(true);
        frame.set_lsn(3);
        frame.increment_pin_count();
        frame.write(8, b"abc");
        assert_eq!(&frame.data()[8..11], b"abc");

        frame.reset();
        assert_eq!(frame.page_id(), INVALID_PAGE_ID);
        assert!(!frame.is_dirty());
        assert_eq!(frame.lsn(), 0);
        assert_eq!(frame.pin_count(), 0);
        assert!(frame.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_page_frame_write_out_of_bounds_panics() {
        let mut frame = PageFrame::new();
        assert_errors!(frame.write(PAGE_SIZE - 1, &[1, 2]));

        // A write that exactly fills the page is in bounds.
        frame.write(PAGE_SIZE - 2, &[1, 2]);
        assert_eq!(&frame.data()[PAGE_SIZE - 2..], &[1, 2]);
    }

    #[test]
    fn test_page_frame_pin_count_saturates_at_zero() {
        let mut frame = PageFrame::new();
        frame.increment_pin_count();
        frame.decrement_pin_count();
        assert_eq!(frame.pin_count(), 0);

        frame.decrement_pin_count();
        assert_eq!(frame.pin_count(), 0);
    }
}
