use log::{debug, trace};
use shaledb_error::Error;

use crate::disk::disk_manager::DiskManager;
use crate::frame::PageFrame;
use crate::frame_handle::{PageFrameMutHandle, PageFrameRefHandle};
use crate::page::INVALID_PAGE_ID;
use crate::typedef::{FrameId, PageId};
use crate::wal::LogManager;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use crate::Result;

use crate::replacer::replacer::Replacer;

/// Manages page allocation, caching, and eviction for one buffer pool
/// instance (a single shard of the page id space).
#[derive(Debug)]
pub struct BufferPoolManager {
    frames: Vec<PageFrame>, // Storage for all frames in the buffer pool
    page_table: HashMap<PageId, FrameId>, // Maps page IDs to frame IDs
    replacer: Box<dyn Replacer>, // Handles the replacement policy (e.g. CLOCK)
    free_list: VecDeque<FrameId>, // List of free frames
    disk_manager: Arc<Mutex<DiskManager>>, // Manages reading/writing pages to disk
    log_manager: Option<Arc<LogManager>>, // Consulted before dirty write-back
    next_page_id: PageId, // Next id this instance hands out, strided by num_instances
    num_instances: u32,
    instance_index: u32,
}

impl BufferPoolManager {
    /// Initializes a standalone buffer pool with a given size.
    pub fn new(
        pool_size: usize,
        disk_manager: Arc<Mutex<DiskManager>>,
        replacer: Box<dyn Replacer>,
    ) -> Self {
        Self::new_instance(pool_size, 1, 0, disk_manager, None, replacer)
    }

    /// Initializes instance `instance_index` of a pool of `num_instances`.
    ///
    /// Each instance allocates page ids congruent to its own index, starting
    /// at `instance_index` and strided by `num_instances`, so `pid %
    /// num_instances` always names the owning instance.
    pub fn new_instance(
        pool_size: usize,
        num_instances: u32,
        instance_index: u32,
        disk_manager: Arc<Mutex<DiskManager>>,
        log_manager: Option<Arc<LogManager>>,
        replacer: Box<dyn Replacer>,
    ) -> Self {
        assert!(num_instances > 0, "a pool needs at least one instance");
        assert!(
            instance_index < num_instances,
            "instance index must be below the instance count"
        );

        let mut frames = Vec::with_capacity(pool_size);
        frames.resize_with(pool_size, PageFrame::new);

        Self {
            frames,
            page_table: HashMap::new(),
            replacer,
            free_list: (0..pool_size).collect(),
            disk_manager,
            log_manager,
            next_page_id: instance_index,
            num_instances,
            instance_index,
        }
    }

    /// Hands out the next page id owned by this instance.
    fn allocate_page(&mut self) -> PageId {
        let page_id = self.next_page_id;
        debug_assert_eq!(page_id % self.num_instances, self.instance_index);
        self.next_page_id += self.num_instances;
        page_id
    }

    /// Returns a free frame or evicts a page if necessary.
    fn get_free_frame(&mut self) -> Result<FrameId> {
        if let Some(frame_id) = self.free_list.pop_front() {
            return Ok(frame_id);
        }

        // Evict a page if no free frames are available
        let frame_id = self.replacer.evict().ok_or(Error::BufferPoolError(
            "No evictable frame in buffer pool".to_string(),
        ))?;
        assert_eq!(
            self.frames[frame_id].pin_count(),
            0,
            "If page is evicted from replacer, its pin count must be 0."
        );

        // Write dirty page back to disk before eviction
        if self.frames[frame_id].is_dirty() {
            debug!(
                "evicting dirty page {} from frame {}",
                self.frames[frame_id].page_id(),
                frame_id
            );
            self.flush_frame(frame_id)?;
        } else {
            trace!(
                "evicting clean page {} from frame {}",
                self.frames[frame_id].page_id(),
                frame_id
            );
        }

        // Remove the old page from the page table
        self.page_table.remove(&self.frames[frame_id].page_id());

        // Reset the frame for reuse
        self.frames[frame_id].reset();

        Ok(frame_id)
    }

    /// Writes a frame's bytes back to disk, forcing the log first so no
    /// page with unflushed log records hits disk.
    fn flush_frame(&mut self, frame_id: FrameId) -> Result<()> {
        let frame = &self.frames[frame_id];
        if let Some(log_manager) = &self.log_manager {
            if frame.lsn() > log_manager.persistent_lsn() {
                log_manager.flush_up_to(frame.lsn());
            }
        }

        let mut disk = self.disk_manager.lock()?;
        disk.write(frame.page_id(), frame.data())?;
        drop(disk);

        self.frames[frame_id].set_dirty(false);
        Ok(())
    }

    /// Allocates a new page pinned into a free frame.
    ///
    /// Fails when every frame is pinned. The new page starts zeroed, clean,
    /// and with a pin count of one.
    pub(crate) fn create_page(&mut self) -> Result<&mut PageFrame> {
        // Refuse before allocating an id, so exhaustion burns nothing.
        if self.free_list.is_empty() && self.replacer.evictable_count() == 0 {
            return Err(Error::BufferPoolError(
                "Every frame in the buffer pool is pinned".to_string(),
            ));
        }

        let page_id = self.allocate_page();
        let frame_id = self.get_free_frame()?;

        // Register the page with the on-disk allocator before committing
        // any in-memory state, so an IO failure leaves the pool unchanged.
        if let Err(err) = self.disk_manager.lock()?.allocate_page(page_id) {
            self.free_list.push_back(frame_id);
            return Err(err);
        }

        debug!("allocated page {} into frame {}", page_id, frame_id);

        // The frame came from the free list or straight out of the
        // replacer, so it is already absent from both.
        self.page_table.insert(page_id, frame_id);

        let frame = &mut self.frames[frame_id];
        frame.set_page_id(page_id);
        frame.set_pin_count(1);
        Ok(frame)
    }

    /// Fetches a mutable reference to a page, loading it from disk if
    /// necessary.
    pub(crate) fn fetch_page_mut(&mut self, page_id: PageId) -> Result<&mut PageFrame> {
        // On a hit, take another pin and shield the frame from eviction.
        if let Some(&frame_id) = self.page_table.get(&page_id) {
            self.replacer.pin(frame_id);
            let frame = &mut self.frames[frame_id];
            frame.increment_pin_count();
            return Ok(frame);
        }

        let frame_id = self.get_free_frame()?;

        // Read before committing any metadata, so a page with no disk
        // record leaves the pool unchanged.
        let page_data = match self.disk_manager.lock()?.read(page_id)? {
            Some(data) => data,
            None => {
                self.free_list.push_back(frame_id);
                return Err(Error::BufferPoolError(format!(
                    "Page {:?} does not exist on disk",
                    page_id
                )));
            }
        };

        trace!("read page {} from disk into frame {}", page_id, frame_id);

        self.page_table.insert(page_id, frame_id);

        let frame = &mut self.frames[frame_id];
        frame.set_page_id(page_id);
        frame.set_pin_count(1);
        frame.data_mut()[..page_data.len()].copy_from_slice(&page_data);
        Ok(frame)
    }

    /// Fetches an immutable reference to a page.
    pub(crate) fn fetch_page(&mut self, page_id: PageId) -> Result<&PageFrame> {
        Ok(self.fetch_page_mut(page_id)?)
    }

    /// Drops one pin on a page, optionally marking it dirty.
    ///
    /// Returns false if the page is not resident. The dirty flag is only
    /// ever raised here; it stays set until the page is flushed. Unpinning
    /// a page already at zero pins is tolerated and leaves it at zero.
    pub fn unpin_page(&mut self, page_id: PageId, is_dirty: bool) -> bool {
        let Some(&frame_id) = self.page_table.get(&page_id) else {
            return false;
        };

        let frame = &mut self.frames[frame_id];
        if is_dirty {
            frame.set_dirty(true);
        }

        frame.decrement_pin_count();
        if frame.pin_count() == 0 {
            self.replacer.unpin(frame_id);
        }
        true
    }

    /// Flushes a specific page to disk. Pin state and evictability are
    /// unaffected; clean pages are not rewritten.
    pub fn flush_page(&mut self, page_id: &PageId) -> Result<()> {
        if *page_id == INVALID_PAGE_ID {
            return Err(Error::InvalidInput(
                "Cannot flush the invalid page id".to_string(),
            ));
        }

        if let Some(&frame_id) = self.page_table.get(page_id) {
            if self.frames[frame_id].is_dirty() {
                trace!("flushing page {} from frame {}", page_id, frame_id);
                self.flush_frame(frame_id)?;
            }
            Ok(())
        } else {
            // page not in memory
            Err(Error::BufferPoolError(format!(
                "Page {:?} not found in buffer pool",
                page_id
            )))
        }
    }

    /// Flushes every resident page to disk.
    pub fn flush_all_pages(&mut self) -> Result<()> {
        let resident: Vec<PageId> = self.page_table.keys().copied().collect();
        for page_id in resident {
            self.flush_page(&page_id)?;
        }
        Ok(())
    }

    /// Deletes a page from the buffer pool and releases its disk slot.
    ///
    /// Deleting an absent page succeeds, so deletion is idempotent.
    /// Deleting a pinned page fails with [`Error::PagePinned`].
    pub fn delete_page(&mut self, page_id: PageId) -> Result<()> {
        if let Some(&frame_id) = self.page_table.get(&page_id) {
            if self.frames[frame_id].pin_count() > 0 {
                return Err(Error::PagePinned(page_id));
            }

            // Reclaim the frame into the free list. The frame leaves the
            // replacer as well: a free frame must not be an eviction
            // candidate.
            self.page_table.remove(&page_id);
            self.replacer.remove(frame_id);
            self.frames[frame_id].reset();
            self.free_list.push_back(frame_id);

            self.disk_manager.lock()?.deallocate_page(page_id)?;
            debug!("deleted page {} from frame {}", page_id, frame_id);
        } else {
            // Not resident. Still release any disk slot the page may hold,
            // swallowing the unknown-id case to keep deletion idempotent.
            let _ = self.disk_manager.lock()?.deallocate_page(page_id);
        }

        Ok(())
    }

    /// Returns the total number of frames in the buffer pool.
    pub fn pool_size(&self) -> usize {
        self.frames.len()
    }

    /// Returns the number of frames available for new pages.
    pub fn free_frame_count(&self) -> usize {
        self.free_list.len() + self.replacer.evictable_count()
    }

    /// Returns the pin count of a page, or `None` if it is not resident.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u16> {
        let frame_id = self.page_table.get(&page_id)?;
        Some(self.frames[*frame_id].pin_count())
    }

    /// Creates a new page and returns a pinned write handle for it.
    pub fn create_page_handle(bpm: &Arc<RwLock<BufferPoolManager>>) -> Result<PageFrameMutHandle> {
        let page_frame = {
            let mut bpm_guard = bpm.write()?;
            // SAFETY:
            // The handle must hold both the Arc to the pool and a reference
            // to a frame inside it, but `create_page()` ties its return
            // borrow to `bpm_guard`, which would keep the whole pool
            // borrowed. Extracting a raw pointer from the exclusive guard
            // splits that borrow. The frame reference stays valid after the
            // guard drops because the page is pinned and pinned frames are
            // never evicted or recycled.
            let bpm_ptr = &mut *bpm_guard as *mut BufferPoolManager;
            unsafe { (*bpm_ptr).create_page()? }
        };

        Ok(PageFrameMutHandle::new(bpm, page_frame))
    }

    /// Fetches a read-only handle to a page.
    pub fn fetch_page_handle(
        bpm: &Arc<RwLock<BufferPoolManager>>,
        page_id: PageId,
    ) -> Result<PageFrameRefHandle> {
        let page_frame = {
            let mut bpm_guard = bpm.write()?;
            // SAFETY: see `create_page_handle`
            let bpm_ptr = &mut *bpm_guard as *mut BufferPoolManager;
            unsafe { (*bpm_ptr).fetch_page(page_id)? }
        };

        Ok(PageFrameRefHandle::new(bpm, page_frame))
    }

    /// Fetches a mutable handle to a page.
    pub fn fetch_page_mut_handle(
        bpm: &Arc<RwLock<BufferPoolManager>>,
        page_id: PageId,
    ) -> Result<PageFrameMutHandle> {
        let page_frame = {
            let mut bpm_guard = bpm.write()?;
            // SAFETY: see `create_page_handle`
            let bpm_ptr = &mut *bpm_guard as *mut BufferPoolManager;
            unsafe { (*bpm_ptr).fetch_page_mut(page_id)? }
        };

        Ok(PageFrameMutHandle::new(bpm, page_frame))
    }
}
