use log::debug;
use shaledb_error::Error;

use crate::buffer_pool::BufferPoolManager;
use crate::disk::disk_manager::DiskManager;
use crate::frame_handle::{PageFrameMutHandle, PageFrameRefHandle};
use crate::replacer::clock_replacer::ClockReplacer;
use crate::typedef::PageId;
use crate::wal::LogManager;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::Result;

/// A buffer pool front that shards the page id space across independent
/// instances to reduce lock contention.
///
/// Page id `p` belongs to instance `p % num_instances`; since each instance
/// only allocates ids congruent to its own index, routing an existing page
/// is always correct. This layer takes no lock of its own: routing is
/// arithmetic, and each dispatched call contends only on one instance.
#[derive(Debug)]
pub struct ParallelBufferPoolManager {
    instances: Vec<Arc<RwLock<BufferPoolManager>>>,
    /// Instance where the next round-robin page creation starts.
    start_index: AtomicUsize,
}

impl ParallelBufferPoolManager {
    /// Initializes `num_instances` instances of `pool_size` frames each,
    /// sharing one disk manager and (optionally) one log manager.
    pub fn new(
        num_instances: u32,
        pool_size: usize,
        disk_manager: Arc<Mutex<DiskManager>>,
        log_manager: Option<Arc<LogManager>>,
    ) -> Self {
        assert!(num_instances > 0, "a pool needs at least one instance");

        let instances = (0..num_instances)
            .map(|instance_index| {
                Arc::new(RwLock::new(BufferPoolManager::new_instance(
                    pool_size,
                    num_instances,
                    instance_index,
                    Arc::clone(&disk_manager),
                    log_manager.clone(),
                    Box::new(ClockReplacer::new(pool_size)),
                )))
            })
            .collect();

        Self {
            instances,
            start_index: AtomicUsize::new(0),
        }
    }

    /// Returns the instance responsible for the given page id.
    fn instance_for(&self, page_id: PageId) -> &Arc<RwLock<BufferPoolManager>> {
        &self.instances[page_id as usize % self.instances.len()]
    }

    /// Creates a new page on the first willing instance and returns a
    /// pinned write handle for it.
    ///
    /// Instances are tried round-robin from a rotating start index; the
    /// index moves past each call's winner so allocation load spreads
    /// across the shards over time. Fails only when every instance is
    /// exhausted.
    pub fn create_page_handle(&self) -> Result<PageFrameMutHandle> {
        let num_instances = self.instances.len();
        let start = self.start_index.load(Ordering::Acquire);

        for offset in 0..num_instances {
            let index = (start + offset) % num_instances;
            match BufferPoolManager::create_page_handle(&self.instances[index]) {
                Ok(handle) => {
                    self.start_index
                        .store((index + 1) % num_instances, Ordering::Release);
                    return Ok(handle);
                }
                // This instance has every frame pinned; try the next one.
                Err(Error::BufferPoolError(_)) => {
                    debug!("instance {} refused to create a page", index);
                }
                Err(err) => return Err(err),
            }
        }

        Err(Error::BufferPoolError(
            "Every buffer pool instance is exhausted".to_string(),
        ))
    }

    /// Fetches a read-only handle to a page from its owning instance.
    pub fn fetch_page_handle(&self, page_id: PageId) -> Result<PageFrameRefHandle> {
        BufferPoolManager::fetch_page_handle(self.instance_for(page_id), page_id)
    }

    /// Fetches a mutable handle to a page from its owning instance.
    pub fn fetch_page_mut_handle(&self, page_id: PageId) -> Result<PageFrameMutHandle> {
        BufferPoolManager::fetch_page_mut_handle(self.instance_for(page_id), page_id)
    }

    /// Drops one pin on a page, optionally marking it dirty.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        self.instance_for(page_id)
            .write()
            .unwrap()
            .unpin_page(page_id, is_dirty)
    }

    /// Flushes a page from its owning instance.
    pub fn flush_page(&self, page_id: &PageId) -> Result<()> {
        self.instance_for(*page_id).write()?.flush_page(page_id)
    }

    /// Flushes every resident page of every instance.
    pub fn flush_all_pages(&self) -> Result<()> {
        for instance in &self.instances {
            instance.write()?.flush_all_pages()?;
        }
        Ok(())
    }

    /// Deletes a page on its owning instance.
    pub fn delete_page(&self, page_id: PageId) -> Result<()> {
        self.instance_for(page_id).write()?.delete_page(page_id)
    }

    /// Total number of frames across all instances.
    pub fn pool_size(&self) -> usize {
        self.instances
            .iter()
            .map(|instance| instance.read().unwrap().pool_size())
            .sum()
    }

    /// Number of instances the page id space is partitioned across.
    pub fn num_instances(&self) -> usize {
        self.instances.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::thread;

    fn get_parallel_bpm(
        num_instances: u32,
        pool_size: usize,
        file_name: &str,
    ) -> ParallelBufferPoolManager {
        let disk_manager = Arc::new(Mutex::new(DiskManager::new(file_name).unwrap()));
        ParallelBufferPoolManager::new(num_instances, pool_size, disk_manager, None)
    }

    #[test]
    #[serial]
    fn test_parallel_bpm_round_robin_allocation() {
        let bpm = get_parallel_bpm(4, 4, "parallel_round_robin.db");

        // The start index rotates, so the first four pages land on
        // instances 0..4 in order and get ids 0, 1, 2, 3; the next four
        // wrap around with ids strided by the instance count.
        for expected in 0u32..8 {
            let page_id = bpm.create_page_handle().unwrap().page_id();
            assert_eq!(page_id, expected);
            assert_eq!(page_id % 4, expected % 4);
        }
    }

    #[test]
    #[serial]
    fn test_parallel_bpm_routes_to_owner_instance() {
        let bpm = get_parallel_bpm(4, 4, "parallel_routing.db");

        let mut page_ids = Vec::new();
        for _ in 0..8 {
            let mut page_handle = bpm.create_page_handle().unwrap();
            let page_id = page_handle.page_id();
            page_handle.write(0, page_id.to_string().as_bytes());
            page_ids.push(page_id);
        }

        // Page 5 belongs to instance 1 (5 mod 4); fetching it through the
        // front must find the bytes written above.
        let page_handle = bpm.fetch_page_handle(5).unwrap();
        assert_eq!(&page_handle.data()[..1], b"5");
        drop(page_handle);

        for page_id in page_ids {
            let page_handle = bpm.fetch_page_handle(page_id).unwrap();
            let expected = page_id.to_string();
            assert_eq!(&page_handle.data()[..expected.len()], expected.as_bytes());
        }
    }

    #[test]
    #[serial]
    fn test_parallel_bpm_pool_size_aggregates_instances() {
        let bpm = get_parallel_bpm(4, 2, "parallel_pool_size.db");
        assert_eq!(bpm.pool_size(), 8);
        assert_eq!(bpm.num_instances(), 4);
    }

    #[test]
    #[serial]
    fn test_parallel_bpm_skips_exhausted_instances() {
        let bpm = get_parallel_bpm(2, 1, "parallel_exhausted.db");

        let handle0 = bpm.create_page_handle().unwrap();
        let handle1 = bpm.create_page_handle().unwrap();
        assert_eq!(handle0.page_id(), 0);
        assert_eq!(handle1.page_id(), 1);

        // Both single-frame instances are pinned.
        assert!(bpm.create_page_handle().is_err());

        // Freeing instance 0's frame lets creation succeed there, skipping
        // nothing: the start index still points at instance 0.
        drop(handle0);
        let handle2 = bpm.create_page_handle().unwrap();
        assert_eq!(handle2.page_id(), 2);
        assert_eq!(handle2.page_id() % 2, 0);
        drop(handle2);
        drop(handle1);
    }

    #[test]
    #[serial]
    fn test_parallel_bpm_unpin_and_delete_route_correctly() {
        let bpm = get_parallel_bpm(4, 2, "parallel_unpin_delete.db");

        let page_id = bpm.create_page_handle().unwrap().page_id();

        // The handle already unpinned on drop; another unpin is tolerated.
        assert!(bpm.unpin_page(page_id, false));
        assert!(!bpm.unpin_page(9999, false));

        bpm.delete_page(page_id).unwrap();
        assert!(bpm.fetch_page_handle(page_id).is_err());

        // Idempotent on the owning shard.
        bpm.delete_page(page_id).unwrap();
    }

    #[test]
    #[serial]
    fn test_parallel_bpm_flush_all_reaches_every_shard() {
        let disk_manager = Arc::new(Mutex::new(
            DiskManager::new("parallel_flush_all.db").unwrap(),
        ));
        let bpm = ParallelBufferPoolManager::new(3, 2, Arc::clone(&disk_manager), None);

        let mut page_ids = Vec::new();
        for i in 0u8..6 {
            let mut page_handle = bpm.create_page_handle().unwrap();
            page_handle.write(0, &[i + 1]);
            page_ids.push(page_handle.page_id());
        }

        bpm.flush_all_pages().unwrap();

        // Every shard's pages reached the shared disk manager.
        for (i, page_id) in page_ids.iter().enumerate() {
            let bytes = disk_manager.lock().unwrap().read(*page_id).unwrap().unwrap();
            assert_eq!(bytes[0], i as u8 + 1);
        }
    }

    #[test]
    #[serial]
    fn test_parallel_bpm_concurrent_shard_traffic() {
        let num_threads = 4;
        let pages_per_thread = 32;
        let bpm = Arc::new(get_parallel_bpm(4, 64, "parallel_concurrent.db"));

        let mut threads = Vec::new();
        for _ in 0..num_threads {
            let bpm_clone = Arc::clone(&bpm);
            threads.push(thread::spawn(move || {
                let mut page_ids = Vec::new();
                for _ in 0..pages_per_thread {
                    let mut page_handle = bpm_clone
                        .create_page_handle()
                        .expect("Failed to create page");
                    let page_id = page_handle.page_id();
                    page_handle.write(0, page_id.to_string().as_bytes());
                    page_ids.push(page_id);
                }

                for &page_id in &page_ids {
                    let page_handle = bpm_clone
                        .fetch_page_handle(page_id)
                        .expect("Failed to fetch page");
                    let expected = page_id.to_string();
                    assert_eq!(&page_handle.data()[..expected.len()], expected.as_bytes());
                }

                page_ids
            }));
        }

        // Page ids must be globally distinct even across racing creators.
        let mut allocated = Vec::new();
        for handle in threads {
            allocated.extend(handle.join().expect("Thread panicked"));
        }
        let total = allocated.len();
        allocated.sort_unstable();
        allocated.dedup();
        assert_eq!(allocated.len(), total);
    }
}
