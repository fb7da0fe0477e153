use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::common::types::{PageId, PagePtr};
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::buffer::manager::BufferPoolManager;
use crate::storage::disk::DiskManager;

/// A buffer pool partitioned into independent instances.
///
/// Every request for an existing page is forwarded to the instance that owns
/// it (`page_id mod num_instances`); `new_page` is spread round-robin so that
/// allocation pressure lands evenly across instances.
pub struct PartitionedBufferPool {
    instances: Vec<Arc<BufferPoolManager>>,
    next_instance: AtomicUsize,
}

impl PartitionedBufferPool {
    /// Build `num_instances` instances of `pool_size` frames each over a
    /// shared disk manager
    pub fn new(num_instances: u32, pool_size: usize, disk_manager: Arc<DiskManager>) -> Self {
        assert!(num_instances > 0);
        let instances = (0..num_instances)
            .map(|index| {
                Arc::new(BufferPoolManager::new_partitioned(
                    pool_size,
                    num_instances,
                    index,
                    disk_manager.clone(),
                ))
            })
            .collect();

        Self {
            instances,
            next_instance: AtomicUsize::new(0),
        }
    }

    pub fn num_instances(&self) -> usize {
        self.instances.len()
    }

    /// Total frames across all instances
    pub fn pool_size(&self) -> usize {
        self.instances.iter().map(|instance| instance.pool_size()).sum()
    }

    /// The instance that owns `page_id`
    fn owner(&self, page_id: PageId) -> &BufferPoolManager {
        let index = page_id.rem_euclid(self.instances.len() as PageId) as usize;
        &self.instances[index]
    }

    /// Create a new page on the first instance with a frame to spare,
    /// starting after the instance used last time
    pub fn new_page(&self) -> Result<(PagePtr, PageId), BufferPoolError> {
        let start = self.next_instance.fetch_add(1, Ordering::Relaxed);
        for offset in 0..self.instances.len() {
            let instance = &self.instances[(start + offset) % self.instances.len()];
            match instance.new_page() {
                Ok(created) => return Ok(created),
                Err(BufferPoolError::NoFreeFrame) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(BufferPoolError::NoFreeFrame)
    }

    pub fn fetch_page(&self, page_id: PageId) -> Result<PagePtr, BufferPoolError> {
        if page_id < 0 {
            return Err(BufferPoolError::InvalidPageId(page_id));
        }
        self.owner(page_id).fetch_page(page_id)
    }

    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<(), BufferPoolError> {
        if page_id < 0 {
            return Err(BufferPoolError::InvalidPageId(page_id));
        }
        self.owner(page_id).unpin_page(page_id, is_dirty)
    }

    pub fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        if page_id < 0 {
            return Err(BufferPoolError::InvalidPageId(page_id));
        }
        self.owner(page_id).flush_page(page_id)
    }

    pub fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        for instance in &self.instances {
            instance.flush_all_pages()?;
        }
        Ok(())
    }

    pub fn delete_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        if page_id < 0 {
            return Err(BufferPoolError::InvalidPageId(page_id));
        }
        self.owner(page_id).delete_page(page_id)
    }
}
