use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use parking_lot::Mutex;

use crate::common::types::{Frame, FrameId, FramePtr, Page, PageId, PagePtr, INVALID_PAGE_ID};
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::buffer::replacer::LruReplacer;
use crate::storage::disk::DiskManager;

/// Management state guarded by the pool latch. Page payloads are not in here;
/// they are reached through the per-page latch on each frame's `PagePtr`.
struct PoolState {
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
    replacer: LruReplacer,
    next_page_id: PageId,
}

/// One buffer pool instance: a fixed array of frames fronting the disk file.
///
/// When the pool is partitioned, instance `i` of `n` hands out page ids
/// `i, i+n, i+2n, …`, so `page_id mod n` always identifies the owning
/// instance. A standalone pool is simply instance 0 of 1.
pub struct BufferPoolManager {
    pool_size: usize,
    num_instances: u32,
    instance_index: u32,
    frames: Vec<FramePtr>,
    state: Mutex<PoolState>,
    disk_manager: Arc<DiskManager>,
}

impl BufferPoolManager {
    pub fn new(pool_size: usize, disk_manager: Arc<DiskManager>) -> Self {
        Self::new_partitioned(pool_size, 1, 0, disk_manager)
    }

    pub fn new_partitioned(
        pool_size: usize,
        num_instances: u32,
        instance_index: u32,
        disk_manager: Arc<DiskManager>,
    ) -> Self {
        assert!(num_instances > 0);
        assert!(instance_index < num_instances);

        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);

        for frame_id in 0..pool_size {
            let page = Arc::new(parking_lot::RwLock::new(Page::new(INVALID_PAGE_ID)));
            frames.push(Arc::new(parking_lot::RwLock::new(Frame::new(frame_id, page))));
            free_list.push_back(frame_id);
        }

        Self {
            pool_size,
            num_instances,
            instance_index,
            frames,
            state: Mutex::new(PoolState {
                page_table: HashMap::new(),
                free_list,
                replacer: LruReplacer::new(pool_size),
                next_page_id: instance_index as PageId,
            }),
            disk_manager,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Create a new page, pinned once
    ///
    /// Fails with `NoFreeFrame` before a page id is consumed if every frame is
    /// pinned.
    pub fn new_page(&self) -> Result<(PagePtr, PageId), BufferPoolError> {
        let mut state = self.state.lock();

        let frame_id = self.take_frame(&mut state)?;
        let page_id = self.allocate_page_id(&mut state);

        let frame = &self.frames[frame_id];
        let page_ptr = {
            let mut frame_guard = frame.write();
            frame_guard.pin_count = 1;
            frame_guard.is_dirty = false;
            {
                let mut page_guard = frame_guard.page.write();
                page_guard.reset();
                page_guard.page_id = page_id;
            }
            frame_guard.page.clone()
        };

        state.page_table.insert(page_id, frame_id);
        state.replacer.pin(frame_id);

        Ok((page_ptr, page_id))
    }

    /// Fetch a page from the buffer pool or disk, pinning it
    pub fn fetch_page(&self, page_id: PageId) -> Result<PagePtr, BufferPoolError> {
        if page_id < 0 {
            return Err(BufferPoolError::InvalidPageId(page_id));
        }

        let mut state = self.state.lock();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let frame = &self.frames[frame_id];
            let page_ptr = {
                let mut frame_guard = frame.write();
                frame_guard.pin_count += 1;
                frame_guard.page.clone()
            };
            state.replacer.pin(frame_id);
            return Ok(page_ptr);
        }

        let frame_id = self.take_frame(&mut state)?;
        let frame = &self.frames[frame_id];
        let page_ptr = {
            let mut frame_guard = frame.write();
            frame_guard.pin_count = 1;
            frame_guard.is_dirty = false;
            {
                let mut page_guard = frame_guard.page.write();
                self.disk_manager.read_page(page_id, &mut page_guard)?;
            }
            frame_guard.page.clone()
        };

        state.page_table.insert(page_id, frame_id);
        state.replacer.pin(frame_id);

        Ok(page_ptr)
    }

    /// Unpin a page, OR-ing the caller's dirty flag into the frame's
    ///
    /// A reader unpinning with `false` never clears a dirty bit set by an
    /// earlier writer.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<(), BufferPoolError> {
        let state = self.state.lock();

        let frame_id = match state.page_table.get(&page_id) {
            Some(&id) => id,
            None => return Err(BufferPoolError::PageNotBuffered(page_id)),
        };

        let frame = &self.frames[frame_id];
        let pin_count = {
            let mut frame_guard = frame.write();
            if frame_guard.pin_count == 0 {
                return Err(BufferPoolError::PinCountZero(page_id));
            }
            frame_guard.pin_count -= 1;
            if is_dirty {
                frame_guard.is_dirty = true;
            }
            frame_guard.pin_count
        };

        if pin_count == 0 {
            state.replacer.unpin(frame_id);
        }

        Ok(())
    }

    /// Write a page back to disk if it is buffered and dirty; pin state is
    /// untouched
    pub fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        let state = self.state.lock();

        let frame_id = match state.page_table.get(&page_id) {
            Some(&id) => id,
            None => return Err(BufferPoolError::PageNotBuffered(page_id)),
        };

        self.flush_frame(frame_id)
    }

    /// Flush every buffered page
    pub fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        let state = self.state.lock();
        for &frame_id in state.page_table.values() {
            self.flush_frame(frame_id)?;
        }
        Ok(())
    }

    /// Delete a page from the pool and deallocate its id
    ///
    /// Deleting a page that is not buffered succeeds; deleting a pinned page
    /// fails with `PagePinned`.
    pub fn delete_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        let mut state = self.state.lock();

        let frame_id = match state.page_table.get(&page_id) {
            Some(&id) => id,
            None => {
                self.disk_manager.deallocate_page(page_id);
                return Ok(());
            }
        };

        let frame = &self.frames[frame_id];
        {
            let mut frame_guard = frame.write();
            if frame_guard.pin_count > 0 {
                return Err(BufferPoolError::PagePinned(page_id));
            }
            frame_guard.page.write().reset();
            frame_guard.is_dirty = false;
            frame_guard.pin_count = 0;
        }

        state.page_table.remove(&page_id);
        state.replacer.pin(frame_id);
        state.free_list.push_back(frame_id);
        self.disk_manager.deallocate_page(page_id);

        Ok(())
    }

    /// Take a frame for reuse: free list first, then an eviction victim.
    /// A dirty victim is written back before its frame is handed out.
    fn take_frame(&self, state: &mut PoolState) -> Result<FrameId, BufferPoolError> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }

        let victim_id = match state.replacer.victim() {
            Some(id) => id,
            None => return Err(BufferPoolError::NoFreeFrame),
        };

        let frame = &self.frames[victim_id];
        let old_page_id = {
            let frame_guard = frame.read();
            debug_assert_eq!(frame_guard.pin_count, 0);
            let page_guard = frame_guard.page.read();
            if frame_guard.is_dirty {
                self.disk_manager.write_page(&page_guard)?;
            }
            page_guard.page_id
        };

        if old_page_id != INVALID_PAGE_ID {
            state.page_table.remove(&old_page_id);
        }

        Ok(victim_id)
    }

    fn flush_frame(&self, frame_id: FrameId) -> Result<(), BufferPoolError> {
        let frame = &self.frames[frame_id];
        let mut frame_guard = frame.write();
        if frame_guard.is_dirty {
            let page_guard = frame_guard.page.read();
            self.disk_manager.write_page(&page_guard)?;
            drop(page_guard);
            frame_guard.is_dirty = false;
        }
        Ok(())
    }

    /// Hand out the next id owned by this instance
    fn allocate_page_id(&self, state: &mut PoolState) -> PageId {
        let page_id = state.next_page_id;
        state.next_page_id += self.num_instances as PageId;
        debug_assert_eq!(page_id.rem_euclid(self.num_instances as PageId), self.instance_index as PageId);
        page_id
    }
}
