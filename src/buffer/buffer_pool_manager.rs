use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::common::{FrameId, IndexError, PageId, Result, INVALID_PAGE_ID, PAGE_SIZE};
use crate::storage::disk::{DiskManager, DiskScheduler};

use super::{Frame, LruKReplacer, ReadPageGuard, WritePageGuard};

/// Page table and free frames; guarded together so a page is never resident
/// in two frames.
struct PoolInner {
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
}

/// State shared between the manager and the guards it hands out.
pub(crate) struct BufferPoolState {
    frames: Vec<Frame>,
    inner: Mutex<PoolInner>,
    replacer: LruKReplacer,
}

impl BufferPoolState {
    /// Drops one pin on behalf of a guard.
    pub(crate) fn unpin(&self, frame_id: FrameId, page_id: PageId, is_dirty: bool) {
        let _inner = self.inner.lock();
        let frame = &self.frames[frame_id.as_usize()];

        if frame.page_id() != page_id {
            warn!(page_id = page_id.as_u32(), "buffer.unpin.frame_reassigned");
            return;
        }
        if is_dirty {
            frame.set_dirty(true);
        }
        match frame.unpin() {
            Some(0) => self.replacer.set_evictable(frame_id, true),
            Some(_) => {}
            None => warn!(page_id = page_id.as_u32(), "buffer.unpin.not_pinned"),
        }
    }
}

/// BufferPoolManager caches database pages in a fixed number of frames,
/// reading them through the disk scheduler on a miss and evicting with
/// LRU-K when no frame is free.
///
/// Pages are handed out as [`ReadPageGuard`] / [`WritePageGuard`]; a page
/// stays pinned for as long as a guard for it is alive.
pub struct BufferPoolManager {
    pool_size: usize,
    state: Arc<BufferPoolState>,
    disk_scheduler: DiskScheduler,
}

impl BufferPoolManager {
    /// Creates a new BufferPoolManager with the given pool size, k value for
    /// LRU-K, and disk manager.
    pub fn new(pool_size: usize, k: usize, disk_manager: Arc<DiskManager>) -> Self {
        let frames = (0..pool_size)
            .map(|i| Frame::new(FrameId::new(i as u32)))
            .collect();
        let free_list = (0..pool_size).map(|i| FrameId::new(i as u32)).collect();

        let state = Arc::new(BufferPoolState {
            frames,
            inner: Mutex::new(PoolInner {
                page_table: HashMap::new(),
                free_list,
            }),
            replacer: LruKReplacer::new(k, pool_size),
        });

        Self {
            pool_size,
            state,
            disk_scheduler: DiskScheduler::new(disk_manager),
        }
    }

    /// Allocates a new zeroed page and makes it resident, unpinned.
    /// Fails with `BufferPoolFull` when every frame is pinned.
    pub fn new_page(&self) -> Result<PageId> {
        let mut inner = self.state.inner.lock();
        let frame_id = self.acquire_frame(&mut inner)?;

        let page_id = match self.disk_scheduler.disk_manager().allocate_page() {
            Ok(page_id) => page_id,
            Err(e) => {
                inner.free_list.push_back(frame_id);
                return Err(e);
            }
        };

        let frame = &self.state.frames[frame_id.as_usize()];
        frame.load(page_id, &[0u8; PAGE_SIZE]);
        inner.page_table.insert(page_id, frame_id);

        self.state.replacer.record_access(frame_id);
        self.state.replacer.set_evictable(frame_id, true);

        trace!(page_id = page_id.as_u32(), frame_id = frame_id.as_usize(), "buffer.new_page");
        Ok(page_id)
    }

    /// Deletes a page from the buffer pool and returns it to the disk free list.
    /// Fails if the page is pinned; returns false if it was already free.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut inner = self.state.inner.lock();

        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            let frame = &self.state.frames[frame_id.as_usize()];
            if frame.pin_count() > 0 {
                return Err(IndexError::PageStillPinned(page_id));
            }

            inner.page_table.remove(&page_id);
            frame.reset();
            self.state.replacer.remove(frame_id);
            inner.free_list.push_back(frame_id);
        }

        match self.disk_scheduler.disk_manager().deallocate_page(page_id) {
            Ok(()) => {
                trace!(page_id = page_id.as_u32(), "buffer.delete_page");
                Ok(true)
            }
            Err(IndexError::PageAlreadyFree(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Pins a page for shared access.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<ReadPageGuard> {
        let frame_id = self.fetch_page(page_id)?;
        let data = self.state.frames[frame_id.as_usize()].data.read_arc();
        Ok(ReadPageGuard::new(
            page_id,
            frame_id,
            Arc::clone(&self.state),
            data,
        ))
    }

    /// Pins a page for exclusive access.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<WritePageGuard> {
        let frame_id = self.fetch_page(page_id)?;
        let data = self.state.frames[frame_id.as_usize()].data.write_arc();
        Ok(WritePageGuard::new(
            page_id,
            frame_id,
            Arc::clone(&self.state),
            data,
        ))
    }

    /// Writes a resident page to disk. Returns false if it is not resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if page_id == INVALID_PAGE_ID {
            return Err(IndexError::InvalidPageId(page_id));
        }

        let inner = self.state.inner.lock();
        match inner.page_table.get(&page_id) {
            Some(&frame_id) => {
                self.write_back(frame_id, page_id)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Writes every dirty resident page to disk.
    pub fn flush_all_pages(&self) -> Result<()> {
        let inner = self.state.inner.lock();

        for (&page_id, &frame_id) in inner.page_table.iter() {
            if self.state.frames[frame_id.as_usize()].is_dirty() {
                self.write_back(frame_id, page_id)?;
            }
        }

        Ok(())
    }

    /// Returns the pin count of a resident page.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let inner = self.state.inner.lock();
        inner
            .page_table
            .get(&page_id)
            .map(|&frame_id| self.state.frames[frame_id.as_usize()].pin_count())
    }

    /// Number of frames currently pinned by at least one guard.
    pub fn pinned_frame_count(&self) -> usize {
        let _inner = self.state.inner.lock();
        self.state
            .frames
            .iter()
            .filter(|frame| frame.pin_count() > 0)
            .count()
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn free_frame_count(&self) -> usize {
        self.state.inner.lock().free_list.len()
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        self.disk_scheduler.disk_manager()
    }

    /// Makes a page resident and pins it, returning its frame.
    fn fetch_page(&self, page_id: PageId) -> Result<FrameId> {
        if page_id == INVALID_PAGE_ID {
            return Err(IndexError::InvalidPageId(page_id));
        }

        let mut inner = self.state.inner.lock();

        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            self.state.frames[frame_id.as_usize()].pin();
            self.state.replacer.record_access(frame_id);
            self.state.replacer.set_evictable(frame_id, false);
            return Ok(frame_id);
        }

        let frame_id = self.acquire_frame(&mut inner)?;

        let mut image = [0u8; PAGE_SIZE];
        if let Err(e) = self.disk_scheduler.schedule_read_sync(page_id, &mut image) {
            inner.free_list.push_back(frame_id);
            return Err(e);
        }

        let frame = &self.state.frames[frame_id.as_usize()];
        frame.load(page_id, &image);
        frame.pin();
        inner.page_table.insert(page_id, frame_id);

        self.state.replacer.record_access(frame_id);
        self.state.replacer.set_evictable(frame_id, false);

        trace!(page_id = page_id.as_u32(), frame_id = frame_id.as_usize(), "buffer.fetch_miss");
        Ok(frame_id)
    }

    /// Takes a free frame, evicting (and writing back) a victim if needed.
    fn acquire_frame(&self, inner: &mut PoolInner) -> Result<FrameId> {
        if let Some(frame_id) = inner.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = self
            .state
            .replacer
            .evict()
            .ok_or(IndexError::BufferPoolFull)?;
        let frame = &self.state.frames[frame_id.as_usize()];
        let victim = frame.page_id();

        if frame.is_dirty() {
            if let Err(e) = self.write_back(frame_id, victim) {
                // Keep the victim resident; it is still the only copy
                self.state.replacer.record_access(frame_id);
                self.state.replacer.set_evictable(frame_id, true);
                return Err(e);
            }
        }

        inner.page_table.remove(&victim);
        frame.reset();

        trace!(page_id = victim.as_u32(), frame_id = frame_id.as_usize(), "buffer.evict");
        Ok(frame_id)
    }

    fn write_back(&self, frame_id: FrameId, page_id: PageId) -> Result<()> {
        let frame = &self.state.frames[frame_id.as_usize()];
        let mut image = [0u8; PAGE_SIZE];
        frame.copy_to(&mut image);

        self.disk_scheduler.schedule_write_sync(page_id, &image)?;
        frame.set_dirty(false);
        Ok(())
    }
}
