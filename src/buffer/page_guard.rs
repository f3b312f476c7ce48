use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::RawRwLock;

use crate::common::{FrameId, PageId};
use crate::storage::disk::PageBuf;

use super::buffer_pool_manager::BufferPoolState;

/// The pin a guard holds on its frame; released exactly once.
struct Pin {
    page_id: PageId,
    frame_id: FrameId,
    state: Arc<BufferPoolState>,
    is_dirty: bool,
}

impl Pin {
    fn release(&self) {
        self.state.unpin(self.frame_id, self.page_id, self.is_dirty);
    }
}

/// RAII guard for read-only access to a page.
/// Unpins the page (clean) when dropped.
pub struct ReadPageGuard {
    pin: Pin,
    data: Option<ArcRwLockReadGuard<RawRwLock, PageBuf>>,
}

impl ReadPageGuard {
    pub(crate) fn new(
        page_id: PageId,
        frame_id: FrameId,
        state: Arc<BufferPoolState>,
        data: ArcRwLockReadGuard<RawRwLock, PageBuf>,
    ) -> Self {
        Self {
            pin: Pin {
                page_id,
                frame_id,
                state,
                is_dirty: false,
            },
            data: Some(data),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.pin.page_id
    }

    pub fn data(&self) -> &[u8] {
        match &self.data {
            Some(guard) => &guard[..],
            None => unreachable!("page data is only taken on drop"),
        }
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
        // Release the latch before the pin so an evictable frame is never latched
        self.data.take();
        self.pin.release();
    }
}

/// RAII guard for read-write access to a page.
/// The first mutable access marks the page dirty; dropping the guard unpins
/// it with that flag.
pub struct WritePageGuard {
    pin: Pin,
    data: Option<ArcRwLockWriteGuard<RawRwLock, PageBuf>>,
}

impl WritePageGuard {
    pub(crate) fn new(
        page_id: PageId,
        frame_id: FrameId,
        state: Arc<BufferPoolState>,
        data: ArcRwLockWriteGuard<RawRwLock, PageBuf>,
    ) -> Self {
        Self {
            pin: Pin {
                page_id,
                frame_id,
                state,
                is_dirty: false,
            },
            data: Some(data),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.pin.page_id
    }

    pub fn is_dirty(&self) -> bool {
        self.pin.is_dirty
    }

    pub fn data(&self) -> &[u8] {
        match &self.data {
            Some(guard) => &guard[..],
            None => unreachable!("page data is only taken on drop"),
        }
    }

    /// Returns the page data for writing and marks the page dirty.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.pin.is_dirty = true;
        match &mut self.data {
            Some(guard) => &mut guard[..],
            None => unreachable!("page data is only taken on drop"),
        }
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
        self.data.take();
        self.pin.release();
    }
}
