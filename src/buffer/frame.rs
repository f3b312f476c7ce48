use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::common::{FrameId, PageId, INVALID_PAGE_ID, PAGE_SIZE};
use crate::storage::disk::PageBuf;

/// A single buffer frame: the resident page image plus its pin and dirty state.
pub struct Frame {
    frame_id: FrameId,
    /// The page held by this frame (INVALID_PAGE_ID if empty)
    page_id: AtomicU32,
    /// Number of outstanding page guards
    pin_count: AtomicU32,
    /// Whether the image differs from what is on disk
    is_dirty: AtomicBool,
    /// The page image; guards lock it for as long as they live
    pub(crate) data: Arc<RwLock<PageBuf>>,
}

impl Frame {
    pub fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            page_id: AtomicU32::new(INVALID_PAGE_ID.as_u32()),
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
            data: Arc::new(RwLock::new(Box::new([0u8; PAGE_SIZE]))),
        }
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    pub fn page_id(&self) -> PageId {
        PageId::new(self.page_id.load(Ordering::Acquire))
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    /// Increments the pin count and returns the new value.
    pub fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrements the pin count and returns the new value, or `None` if the
    /// frame was not pinned.
    pub fn unpin(&self) -> Option<u32> {
        self.pin_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |pins| pins.checked_sub(1))
            .ok()
            .map(|previous| previous - 1)
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }

    pub fn set_dirty(&self, dirty: bool) {
        self.is_dirty.store(dirty, Ordering::Release);
    }

    /// Loads a page image into the frame and assigns it to `page_id`.
    pub fn load(&self, page_id: PageId, image: &[u8]) {
        self.data.write().copy_from_slice(image);
        self.page_id.store(page_id.as_u32(), Ordering::Release);
        self.pin_count.store(0, Ordering::Release);
        self.is_dirty.store(false, Ordering::Release);
    }

    /// Copies the page image out of the frame.
    pub fn copy_to(&self, out: &mut [u8]) {
        out.copy_from_slice(&self.data.read()[..]);
    }

    /// Returns the frame to its empty state.
    pub fn reset(&self) {
        self.data.write().fill(0);
        self.page_id
            .store(INVALID_PAGE_ID.as_u32(), Ordering::Release);
        self.pin_count.store(0, Ordering::Release);
        self.is_dirty.store(false, Ordering::Release);
    }
}
