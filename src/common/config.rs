use crate::storage::page::{internal_page_capacity, leaf_page_capacity};

use super::error::{IndexError, Result};
use super::types::{FrameId, PageId};

/// Size of a page in bytes (4 KB)
pub const PAGE_SIZE: usize = 4096;

/// Invalid page ID constant
pub const INVALID_PAGE_ID: PageId = PageId(u32::MAX);

/// Invalid frame ID constant
pub const INVALID_FRAME_ID: FrameId = FrameId(u32::MAX);

/// Page reserved for the index catalog in every database file
pub const HEADER_PAGE_ID: PageId = PageId(0);

/// Default K value for LRU-K replacement policy
pub const DEFAULT_LRUK_K: usize = 2;

/// Default buffer pool size (number of frames)
pub const DEFAULT_BUFFER_POOL_SIZE: usize = 64;

/// Default key width in bytes (an i64)
pub const DEFAULT_KEY_SIZE: usize = 8;

/// Widest key a page layout accepts
pub const MAX_KEY_SIZE: usize = 64;

/// Node capacity settings for a B+ tree.
///
/// `leaf_max_size` counts key/value pairs, `internal_max_size` counts child
/// pointers. A node splits when an insert pushes it past its max size, so each
/// page keeps one spare slot for that transient overflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BTreeOptions {
    pub key_size: usize,
    pub leaf_max_size: usize,
    pub internal_max_size: usize,
}

impl BTreeOptions {
    /// Options sized to fill a page for the given key width.
    pub fn with_key_size(key_size: usize) -> Self {
        Self {
            key_size,
            leaf_max_size: leaf_page_capacity(key_size).saturating_sub(1),
            internal_max_size: internal_page_capacity(key_size).saturating_sub(1),
        }
    }

    /// Overrides the node fan-out, mostly useful to force deep trees in tests.
    pub fn with_max_sizes(mut self, leaf_max_size: usize, internal_max_size: usize) -> Self {
        self.leaf_max_size = leaf_max_size;
        self.internal_max_size = internal_max_size;
        self
    }

    pub fn leaf_min_size(&self) -> usize {
        min_size_for(self.leaf_max_size)
    }

    pub fn internal_min_size(&self) -> usize {
        min_size_for(self.internal_max_size)
    }

    pub fn validate(&self) -> Result<()> {
        if self.key_size == 0 || self.key_size > MAX_KEY_SIZE {
            return Err(IndexError::InvalidOptions(format!(
                "key size {} outside 1..={}",
                self.key_size, MAX_KEY_SIZE
            )));
        }

        let leaf_capacity = leaf_page_capacity(self.key_size);
        if self.leaf_max_size < 2 || self.leaf_max_size >= leaf_capacity {
            return Err(IndexError::InvalidOptions(format!(
                "leaf max size {} outside 2..{}",
                self.leaf_max_size, leaf_capacity
            )));
        }

        let internal_capacity = internal_page_capacity(self.key_size);
        if self.internal_max_size < 3 || self.internal_max_size >= internal_capacity {
            return Err(IndexError::InvalidOptions(format!(
                "internal max size {} outside 3..{}",
                self.internal_max_size, internal_capacity
            )));
        }

        Ok(())
    }
}

impl Default for BTreeOptions {
    fn default() -> Self {
        Self::with_key_size(DEFAULT_KEY_SIZE)
    }
}

/// `ceil(max_size / 2)`
pub fn min_size_for(max_size: usize) -> usize {
    max_size.div_ceil(2)
}
