use thiserror::Error;

use super::types::{FrameId, PageId};

/// Error types for the index and the storage it runs on
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Page {0} not found")]
    PageNotFound(PageId),

    #[error("Frame {0} not found")]
    FrameNotFound(FrameId),

    #[error("Buffer pool is full, no evictable frames available")]
    BufferPoolFull,

    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),

    #[error("Page {0} is still pinned")]
    PageStillPinned(PageId),

    #[error("Page {0} is already free")]
    PageAlreadyFree(PageId),

    #[error("Disk scheduler error: {0}")]
    DiskScheduler(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Invalid database file")]
    InvalidDatabaseFile,

    #[error("Header page is full")]
    HeaderFull,

    #[error("Invalid index name {0:?}: must be 1..=32 bytes without NUL")]
    InvalidIndexName(String),

    #[error("Index {0:?} is already registered")]
    IndexAlreadyExists(String),

    #[error("Index {0:?} not found")]
    IndexNotFound(String),

    #[error("Key has {actual} bytes, index expects {expected}")]
    KeySizeMismatch { expected: usize, actual: usize },

    #[error("Invalid index options: {0}")]
    InvalidOptions(String),

    #[error("Could not allocate a page for {0}")]
    AllocationFailure(&'static str),

    #[error("Index corrupted: {0}")]
    IndexCorrupted(String),
}

pub type Result<T> = std::result::Result<T, IndexError>;
