//! bptree - a disk-oriented B+ tree index
//!
//! The index stores unique fixed-width keys mapped to [`RecordId`]s in 4 KiB
//! pages. Every page access goes through a buffer pool, so the tree can be far
//! larger than memory and survives a restart through the header page.
//!
//! # Architecture
//!
//! - **Storage** (`storage`)
//!   - `DiskManager`: page-granular file I/O and page allocation
//!   - `DiskScheduler`: background I/O worker
//!   - `HeaderPage`: catalog of index names and their root pages (page 0)
//!   - `LeafPage` / `InternalPage`: B+ tree node layouts
//!
//! - **Buffer Pool** (`buffer`)
//!   - `BufferPoolManager`: caches pages in a fixed set of frames
//!   - `LruKReplacer`: LRU-K eviction policy
//!   - `ReadPageGuard` / `WritePageGuard`: RAII pins on a page
//!
//! - **Index** (`index`)
//!   - `BTreeIndex`: lookup, insert with splits, remove with
//!     redistribution and merging
//!   - `BTreeIterator`: ordered scan over the leaf chain
//!   - `KeyComparator`: key ordering
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bptree::buffer::BufferPoolManager;
//! use bptree::common::{BTreeOptions, RecordId};
//! use bptree::index::{encode_integer_key, BTreeIndex, IntegerComparator};
//! use bptree::storage::disk::DiskManager;
//!
//! let disk_manager = Arc::new(DiskManager::new("test.db").unwrap());
//! let bpm = Arc::new(BufferPoolManager::new(64, 2, disk_manager));
//!
//! let mut index =
//!     BTreeIndex::new("orders", bpm.clone(), IntegerComparator, BTreeOptions::default()).unwrap();
//!
//! let key = encode_integer_key(42, 8);
//! index.insert(&key, RecordId::from_integer(42)).unwrap();
//! assert_eq!(index.get_value(&key).unwrap(), Some(RecordId::from_integer(42)));
//!
//! bpm.flush_all_pages().unwrap();
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;

pub use common::{BTreeOptions, IndexError, PageId, RecordId, Result, SlotId};
pub use index::{BTreeIndex, IntegerComparator, KeyComparator};
