use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::common::{IndexError, PageId, Result, HEADER_PAGE_ID, PAGE_SIZE};

/// Page-granular access to the single index file.
///
/// Page 0 is reserved for the header page. Deallocated pages go onto a free
/// list and are handed out again before the file grows.
pub struct DiskManager {
    db_file: Mutex<File>,
    db_path: String,
    /// Pages the file holds, free ones included
    num_pages: AtomicU32,
    /// Deallocated pages available for reuse, lowest id first
    free_pages: Mutex<BTreeSet<PageId>>,
    num_reads: AtomicU32,
    num_writes: AtomicU32,
}

impl DiskManager {
    /// Opens `db_path`, creating it with a zeroed header page if missing.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path_str = db_path.as_ref().to_string_lossy().to_string();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&db_path)?;

        let file_size = file.metadata()?.len();
        if file_size % PAGE_SIZE as u64 != 0 {
            return Err(IndexError::InvalidDatabaseFile);
        }
        let num_pages = (file_size / PAGE_SIZE as u64) as u32;

        let dm = Self {
            db_file: Mutex::new(file),
            db_path: path_str,
            num_pages: AtomicU32::new(num_pages),
            free_pages: Mutex::new(BTreeSet::new()),
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        };

        if num_pages == 0 {
            let header = dm.allocate_page()?;
            debug_assert_eq!(header, HEADER_PAGE_ID);
            debug!(path = %dm.db_path, "disk.create");
        }

        Ok(dm)
    }

    /// Reads page `page_id` into `data`, which must be one page long.
    pub fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");

        if page_id.as_u32() >= self.num_pages.load(Ordering::Acquire) {
            return Err(IndexError::PageNotFound(page_id));
        }

        let offset = (page_id.as_u32() as u64) * (PAGE_SIZE as u64);

        let mut file = self.db_file.lock();
        file.seek(SeekFrom::Start(offset))?;

        // A page allocated but never flushed may sit past the end of the file
        let bytes_read = file.read(data)?;
        if bytes_read < PAGE_SIZE {
            data[bytes_read..].fill(0);
        }

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Writes one page image at the slot of `page_id`.
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");

        let offset = (page_id.as_u32() as u64) * (PAGE_SIZE as u64);

        let mut file = self.db_file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        file.flush()?;

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Allocates a page and returns its page ID, reusing a freed page if one
    /// is available. The page is zero-initialized on disk.
    pub fn allocate_page(&self) -> Result<PageId> {
        let reused = self.free_pages.lock().pop_first();

        let page_id = match reused {
            Some(page_id) => page_id,
            None => PageId::new(self.num_pages.fetch_add(1, Ordering::SeqCst)),
        };

        let zeros = [0u8; PAGE_SIZE];
        self.write_page(page_id, &zeros)?;

        trace!(page_id = page_id.as_u32(), reused = reused.is_some(), "disk.allocate");
        Ok(page_id)
    }

    /// Returns a page to the free list.
    pub fn deallocate_page(&self, page_id: PageId) -> Result<()> {
        if page_id == HEADER_PAGE_ID || page_id.as_u32() >= self.get_num_pages() {
            return Err(IndexError::InvalidPageId(page_id));
        }

        if !self.free_pages.lock().insert(page_id) {
            return Err(IndexError::PageAlreadyFree(page_id));
        }

        trace!(page_id = page_id.as_u32(), "disk.deallocate");
        Ok(())
    }

    /// Returns the number of pages the file holds, free ones included.
    pub fn get_num_pages(&self) -> u32 {
        self.num_pages.load(Ordering::Acquire)
    }

    /// Returns the number of pages waiting on the free list.
    pub fn get_num_free_pages(&self) -> u32 {
        self.free_pages.lock().len() as u32
    }

    /// Returns the number of pages in use, the header page included.
    pub fn get_num_live_pages(&self) -> u32 {
        self.get_num_pages() - self.get_num_free_pages()
    }

    pub fn get_num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    pub fn get_num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    pub fn get_db_path(&self) -> &str {
        &self.db_path
    }

    /// fsyncs the file.
    pub fn sync(&self) -> Result<()> {
        let file = self.db_file.lock();
        file.sync_all()?;
        Ok(())
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let file = self.db_file.get_mut();
        let _ = file.sync_all();
    }
}
