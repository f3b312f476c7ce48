use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, warn};

use crate::common::{IndexError, PageId, Result, PAGE_SIZE};

use super::DiskManager;

/// Owned page image travelling between the buffer pool and the worker.
pub type PageBuf = Box<[u8; PAGE_SIZE]>;

/// A disk I/O request. The page image is moved into the request and handed
/// back on completion, so the worker never borrows caller memory.
pub enum DiskRequest {
    Read {
        page_id: PageId,
        buf: PageBuf,
        done: Sender<Result<PageBuf>>,
    },
    Write {
        page_id: PageId,
        buf: PageBuf,
        done: Sender<Result<PageBuf>>,
    },
}

/// DiskScheduler manages a background worker thread that processes disk I/O
/// requests in arrival order.
pub struct DiskScheduler {
    /// The disk manager for actual I/O operations
    disk_manager: Arc<DiskManager>,
    /// Channel sender for queuing requests; dropping it stops the worker
    request_sender: Option<Sender<DiskRequest>>,
    /// Handle to the background worker thread
    worker_handle: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    /// Creates a new DiskScheduler with the given DiskManager.
    /// Spawns a background worker thread to process requests.
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        let (sender, receiver) = bounded::<DiskRequest>(128);

        let dm_clone = Arc::clone(&disk_manager);
        let worker_handle = thread::spawn(move || {
            Self::run_worker(dm_clone, receiver);
        });

        Self {
            disk_manager,
            request_sender: Some(sender),
            worker_handle: Some(worker_handle),
        }
    }

    /// Schedules a disk request for processing by the background worker.
    pub fn schedule(&self, request: DiskRequest) -> Result<()> {
        let sender = self
            .request_sender
            .as_ref()
            .ok_or_else(|| IndexError::DiskScheduler("scheduler is shut down".to_string()))?;

        sender
            .send(request)
            .map_err(|e| IndexError::Channel(format!("failed to schedule request: {}", e)))
    }

    /// Schedules a read request and waits for completion.
    pub fn schedule_read_sync(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let (done, completion) = bounded(1);
        self.schedule(DiskRequest::Read {
            page_id,
            buf: Box::new([0u8; PAGE_SIZE]),
            done,
        })?;

        let buf = Self::wait(completion)?;
        data.copy_from_slice(&buf[..]);
        Ok(())
    }

    /// Schedules a write request and waits for completion.
    pub fn schedule_write_sync(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let mut buf: PageBuf = Box::new([0u8; PAGE_SIZE]);
        buf.copy_from_slice(data);

        let (done, completion) = bounded(1);
        self.schedule(DiskRequest::Write { page_id, buf, done })?;

        Self::wait(completion).map(|_| ())
    }

    /// Returns a reference to the underlying DiskManager.
    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }

    fn wait(completion: Receiver<Result<PageBuf>>) -> Result<PageBuf> {
        completion
            .recv()
            .map_err(|e| IndexError::DiskScheduler(format!("failed to receive completion: {}", e)))?
    }

    /// Processes requests until every sender is gone.
    fn run_worker(disk_manager: Arc<DiskManager>, receiver: Receiver<DiskRequest>) {
        for request in receiver.iter() {
            Self::process_request(&disk_manager, request);
        }
        debug!("disk.scheduler.worker_exit");
    }

    fn process_request(disk_manager: &DiskManager, request: DiskRequest) {
        let (done, outcome) = match request {
            DiskRequest::Read {
                page_id,
                mut buf,
                done,
            } => {
                let outcome = disk_manager.read_page(page_id, &mut buf[..]).map(|_| buf);
                (done, outcome)
            }
            DiskRequest::Write { page_id, buf, done } => {
                let outcome = disk_manager.write_page(page_id, &buf[..]).map(|_| buf);
                (done, outcome)
            }
        };

        if let Err(ref e) = outcome {
            warn!(error = %e, "disk.scheduler.request_failed");
        }

        // The requester may have given up waiting; nothing to report then.
        let _ = done.send(outcome);
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        // Closing the queue lets the worker drain what is left and exit
        self.request_sender.take();
        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}
