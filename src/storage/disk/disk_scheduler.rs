use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::common::{BrambleError, PageId, Result, PAGE_SIZE};

use super::DiskManager;

type PageBuf = Box<[u8; PAGE_SIZE]>;

/// A disk I/O request processed by the background worker. Buffers are
/// owned by the request and handed back through the completion channel.
enum DiskRequest {
    Read {
        page_id: PageId,
        done: Sender<Result<PageBuf>>,
    },
    Write {
        page_id: PageId,
        data: PageBuf,
        done: Sender<Result<()>>,
    },
}

/// DiskScheduler funnels page I/O through a single background worker
/// thread. Callers block on a completion channel, so the interface stays
/// synchronous while all file access is serialized off the caller's stack.
pub struct DiskScheduler {
    disk_manager: Arc<DiskManager>,
    request_tx: Option<Sender<DiskRequest>>,
    worker: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    /// Spawns the worker thread over the given disk manager.
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        let (request_tx, request_rx) = bounded::<DiskRequest>(128);
        let dm = Arc::clone(&disk_manager);
        let worker = thread::spawn(move || Self::run_worker(dm, request_rx));

        Self {
            disk_manager,
            request_tx: Some(request_tx),
            worker: Some(worker),
        }
    }

    /// Reads a page, blocking until the worker completes.
    pub fn schedule_read_sync(&self, page_id: PageId) -> Result<PageBuf> {
        let (done_tx, done_rx) = bounded(1);
        self.send(DiskRequest::Read {
            page_id,
            done: done_tx,
        })?;
        done_rx
            .recv()
            .map_err(|e| BrambleError::DiskScheduler(format!("read completion lost: {}", e)))?
    }

    /// Writes a page, blocking until the worker completes.
    pub fn schedule_write_sync(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);
        let mut buf: PageBuf = Box::new([0u8; PAGE_SIZE]);
        buf.copy_from_slice(data);

        let (done_tx, done_rx) = bounded(1);
        self.send(DiskRequest::Write {
            page_id,
            data: buf,
            done: done_tx,
        })?;
        done_rx
            .recv()
            .map_err(|e| BrambleError::DiskScheduler(format!("write completion lost: {}", e)))?
    }

    fn send(&self, request: DiskRequest) -> Result<()> {
        self.request_tx
            .as_ref()
            .ok_or_else(|| BrambleError::DiskScheduler("scheduler shut down".into()))?
            .send(request)
            .map_err(|e| BrambleError::DiskScheduler(format!("failed to schedule: {}", e)))
    }

    /// Worker loop: drains requests until the channel disconnects.
    fn run_worker(disk_manager: Arc<DiskManager>, requests: Receiver<DiskRequest>) {
        while let Ok(request) = requests.recv() {
            match request {
                DiskRequest::Read { page_id, done } => {
                    let mut buf: PageBuf = Box::new([0u8; PAGE_SIZE]);
                    let result = disk_manager
                        .read_page(page_id, &mut buf[..])
                        .map(|()| buf);
                    let _ = done.send(result);
                }
                DiskRequest::Write {
                    page_id,
                    data,
                    done,
                } => {
                    let _ = done.send(disk_manager.write_page(page_id, &data[..]));
                }
            }
        }
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain queued requests and exit.
        self.request_tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
