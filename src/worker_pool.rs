use crate::NumlogError;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{error, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed set of worker threads fed from a bounded queue.
///
/// `execute` never drops a job: when every worker is busy and the queue is
/// full it blocks the caller until a slot frees up.
pub struct WorkerPool {
    name: String,
    sender: Mutex<Option<Sender<Job>>>,
    queue: Receiver<Job>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    exited: Receiver<()>,
    cancelled: Arc<AtomicBool>,
}

impl WorkerPool {
    pub fn new(name: &str, pool_size: usize, queue_capacity: usize) -> Result<Self, NumlogError> {
        if pool_size == 0 {
            return Err(NumlogError::Config("pool size must be at least 1".to_string()));
        }

        let (sender, queue) = crossbeam_channel::bounded::<Job>(queue_capacity);
        let (exited_tx, exited) = crossbeam_channel::unbounded();
        let cancelled = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(pool_size);
        for i in 0..pool_size {
            let jobs = queue.clone();
            let exited_tx = exited_tx.clone();
            let cancelled = Arc::clone(&cancelled);
            let thread_name = format!("{}-{}", name, i);

            let handle = thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || {
                    while let Ok(job) = jobs.recv() {
                        // Past the grace period queued jobs are discarded
                        if cancelled.load(Ordering::Acquire) {
                            continue;
                        }
                        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                            error!("[{}] job panicked", thread_name);
                        }
                    }
                    let _ = exited_tx.send(());
                })
                .map_err(NumlogError::Io)?;
            workers.push(handle);
        }

        Ok(Self {
            name: name.to_string(),
            sender: Mutex::new(Some(sender)),
            queue,
            workers: Mutex::new(workers),
            exited,
            cancelled,
        })
    }

    /// Queue a job, blocking while the queue is full
    pub fn execute<F>(&self, job: F) -> Result<(), NumlogError>
    where
        F: FnOnce() + Send + 'static,
    {
        // Clone out of the lock so a blocked send never holds it
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(NumlogError::PoolClosed)?;

        sender.send(Box::new(job)).map_err(|_| NumlogError::PoolClosed)
    }

    /// Jobs waiting for a free worker
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Stop accepting jobs and wait up to `grace` for the workers to drain the
    /// queue and exit.
    ///
    /// Returns false if the grace period ran out. Remaining queued jobs are
    /// then discarded and the still-busy threads are left to finish on their
    /// own.
    pub fn shutdown(&self, grace: Duration) -> bool {
        let workers = std::mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner));
        drop(self.sender.lock().unwrap_or_else(PoisonError::into_inner).take());

        if workers.is_empty() {
            return true;
        }

        let deadline = Instant::now() + grace;
        let mut remaining = workers.len();
        while remaining > 0 {
            let timeout = deadline.saturating_duration_since(Instant::now());
            match self.exited.recv_timeout(timeout) {
                Ok(()) => remaining -= 1,
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        if remaining > 0 {
            self.cancelled.store(true, Ordering::Release);
            warn!(
                "[{}] {} worker(s) still busy after {:?}, abandoning them and {} queued job(s)",
                self.name,
                remaining,
                grace,
                self.pending()
            );
            return false;
        }

        for handle in workers {
            let _ = handle.join();
        }
        true
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the queue lets idle workers exit; busy ones finish detached
        self.sender.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}
