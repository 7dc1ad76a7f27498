use crate::NumlogError;
use crossbeam_channel::{select, Receiver, RecvTimeoutError, Sender};
use std::sync::{Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::warn;

/// Runs a callback at a fixed rate on its own thread, first after one period
pub struct StatusTimer {
    name: String,
    stop: Mutex<Option<Sender<()>>>,
    done: Receiver<()>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl StatusTimer {
    pub fn start<F>(name: &str, period: Duration, mut callback: F) -> Result<Self, NumlogError>
    where
        F: FnMut() + Send + 'static,
    {
        if period.is_zero() {
            return Err(NumlogError::Config("status period must be greater than zero".to_string()));
        }

        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let (done_tx, done) = crossbeam_channel::bounded::<()>(1);

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let ticker = crossbeam_channel::tick(period);
                loop {
                    select! {
                        recv(ticker) -> _ => callback(),
                        // A message or a dropped sender both mean stop
                        recv(stop_rx) -> _ => break,
                    }
                }
                let _ = done_tx.send(());
            })
            .map_err(NumlogError::Io)?;

        Ok(Self {
            name: name.to_string(),
            stop: Mutex::new(Some(stop_tx)),
            done,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Stop the timer, waiting up to `grace` for a running callback to return.
    ///
    /// Returns false if the thread was still busy when the grace period ran
    /// out; it is detached in that case.
    pub fn stop(&self, grace: Duration) -> bool {
        let Some(stop) = self.stop.lock().unwrap_or_else(PoisonError::into_inner).take() else {
            return true;
        };
        drop(stop);

        let handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner).take();
        match self.done.recv_timeout(grace) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = handle {
                    if handle.join().is_err() {
                        warn!("[{}] status callback panicked", self.name);
                    }
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!("[{}] still running after {:?}, abandoning it", self.name, grace);
                false
            }
        }
    }
}

impl Drop for StatusTimer {
    fn drop(&mut self) {
        self.stop.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}
