//! Blocking calls with a deadline.
//!
//! Each call runs on its own thread; the caller waits on a channel until the
//! deadline. A call that misses it is reported as [`Error::Timeout`]. Reads
//! may leave their thread to finish in the background; writes use
//! [`Pending::wait_settled`] so no write outlives its caller.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::{Error, Result};

/// A call started by [`Pending::spawn`] whose result has not been collected.
pub struct Pending<T> {
    what: String,
    rx: Receiver<Result<T>>,
    deadline: Instant,
    timeout: Duration,
}

impl<T: Send + 'static> Pending<T> {
    pub fn spawn<F>(what: impl Into<String>, timeout: Duration, f: F) -> Self
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let what = what.into();
        let (tx, rx) = mpsc::channel();
        let spawned = thread::Builder::new()
            .name(format!("depot-{}", what))
            .spawn(move || {
                // Receiver may be gone if the caller already timed out
                let _ = tx.send(f());
            });
        let rx = match spawned {
            Ok(_) => rx,
            Err(e) => {
                // Report the spawn failure through a channel like any other error
                let (tx, failed) = mpsc::channel();
                let _ = tx.send(Err(Error::Io(e)));
                failed
            }
        };
        Self {
            what,
            rx,
            deadline: Instant::now() + timeout,
            timeout,
        }
    }

    /// Block until the call finishes or its deadline passes.
    pub fn wait(self) -> Result<T> {
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        match self.rx.recv_timeout(remaining) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(Error::Timeout {
                what: self.what,
                after: self.timeout,
            }),
            Err(RecvTimeoutError::Disconnected) => Err(Error::Io(std::io::Error::other(
                format!("{} exited without a result", self.what),
            ))),
        }
    }

    /// Like [`wait`](Self::wait), but a call that misses its deadline is still
    /// waited for before the timeout is reported.
    ///
    /// The caller may release locks afterwards knowing the call can no
    /// longer change anything.
    pub fn wait_settled(self) -> Result<T> {
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        match self.rx.recv_timeout(remaining) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                warn!(what = %self.what, after = ?self.timeout, "call missed its deadline, waiting for it to settle");
                // Disconnected here means the worker is gone, which is what we wait for
                let _ = self.rx.recv();
                Err(Error::Timeout {
                    what: self.what,
                    after: self.timeout,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(Error::Io(std::io::Error::other(
                format!("{} exited without a result", self.what),
            ))),
        }
    }
}
