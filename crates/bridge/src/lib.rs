//! Background async loop with a blocking submission interface.
//!
//! Decouples a synchronous caller (CLI command loop or GUI shell) from
//! a long-running concurrent workload: one dedicated OS thread runs a
//! current-thread tokio runtime, so every hosted task is multiplexed
//! cooperatively on that single thread. Callers either submit a future
//! and block for its result, or spawn fire-and-forget work whose
//! results flow back over channels.
//!
//! Funneling all ledger and config I/O through this one loop serializes
//! it without extra locking, while transfers stay concurrent because
//! they suspend on I/O rather than on computation.

use std::future::Future;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use tokio::runtime;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

/// Failures at the loop boundary. These are the only failures fatal to
/// a whole run; everything per-file is contained elsewhere.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The loop is gone: it failed to start, was shut down, or dropped
    /// the submitted work before completion.
    #[error("background loop unavailable")]
    LoopUnavailable,

    #[error("failed to start background loop: {0}")]
    Startup(#[source] std::io::Error),
}

/// Handle to the background loop.
pub struct AsyncBridge {
    handle: runtime::Handle,
    tracker: TaskTracker,
    cancel: CancellationToken,
    done_rx: Mutex<Option<std::sync::mpsc::Receiver<()>>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl AsyncBridge {
    /// Spawns the loop thread and returns once its runtime is ready to
    /// accept work.
    pub fn start() -> Result<Self, BridgeError> {
        let rt = runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(BridgeError::Startup)?;
        let handle = rt.handle().clone();

        let tracker = TaskTracker::new();
        let cancel = CancellationToken::new();
        let loop_tracker = tracker.clone();
        let loop_cancel = cancel.clone();
        let (done_tx, done_rx) = std::sync::mpsc::channel();

        let thread = thread::Builder::new()
            .name("teledrop-loop".into())
            .spawn(move || {
                debug!("background loop started");
                rt.block_on(async move {
                    // Parks here while driving every tracked task, until
                    // shutdown cancels the root token.
                    loop_cancel.cancelled().await;
                    // Cancellation is cooperative: tasks that observe the
                    // token exit on their own, so waiting for the tracker
                    // to empty is the acknowledgement. shutdown() bounds
                    // this wait from the outside.
                    loop_tracker.close();
                    loop_tracker.wait().await;
                });
                drop(rt);
                debug!("background loop drained");
                let _ = done_tx.send(());
            })
            .map_err(BridgeError::Startup)?;

        Ok(Self {
            handle,
            tracker,
            cancel,
            done_rx: Mutex::new(Some(done_rx)),
            thread: Some(thread),
        })
    }

    /// Runs `future` on the loop and blocks the calling thread until it
    /// completes, returning its output.
    ///
    /// Intended for short serialized operations (config load/save) and
    /// for launching runs; long workloads should use [`spawn`] and
    /// report through channels instead.
    ///
    /// [`spawn`]: Self::spawn
    pub fn run<F>(&self, future: F) -> Result<F::Output, BridgeError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.tracker.spawn_on(
            async move {
                let _ = tx.send(future.await);
            },
            &self.handle,
        );
        // The sender is dropped without a value iff the loop discarded
        // the task (shutdown or never started).
        rx.blocking_recv().map_err(|_| BridgeError::LoopUnavailable)
    }

    /// Schedules `future` on the loop without waiting for it.
    ///
    /// The future should observe [`cancel_token`] (or a child of it) if
    /// it can outlive a run, so shutdown can drain it.
    ///
    /// [`cancel_token`]: Self::cancel_token
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn_on(future, &self.handle);
    }

    /// Root cancellation token. Hosted workloads observe this token (or
    /// a child of it) at their cooperative checkpoints.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancels all outstanding work and tears the loop down.
    ///
    /// Waits up to `timeout` for the loop thread to acknowledge the
    /// drain; a loop that does not drain in time is detached rather
    /// than joined, so the caller is never wedged.
    pub fn shutdown(mut self, timeout: Duration) {
        self.cancel.cancel();
        let acked = self
            .done_rx
            .lock()
            .unwrap()
            .take()
            .map(|rx| rx.recv_timeout(timeout).is_ok())
            .unwrap_or(false);
        if acked {
            if let Some(thread) = self.thread.take() {
                let _ = thread.join();
            }
        } else {
            warn!(?timeout, "background loop did not drain in time, detaching");
            self.thread.take();
        }
    }
}

impl Drop for AsyncBridge {
    fn drop(&mut self) {
        // Best effort: stop the loop if shutdown() was never called.
        // The thread is detached, not joined; drop must not block.
        self.cancel.cancel();
    }
}
