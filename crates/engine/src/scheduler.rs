//! Batch scheduler.
//!
//! Enumerates the root directory, partitions the frozen file list into
//! batches, runs one upload task per file under a run-wide admission
//! gate, and aggregates outcomes in completion order into progress and
//! log events. Cancellation is cooperative: checked between batches, at
//! admission and before each transfer; in-flight transfers finish.

use std::path::PathBuf;
use std::sync::Arc;

use futures_util::stream::{FuturesUnordered, StreamExt};
use teledrop_ledger::FingerprintLedger;
use teledrop_transport::DocumentSink;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::EngineError;
use crate::scanner::scan_files;
use crate::task::upload_file;
use crate::types::{UploadEvent, UploadOutcome, UploadPolicy};

/// Hard ceiling on concurrently active transfers.
pub const MAX_CONCURRENCY: usize = 10;

/// Files per batch. Batches pace peak memory and log volume only;
/// concurrency is governed by the admission gate, not the batch size.
const BATCH_SIZE: usize = 100;

/// Parameters for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Root directory whose tree is uploaded.
    pub root: PathBuf,
    /// Destination identifier documents are delivered to.
    pub destination: String,
    /// Requested concurrent transfers; clamped to 1..=[`MAX_CONCURRENCY`].
    pub concurrency: usize,
    /// Retry/size policy applied to every upload task.
    pub policy: UploadPolicy,
}

/// Aggregate counts for a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Files enumerated; frozen before the first upload.
    pub total: usize,
    /// Files that reached a terminal outcome.
    pub completed: usize,
    pub uploaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Runs upload batches and aggregates outcomes into events.
pub struct BatchScheduler {
    events_tx: mpsc::Sender<UploadEvent>,
    events_rx: Option<mpsc::Receiver<UploadEvent>>,
    cancel: CancellationToken,
}

impl Default for BatchScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchScheduler {
    /// Creates a scheduler with its own cancellation token.
    pub fn new() -> Self {
        Self::with_cancel_token(CancellationToken::new())
    }

    /// Creates a scheduler observing an externally owned token (e.g. a
    /// child of the hosting loop's root token).
    pub fn with_cancel_token(cancel: CancellationToken) -> Self {
        let (events_tx, events_rx) = mpsc::channel(256);
        Self {
            events_tx,
            events_rx: Some(events_rx),
            cancel,
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<UploadEvent>> {
        self.events_rx.take()
    }

    /// Returns the run's cancellation token.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs the whole upload: enumerate, batch, gate, aggregate.
    ///
    /// The terminal [`UploadEvent::Completed`] is emitted exactly once,
    /// even when every file fails or the run is cancelled.
    pub async fn run(
        &self,
        sink: Arc<dyn DocumentSink>,
        ledger: Arc<FingerprintLedger>,
        config: RunConfig,
    ) -> Result<RunSummary, EngineError> {
        let result = self.run_inner(sink, ledger, config).await;
        let _ = self.events_tx.send(UploadEvent::Completed).await;
        result
    }

    async fn run_inner(
        &self,
        sink: Arc<dyn DocumentSink>,
        ledger: Arc<FingerprintLedger>,
        config: RunConfig,
    ) -> Result<RunSummary, EngineError> {
        let files = scan_files(&config.root)?;
        let total = files.len();
        self.log(format!(
            "found {total} files under {}",
            config.root.display()
        ))
        .await;
        if total == 0 {
            self.log("nothing to upload".into()).await;
            return Ok(RunSummary::default());
        }

        let concurrency = config.concurrency.clamp(1, MAX_CONCURRENCY);
        // One gate for the entire run: batches pace, the gate bounds.
        let gate = Arc::new(Semaphore::new(concurrency));
        info!(total, concurrency, "upload run starting");

        let mut summary = RunSummary {
            total,
            ..RunSummary::default()
        };

        for batch in files.chunks(BATCH_SIZE) {
            if self.cancel.is_cancelled() {
                self.log("upload cancelled".into()).await;
                break;
            }

            // Launched in list order; completion order is whatever the
            // network makes of it.
            let mut in_flight: FuturesUnordered<_> = batch
                .iter()
                .map(|file| {
                    let gate = Arc::clone(&gate);
                    let sink = Arc::clone(&sink);
                    let ledger = Arc::clone(&ledger);
                    let cancel = self.cancel.clone();
                    let destination = config.destination.clone();
                    let policy = config.policy.clone();
                    async move {
                        let Ok(_permit) = gate.acquire_owned().await else {
                            return (file, None);
                        };
                        if cancel.is_cancelled() {
                            return (file, None);
                        }
                        let outcome = upload_file(
                            file,
                            &destination,
                            sink.as_ref(),
                            &ledger,
                            &policy,
                            &cancel,
                        )
                        .await;
                        (file, outcome)
                    }
                })
                .collect();

            while let Some((file, outcome)) = in_flight.next().await {
                // Tasks short-circuited by cancellation have no outcome
                // and do not move the progress counter.
                let Some(outcome) = outcome else { continue };

                summary.completed += 1;
                match outcome {
                    UploadOutcome::Uploaded => summary.uploaded += 1,
                    UploadOutcome::SkippedDuplicate => summary.skipped += 1,
                    _ => summary.failed += 1,
                }

                let percent = (summary.completed * 100 / total) as u8;
                let _ = self
                    .events_tx
                    .send(UploadEvent::Progress { percent })
                    .await;
                self.log(describe_outcome(&file.name(), &outcome)).await;
            }
        }

        info!(
            completed = summary.completed,
            uploaded = summary.uploaded,
            skipped = summary.skipped,
            failed = summary.failed,
            "upload run finished"
        );
        Ok(summary)
    }

    async fn log(&self, line: String) {
        let _ = self.events_tx.send(UploadEvent::Log(line)).await;
    }
}

/// One human-readable line per outcome.
fn describe_outcome(name: &str, outcome: &UploadOutcome) -> String {
    match outcome {
        UploadOutcome::Uploaded => format!("uploaded {name}"),
        UploadOutcome::SkippedDuplicate => {
            format!("skipped {name}: identical content already uploaded")
        }
        UploadOutcome::FailedFingerprint(reason) => format!("cannot read {name}: {reason}"),
        UploadOutcome::FailedTooLarge => format!("{name} is larger than the transport allows"),
        UploadOutcome::FailedTransient { kind, attempts } => {
            format!("giving up on {name} after {attempts} attempts ({kind})")
        }
        UploadOutcome::FailedPermanent(reason) => format!("failed to upload {name}: {reason}"),
    }
}
