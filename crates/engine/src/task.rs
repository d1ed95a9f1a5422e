//! Per-file upload state machine.
//!
//! Fingerprint → dedup check → size guard → transfer, with classified
//! retry/backoff. Every failure maps to an [`UploadOutcome`] so one
//! file can never abort a batch; the only side effect is the ledger
//! write after a confirmed transfer.

use std::time::Duration;

use teledrop_ledger::FingerprintLedger;
use teledrop_transport::{DocumentSink, TransportError};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::fingerprint::fingerprint_file;
use crate::scanner::FileHandle;
use crate::types::{TransientKind, UploadOutcome, UploadPolicy};

/// Uploads one file to `destination`, returning its terminal outcome.
///
/// Returns `None` without side effects when `cancel` is observed at the
/// pre-transfer checkpoint; a transfer already submitted is never
/// preempted.
pub async fn upload_file(
    file: &FileHandle,
    destination: &str,
    sink: &dyn DocumentSink,
    ledger: &FingerprintLedger,
    policy: &UploadPolicy,
    cancel: &CancellationToken,
) -> Option<UploadOutcome> {
    let filename = file.name();

    // Hashing is chunked blocking I/O; keep it off the event loop.
    let fingerprint = {
        let path = file.path.clone();
        match tokio::task::spawn_blocking(move || fingerprint_file(&path)).await {
            Ok(Ok(fp)) => fp,
            Ok(Err(e)) => return Some(UploadOutcome::FailedFingerprint(e.to_string())),
            Err(e) => {
                return Some(UploadOutcome::FailedFingerprint(format!(
                    "hash task failed: {e}"
                )));
            }
        }
    };

    if ledger.contains(&fingerprint).await {
        debug!(file = %filename, "duplicate content, skipping");
        return Some(UploadOutcome::SkippedDuplicate);
    }

    if file.size > policy.max_payload_bytes {
        return Some(UploadOutcome::FailedTooLarge);
    }

    if cancel.is_cancelled() {
        return None;
    }

    // Whole-file buffer, bounded by the size guard above.
    let data = match tokio::fs::read(&file.path).await {
        Ok(data) => data,
        Err(e) => return Some(UploadOutcome::FailedFingerprint(e.to_string())),
    };

    let mut attempt: u32 = 1;
    loop {
        let err = match sink.send_document(destination, &filename, data.clone()).await {
            Ok(()) => {
                if let Err(e) = ledger.record(&fingerprint).await {
                    // The transfer is confirmed, so the run keeps going;
                    // the content may upload again in a future run.
                    warn!(file = %filename, error = %e, "fingerprint not persisted after upload");
                }
                return Some(UploadOutcome::Uploaded);
            }
            Err(err) => err,
        };

        let (kind, backoff) = match err {
            TransportError::FloodControl { retry_after } => {
                // Server-mandated cooldown: obeyed exactly, never
                // counted against the attempt budget.
                debug!(file = %filename, retry_after, "flood control, waiting");
                sleep(Duration::from_secs(retry_after)).await;
                continue;
            }
            TransportError::PayloadTooLarge => return Some(UploadOutcome::FailedTooLarge),
            TransportError::Service(reason) => {
                return Some(UploadOutcome::FailedPermanent(reason));
            }
            TransportError::RateLimited => (TransientKind::RateLimited, policy.rate_limit_backoff),
            TransportError::Timeout => (TransientKind::Timeout, policy.timeout_backoff),
            TransportError::Network(_) => (TransientKind::Network, policy.network_backoff),
        };

        if attempt >= policy.max_attempts {
            return Some(UploadOutcome::FailedTransient {
                kind,
                attempts: attempt,
            });
        }
        debug!(
            file = %filename,
            attempt,
            kind = %kind,
            backoff_secs = backoff.as_secs(),
            "transient failure, backing off"
        );
        attempt += 1;
        sleep(backoff).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tokio::time::Instant;

    /// Scripted sink: pops one canned reply per call, succeeding once
    /// the script is exhausted. Records every submitted filename.
    struct MockSink {
        replies: Mutex<Vec<Result<(), TransportError>>>,
        sent: Mutex<Vec<String>>,
    }

    impl MockSink {
        fn new(replies: Vec<Result<(), TransportError>>) -> Self {
            Self {
                replies: Mutex::new(replies),
                sent: Mutex::new(Vec::new()),
            }
        }

        fn always_ok() -> Self {
            Self::new(Vec::new())
        }

        fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    impl DocumentSink for MockSink {
        fn send_document(
            &self,
            _destination: &str,
            filename: &str,
            _data: Vec<u8>,
        ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + '_>> {
            self.sent.lock().unwrap().push(filename.to_string());
            let reply = {
                let mut replies = self.replies.lock().unwrap();
                if replies.is_empty() {
                    Ok(())
                } else {
                    replies.remove(0)
                }
            };
            Box::pin(async move { reply })
        }
    }

    fn fixture(dir: &TempDir, name: &str, data: &[u8]) -> FileHandle {
        let path = dir.path().join(name);
        std::fs::write(&path, data).unwrap();
        FileHandle {
            path,
            size: data.len() as u64,
        }
    }

    fn ledger_in(dir: &TempDir) -> FingerprintLedger {
        FingerprintLedger::new(dir.path().join("config.json"))
    }

    async fn run_task(
        file: &FileHandle,
        sink: &MockSink,
        ledger: &FingerprintLedger,
        policy: &UploadPolicy,
    ) -> Option<UploadOutcome> {
        let cancel = CancellationToken::new();
        upload_file(file, "dest", sink, ledger, policy, &cancel).await
    }

    #[tokio::test]
    async fn success_records_fingerprint() {
        let dir = TempDir::new().unwrap();
        let file = fixture(&dir, "a.bin", b"CONTENT");
        let sink = MockSink::always_ok();
        let ledger = ledger_in(&dir);

        let outcome = run_task(&file, &sink, &ledger, &UploadPolicy::default()).await;
        assert_eq!(outcome, Some(UploadOutcome::Uploaded));
        assert_eq!(sink.sent_count(), 1);
        assert!(ledger.contains(&crate::fingerprint_bytes(b"CONTENT")).await);
    }

    #[tokio::test]
    async fn duplicate_skips_without_transport() {
        let dir = TempDir::new().unwrap();
        let file = fixture(&dir, "a.bin", b"CONTENT");
        let sink = MockSink::always_ok();
        let ledger = ledger_in(&dir);
        ledger
            .record(&crate::fingerprint_bytes(b"CONTENT"))
            .await
            .unwrap();

        let outcome = run_task(&file, &sink, &ledger, &UploadPolicy::default()).await;
        assert_eq!(outcome, Some(UploadOutcome::SkippedDuplicate));
        assert_eq!(sink.sent_count(), 0);
    }

    #[tokio::test]
    async fn oversized_file_never_reaches_transport() {
        let dir = TempDir::new().unwrap();
        let file = fixture(&dir, "big.bin", b"0123456789");
        let sink = MockSink::always_ok();
        let ledger = ledger_in(&dir);
        let policy = UploadPolicy {
            max_payload_bytes: 4,
            ..UploadPolicy::default()
        };

        let outcome = run_task(&file, &sink, &ledger, &policy).await;
        assert_eq!(outcome, Some(UploadOutcome::FailedTooLarge));
        assert_eq!(sink.sent_count(), 0);
    }

    #[tokio::test]
    async fn missing_file_fails_fingerprint() {
        let dir = TempDir::new().unwrap();
        let file = FileHandle {
            path: dir.path().join("absent.bin"),
            size: 1,
        };
        let sink = MockSink::always_ok();
        let ledger = ledger_in(&dir);

        let outcome = run_task(&file, &sink, &ledger, &UploadPolicy::default()).await;
        assert!(matches!(
            outcome,
            Some(UploadOutcome::FailedFingerprint(_))
        ));
        assert_eq!(sink.sent_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_twice_then_success() {
        let dir = TempDir::new().unwrap();
        let file = fixture(&dir, "a.bin", b"CONTENT");
        let sink = MockSink::new(vec![
            Err(TransportError::Timeout),
            Err(TransportError::Timeout),
        ]);
        let ledger = ledger_in(&dir);
        let policy = UploadPolicy::default();

        let started = Instant::now();
        let outcome = run_task(&file, &sink, &ledger, &policy).await;

        assert_eq!(outcome, Some(UploadOutcome::Uploaded));
        assert_eq!(sink.sent_count(), 3);
        assert!(started.elapsed() >= 2 * policy.timeout_backoff);
        assert!(ledger.contains(&crate::fingerprint_bytes(b"CONTENT")).await);
    }

    #[tokio::test(start_paused = true)]
    async fn budget_exhaustion_reports_attempts() {
        let dir = TempDir::new().unwrap();
        let file = fixture(&dir, "a.bin", b"CONTENT");
        let sink = MockSink::new(vec![
            Err(TransportError::Timeout),
            Err(TransportError::Timeout),
            Err(TransportError::Timeout),
        ]);
        let ledger = ledger_in(&dir);

        let outcome = run_task(&file, &sink, &ledger, &UploadPolicy::default()).await;
        assert_eq!(
            outcome,
            Some(UploadOutcome::FailedTransient {
                kind: TransientKind::Timeout,
                attempts: 3
            })
        );
        assert_eq!(sink.sent_count(), 3);
        assert!(!ledger.contains(&crate::fingerprint_bytes(b"CONTENT")).await);
    }

    #[tokio::test(start_paused = true)]
    async fn flood_control_waits_at_least_the_mandated_duration() {
        let dir = TempDir::new().unwrap();
        let file = fixture(&dir, "a.bin", b"CONTENT");
        let sink = MockSink::new(vec![Err(TransportError::FloodControl { retry_after: 35 })]);
        let ledger = ledger_in(&dir);

        let started = Instant::now();
        let outcome = run_task(&file, &sink, &ledger, &UploadPolicy::default()).await;

        assert_eq!(outcome, Some(UploadOutcome::Uploaded));
        assert!(started.elapsed() >= Duration::from_secs(35));
    }

    #[tokio::test(start_paused = true)]
    async fn flood_control_does_not_consume_the_budget() {
        let dir = TempDir::new().unwrap();
        let file = fixture(&dir, "a.bin", b"CONTENT");
        // More flood-control replies than the attempt budget allows for
        // budget-capped kinds; the upload must still succeed.
        let sink = MockSink::new(vec![
            Err(TransportError::FloodControl { retry_after: 1 }),
            Err(TransportError::FloodControl { retry_after: 1 }),
            Err(TransportError::FloodControl { retry_after: 1 }),
            Err(TransportError::FloodControl { retry_after: 1 }),
        ]);
        let ledger = ledger_in(&dir);

        let outcome = run_task(&file, &sink, &ledger, &UploadPolicy::default()).await;
        assert_eq!(outcome, Some(UploadOutcome::Uploaded));
        assert_eq!(sink.sent_count(), 5);
    }

    #[tokio::test]
    async fn service_error_is_permanent() {
        let dir = TempDir::new().unwrap();
        let file = fixture(&dir, "a.bin", b"CONTENT");
        let sink = MockSink::new(vec![Err(TransportError::Service("401: Unauthorized".into()))]);
        let ledger = ledger_in(&dir);

        let outcome = run_task(&file, &sink, &ledger, &UploadPolicy::default()).await;
        assert_eq!(
            outcome,
            Some(UploadOutcome::FailedPermanent("401: Unauthorized".into()))
        );
        assert_eq!(sink.sent_count(), 1);
    }

    #[tokio::test]
    async fn payload_rejection_is_not_retried() {
        let dir = TempDir::new().unwrap();
        let file = fixture(&dir, "a.bin", b"CONTENT");
        let sink = MockSink::new(vec![Err(TransportError::PayloadTooLarge)]);
        let ledger = ledger_in(&dir);

        let outcome = run_task(&file, &sink, &ledger, &UploadPolicy::default()).await;
        assert_eq!(outcome, Some(UploadOutcome::FailedTooLarge));
        assert_eq!(sink.sent_count(), 1);
    }

    #[tokio::test]
    async fn cancellation_before_transfer_short_circuits() {
        let dir = TempDir::new().unwrap();
        let file = fixture(&dir, "a.bin", b"CONTENT");
        let sink = MockSink::always_ok();
        let ledger = ledger_in(&dir);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = upload_file(
            &file,
            "dest",
            &sink,
            &ledger,
            &UploadPolicy::default(),
            &cancel,
        )
        .await;
        assert_eq!(outcome, None);
        assert_eq!(sink.sent_count(), 0);
        assert!(!ledger.contains(&crate::fingerprint_bytes(b"CONTENT")).await);
    }

    #[tokio::test]
    async fn unwritable_ledger_still_reports_uploaded() {
        let dir = TempDir::new().unwrap();
        let file = fixture(&dir, "a.bin", b"CONTENT");
        let sink = MockSink::always_ok();
        // The record path is a directory: every write fails.
        let ledger = FingerprintLedger::new(dir.path());

        let outcome = run_task(&file, &sink, &ledger, &UploadPolicy::default()).await;
        assert_eq!(outcome, Some(UploadOutcome::Uploaded));
        assert_eq!(sink.sent_count(), 1);
    }
}
