//! Shared engine types: outcomes, events and the retry/size policy.

use std::fmt;
use std::time::Duration;

/// Transient failure classes that consume the retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientKind {
    RateLimited,
    Timeout,
    Network,
}

impl fmt::Display for TransientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited => write!(f, "rate limited"),
            Self::Timeout => write!(f, "timeout"),
            Self::Network => write!(f, "network error"),
        }
    }
}

/// Terminal result of one file's upload task. Produced once, consumed
/// by the scheduler, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Transferred and recorded in the ledger.
    Uploaded,
    /// Identical content was delivered earlier; the transport was never
    /// invoked.
    SkippedDuplicate,
    /// The file could not be read or hashed. Not retried: the file is
    /// unavailable, not the network.
    FailedFingerprint(String),
    /// The file exceeds the transport's maximum payload size.
    FailedTooLarge,
    /// Retry budget exhausted on a transient failure.
    FailedTransient {
        kind: TransientKind,
        attempts: u32,
    },
    /// Non-retryable remote failure.
    FailedPermanent(String),
}

impl UploadOutcome {
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::Uploaded | Self::SkippedDuplicate)
    }
}

/// Events emitted by a run toward the observer (CLI or GUI shell).
#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// Completed-file percentage, 0..=100, monotonically increasing
    /// over a total frozen at enumeration time.
    Progress { percent: u8 },
    /// One human-readable line per notable occurrence.
    Log(String),
    /// Terminal signal; emitted exactly once per run.
    Completed,
}

/// Retry and size policy applied to every upload task.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    /// Attempt budget shared by the budget-capped transient kinds.
    /// Server-mandated flood-control waits are always obeyed and never
    /// counted against it.
    pub max_attempts: u32,
    /// Backoff after a generic rate-limit reply.
    pub rate_limit_backoff: Duration,
    /// Backoff after a timeout.
    pub timeout_backoff: Duration,
    /// Backoff after a generic network failure.
    pub network_backoff: Duration,
    /// Maximum payload the transport accepts; checked before any
    /// network call.
    pub max_payload_bytes: u64,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            rate_limit_backoff: Duration::from_secs(5),
            timeout_backoff: Duration::from_secs(5),
            network_backoff: Duration::from_secs(2),
            max_payload_bytes: 4 * 1024 * 1024 * 1024,
        }
    }
}
