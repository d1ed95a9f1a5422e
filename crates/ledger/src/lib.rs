//! Persisted configuration record and fingerprint ledger.
//!
//! One JSON file backs both the uploader's settings and the set of
//! content fingerprints already delivered. All mutation goes through
//! [`FingerprintLedger`], which serializes read-modify-write cycles so
//! concurrent uploads never lose each other's updates.

mod ledger;
mod record;

pub use ledger::FingerprintLedger;
pub use record::{DEFAULT_THREAD_COUNT, UploaderConfig};

/// Errors from persisting or decoding the backing record.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("record I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("record encoding failure: {0}")]
    Encoding(#[from] serde_json::Error),
}
