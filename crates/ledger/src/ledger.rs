//! Fingerprint ledger over the shared configuration record.

use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::LedgerError;
use crate::record::UploaderConfig;

/// Persisted set of content fingerprints already delivered, plus gated
/// access to the rest of the record sharing the same backing file.
///
/// Every operation runs a full read-modify-write cycle under one mutex,
/// so two uploads finishing concurrently never lose each other's
/// fingerprint. The record is re-read inside the gate each time rather
/// than cached; the file is the source of truth.
pub struct FingerprintLedger {
    path: PathBuf,
    gate: Mutex<()>,
}

impl FingerprintLedger {
    /// Creates a ledger backed by the record at `path`. The file is not
    /// touched until the first operation.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            gate: Mutex::new(()),
        }
    }

    /// Path of the backing record.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True iff `fingerprint` was recorded by an earlier confirmed
    /// delivery.
    ///
    /// Read failures degrade to `false`: a missed dedup hit costs one
    /// redundant upload, not correctness.
    pub async fn contains(&self, fingerprint: &str) -> bool {
        let _guard = self.gate.lock().await;
        match UploaderConfig::load(&self.path) {
            Ok(config) => config.hash_string.iter().any(|h| h == fingerprint),
            Err(e) => {
                warn!(error = %e, "ledger read failed, treating fingerprint as unknown");
                false
            }
        }
    }

    /// Records `fingerprint`. Idempotent; the record is only rewritten
    /// when the fingerprint is new.
    pub async fn record(&self, fingerprint: &str) -> Result<(), LedgerError> {
        let _guard = self.gate.lock().await;
        let mut config = UploaderConfig::load(&self.path)?;
        if !config.hash_string.iter().any(|h| h == fingerprint) {
            config.hash_string.push(fingerprint.to_string());
            config.save(&self.path)?;
            debug!(fingerprint, "fingerprint recorded");
        }
        Ok(())
    }

    /// Clears every recorded fingerprint. The other settings in the
    /// record are kept.
    pub async fn reset(&self) -> Result<(), LedgerError> {
        let _guard = self.gate.lock().await;
        let mut config = UploaderConfig::load(&self.path)?;
        config.hash_string.clear();
        config.save(&self.path)
    }

    /// Loads the whole record, serialized with every other operation.
    pub async fn load(&self) -> Result<UploaderConfig, LedgerError> {
        let _guard = self.gate.lock().await;
        UploaderConfig::load(&self.path)
    }

    /// Applies `mutate` to the record and persists the result, as one
    /// gated read-modify-write cycle. Returns the updated record.
    pub async fn update<F>(&self, mutate: F) -> Result<UploaderConfig, LedgerError>
    where
        F: FnOnce(&mut UploaderConfig),
    {
        let _guard = self.gate.lock().await;
        let mut config = UploaderConfig::load(&self.path)?;
        mutate(&mut config);
        config.save(&self.path)?;
        Ok(config)
    }
}
