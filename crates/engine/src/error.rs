//! Engine error types.

/// Errors that abort a run before any file is processed. Per-file
/// failures never surface here; they become [`UploadOutcome`] values.
///
/// [`UploadOutcome`]: crate::UploadOutcome
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("directory scan failed: {0}")]
    Scan(#[from] std::io::Error),
}
