//! Concurrent deduplicating upload engine.
//!
//! Scans a directory tree, fingerprints each file, skips content that
//! was already delivered, and uploads the rest through a bounded
//! concurrency gate with classified retry/backoff. The caller sees
//! discrete progress/log events and a terminal completion signal; every
//! per-file failure is contained to that file.

mod error;
mod fingerprint;
mod scanner;
mod scheduler;
mod task;
mod types;

pub use error::EngineError;
pub use fingerprint::{fingerprint_bytes, fingerprint_file};
pub use scanner::{FileHandle, scan_files};
pub use scheduler::{BatchScheduler, MAX_CONCURRENCY, RunConfig, RunSummary};
pub use task::upload_file;
pub use types::{TransientKind, UploadEvent, UploadOutcome, UploadPolicy};
