//! Document delivery transport.
//!
//! The upload engine talks to a [`DocumentSink`] only; the concrete
//! Telegram Bot API client lives in [`telegram`] and tests use scripted
//! mocks. Failures are classified into [`TransportError`] kinds so the
//! retry policy can decide per kind.

mod telegram;

pub use telegram::BotClient;

use std::future::Future;
use std::pin::Pin;

/// Classified transport failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Server-mandated cooldown with an explicit wait duration.
    #[error("flood control: retry in {retry_after}s")]
    FloodControl { retry_after: u64 },

    #[error("too many requests")]
    RateLimited,

    #[error("request timed out")]
    Timeout,

    #[error("document exceeds the maximum payload size")]
    PayloadTooLarge,

    #[error("network error: {0}")]
    Network(String),

    #[error("service error: {0}")]
    Service(String),
}

impl TransportError {
    /// True for kinds worth retrying, possibly after a wait.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::FloodControl { .. } | Self::RateLimited | Self::Timeout | Self::Network(_)
        )
    }
}

/// Abstract destination for document delivery.
///
/// Implementations send a complete byte buffer as a named document to a
/// destination identifier. Boxed-future methods keep the trait
/// object-safe so the engine can hold `Arc<dyn DocumentSink>`.
pub trait DocumentSink: Send + Sync {
    /// Sends `data` as a document named `filename` to `destination`.
    fn send_document(
        &self,
        destination: &str,
        filename: &str,
        data: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + '_>>;
}
