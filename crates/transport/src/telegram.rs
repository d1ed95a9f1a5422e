//! Telegram Bot API document sender.
//!
//! Async HTTP client using `reqwest` multipart uploads against the
//! `sendDocument` method. API replies are classified into
//! [`TransportError`] kinds; flood-control replies carry the
//! server-specified wait so callers can obey it exactly.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::debug;

use crate::{DocumentSink, TransportError};

const DEFAULT_BASE_URL: &str = "https://api.telegram.org";

/// Request timeout for one document send.
const SEND_TIMEOUT: Duration = Duration::from_secs(120);

/// Envelope of every Bot API reply.
#[derive(Debug, Deserialize)]
struct ApiReply {
    ok: bool,
    #[serde(default)]
    error_code: Option<u16>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ReplyParameters>,
}

#[derive(Debug, Deserialize)]
struct ReplyParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

/// Telegram Bot API client for document delivery.
pub struct BotClient {
    http: reqwest::Client,
    token: String,
    base_url: String,
}

impl BotClient {
    /// Creates a client authenticated with the given bot token.
    pub fn new(token: &str) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(Self {
            http,
            token: token.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Overrides the API base URL (self-hosted Bot API servers, tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    async fn send(
        &self,
        destination: &str,
        filename: &str,
        data: Vec<u8>,
    ) -> Result<(), TransportError> {
        let url = format!("{}/bot{}/sendDocument", self.base_url, self.token);
        let size = data.len();

        let document = Part::bytes(data).file_name(filename.to_string());
        let form = Form::new()
            .text("chat_id", destination.to_string())
            .part("document", document);

        let response = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(classify_request_error)?;

        let reply: ApiReply = match serde_json::from_str(&body) {
            Ok(reply) => reply,
            // A non-JSON body from a success status still counts as
            // delivered; anything else is classified from the status.
            Err(_) if (200..300).contains(&status) => return Ok(()),
            Err(_) => return Err(classify_reply(status, &body, None)),
        };

        if reply.ok {
            debug!(filename, bytes = size, "document delivered");
            return Ok(());
        }

        let retry_after = reply.parameters.and_then(|p| p.retry_after);
        let code = reply.error_code.unwrap_or(status);
        let description = reply.description.unwrap_or_else(|| body.clone());
        Err(classify_reply(code, &description, retry_after))
    }
}

impl DocumentSink for BotClient {
    fn send_document(
        &self,
        destination: &str,
        filename: &str,
        data: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + '_>> {
        let destination = destination.to_string();
        let filename = filename.to_string();
        Box::pin(async move { self.send(&destination, &filename, data).await })
    }
}

/// Classifies a transport-level `reqwest` failure.
fn classify_request_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(err.to_string())
    }
}

/// Classifies an API-level rejection from its status code, description
/// and optional server-specified wait.
fn classify_reply(code: u16, description: &str, retry_after: Option<u64>) -> TransportError {
    match code {
        429 => match retry_after {
            Some(retry_after) => TransportError::FloodControl { retry_after },
            None => TransportError::RateLimited,
        },
        413 => TransportError::PayloadTooLarge,
        _ if description.contains("too big") || description.contains("Too Large") => {
            TransportError::PayloadTooLarge
        }
        _ => TransportError::Service(format!("{code}: {description}")),
    }
}
