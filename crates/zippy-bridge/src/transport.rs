//! [`Transport`] – the HTTP seam shared by every request the bridge issues.
//!
//! Pings, prompt submissions and model listings all go through one
//! [`Transport`] instance owned by the bridge for its whole lifetime.
//! [`HttpTransport`] is the production implementation on top of a single
//! [`reqwest::Client`]; tests plug in fakes that simulate refusals, delays
//! or arbitrary status codes.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use zippy_types::ZippyError;

// ─────────────────────────────────────────────────────────────────────────────
// Reply / failure
// ─────────────────────────────────────────────────────────────────────────────

/// Any network-level fault that prevented a reply from being obtained:
/// DNS errors, refused connections, timeouts, truncated bodies.
///
/// A reply that carries an error status (404, 500, …) is *not* a transport
/// failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportFailure {
    pub message: String,
}

impl TransportFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for TransportFailure {
    fn from(e: reqwest::Error) -> Self {
        Self::new(e.to_string())
    }
}

impl From<TransportFailure> for ZippyError {
    fn from(f: TransportFailure) -> Self {
        ZippyError::Transport(f.message)
    }
}

/// A completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportReply {
    pub status: u16,
    pub body: String,
}

impl TransportReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Request/response transport used by the bridge.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue `GET url` and return the reply, whatever its status.
    async fn get(&self, url: &str) -> Result<TransportReply, TransportFailure>;

    /// Issue `POST url` with `body` as a JSON payload.
    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<TransportReply, TransportFailure>;
}

// ─────────────────────────────────────────────────────────────────────────────
// HttpTransport
// ─────────────────────────────────────────────────────────────────────────────

/// [`Transport`] backed by one shared [`reqwest::Client`].
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport whose requests are abandoned after
    /// `request_timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ZippyError::Config`] when the TLS backend or client cannot
    /// be initialised.
    pub fn new(request_timeout: Duration) -> Result<Self, ZippyError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ZippyError::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    async fn into_reply(response: reqwest::Response) -> Result<TransportReply, TransportFailure> {
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(TransportReply { status, body })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<TransportReply, TransportFailure> {
        let response = self.client.get(url).send().await?;
        Self::into_reply(response).await
    }

    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<TransportReply, TransportFailure> {
        let response = self.client.post(url).json(body).send().await?;
        Self::into_reply(response).await
    }
}
