//! Replay transport — delivers queued requests over HTTP
//!
//! The drain worker only sees the [`ReplayTransport`] trait, so tests
//! substitute scripted transports and the wire protocol stays in one
//! place.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

use super::storage::QueuedRequest;

/// Delivery errors, classified for the retry executor
///
/// `Network` and `Busy` are transient (retried, request stays queued);
/// `Rejected` is permanent (request is dead-lettered).
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("network error: {0}")]
    Network(String),

    #[error("server busy (status {status})")]
    Busy { status: u16 },

    #[error("request rejected (status {status}): {message}")]
    Rejected { status: u16, message: String },
}

impl DeliveryError {
    /// Whether a retry with backoff can succeed
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }
}

/// Confirmation of a delivered request
#[derive(Debug, Clone)]
pub struct DeliveryReceipt {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Transport replaying a queued request against its original target
#[async_trait]
pub trait ReplayTransport: Send + Sync {
    async fn deliver(&self, request: &QueuedRequest) -> Result<DeliveryReceipt, DeliveryError>;
}

/// HTTP replay transport backed by reqwest
pub struct HttpReplayTransport {
    client: Client,
}

impl HttpReplayTransport {
    /// Build a transport with a bounded per-request timeout
    pub fn new(timeout: Duration) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::Network(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ReplayTransport for HttpReplayTransport {
    async fn deliver(&self, request: &QueuedRequest) -> Result<DeliveryReceipt, DeliveryError> {
        // An unparseable method can never be delivered — permanent
        let method = reqwest::Method::from_bytes(request.method.as_bytes()).map_err(|_| {
            DeliveryError::Rejected {
                status: 0,
                message: format!("invalid HTTP method: {}", request.method),
            }
        })?;

        let mut builder = self
            .client
            .request(method, &request.url)
            .body(request.body.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| DeliveryError::Network(e.to_string()))?;

        let status = response.status();
        let code = status.as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| DeliveryError::Network(e.to_string()))?
            .to_vec();

        if status.is_success() {
            return Ok(DeliveryReceipt { status: code, body });
        }

        if code == 429 || status.is_server_error() {
            return Err(DeliveryError::Busy { status: code });
        }

        Err(DeliveryError::Rejected {
            status: code,
            message: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}
