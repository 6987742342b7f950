//! HttpLedgerApi — HTTP client for the ledger gateway

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::{AnchorReceipt, AnchorSubmission, LedgerApi, LedgerError};
use crate::sync::NewQueuedRequest;

/// Header marking a replayable request as a ledger anchor submission,
/// so the drain observer knows to record the audit entry on delivery.
pub const REQUEST_KIND_HEADER: &str = "x-request-kind";
/// Header value for anchor submissions
pub const ANCHOR_REQUEST_KIND: &str = "ledger-anchor";

/// HTTP client for the ledger gateway anchor API
pub struct HttpLedgerApi {
    client: Client,
    gateway_url: String,
}

impl HttpLedgerApi {
    /// Create a new client against `gateway_url` (base URL, e.g.
    /// "https://ledger.example.com") with a bounded request timeout.
    pub fn new(gateway_url: String, timeout: Duration) -> Result<Self, LedgerError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::Network(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            gateway_url,
        })
    }

    /// Full URL of the anchor endpoint
    pub fn anchor_url(&self) -> String {
        format!("{}/api/ledger/anchors", self.gateway_url)
    }

    /// Build a durable queue entry equivalent to [`LedgerApi::submit_anchor`]
    ///
    /// Used when the synchronous attempt fails and the submission must
    /// survive a restart in the offline queue.
    pub fn queued_submission(
        &self,
        submission: &AnchorSubmission,
    ) -> Result<NewQueuedRequest, serde_json::Error> {
        let body = serde_json::to_vec(submission)?;
        let mut headers = std::collections::HashMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        headers.insert(
            REQUEST_KIND_HEADER.to_string(),
            ANCHOR_REQUEST_KIND.to_string(),
        );

        Ok(NewQueuedRequest {
            url: self.anchor_url(),
            method: "POST".to_string(),
            headers,
            body,
        })
    }
}

#[async_trait]
impl LedgerApi for HttpLedgerApi {
    async fn submit_anchor(&self, submission: &AnchorSubmission) -> Result<String, LedgerError> {
        let response = self
            .client
            .post(self.anchor_url())
            .header(REQUEST_KIND_HEADER, ANCHOR_REQUEST_KIND)
            .json(submission)
            .send()
            .await
            .map_err(|e| LedgerError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let receipt: AnchorReceipt = response
                .json()
                .await
                .map_err(|e| LedgerError::Network(format!("Failed to parse receipt: {e}")))?;
            return Ok(receipt.transaction_id);
        }

        let code = status.as_u16();
        if code == 429 || status.is_server_error() {
            return Err(LedgerError::Busy { status: code });
        }

        let body = response.text().await.unwrap_or_default();
        Err(LedgerError::Rejected {
            status: code,
            message: body,
        })
    }
}
