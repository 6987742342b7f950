//! Ledger anchoring — submit record fingerprints to an external
//! append-only ledger
//!
//! The ledger is treated as an opaque anchor: one write per fingerprint,
//! returning a transaction id. Everything specific to the gateway wire
//! format lives in [`HttpLedgerApi`]; the rest of the pipeline only sees
//! the [`LedgerApi`] trait, so tests substitute mocks and the anchoring
//! backend can be swapped without touching the audit pipeline.

mod client;
pub mod http;

pub use client::{AnchorError, LedgerAnchorClient};
pub use http::{ANCHOR_REQUEST_KIND, HttpLedgerApi, REQUEST_KIND_HEADER};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audit::RecordType;

/// One anchor submission: what gets written to the ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorSubmission {
    pub record_type: RecordType,
    pub record_id: String,
    pub data_hash: String,
}

/// Receipt returned by the ledger gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorReceipt {
    pub transaction_id: String,
}

/// Ledger submission errors
///
/// Only `Network` and `Busy` are transient; `Rejected` means the
/// submission itself is bad and retrying cannot help.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger gateway unreachable: {0}")]
    Network(String),

    #[error("ledger gateway busy (status {status})")]
    Busy { status: u16 },

    #[error("ledger rejected submission (status {status}): {message}")]
    Rejected { status: u16, message: String },
}

impl LedgerError {
    /// Whether a retry with backoff can succeed
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }
}

/// External ledger write interface
///
/// One successful call performs exactly one ledger write and returns the
/// transaction id. Idempotency across calls is the caller's concern
/// ([`LedgerAnchorClient`] checks the audit log store before sending).
#[async_trait]
pub trait LedgerApi: Send + Sync {
    async fn submit_anchor(&self, submission: &AnchorSubmission) -> Result<String, LedgerError>;
}
