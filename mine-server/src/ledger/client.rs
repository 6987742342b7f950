//! LedgerAnchorClient — idempotent anchoring against the ledger

use std::sync::Arc;
use thiserror::Error;

use super::{AnchorSubmission, LedgerApi, LedgerError};
use crate::audit::hasher::{self, HashError};
use crate::audit::storage::{AuditStorage, AuditStorageError};
use crate::audit::types::{AuditLogEntry, RecordType};
use crate::sync::retry::{self, RetryPolicy};

/// Anchoring errors
#[derive(Debug, Error)]
pub enum AnchorError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Storage(#[from] AuditStorageError),

    #[error(transparent)]
    Queue(#[from] crate::sync::QueueStorageError),

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error("data hash is not a well-formed sha-256 digest: {0}")]
    InvalidHash(String),
}

impl From<AnchorError> for shared::error::AppError {
    fn from(err: AnchorError) -> Self {
        use shared::error::{AppError, ErrorCode};
        match err {
            AnchorError::Ledger(LedgerError::Network(msg)) => {
                AppError::with_message(ErrorCode::LedgerUnreachable, msg)
            }
            AnchorError::Ledger(LedgerError::Busy { status }) => {
                AppError::new(ErrorCode::LedgerBusy).with_detail("status", status)
            }
            AnchorError::Ledger(LedgerError::Rejected { status, message }) => {
                AppError::with_message(ErrorCode::LedgerRejected, message)
                    .with_detail("status", status)
            }
            AnchorError::Storage(e) => e.into(),
            AnchorError::Queue(e) => e.into(),
            AnchorError::Hash(e) => {
                AppError::with_message(ErrorCode::RecordEncodingFailed, e.to_string())
            }
            AnchorError::InvalidHash(hash) => {
                AppError::new(ErrorCode::RecordHashInvalid).with_detail("hash", hash)
            }
        }
    }
}

/// Idempotent anchor client
///
/// Wraps a [`LedgerApi`] with:
/// - check-before-send against the audit log store, so retried or
///   duplicated submissions never produce two ledger writes for
///   identical content
/// - transient-failure retry with exponential backoff
/// - audit entry insertion on confirmed success (a concurrent duplicate
///   insert is treated as success)
#[derive(Clone)]
pub struct LedgerAnchorClient {
    api: Arc<dyn LedgerApi>,
    storage: AuditStorage,
    retry: RetryPolicy,
}

impl LedgerAnchorClient {
    pub fn new(api: Arc<dyn LedgerApi>, storage: AuditStorage, retry: RetryPolicy) -> Self {
        Self {
            api,
            storage,
            retry,
        }
    }

    /// Anchor `(record_type, record_id, data_hash)` on the ledger
    ///
    /// Returns the audit entry — the existing one if this content was
    /// already anchored, the freshly inserted one otherwise. The caller
    /// is responsible for `record_id` referencing a real domain record.
    pub async fn anchor(
        &self,
        record_type: RecordType,
        record_id: &str,
        data_hash: &str,
    ) -> Result<AuditLogEntry, AnchorError> {
        if !hasher::is_well_formed_digest(data_hash) {
            return Err(AnchorError::InvalidHash(data_hash.to_string()));
        }

        // Check-before-send: unchanged content is an idempotent no-op
        if let Some(existing) = self.storage.find_entry(record_id, data_hash).await? {
            tracing::debug!(
                record_id = %record_id,
                transaction_id = %existing.ledger_transaction_id,
                "Anchor already exists, skipping ledger write"
            );
            return Ok(existing);
        }

        let submission = AnchorSubmission {
            record_type,
            record_id: record_id.to_string(),
            data_hash: data_hash.to_string(),
        };

        let transaction_id = retry::execute(&self.retry, LedgerError::is_transient, || {
            self.api.submit_anchor(&submission)
        })
        .await?;

        match self
            .storage
            .insert(
                record_type,
                record_id.to_string(),
                data_hash.to_string(),
                transaction_id.clone(),
            )
            .await
        {
            Ok(entry) => {
                tracing::info!(
                    record_type = %record_type,
                    record_id = %record_id,
                    transaction_id = %transaction_id,
                    "Record anchored on ledger"
                );
                Ok(entry)
            }
            // A concurrent anchor of the same content won the race; ours
            // still confirmed on the ledger, so surface the stored entry.
            Err(AuditStorageError::Duplicate { .. }) => {
                let existing = self.storage.find_entry(record_id, data_hash).await?;
                existing.ok_or_else(|| {
                    AnchorError::Storage(AuditStorageError::Database(
                        "duplicate entry vanished during anchor".to_string(),
                    ))
                })
            }
            Err(e) => Err(AnchorError::Storage(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use surrealdb::Surreal;
    use surrealdb::engine::local::RocksDb;

    /// Mock ledger counting writes, scriptable failure prefix
    struct MockLedger {
        writes: AtomicU32,
        fail_first: u32,
        error: fn(u32) -> LedgerError,
    }

    impl MockLedger {
        fn ok() -> Self {
            Self {
                writes: AtomicU32::new(0),
                fail_first: 0,
                error: |_| LedgerError::Network("unused".into()),
            }
        }

        fn failing(fail_first: u32, error: fn(u32) -> LedgerError) -> Self {
            Self {
                writes: AtomicU32::new(0),
                fail_first,
                error,
            }
        }

        fn write_count(&self) -> u32 {
            self.writes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LedgerApi for MockLedger {
        async fn submit_anchor(
            &self,
            submission: &AnchorSubmission,
        ) -> Result<String, LedgerError> {
            let attempt = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.fail_first {
                return Err((self.error)(attempt));
            }
            Ok(format!("tx-{}", &submission.data_hash[..8]))
        }
    }

    async fn test_client(api: Arc<dyn LedgerApi>) -> (LedgerAnchorClient, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let db = Surreal::new::<RocksDb>(tmp.path()).await.unwrap();
        db.use_ns("test").use_db("test").await.unwrap();
        let storage = AuditStorage::new(db);
        let retry = RetryPolicy::new(3, Duration::from_millis(1));
        (LedgerAnchorClient::new(api, storage, retry), tmp)
    }

    fn digest(tag: &str) -> String {
        use sha2::{Digest, Sha256};
        let mut h = Sha256::new();
        h.update(tag.as_bytes());
        format!("{:x}", h.finalize())
    }

    #[tokio::test]
    async fn test_anchor_rejects_malformed_hash() {
        let ledger = Arc::new(MockLedger::ok());
        let (client, _tmp) = test_client(ledger.clone()).await;

        let err = client
            .anchor(RecordType::Incident, "incident:1", "not-a-digest")
            .await
            .unwrap_err();
        assert!(matches!(err, AnchorError::InvalidHash(_)));
        assert_eq!(ledger.write_count(), 0);
    }

    #[tokio::test]
    async fn test_anchor_is_idempotent() {
        let ledger = Arc::new(MockLedger::ok());
        let (client, _tmp) = test_client(ledger.clone()).await;
        let hash = digest("payload-v1");

        let first = client
            .anchor(RecordType::Incident, "incident:1", &hash)
            .await
            .unwrap();
        let second = client
            .anchor(RecordType::Incident, "incident:1", &hash)
            .await
            .unwrap();

        // Exactly one ledger write, one audit entry
        assert_eq!(ledger.write_count(), 1);
        assert_eq!(
            first.ledger_transaction_id,
            second.ledger_transaction_id
        );
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let ledger = Arc::new(MockLedger::failing(2, |_| LedgerError::Busy {
            status: 503,
        }));
        let (client, _tmp) = test_client(ledger.clone()).await;
        let hash = digest("payload-v1");

        let entry = client
            .anchor(RecordType::SensorReading, "reading:1", &hash)
            .await
            .unwrap();
        assert_eq!(ledger.write_count(), 3);
        assert!(entry.ledger_transaction_id.starts_with("tx-"));
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let ledger = Arc::new(MockLedger::failing(u32::MAX, |_| LedgerError::Rejected {
            status: 400,
            message: "bad submission".into(),
        }));
        let (client, _tmp) = test_client(ledger.clone()).await;
        let hash = digest("payload-v1");

        let err = client
            .anchor(RecordType::EmissionData, "emission:1", &hash)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AnchorError::Ledger(LedgerError::Rejected { .. })
        ));
        // A permanent rejection aborts after the first attempt
        assert_eq!(ledger.write_count(), 1);
    }

    #[tokio::test]
    async fn test_changed_content_creates_new_entry() {
        let ledger = Arc::new(MockLedger::ok());
        let (client, _tmp) = test_client(ledger.clone()).await;

        client
            .anchor(RecordType::Incident, "incident:1", &digest("v1"))
            .await
            .unwrap();
        client
            .anchor(RecordType::Incident, "incident:1", &digest("v2"))
            .await
            .unwrap();

        assert_eq!(ledger.write_count(), 2);
    }
}
