//! 锚定后台 Worker
//!
//! 从 mpsc 通道消费 AnchorRequest，执行锚定流水线。
//! 通道关闭时自动退出。

use std::sync::Arc;

use super::service::{AnchorOutcome, AnchorRequest, AuditService};

/// 锚定后台 Worker
///
/// 消费异步提交的锚定请求；瞬时失败由流水线内部降级进离线队列，
/// 永久失败只记录日志供运维排查。
pub struct AnchorWorker {
    service: Arc<AuditService>,
}

impl AnchorWorker {
    pub fn new(service: Arc<AuditService>) -> Self {
        Self { service }
    }

    /// 运行 worker（阻塞直到通道关闭）
    pub async fn run(self, mut rx: tokio::sync::mpsc::Receiver<AnchorRequest>) {
        tracing::info!("Anchor worker started");

        while let Some(req) = rx.recv().await {
            match self
                .service
                .anchor_record(req.record_type, &req.record_id, &req.payload)
                .await
            {
                Ok(AnchorOutcome::Anchored(entry)) => {
                    tracing::debug!(
                        record_id = %entry.record_id,
                        transaction_id = %entry.ledger_transaction_id,
                        "Anchor recorded"
                    );
                }
                Ok(AnchorOutcome::Queued { record_id, .. }) => {
                    tracing::debug!(record_id = %record_id, "Anchor queued for replay");
                }
                Err(e) => {
                    tracing::error!(
                        record_id = %req.record_id,
                        error = %e,
                        "Anchor failed permanently"
                    );
                }
            }
        }

        tracing::info!("Anchor channel closed, worker stopping");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::storage::AuditStorage;
    use crate::audit::types::RecordType;
    use crate::ledger::{
        AnchorSubmission, HttpLedgerApi, LedgerAnchorClient, LedgerApi, LedgerError,
    };
    use crate::sync::{QueueStorage, RetryPolicy};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use surrealdb::Surreal;
    use surrealdb::engine::local::RocksDb;

    struct OnlineLedger;

    #[async_trait]
    impl LedgerApi for OnlineLedger {
        async fn submit_anchor(
            &self,
            submission: &AnchorSubmission,
        ) -> Result<String, LedgerError> {
            Ok(format!("tx-{}", &submission.data_hash[..8]))
        }
    }

    #[tokio::test]
    async fn test_submitted_requests_are_anchored() {
        let tmp = tempfile::tempdir().unwrap();
        let db = Surreal::new::<RocksDb>(tmp.path().join("audit")).await.unwrap();
        db.use_ns("test").use_db("test").await.unwrap();
        let storage = AuditStorage::new(db);
        let queue = QueueStorage::open(tmp.path().join("queue.redb")).unwrap();
        let ledger_api = Arc::new(
            HttpLedgerApi::new("http://ledger.local".into(), Duration::from_secs(5)).unwrap(),
        );
        let client = LedgerAnchorClient::new(
            Arc::new(OnlineLedger),
            storage.clone(),
            RetryPolicy::new(1, Duration::from_millis(1)),
        );
        let (service, rx) = AuditService::new(storage, client, queue, ledger_api, 16);

        let worker = AnchorWorker::new(service.clone());
        let handle = tokio::spawn(worker.run(rx));

        service
            .submit(
                RecordType::Incident,
                "incident:42",
                json!({"title": "conveyor jam"}),
            )
            .await;

        // Wait for the worker to process the request
        for _ in 0..100 {
            if !service.history("incident:42").await.unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let history = service.history("incident:42").await.unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].ledger_transaction_id.starts_with("tx-"));

        handle.abort();
    }
}
