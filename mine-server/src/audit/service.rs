//! 审计锚定服务
//!
//! `AuditService` 是锚定流水线的核心服务，提供：
//! - 同步锚定（哈希 → 账本 → 审计日志）
//! - 异步锚定（通过 mpsc 通道交给后台 worker）
//! - 离线降级：账本瞬时不可达时，请求持久化进离线队列
//! - 排空回调：离线队列投递成功后补写审计日志
//! - 查询与验证（直接读取存储）

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::hasher;
use super::storage::{AuditStorage, AuditStorageError, AuditStorageResult};
use super::types::{AnchorVerification, AuditLogEntry, AuditQuery, RecordType};
use crate::ledger::http::{ANCHOR_REQUEST_KIND, REQUEST_KIND_HEADER};
use crate::ledger::{
    AnchorError, AnchorReceipt, AnchorSubmission, HttpLedgerApi, LedgerAnchorClient,
};
use crate::sync::{DeliveryObserver, DeliveryReceipt, QueueStorage, QueuedRequest};

/// 发送到 AnchorWorker 的锚定请求
pub struct AnchorRequest {
    pub record_type: RecordType,
    pub record_id: String,
    pub payload: serde_json::Value,
}

/// 锚定结果
///
/// `Queued` 不是失败：请求已持久化，排空后由 [`DeliveryObserver`]
/// 回调补写审计日志（at-least-once）。
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnchorOutcome {
    /// 已确认写入账本并记录审计日志
    Anchored(AuditLogEntry),
    /// 账本瞬时不可达，请求已进入离线队列
    Queued { record_id: String, data_hash: String },
}

/// 审计锚定服务
///
/// 领域记录生产者（事故上报、传感器采集、排放计算）只与本服务交互。
pub struct AuditService {
    storage: AuditStorage,
    anchor_client: LedgerAnchorClient,
    queue: QueueStorage,
    ledger_api: Arc<HttpLedgerApi>,
    tx: mpsc::Sender<AnchorRequest>,
}

impl std::fmt::Debug for AuditService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditService").finish_non_exhaustive()
    }
}

impl AuditService {
    /// 创建锚定服务
    ///
    /// 返回的 Receiver 交给 [`super::worker::AnchorWorker`] 消费。
    pub fn new(
        storage: AuditStorage,
        anchor_client: LedgerAnchorClient,
        queue: QueueStorage,
        ledger_api: Arc<HttpLedgerApi>,
        buffer_size: usize,
    ) -> (Arc<Self>, mpsc::Receiver<AnchorRequest>) {
        let (tx, rx) = mpsc::channel(buffer_size);
        let service = Arc::new(Self {
            storage,
            anchor_client,
            queue,
            ledger_api,
            tx,
        });
        (service, rx)
    }

    /// 同步锚定一条领域记录
    ///
    /// 1. 计算 payload 的规范哈希（失败 = 永久错误，直接中止）
    /// 2. 幂等锚定（check-before-send + 重试）
    /// 3. 瞬时失败（断网、重试耗尽）→ 持久化进离线队列
    ///
    /// 永久错误（账本拒绝、哈希格式非法）立即上报，绝不入队。
    pub async fn anchor_record(
        &self,
        record_type: RecordType,
        record_id: &str,
        payload: &serde_json::Value,
    ) -> Result<AnchorOutcome, AnchorError> {
        let data_hash = hasher::canonical_hash(payload)?;

        match self
            .anchor_client
            .anchor(record_type, record_id, &data_hash)
            .await
        {
            Ok(entry) => Ok(AnchorOutcome::Anchored(entry)),
            Err(AnchorError::Ledger(e)) if e.is_transient() => {
                let submission = AnchorSubmission {
                    record_type,
                    record_id: record_id.to_string(),
                    data_hash: data_hash.clone(),
                };
                let new_request = self
                    .ledger_api
                    .queued_submission(&submission)
                    .map_err(AuditStorageError::Serialization)?;
                let queued = self.queue.enqueue(new_request)?;

                tracing::warn!(
                    record_type = %record_type,
                    record_id = %record_id,
                    queue_id = queued.id,
                    "Ledger unreachable, anchor request queued for replay: {e}"
                );

                Ok(AnchorOutcome::Queued {
                    record_id: record_id.to_string(),
                    data_hash,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// 异步提交锚定请求（非阻塞调用方）
    ///
    /// 通过 mpsc 通道发送到后台 worker。
    /// 通道满时阻塞等待 — 锚定请求不允许丢失。
    pub async fn submit(
        &self,
        record_type: RecordType,
        record_id: impl Into<String>,
        payload: serde_json::Value,
    ) {
        let req = AnchorRequest {
            record_type,
            record_id: record_id.into(),
            payload,
        };

        if self.tx.send(req).await.is_err() {
            tracing::error!("Anchor channel closed — anchor request lost!");
        }
    }

    /// 查询审计日志
    pub async fn query(
        &self,
        q: &AuditQuery,
    ) -> AuditStorageResult<(Vec<AuditLogEntry>, u64)> {
        self.storage.query(q).await
    }

    /// 某记录的锚定历史（最旧在前）
    pub async fn history(&self, record_id: &str) -> AuditStorageResult<Vec<AuditLogEntry>> {
        self.storage.find_by_record(record_id).await
    }

    /// 验证当前哈希是否与最近锚定一致
    pub async fn verify(
        &self,
        record_id: &str,
        current_hash: &str,
    ) -> AuditStorageResult<AnchorVerification> {
        self.storage.verify(record_id, current_hash).await
    }

    /// 获取存储引用
    pub fn storage(&self) -> &AuditStorage {
        &self.storage
    }
}

/// 排空回调：离线队列投递成功的锚定请求补写审计日志
///
/// 重复（排空与同步路径竞争，或同内容已锚定）按成功处理。
#[async_trait::async_trait]
impl DeliveryObserver for AuditService {
    async fn delivered(&self, request: &QueuedRequest, receipt: &DeliveryReceipt) {
        if request.headers.get(REQUEST_KIND_HEADER).map(String::as_str)
            != Some(ANCHOR_REQUEST_KIND)
        {
            return;
        }

        let submission: AnchorSubmission = match serde_json::from_slice(&request.body) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(id = request.id, error = %e, "Queued anchor body unreadable");
                return;
            }
        };
        let anchor_receipt: AnchorReceipt = match serde_json::from_slice(&receipt.body) {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(id = request.id, error = %e, "Ledger receipt unreadable");
                return;
            }
        };

        match self
            .storage
            .insert(
                submission.record_type,
                submission.record_id.clone(),
                submission.data_hash,
                anchor_receipt.transaction_id,
            )
            .await
        {
            Ok(entry) => {
                tracing::info!(
                    record_id = %entry.record_id,
                    transaction_id = %entry.ledger_transaction_id,
                    "Queued anchor delivered and recorded"
                );
            }
            Err(AuditStorageError::Duplicate { .. }) => {
                tracing::debug!(
                    record_id = %submission.record_id,
                    "Queued anchor already recorded, skipping"
                );
            }
            Err(e) => {
                tracing::error!(
                    record_id = %submission.record_id,
                    error = %e,
                    "Failed to record queued anchor"
                );
            }
        }
    }
}
