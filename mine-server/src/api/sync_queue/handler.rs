//! Sync Queue API Handlers

use axum::{Json, extract::State};
use serde::Serialize;

use crate::core::ServerState;
use crate::sync::{DeadLetterEntry, DrainOutcome, DrainSignal, QueuedRequest};
use crate::utils::AppResult;

/// 待投递队列响应
#[derive(Debug, Serialize)]
pub struct QueueListResponse {
    pub items: Vec<QueuedRequest>,
    pub total: usize,
}

/// GET /api/sync-queue — 待投递请求快照（FIFO 顺序）
pub async fn list(State(state): State<ServerState>) -> AppResult<Json<QueueListResponse>> {
    let items = state.queue.pending()?;
    let total = items.len();
    Ok(Json(QueueListResponse { items, total }))
}

/// POST /api/sync-queue/drain — 手动触发一次排空
///
/// 已有排空在运行时返回 `already_running`，不产生重复投递。
pub async fn drain(State(state): State<ServerState>) -> Json<DrainOutcome> {
    let outcome = state.drain_worker.drain().await;
    Json(outcome)
}

/// 死信列表响应
#[derive(Debug, Serialize)]
pub struct DeadLetterListResponse {
    pub items: Vec<DeadLetterEntry>,
    pub total: usize,
}

/// GET /api/sync-queue/dead-letters — 死信列表（人工排查）
pub async fn dead_letters(
    State(state): State<ServerState>,
) -> AppResult<Json<DeadLetterListResponse>> {
    let items = state.queue.dead_letters()?;
    let total = items.len();
    Ok(Json(DeadLetterListResponse { items, total }))
}

/// 恢复结果
#[derive(Debug, Serialize)]
pub struct RecoverResponse {
    pub recovered: usize,
}

/// POST /api/sync-queue/dead-letters/recover — 死信回收进待投递队列
pub async fn recover_dead_letters(
    State(state): State<ServerState>,
) -> AppResult<Json<RecoverResponse>> {
    let recovered = state.queue.recover_dead_letters()?;
    if recovered > 0 {
        tracing::info!(count = recovered, "Recovered dead letter entries to pending queue");
        state.trigger_drain(DrainSignal::Manual);
    }
    Ok(Json(RecoverResponse { recovered }))
}
