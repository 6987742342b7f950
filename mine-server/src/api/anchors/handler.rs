//! Anchors API Handlers

use axum::{Json, extract::State};
use serde::Deserialize;

use crate::audit::{AnchorOutcome, RecordType};
use crate::core::ServerState;
use crate::utils::AppResult;

/// 锚定请求体
#[derive(Debug, Deserialize)]
pub struct CreateAnchorRequest {
    pub record_type: RecordType,
    pub record_id: String,
    /// 记录的逻辑内容；服务端计算规范哈希
    pub payload: serde_json::Value,
}

/// POST /api/anchors — 锚定一条领域记录
///
/// 账本瞬时不可达时返回 `queued`：请求已持久化，排空后补录。
pub async fn create(
    State(state): State<ServerState>,
    Json(req): Json<CreateAnchorRequest>,
) -> AppResult<Json<AnchorOutcome>> {
    let outcome = state
        .audit_service
        .anchor_record(req.record_type, &req.record_id, &req.payload)
        .await?;
    Ok(Json(outcome))
}
