//! Audit Log API Handlers

use axum::{
    Json,
    extract::{Path, Query, State},
};

use crate::audit::{
    AnchorVerification, AuditListResponse, AuditLogEntry, AuditQuery, is_well_formed_digest,
};
use crate::core::ServerState;
use crate::utils::{AppError, AppResult, ErrorCode};

/// GET /api/audit-log — 查询审计日志
pub async fn list(
    State(state): State<ServerState>,
    Query(query): Query<AuditQuery>,
) -> AppResult<Json<AuditListResponse>> {
    let (items, total) = state.audit_service.query(&query).await?;
    Ok(Json(AuditListResponse { items, total }))
}

/// GET /api/audit-log/{record_id} — 某记录的锚定历史（最旧在前）
pub async fn history(
    State(state): State<ServerState>,
    Path(record_id): Path<String>,
) -> AppResult<Json<Vec<AuditLogEntry>>> {
    let entries = state.audit_service.history(&record_id).await?;
    Ok(Json(entries))
}

/// 验证请求体
#[derive(Debug, serde::Deserialize)]
pub struct VerifyRequest {
    pub current_hash: String,
}

/// POST /api/audit-log/{record_id}/verify — 与最近锚定的哈希比对
pub async fn verify(
    State(state): State<ServerState>,
    Path(record_id): Path<String>,
    Json(req): Json<VerifyRequest>,
) -> AppResult<Json<AnchorVerification>> {
    if !is_well_formed_digest(&req.current_hash) {
        return Err(
            AppError::new(ErrorCode::RecordHashInvalid).with_detail("hash", req.current_hash)
        );
    }

    let verification = state
        .audit_service
        .verify(&record_id, &req.current_hash)
        .await?;
    Ok(Json(verification))
}
