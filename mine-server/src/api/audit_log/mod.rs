//! Audit Log API 模块 (审计日志查询、验证)

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/audit-log", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/", get(handler::list))
        .route("/{record_id}", get(handler::history))
        .route("/{record_id}/verify", post(handler::verify))
}
