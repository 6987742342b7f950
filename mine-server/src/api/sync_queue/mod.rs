//! Sync Queue API 模块 (离线队列查询、排空、死信恢复)

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/sync-queue", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/", get(handler::list))
        .route("/drain", post(handler::drain))
        .route("/dead-letters", get(handler::dead_letters))
        .route("/dead-letters/recover", post(handler::recover_dead_letters))
}
