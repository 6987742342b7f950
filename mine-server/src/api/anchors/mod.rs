//! Anchors API 模块（领域记录锚定）

mod handler;

use axum::{Router, routing::post};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/anchors", routes())
}

fn routes() -> Router<ServerState> {
    Router::new().route("/", post(handler::create))
}
