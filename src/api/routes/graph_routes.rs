//! Graph Routes
//!
//! 定义知识图查询的 API 路由。

use crate::api::handlers::graph_handler::*;
use axum::{Router, routing::get};

use crate::api::app_state::AppState;

/// 创建图路由器
pub fn create_graph_router() -> Router<AppState> {
    Router::new()
        .route("/sessions/:session_id/graph", get(get_session_graph))
        .route("/nodes/:node_id", get(get_node))
}
