//! Nugget Routes
//!
//! 定义 nugget 管理的 API 路由。

use crate::api::handlers::nugget_handler::*;
use axum::{
    Router,
    routing::{get, post},
};

use crate::api::app_state::AppState;

/// 创建 nugget 路由器
pub fn create_nugget_router() -> Router<AppState> {
    Router::new()
        .route("/sessions/:session_id/nuggets", get(list_nuggets))
        .route("/nuggets/:nugget_id/feedback", post(submit_feedback))
        .route("/nuggets/:nugget_id/status", post(update_status))
}
