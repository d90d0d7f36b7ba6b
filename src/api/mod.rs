//! API 模块
//!
//! 提供 REST API 支持。

#[cfg(test)]
mod api_tests;
pub mod app_state;
pub mod dto;
pub mod handlers;
pub mod routes;

use crate::api::app_state::AppState;
use crate::error::AppError;
use crate::observability::{ObservabilityState, create_observability_router};
use axum::Router;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub fn create_router(app_state: AppState) -> Router {
    let observability = Arc::new(ObservabilityState::new(
        app_state.metrics.clone(),
        app_state.version.clone(),
    ));

    let api = Router::new()
        .merge(routes::chat_routes::create_chat_router())
        .merge(routes::graph_routes::create_graph_router())
        .merge(routes::nugget_routes::create_nugget_router());

    Router::new()
        .nest("/api/v1", api)
        .with_state(app_state)
        .merge(create_observability_router(observability))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

pub async fn initialize_api(app_state: AppState) -> Result<Router, AppError> {
    tracing::info!("Initializing API router...");
    Ok(create_router(app_state))
}
