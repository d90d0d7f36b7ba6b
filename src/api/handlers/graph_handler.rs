use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use tracing::debug;

use crate::{api::app_state::AppState, error::AppError};

pub async fn get_session_graph(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    debug!("Getting graph for session: {}", session_id);
    let view = state.orchestrator.graph_view(&session_id).await?;
    Ok(Json(view))
}

pub async fn get_node(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    debug!("Getting node: {}", node_id);
    let detail = state.orchestrator.node_detail(&node_id).await?;
    Ok(Json(detail))
}
