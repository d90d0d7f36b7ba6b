use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use tracing::debug;

use crate::{
    api::{app_state::AppState, dto::nugget_dto::*},
    error::AppError,
};

pub async fn list_nuggets(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(params): Query<ListNuggetsParams>,
) -> Result<impl IntoResponse, AppError> {
    debug!("Listing nuggets for session: {}", session_id);

    let nuggets = state
        .nugget_service
        .list(&session_id, params.into())
        .await?;

    let items: Vec<NuggetListItem> = nuggets.into_iter().map(NuggetListItem::from).collect();
    let total = items.len();
    Ok(Json(NuggetListResponse {
        nuggets: items,
        total,
    }))
}

pub async fn submit_feedback(
    State(state): State<AppState>,
    Path(nugget_id): Path<String>,
    Json(request): Json<NuggetFeedbackRequest>,
) -> Result<impl IntoResponse, AppError> {
    debug!("Feedback {:?} for nugget: {}", request.feedback, nugget_id);
    let receipt = state
        .nugget_service
        .set_feedback(&nugget_id, request.feedback)
        .await?;
    Ok(Json(receipt))
}

pub async fn update_status(
    State(state): State<AppState>,
    Path(nugget_id): Path<String>,
    Json(request): Json<NuggetStatusRequest>,
) -> Result<impl IntoResponse, AppError> {
    debug!("Status {:?} for nugget: {}", request.status, nugget_id);
    let receipt = state
        .nugget_service
        .set_status(&nugget_id, request.status)
        .await?;
    Ok(Json(receipt))
}
