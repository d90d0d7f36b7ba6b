use axum::{Json, extract::State, response::IntoResponse};
use tracing::debug;
use validator::Validate;

use crate::{
    api::{app_state::AppState, dto::chat_dto::ChatTurnRequest},
    error::AppError,
};

pub async fn chat_turn(
    State(state): State<AppState>,
    Json(request): Json<ChatTurnRequest>,
) -> Result<impl IntoResponse, AppError> {
    request.validate()?;
    debug!(
        "Chat turn for session: {}",
        request.session_id.as_deref().unwrap_or("<new>")
    );

    let outcome = state
        .orchestrator
        .process_turn(request.session_id.as_deref(), &request.message)
        .await?;

    Ok(Json(outcome))
}
