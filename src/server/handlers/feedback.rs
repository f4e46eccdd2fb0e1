use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::feedback::FeedbackEntry;
use crate::state::AppState;

pub async fn save_feedback(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<FeedbackEntry>,
) -> Result<impl IntoResponse, ApiError> {
    let message = state.feedback.save(payload).await?;
    Ok(Json(json!({ "status": "success", "message": message })))
}

pub async fn list_feedback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    let entries = state
        .feedback
        .list(params.get("session_id").map(String::as_str))
        .await?;
    Ok(Json(json!({ "feedback": entries })))
}
