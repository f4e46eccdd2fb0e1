use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

pub async fn health(State(_state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn get_status(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let chunks = state
        .store
        .count(Some(state.retriever.collection()))
        .await
        .unwrap_or(0);
    let messages = state.history.total_message_count().await.unwrap_or(0);
    Ok(Json(json!({
        "status": "RAG API is running",
        "collection": state.retriever.collection(),
        "chunks": chunks,
        "messages": messages
    })))
}
