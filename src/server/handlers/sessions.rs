use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::core::errors::ApiError;
use crate::history::HistoryMessage;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    pub title: Option<String>,
}

fn format_message(msg: &HistoryMessage) -> Value {
    let role = match msg.message_type.as_str() {
        "ai" => "assistant",
        "system" => "system",
        _ => "user",
    };
    json!({
        "id": msg.id,
        "role": role,
        "content": msg.content,
        "timestamp": msg.created_at
    })
}

pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let sessions = state.history.list_sessions().await?;
    Ok(Json(json!({ "sessions": sessions })))
}

pub async fn create_session(
    State(state): State<Arc<AppState>>,
    payload: Option<Json<CreateSessionRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let title = payload.and_then(|Json(p)| p.title);
    let session_id = state.history.create_session(title).await?;
    let session = state.history.get_session(&session_id).await?;
    Ok(Json(json!({ "session": session })))
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .history
        .get_session(&session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Session not found".to_string()))?;

    let messages = state.history.get_history(&session_id, 100).await?;
    let message_payload: Vec<Value> = messages
        .into_iter()
        .map(|msg| json!({ "type": msg.message_type, "content": msg.content }))
        .collect();

    Ok(Json(json!({ "session": session, "messages": message_payload })))
}

pub async fn get_session_messages(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = params
        .get("limit")
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(100);

    let messages = state.history.get_history(&session_id, limit).await?;
    let formatted: Vec<Value> = messages.iter().map(format_message).collect();
    Ok(Json(json!({ "messages": formatted })))
}

pub async fn get_transcript(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.history.export_transcript(&session_id).await?))
}

pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.history.delete_session(&session_id).await? {
        return Err(ApiError::NotFound("Session not found".to_string()));
    }
    Ok(Json(json!({ "success": true })))
}
