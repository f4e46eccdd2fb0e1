use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default, alias = "query")]
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub base_url: String,
    pub question: String,
    #[serde(default)]
    pub max_links: Option<usize>,
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let reply = state.chat.respond(payload.session_id, &payload.message).await?;
    Ok(Json(reply))
}

pub async fn ask(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let max_links = payload
        .max_links
        .unwrap_or(state.settings.crawler.max_links);
    let answer = state
        .website_qa
        .ask(&payload.base_url, &payload.question, max_links)
        .await?;
    Ok(Json(json!({ "answer": answer })))
}
