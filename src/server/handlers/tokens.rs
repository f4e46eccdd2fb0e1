use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::llm::ChatMessage;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CountRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub messages: Option<Vec<ChatMessage>>,
}

pub async fn count_tokens(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CountRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let counter = &state.token_counter;
    let count = match (&payload.text, &payload.messages) {
        (Some(text), _) => counter.count(text),
        (None, Some(messages)) => counter.count_messages(messages),
        (None, None) => {
            return Err(ApiError::BadRequest(
                "Provide either text or messages".to_string(),
            ))
        }
    };
    Ok(Json(json!({ "count": count, "counter": counter.name() })))
}
