use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};

use crate::core::errors::ApiError;
use crate::state::AppState;

pub async fn get_config(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let config = state.config.load_config()?;
    Ok(Json(state.config.redact_sensitive_values(&config)))
}

pub async fn update_config(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    state.config.update_config(payload, false)?;
    Ok(Json(json!({ "status": "success", "restart_required": true })))
}

pub async fn patch_config(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    state.config.update_config(payload, true)?;
    Ok(Json(json!({ "status": "success", "restart_required": true })))
}
