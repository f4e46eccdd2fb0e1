use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::llm::DialAdmin;
use crate::state::AppState;

fn admin(state: &AppState) -> Result<&DialAdmin, ApiError> {
    state.dial_admin.as_ref().ok_or_else(|| {
        ApiError::ServiceUnavailable(format!(
            "Model listing needs the dial provider (current: {})",
            state.settings.llm.provider
        ))
    })
}

/// `?kind=embedding` narrows to embedding models; `?limits=true` adds the
/// per-deployment token quotas.
pub async fn list_models(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    let admin = admin(&state)?;
    let models = match params.get("kind").map(String::as_str) {
        Some("embedding") => admin.embedding_models().await?,
        _ => admin.list_models().await?,
    };
    let mut body = json!({ "models": models });
    if params.get("limits").map(|v| v == "true").unwrap_or(false) {
        body["limits"] = json!(admin.all_limits().await?);
    }
    Ok(Json(body))
}

pub async fn get_model(
    State(state): State<Arc<AppState>>,
    Path(model_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let admin = admin(&state)?;
    let info = admin.model_info(&model_id).await?;
    let limits = admin.deployment_limits(&model_id).await.ok();
    Ok(Json(json!({ "model": info, "limits": limits })))
}
