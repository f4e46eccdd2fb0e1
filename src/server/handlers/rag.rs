use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RetrieveRequest {
    pub query: String,
    #[serde(default)]
    pub k: Option<usize>,
    #[serde(default)]
    pub collection: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ContextRequest {
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct IngestUrlRequest {
    pub url: String,
    #[serde(default)]
    pub collection: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IngestTextRequest {
    pub text: String,
    #[serde(default = "default_text_source")]
    pub source: String,
    #[serde(default)]
    pub collection: Option<String>,
}

fn default_text_source() -> String {
    "api".to_string()
}

#[derive(Debug, Default, Deserialize)]
pub struct RebuildRequest {
    #[serde(default)]
    pub force: bool,
}

pub async fn retrieve(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RetrieveRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.query.trim().is_empty() {
        return Err(ApiError::BadRequest("Query must not be empty".to_string()));
    }
    let k = payload.k.unwrap_or(state.settings.rag.top_k);
    let results = state
        .retriever
        .search(&payload.query, k, payload.collection.as_deref())
        .await?;
    let documents: Vec<_> = results
        .iter()
        .map(|r| r.chunk.to_document(Some(r.score)))
        .collect();
    Ok(Json(json!({ "documents": documents })))
}

/// Joined text of the best `rag.tool_top_k` chunks.
pub async fn context(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ContextRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.query.trim().is_empty() {
        return Err(ApiError::BadRequest("Query must not be empty".to_string()));
    }
    let context = state.context_retriever.retrieve_context(&payload.query).await?;
    Ok(Json(json!({ "context": context })))
}

pub async fn ingest_url(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<IngestUrlRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let chunks = state
        .ingestor
        .ingest_url(&payload.url, payload.collection.as_deref())
        .await?;
    Ok(Json(json!({ "chunks": chunks })))
}

pub async fn ingest_text(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<IngestTextRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let chunks = state
        .ingestor
        .ingest_text(&payload.text, &payload.source, payload.collection.as_deref())
        .await?;
    Ok(Json(json!({ "chunks": chunks })))
}

pub async fn rebuild_index(
    State(state): State<Arc<AppState>>,
    payload: Option<Json<RebuildRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let force = payload.map(|Json(p)| p.force).unwrap_or(false);
    let report = state.ingestor.rebuild_index(force).await?;
    Ok(Json(json!({
        "rebuilt": report.rebuilt,
        "chunks": report.chunk_count
    })))
}

pub async fn index_stats(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let collection = state.ingestor.collection();
    let chunks = state.store.count(Some(collection)).await?;
    let total = state.store.count(None).await?;
    let meta = state.store.index_meta(collection).await?;
    Ok(Json(json!({
        "collection": collection,
        "chunks": chunks,
        "total_chunks": total,
        "index": meta
    })))
}
