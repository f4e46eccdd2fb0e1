//! VectorStore trait: abstract interface for chunk storage backends.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;
use crate::documents::Document;

/// A stored chunk with metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredChunk {
    /// Unique chunk identifier.
    pub chunk_id: String,
    /// The text content of the chunk.
    pub content: String,
    /// Source identifier (URL, file path, docstore entry).
    pub source: String,
    /// Collection the chunk belongs to.
    pub collection: String,
    /// Optional metadata (JSON object).
    pub metadata: Option<serde_json::Value>,
}

impl StoredChunk {
    pub fn to_document(&self, score: Option<f32>) -> Document {
        let mut doc = Document::new(self.content.clone());
        if let Some(serde_json::Value::Object(map)) = &self.metadata {
            doc.metadata = map.clone();
        }
        if !self.source.is_empty() {
            doc.metadata.insert(
                "source".to_string(),
                serde_json::Value::String(self.source.clone()),
            );
        }
        if let Some(score) = score {
            doc.metadata
                .insert("score".to_string(), serde_json::Value::from(score as f64));
        }
        doc
    }
}

/// Result of a similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkSearchResult {
    pub chunk: StoredChunk,
    /// Cosine similarity (higher = better).
    pub score: f32,
}

/// What a collection was built from. Used to decide whether an existing
/// index can be reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub embedding_model: String,
    pub fingerprint: String,
    pub chunk_count: usize,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert chunks with their embedding vectors. Existing ids are replaced.
    async fn insert_batch(&self, items: Vec<(StoredChunk, Vec<f32>)>) -> Result<(), ApiError>;

    /// Chunks most similar to the query embedding, best first.
    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        collection: Option<&str>,
    ) -> Result<Vec<ChunkSearchResult>, ApiError>;

    /// Chunk count (optionally filtered by collection).
    async fn count(&self, collection: Option<&str>) -> Result<usize, ApiError>;

    /// All chunks of a collection in insertion order.
    async fn list(&self, collection: &str) -> Result<Vec<StoredChunk>, ApiError>;

    /// Delete every chunk of a collection and its index metadata.
    async fn clear_collection(&self, collection: &str) -> Result<usize, ApiError>;

    async fn index_meta(&self, collection: &str) -> Result<Option<IndexMeta>, ApiError>;

    async fn set_index_meta(&self, collection: &str, meta: &IndexMeta) -> Result<(), ApiError>;
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;

    if denom <= f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}

/// Scores candidates against the query, dropping empty or mismatched vectors,
/// and keeps the best `max(limit, 1)`.
pub(crate) fn rank<I>(query: &[f32], candidates: I, limit: usize) -> Vec<ChunkSearchResult>
where
    I: IntoIterator<Item = (StoredChunk, Vec<f32>)>,
{
    let mut scored: Vec<ChunkSearchResult> = candidates
        .into_iter()
        .filter(|(_, embedding)| !embedding.is_empty() && embedding.len() == query.len())
        .map(|(chunk, embedding)| ChunkSearchResult {
            score: cosine_similarity(query, &embedding),
            chunk,
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(limit.max(1));
    scored
}
