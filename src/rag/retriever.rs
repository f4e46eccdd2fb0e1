use std::sync::Arc;

use super::store::{ChunkSearchResult, VectorStore};
use crate::core::errors::ApiError;
use crate::documents::Document;
use crate::embeddings::EmbeddingProvider;

pub const NO_RELEVANT_INFORMATION: &str = "No relevant information found.";

/// Similarity search over one collection.
#[derive(Clone)]
pub struct Retriever {
    embeddings: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    collection: String,
    top_k: usize,
}

impl Retriever {
    pub fn new(
        embeddings: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            embeddings,
            store,
            collection: collection.into(),
            top_k: 5,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub async fn search(
        &self,
        query: &str,
        k: usize,
        collection: Option<&str>,
    ) -> Result<Vec<ChunkSearchResult>, ApiError> {
        let query_embedding = self.embeddings.embed_query(query).await?;
        let collection = collection.unwrap_or(&self.collection);
        self.store
            .search(&query_embedding, k.max(1), Some(collection))
            .await
    }

    /// Top `k` documents (or the configured default), with `score` and
    /// `source` in their metadata.
    pub async fn get_relevant_documents(
        &self,
        query: &str,
        k: Option<usize>,
    ) -> Result<Vec<Document>, ApiError> {
        let results = self.search(query, k.unwrap_or(self.top_k), None).await?;
        Ok(results
            .iter()
            .map(|r| r.chunk.to_document(Some(r.score)))
            .collect())
    }

    /// Matching chunk texts joined by blank lines, or a fixed notice when
    /// nothing matched.
    pub async fn retrieve_context(&self, query: &str) -> Result<String, ApiError> {
        let docs = self.get_relevant_documents(query, None).await?;
        let parts: Vec<&str> = docs
            .iter()
            .map(|d| d.page_content.trim())
            .filter(|c| !c.is_empty())
            .collect();
        if parts.is_empty() {
            return Ok(NO_RELEVANT_INFORMATION.to_string());
        }
        Ok(parts.join("\n\n"))
    }
}
