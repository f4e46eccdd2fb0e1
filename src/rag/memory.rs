//! Process-local vector store. Holds everything in memory; used for one-shot
//! crawl-and-answer requests and in tests.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::store::{rank, ChunkSearchResult, IndexMeta, StoredChunk, VectorStore};
use crate::core::errors::ApiError;

#[derive(Default)]
struct Inner {
    rows: Vec<(StoredChunk, Vec<f32>)>,
    meta: HashMap<String, IndexMeta>,
}

#[derive(Default)]
pub struct InMemoryVectorStore {
    inner: RwLock<Inner>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn insert_batch(&self, items: Vec<(StoredChunk, Vec<f32>)>) -> Result<(), ApiError> {
        let mut inner = self.inner.write().await;
        for (chunk, embedding) in items {
            let position = inner
                .rows
                .iter()
                .position(|(existing, _)| existing.chunk_id == chunk.chunk_id);
            match position {
                Some(idx) => inner.rows[idx] = (chunk, embedding),
                None => inner.rows.push((chunk, embedding)),
            }
        }
        Ok(())
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        collection: Option<&str>,
    ) -> Result<Vec<ChunkSearchResult>, ApiError> {
        let inner = self.inner.read().await;
        let candidates = inner
            .rows
            .iter()
            .filter(|(chunk, _)| collection.map_or(true, |c| chunk.collection == c))
            .cloned();
        Ok(rank(query_embedding, candidates, limit))
    }

    async fn count(&self, collection: Option<&str>) -> Result<usize, ApiError> {
        let inner = self.inner.read().await;
        Ok(inner
            .rows
            .iter()
            .filter(|(chunk, _)| collection.map_or(true, |c| chunk.collection == c))
            .count())
    }

    async fn list(&self, collection: &str) -> Result<Vec<StoredChunk>, ApiError> {
        let inner = self.inner.read().await;
        Ok(inner
            .rows
            .iter()
            .filter(|(chunk, _)| chunk.collection == collection)
            .map(|(chunk, _)| chunk.clone())
            .collect())
    }

    async fn clear_collection(&self, collection: &str) -> Result<usize, ApiError> {
        let mut inner = self.inner.write().await;
        let before = inner.rows.len();
        inner.rows.retain(|(chunk, _)| chunk.collection != collection);
        inner.meta.remove(collection);
        Ok(before - inner.rows.len())
    }

    async fn index_meta(&self, collection: &str) -> Result<Option<IndexMeta>, ApiError> {
        Ok(self.inner.read().await.meta.get(collection).cloned())
    }

    async fn set_index_meta(&self, collection: &str, meta: &IndexMeta) -> Result<(), ApiError> {
        self.inner
            .write()
            .await
            .meta
            .insert(collection.to_string(), meta.clone());
        Ok(())
    }
}
