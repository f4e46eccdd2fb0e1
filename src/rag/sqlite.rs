//! SQLite-backed vector store.
//!
//! Chunks and their embeddings live in `rag.db`; search is brute-force
//! cosine similarity over the rows of one collection.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::store::{rank, ChunkSearchResult, IndexMeta, StoredChunk, VectorStore};
use crate::core::config::AppPaths;
use crate::core::errors::ApiError;

pub struct SqliteVectorStore {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl SqliteVectorStore {
    pub async fn new(paths: &AppPaths) -> Result<Self, ApiError> {
        Self::with_path(paths.rag_db_path.clone()).await
    }

    pub async fn with_path(db_path: PathBuf) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::internal)?;

        let store = Self { pool, db_path };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS rag_chunks (
                chunk_id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                source TEXT NOT NULL DEFAULT '',
                collection TEXT NOT NULL DEFAULT '',
                metadata TEXT DEFAULT '{}',
                embedding BLOB,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_rag_collection ON rag_chunks(collection)")
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS rag_index_meta (
                collection TEXT PRIMARY KEY,
                embedding_model TEXT NOT NULL,
                fingerprint TEXT NOT NULL,
                chunk_count INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> StoredChunk {
        let metadata_str: Option<String> = row.get("metadata");
        let metadata = metadata_str
            .and_then(|s| serde_json::from_str::<Value>(&s).ok())
            .filter(|v| !matches!(v, Value::Object(map) if map.is_empty()));

        StoredChunk {
            chunk_id: row.get("chunk_id"),
            content: row.get("content"),
            source: row.get("source"),
            collection: row.get("collection"),
            metadata,
        }
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn insert_batch(&self, items: Vec<(StoredChunk, Vec<f32>)>) -> Result<(), ApiError> {
        if items.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        for (chunk, embedding) in &items {
            let blob = Self::serialize_embedding(embedding);
            let metadata_str = match &chunk.metadata {
                Some(m) => serde_json::to_string(m).map_err(ApiError::internal)?,
                None => "{}".to_string(),
            };

            sqlx::query(
                "INSERT OR REPLACE INTO rag_chunks (chunk_id, content, source, collection, metadata, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .bind(&chunk.chunk_id)
            .bind(&chunk.content)
            .bind(&chunk.source)
            .bind(&chunk.collection)
            .bind(&metadata_str)
            .bind(&blob)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        }

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        collection: Option<&str>,
    ) -> Result<Vec<ChunkSearchResult>, ApiError> {
        let rows = if let Some(collection) = collection {
            sqlx::query(
                "SELECT chunk_id, content, source, collection, metadata, embedding
                 FROM rag_chunks
                 WHERE collection = ?1",
            )
            .bind(collection)
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?
        } else {
            sqlx::query(
                "SELECT chunk_id, content, source, collection, metadata, embedding
                 FROM rag_chunks",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?
        };

        let candidates = rows.iter().map(|row| {
            let bytes: Option<Vec<u8>> = row.get("embedding");
            let embedding = bytes
                .map(|b| Self::deserialize_embedding(&b))
                .unwrap_or_default();
            (Self::row_to_chunk(row), embedding)
        });

        Ok(rank(query_embedding, candidates, limit))
    }

    async fn count(&self, collection: Option<&str>) -> Result<usize, ApiError> {
        let count: i64 = if let Some(collection) = collection {
            sqlx::query_scalar("SELECT COUNT(*) FROM rag_chunks WHERE collection = ?1")
                .bind(collection)
                .fetch_one(&self.pool)
                .await
                .map_err(ApiError::internal)?
        } else {
            sqlx::query_scalar("SELECT COUNT(*) FROM rag_chunks")
                .fetch_one(&self.pool)
                .await
                .map_err(ApiError::internal)?
        };

        Ok(count as usize)
    }

    async fn list(&self, collection: &str) -> Result<Vec<StoredChunk>, ApiError> {
        let rows = sqlx::query(
            "SELECT chunk_id, content, source, collection, metadata
             FROM rag_chunks
             WHERE collection = ?1
             ORDER BY rowid ASC",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(rows.iter().map(Self::row_to_chunk).collect())
    }

    async fn clear_collection(&self, collection: &str) -> Result<usize, ApiError> {
        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        let result = sqlx::query("DELETE FROM rag_chunks WHERE collection = ?1")
            .bind(collection)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        sqlx::query("DELETE FROM rag_index_meta WHERE collection = ?1")
            .bind(collection)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(result.rows_affected() as usize)
    }

    async fn index_meta(&self, collection: &str) -> Result<Option<IndexMeta>, ApiError> {
        let row = sqlx::query(
            "SELECT embedding_model, fingerprint, chunk_count
             FROM rag_index_meta
             WHERE collection = ?1",
        )
        .bind(collection)
        .fetch_optional(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(row.map(|row| {
            let chunk_count: i64 = row.get("chunk_count");
            IndexMeta {
                embedding_model: row.get("embedding_model"),
                fingerprint: row.get("fingerprint"),
                chunk_count: chunk_count.max(0) as usize,
            }
        }))
    }

    async fn set_index_meta(&self, collection: &str, meta: &IndexMeta) -> Result<(), ApiError> {
        sqlx::query(
            "INSERT OR REPLACE INTO rag_index_meta (collection, embedding_model, fingerprint, chunk_count, updated_at)
             VALUES (?1, ?2, ?3, ?4, STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))",
        )
        .bind(collection)
        .bind(&meta.embedding_model)
        .bind(&meta.fingerprint)
        .bind(meta.chunk_count as i64)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> SqliteVectorStore {
        let tmp = std::env::temp_dir().join(format!(
            "ragbot-rag-test-{}.db",
            uuid::Uuid::new_v4()
        ));
        SqliteVectorStore::with_path(tmp).await.unwrap()
    }

    fn make_chunk(id: &str, content: &str, collection: &str) -> StoredChunk {
        StoredChunk {
            chunk_id: id.to_string(),
            content: content.to_string(),
            source: "doc".to_string(),
            collection: collection.to_string(),
            metadata: Some(serde_json::json!({ "chunk_index": 0 })),
        }
    }

    #[tokio::test]
    async fn insert_and_search_ranks_by_cosine() {
        let store = test_store().await;

        store
            .insert_batch(vec![
                (make_chunk("c1", "Cart page", "app"), vec![1.0, 0.0, 0.0]),
                (make_chunk("c2", "Checkout page", "app"), vec![0.7, 0.7, 0.0]),
                (make_chunk("c3", "Other site", "other"), vec![1.0, 0.0, 0.0]),
            ])
            .await
            .unwrap();
        assert_eq!(store.count(None).await.unwrap(), 3);
        assert_eq!(store.count(Some("app")).await.unwrap(), 2);

        let results = store.search(&[1.0, 0.0, 0.0], 10, Some("app")).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.chunk_id, "c1");
        assert!(results[0].score > 0.99);
        assert_eq!(results[1].chunk.chunk_id, "c2");
        assert_eq!(
            results[0].chunk.metadata,
            Some(serde_json::json!({ "chunk_index": 0 }))
        );

        let limited = store.search(&[1.0, 0.0, 0.0], 0, None).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn search_skips_mismatched_dimensions() {
        let store = test_store().await;
        store
            .insert_batch(vec![
                (make_chunk("c1", "old model", "app"), vec![1.0, 0.0]),
                (make_chunk("c2", "new model", "app"), vec![1.0, 0.0, 0.0]),
            ])
            .await
            .unwrap();

        let results = store.search(&[1.0, 0.0, 0.0], 5, Some("app")).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.chunk_id, "c2");
    }

    #[tokio::test]
    async fn clear_collection_drops_chunks_and_meta() {
        let store = test_store().await;
        store
            .insert_batch(vec![
                (make_chunk("c1", "a", "app"), vec![1.0]),
                (make_chunk("c2", "b", "app"), vec![1.0]),
                (make_chunk("c3", "c", "keep"), vec![1.0]),
            ])
            .await
            .unwrap();
        let meta = IndexMeta {
            embedding_model: "embed-v1".to_string(),
            fingerprint: "abc".to_string(),
            chunk_count: 2,
        };
        store.set_index_meta("app", &meta).await.unwrap();
        assert_eq!(store.index_meta("app").await.unwrap(), Some(meta));

        let listed: Vec<String> = store
            .list("app")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.chunk_id)
            .collect();
        assert_eq!(listed, vec!["c1", "c2"]);

        assert_eq!(store.clear_collection("app").await.unwrap(), 2);
        assert_eq!(store.count(None).await.unwrap(), 1);
        assert_eq!(store.index_meta("app").await.unwrap(), None);
    }
}
