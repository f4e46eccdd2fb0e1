//! Building and reusing a persistent collection.
//!
//! A collection records which embedding model and which source texts it was
//! built from. `load_or_build` reuses it while both still match and rebuilds
//! from scratch otherwise.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::splitter::{SplitterConfig, TextSplitter};
use super::store::{IndexMeta, StoredChunk, VectorStore};
use crate::core::errors::ApiError;
use crate::documents::Document;
use crate::embeddings::EmbeddingProvider;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub rebuilt: bool,
    pub chunk_count: usize,
}

/// SHA-256 over the splitter settings and every source text.
pub fn fingerprint(docs: &[Document], splitter: &SplitterConfig) -> String {
    let mut hasher = Sha256::new();
    hasher.update(splitter.strategy.as_str().as_bytes());
    hasher.update(splitter.chunk_size.to_le_bytes());
    hasher.update(splitter.chunk_overlap.to_le_bytes());
    for doc in docs {
        hasher.update(doc.page_content.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

/// Embeds already-split chunks into rows for `collection`. Blank chunks are
/// skipped.
async fn embed_chunks(
    embeddings: &dyn EmbeddingProvider,
    chunks: &[Document],
    collection: &str,
) -> Result<Vec<(StoredChunk, Vec<f32>)>, ApiError> {
    let chunks: Vec<&Document> = chunks
        .iter()
        .filter(|c| !c.page_content.trim().is_empty())
        .collect();
    if chunks.is_empty() {
        return Ok(Vec::new());
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.page_content.clone()).collect();
    let vectors = embeddings.embed_documents(&texts).await?;
    if vectors.len() != chunks.len() {
        return Err(ApiError::Upstream(format!(
            "Embedding API returned {} vectors for {} chunks",
            vectors.len(),
            chunks.len()
        )));
    }

    Ok(chunks
        .into_iter()
        .zip(vectors)
        .map(|(doc, vector)| {
            let stored = StoredChunk {
                chunk_id: uuid::Uuid::new_v4().to_string(),
                content: doc.page_content.clone(),
                source: doc.source().unwrap_or_default().to_string(),
                collection: collection.to_string(),
                metadata: if doc.metadata.is_empty() {
                    None
                } else {
                    Some(Value::Object(doc.metadata.clone()))
                },
            };
            (stored, vector)
        })
        .collect())
}

/// Embeds already-split chunks and stores them in `collection`.
pub async fn add_documents(
    store: &dyn VectorStore,
    embeddings: &dyn EmbeddingProvider,
    chunks: &[Document],
    collection: &str,
) -> Result<usize, ApiError> {
    let items = embed_chunks(embeddings, chunks, collection).await?;
    let count = items.len();
    if count > 0 {
        store.insert_batch(items).await?;
    }
    Ok(count)
}

/// Reuses the collection when it was built from the same model and sources,
/// otherwise rebuilds it. The old chunks stay in place until the new ones
/// are embedded.
pub async fn load_or_build(
    store: &dyn VectorStore,
    embeddings: &dyn EmbeddingProvider,
    docs: &[Document],
    collection: &str,
    splitter: &TextSplitter,
    force: bool,
) -> Result<BuildReport, ApiError> {
    let fingerprint = fingerprint(docs, splitter.config());
    let model = embeddings.model().to_string();

    if !force {
        if let Some(meta) = store.index_meta(collection).await? {
            let existing = store.count(Some(collection)).await?;
            if meta.embedding_model == model && meta.fingerprint == fingerprint && existing > 0 {
                tracing::info!(
                    "Loading index from disk ({} chunks in '{}')",
                    existing,
                    collection
                );
                return Ok(BuildReport {
                    rebuilt: false,
                    chunk_count: existing,
                });
            }
            if meta.embedding_model != model {
                tracing::info!(
                    "Embedding model changed ({} -> {}); rebuilding '{}'",
                    meta.embedding_model,
                    model,
                    collection
                );
            }
        }
    }

    tracing::info!("Building index from scratch for '{}'", collection);
    let chunks = splitter.split_documents(docs);
    let items = embed_chunks(embeddings, &chunks, collection).await?;
    let chunk_count = items.len();

    let removed = store.clear_collection(collection).await?;
    if removed > 0 {
        tracing::debug!("Removed {} stale chunks from '{}'", removed, collection);
    }
    if chunk_count > 0 {
        store.insert_batch(items).await?;
    }
    store
        .set_index_meta(
            collection,
            &IndexMeta {
                embedding_model: model,
                fingerprint,
                chunk_count,
            },
        )
        .await?;

    tracing::info!("Indexed {} chunks into '{}'", chunk_count, collection);
    Ok(BuildReport {
        rebuilt: true,
        chunk_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::testing::KeywordEmbeddings;
    use crate::rag::memory::InMemoryVectorStore;

    fn docs() -> Vec<Document> {
        vec![
            Document::with_source("The cart page lists selected products.", "cart"),
            Document::with_source("Checkout asks for a shipping address.", "checkout"),
        ]
    }

    #[test]
    fn fingerprint_tracks_content_and_settings() {
        let config = SplitterConfig::recursive(1000, 200);
        let base = fingerprint(&docs(), &config);
        assert_eq!(base, fingerprint(&docs(), &config));
        assert_eq!(base.len(), 64);

        let mut changed = docs();
        changed[1].page_content.push('!');
        assert_ne!(base, fingerprint(&changed, &config));
        assert_ne!(base, fingerprint(&docs(), &SplitterConfig::recursive(500, 50)));
    }

    #[tokio::test]
    async fn reuses_matching_index_and_rebuilds_on_change() {
        let store = InMemoryVectorStore::new();
        let embeddings = KeywordEmbeddings::default();
        let splitter = TextSplitter::default();

        let first = load_or_build(&store, &embeddings, &docs(), "app", &splitter, false)
            .await
            .unwrap();
        assert_eq!(
            first,
            BuildReport {
                rebuilt: true,
                chunk_count: 2
            }
        );
        assert_eq!(embeddings.call_count(), 1);

        let second = load_or_build(&store, &embeddings, &docs(), "app", &splitter, false)
            .await
            .unwrap();
        assert!(!second.rebuilt);
        assert_eq!(second.chunk_count, 2);
        assert_eq!(embeddings.call_count(), 1);

        let forced = load_or_build(&store, &embeddings, &docs(), "app", &splitter, true)
            .await
            .unwrap();
        assert!(forced.rebuilt);
        assert_eq!(store.count(Some("app")).await.unwrap(), 2);

        let mut changed = docs();
        changed.push(Document::new("Orders can be tracked from the account page."));
        let third = load_or_build(&store, &embeddings, &changed, "app", &splitter, false)
            .await
            .unwrap();
        assert!(third.rebuilt);
        assert_eq!(store.count(Some("app")).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn model_change_triggers_rebuild() {
        let store = InMemoryVectorStore::new();
        let splitter = TextSplitter::default();

        let old = KeywordEmbeddings::with_model("embed-v1");
        load_or_build(&store, &old, &docs(), "app", &splitter, false)
            .await
            .unwrap();

        let new = KeywordEmbeddings::with_model("embed-v2");
        let report = load_or_build(&store, &new, &docs(), "app", &splitter, false)
            .await
            .unwrap();
        assert!(report.rebuilt);
        assert_eq!(
            store.index_meta("app").await.unwrap().unwrap().embedding_model,
            "embed-v2"
        );
    }

    struct BrokenEmbeddings;

    #[async_trait::async_trait]
    impl EmbeddingProvider for BrokenEmbeddings {
        fn model(&self) -> &str {
            "keyword-test"
        }

        async fn embed_documents(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
            Err(ApiError::Upstream("Embedding API Error: 503 - unavailable".to_string()))
        }
    }

    #[tokio::test]
    async fn failed_rebuild_keeps_previous_index() {
        let store = InMemoryVectorStore::new();
        let splitter = TextSplitter::default();
        load_or_build(&store, &KeywordEmbeddings::default(), &docs(), "app", &splitter, false)
            .await
            .unwrap();
        let meta = store.index_meta("app").await.unwrap();

        let mut changed = docs();
        changed.push(Document::new("Orders can be tracked from the account page."));
        let err = load_or_build(&store, &BrokenEmbeddings, &changed, "app", &splitter, false)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Upstream(_)));

        assert_eq!(store.count(Some("app")).await.unwrap(), 2);
        assert_eq!(store.index_meta("app").await.unwrap(), meta);
    }

    #[tokio::test]
    async fn add_documents_skips_blank_chunks() {
        let store = InMemoryVectorStore::new();
        let embeddings = KeywordEmbeddings::default();
        let chunks = vec![Document::new("  "), Document::with_source("Shipping is free", "faq")];

        let added = add_documents(&store, &embeddings, &chunks, "web").await.unwrap();
        assert_eq!(added, 1);
        let stored = store.list("web").await.unwrap();
        assert_eq!(stored[0].source, "faq");
    }
}
