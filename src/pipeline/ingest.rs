//! Writes into the persistent collection: ad-hoc URLs and texts, plus full
//! rebuilds from the on-disk sources.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::core::config::{AppPaths, StorageSettings};
use crate::core::errors::ApiError;
use crate::documents::{load_docstore, load_qna, load_text_dir, Document, WebLoader};
use crate::embeddings::EmbeddingProvider;
use crate::rag::{add_documents, load_or_build, BuildReport, TextSplitter, VectorStore};

/// Files the app collection is built from.
#[derive(Debug, Clone)]
pub struct DocumentSources {
    pub docstore_path: PathBuf,
    pub qna_path: PathBuf,
    pub texts_dir: PathBuf,
}

impl DocumentSources {
    pub fn from_settings(storage: &StorageSettings, paths: &AppPaths) -> Self {
        Self {
            docstore_path: paths.resolve(&storage.docstore_path),
            qna_path: paths.resolve(&storage.qna_path),
            texts_dir: paths.resolve(&storage.texts_dir),
        }
    }

    /// Parsed screenshots first, then QnA pairs, then plain-text files.
    pub fn load(&self) -> Result<Vec<Document>, ApiError> {
        let mut docs = load_docstore(&self.docstore_path)?;
        docs.extend(load_qna(&self.qna_path)?);
        docs.extend(load_text_dir(&self.texts_dir)?);
        Ok(docs)
    }
}

#[derive(Clone)]
pub struct Ingestor {
    store: Arc<dyn VectorStore>,
    embeddings: Arc<dyn EmbeddingProvider>,
    loader: WebLoader,
    splitter: TextSplitter,
    sources: DocumentSources,
    collection: String,
    rebuild_lock: Arc<Mutex<()>>,
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embeddings: Arc<dyn EmbeddingProvider>,
        loader: WebLoader,
        splitter: TextSplitter,
        sources: DocumentSources,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            store,
            embeddings,
            loader,
            splitter,
            sources,
            collection: collection.into(),
            rebuild_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn target<'a>(&'a self, collection: Option<&'a str>) -> &'a str {
        collection
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(&self.collection)
    }

    /// Fetches one page and indexes its chunks. Returns the chunk count.
    pub async fn ingest_url(&self, url: &str, collection: Option<&str>) -> Result<usize, ApiError> {
        let doc = self.loader.load(url.trim()).await?;
        if doc.page_content.trim().is_empty() {
            return Err(ApiError::BadRequest(format!("No visible text at {}", url)));
        }
        let chunks = self.splitter.split_documents(&[doc]);
        let target = self.target(collection);
        let count = add_documents(self.store.as_ref(), self.embeddings.as_ref(), &chunks, target).await?;
        tracing::info!("Ingested {} chunks from {} into '{}'", count, url, target);
        Ok(count)
    }

    pub async fn ingest_text(
        &self,
        text: &str,
        source: &str,
        collection: Option<&str>,
    ) -> Result<usize, ApiError> {
        if text.trim().is_empty() {
            return Err(ApiError::BadRequest("Text must not be empty".to_string()));
        }
        let chunks = self.splitter.split_documents(&[Document::with_source(text, source)]);
        let target = self.target(collection);
        let count = add_documents(self.store.as_ref(), self.embeddings.as_ref(), &chunks, target).await?;
        tracing::info!("Ingested {} chunks from '{}' into '{}'", count, source, target);
        Ok(count)
    }

    /// Rebuilds the app collection from the on-disk sources, or reuses it
    /// when nothing changed and `force` is unset. Concurrent calls run one
    /// after another.
    pub async fn rebuild_index(&self, force: bool) -> Result<BuildReport, ApiError> {
        let _guard = self.rebuild_lock.lock().await;
        let docs = self.sources.load()?;
        tracing::info!("Loaded {} source documents", docs.len());
        load_or_build(
            self.store.as_ref(),
            self.embeddings.as_ref(),
            &docs,
            &self.collection,
            &self.splitter,
            force,
        )
        .await
    }
}
