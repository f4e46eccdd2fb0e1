use std::sync::Arc;

use crate::context::rag_answer_prompt;
use crate::core::config::LlmSettings;
use crate::core::errors::ApiError;
use crate::documents::Crawler;
use crate::embeddings::EmbeddingProvider;
use crate::llm::{ChatMessage, ChatModel, ChatRequest};
use crate::rag::{add_documents, InMemoryVectorStore, SplitterConfig, TextSplitter, VectorStore};

pub const NO_CONTENT: &str = "No content found to answer your question.";

const ASK_CHUNK_SIZE: usize = 500;
const ASK_CHUNK_OVERLAP: usize = 50;
const ASK_TOP_K: usize = 5;
const ASK_COLLECTION: &str = "ask";

/// One-shot question answering over a website: crawl, index in memory,
/// answer, forget.
#[derive(Clone)]
pub struct WebsiteQa {
    crawler: Crawler,
    embeddings: Arc<dyn EmbeddingProvider>,
    chat_model: Arc<dyn ChatModel>,
    llm: LlmSettings,
}

impl WebsiteQa {
    pub fn new(
        crawler: Crawler,
        embeddings: Arc<dyn EmbeddingProvider>,
        chat_model: Arc<dyn ChatModel>,
        llm: LlmSettings,
    ) -> Self {
        Self {
            crawler,
            embeddings,
            chat_model,
            llm,
        }
    }

    pub async fn ask(
        &self,
        base_url: &str,
        question: &str,
        max_links: usize,
    ) -> Result<String, ApiError> {
        if question.trim().is_empty() {
            return Err(ApiError::BadRequest("Question must not be empty".to_string()));
        }

        let mut links = self.crawler.internal_links(base_url, max_links).await?;
        if links.is_empty() {
            links.push(base_url.trim().to_string());
        }
        let docs = self.crawler.load_documents(&links).await;

        let splitter = TextSplitter::new(SplitterConfig::character(
            ASK_CHUNK_SIZE,
            ASK_CHUNK_OVERLAP,
        ));
        let chunks = splitter.split_documents(&docs);
        for (i, chunk) in chunks.iter().enumerate() {
            let preview: String = chunk.page_content.chars().take(80).collect();
            tracing::debug!("Chunk {}: {}...", i + 1, preview);
        }
        if chunks.iter().all(|c| c.page_content.trim().is_empty()) {
            return Ok(NO_CONTENT.to_string());
        }

        let store = InMemoryVectorStore::new();
        add_documents(&store, self.embeddings.as_ref(), &chunks, ASK_COLLECTION).await?;
        let query = self.embeddings.embed_query(question).await?;
        let hits = store.search(&query, ASK_TOP_K, Some(ASK_COLLECTION)).await?;
        let context = hits
            .iter()
            .map(|h| h.chunk.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let request = ChatRequest::new(vec![ChatMessage::user(rag_answer_prompt(
            &context, question,
        ))])
        .with_settings(&self.llm);
        self.chat_model.chat(request).await
    }
}
