use std::sync::Arc;

use crate::context::TokenCounter;
use crate::core::config::{AppPaths, ConfigService, Settings};
use crate::documents::{Crawler, WebLoader};
use crate::embeddings::{build_embedding_provider, EmbeddingProvider};
use crate::feedback::FeedbackStore;
use crate::history::HistoryStore;
use crate::llm::{build_chat_model, ChatModel, DialAdmin};
use crate::pipeline::ingest::DocumentSources;
use crate::pipeline::{ChatPipeline, Ingestor, WebsiteQa};
use crate::rag::{Retriever, SplitterConfig, SqliteVectorStore, TextSplitter, VectorStore};

pub mod error;

use error::InitializationError;

/// Global application state shared across all routes and background tasks.
///
/// `settings` is the snapshot taken at startup. Config edits made through
/// `/api/config` are written to disk and apply after a restart.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: ConfigService,
    pub settings: Arc<Settings>,
    pub history: HistoryStore,
    pub feedback: FeedbackStore,
    pub store: Arc<dyn VectorStore>,
    pub embeddings: Arc<dyn EmbeddingProvider>,
    pub chat_model: Arc<dyn ChatModel>,
    pub retriever: Retriever,
    /// Same collection with the smaller `rag.tool_top_k`, for plain-text
    /// context lookups.
    pub context_retriever: Retriever,
    pub chat: ChatPipeline,
    pub website_qa: WebsiteQa,
    pub ingestor: Ingestor,
    pub token_counter: TokenCounter,
    pub dial_admin: Option<DialAdmin>,
}

impl AppState {
    /// Builds the state and starts the first index build in the background,
    /// so the server accepts requests right away.
    pub async fn initialize(paths: AppPaths) -> Result<Arc<Self>, InitializationError> {
        let state = Self::build(paths).await?;

        let ingestor = state.ingestor.clone();
        tokio::spawn(async move {
            match ingestor.rebuild_index(false).await {
                Ok(report) => tracing::info!(
                    "Index ready ({} chunks, rebuilt: {})",
                    report.chunk_count,
                    report.rebuilt
                ),
                Err(e) => tracing::error!("Initial index build failed: {}", e),
            }
        });

        Ok(state)
    }

    /// Loads settings under `paths` and wires the configured remote
    /// providers.
    pub async fn build(paths: AppPaths) -> Result<Arc<Self>, InitializationError> {
        let paths = Arc::new(paths);
        let config = ConfigService::new(paths.clone());
        let settings = config
            .load_settings()
            .map_err(|e| InitializationError::Config(e.into()))?;

        let embeddings = build_embedding_provider(&settings.embeddings)
            .map_err(|e| InitializationError::Embeddings(e.into()))?;
        let chat_model =
            build_chat_model(&settings.llm).map_err(|e| InitializationError::Llm(e.into()))?;

        Self::assemble(paths, config, settings, embeddings, chat_model).await
    }

    /// Opens the stores and assembles the pipelines around the given
    /// providers.
    pub async fn assemble(
        paths: Arc<AppPaths>,
        config: ConfigService,
        settings: Settings,
        embeddings: Arc<dyn EmbeddingProvider>,
        chat_model: Arc<dyn ChatModel>,
    ) -> Result<Arc<Self>, InitializationError> {
        let history = HistoryStore::new(paths.db_path.clone())
            .await
            .map_err(|e| InitializationError::History(e.into()))?;
        let feedback = FeedbackStore::with_pool(history.pool().clone())
            .await
            .map_err(|e| InitializationError::History(e.into()))?;

        let store: Arc<dyn VectorStore> = Arc::new(
            SqliteVectorStore::new(paths.as_ref())
                .await
                .map_err(|e| InitializationError::Rag(e.into()))?,
        );

        let token_counter = TokenCounter::from_settings(&settings.rag);
        let retriever = Retriever::new(embeddings.clone(), store.clone(), &settings.rag.collection)
            .with_top_k(settings.rag.top_k);
        let context_retriever = retriever.clone().with_top_k(settings.rag.tool_top_k);

        let loader =
            WebLoader::new(&settings.crawler).map_err(|e| InitializationError::Rag(e.into()))?;

        let chat = ChatPipeline::new(
            retriever.clone(),
            chat_model.clone(),
            history.clone(),
            token_counter.clone(),
            settings.rag.history_max_tokens,
            settings.llm.clone(),
        );
        let website_qa = WebsiteQa::new(
            Crawler::new(loader.clone()),
            embeddings.clone(),
            chat_model.clone(),
            settings.llm.clone(),
        );
        let ingestor = Ingestor::new(
            store.clone(),
            embeddings.clone(),
            loader,
            TextSplitter::new(SplitterConfig::from_settings(&settings.rag)),
            DocumentSources::from_settings(&settings.storage, &paths),
            &settings.rag.collection,
        );

        let dial_admin = if settings.llm.provider == "dial" {
            Some(
                DialAdmin::new(
                    &settings.llm.base_url,
                    settings.llm.api_key.clone(),
                    settings.llm.timeout_secs,
                )
                .map_err(|e| InitializationError::Llm(e.into()))?,
            )
        } else {
            None
        };

        tracing::info!(
            "Using chat model '{}' ({}) and embeddings '{}'",
            settings.llm.model,
            chat_model.name(),
            embeddings.model()
        );

        Ok(Arc::new(AppState {
            paths,
            config,
            settings: Arc::new(settings),
            history,
            feedback,
            store,
            embeddings,
            chat_model,
            retriever,
            context_retriever,
            chat,
            website_qa,
            ingestor,
            token_counter,
            dial_admin,
        }))
    }
}
