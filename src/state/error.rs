use thiserror::Error;

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Failed to load configuration: {0}")]
    Config(#[source] anyhow::Error),

    #[error("Failed to initialize history store: {0}")]
    History(#[source] anyhow::Error),

    #[error("Failed to initialize vector store: {0}")]
    Rag(#[source] anyhow::Error),

    #[error("Failed to initialize embeddings provider: {0}")]
    Embeddings(#[source] anyhow::Error),

    #[error("Failed to initialize chat model: {0}")]
    Llm(#[source] anyhow::Error),
}
