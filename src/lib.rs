pub mod context;
pub mod core;
pub mod documents;
pub mod embeddings;
pub mod feedback;
pub mod history;
pub mod llm;
pub mod omniparser;
pub mod pipeline;
pub mod rag;
pub mod server;
pub mod state;
