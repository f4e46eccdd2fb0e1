//! End-to-end flows built from the retrieval and chat pieces.

pub mod ask;
pub mod chat;
pub mod ingest;

pub use ask::{WebsiteQa, NO_CONTENT};
pub use chat::{ChatPipeline, ChatReply, NOTHING_RELEVANT};
pub use ingest::Ingestor;
