//! Retrieval layer: chunking, vector storage, index builds and similarity
//! search.

pub mod index;
pub mod memory;
pub mod retriever;
pub mod splitter;
pub mod sqlite;
pub mod store;

pub use index::{add_documents, fingerprint, load_or_build, BuildReport};
pub use memory::InMemoryVectorStore;
pub use retriever::{Retriever, NO_RELEVANT_INFORMATION};
pub use splitter::{SplitStrategy, SplitterConfig, TextChunk, TextSplitter};
pub use sqlite::SqliteVectorStore;
pub use store::{cosine_similarity, ChunkSearchResult, IndexMeta, StoredChunk, VectorStore};
