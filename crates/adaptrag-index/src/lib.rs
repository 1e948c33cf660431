//! Local evidence source: load pages, split them into token-sized chunks,
//! embed them, and serve nearest-neighbour retrieval over SQLite.
//!
//! The index is built once at startup and shared read-only afterwards.

pub mod builder;
pub mod embeddings;
pub mod loader;
pub mod retriever;
pub mod splitter;
pub mod store;

pub use builder::{IndexBuilder, IndexStats};
pub use embeddings::{cosine_similarity, EmbeddingProvider, HttpEmbeddingProvider};
pub use loader::WebLoader;
pub use retriever::VectorRetriever;
pub use splitter::TokenTextSplitter;
pub use store::{ScoredDocument, VectorStore};
