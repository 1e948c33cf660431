use std::sync::Arc;

use tracing::{debug, info};

use adaptrag_core::config::{EmbeddingConfig, IndexConfig};
use adaptrag_core::error::Result;
use adaptrag_core::types::Document;

use crate::embeddings::EmbeddingProvider;
use crate::loader::WebLoader;
use crate::splitter::TokenTextSplitter;
use crate::store::VectorStore;

/// Counts reported after an index build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexStats {
    pub sources: usize,
    pub chunks: usize,
}

/// Loads source pages, splits them, embeds the chunks and fills a store.
pub struct IndexBuilder {
    splitter: TokenTextSplitter,
    embedder: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl IndexBuilder {
    pub fn new(splitter: TokenTextSplitter, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            splitter,
            embedder,
            batch_size: 64,
        }
    }

    pub fn from_config(
        index: &IndexConfig,
        embedding: &EmbeddingConfig,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self::new(
            TokenTextSplitter::new(index.chunk_size, index.chunk_overlap),
            embedder,
        )
        .with_batch_size(embedding.batch_size)
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Fetch every URL and index the pages. Replaces the store's collection.
    pub async fn build(&self, urls: &[String], store: &VectorStore) -> Result<IndexStats> {
        let loader = WebLoader::new()?;
        let pages = loader.load_all(urls).await?;
        self.build_from_documents(&pages, store).await
    }

    /// Index already-loaded documents. Replaces the store's collection.
    pub async fn build_from_documents(
        &self,
        documents: &[Document],
        store: &VectorStore,
    ) -> Result<IndexStats> {
        let chunks = self.splitter.split_documents(documents);
        store.clear()?;

        for (i, batch) in chunks.chunks(self.batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;
            store.add(batch, &vectors)?;
            debug!(batch = i, size = batch.len(), "Embedded chunk batch");
        }

        let stats = IndexStats {
            sources: documents.len(),
            chunks: chunks.len(),
        };
        info!(
            collection = store.collection(),
            sources = stats.sources,
            chunks = stats.chunks,
            "Index built"
        );
        Ok(stats)
    }
}
