use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::debug;

use adaptrag_core::error::{RagError, Result};
use adaptrag_core::traits::Retriever;
use adaptrag_core::types::{Document, Step};

use crate::embeddings::EmbeddingProvider;
use crate::store::VectorStore;

/// Nearest-neighbour retrieval over a [`VectorStore`].
pub struct VectorRetriever {
    store: Arc<VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    top_k: usize,
    min_score: Option<f32>,
}

impl VectorRetriever {
    pub fn new(store: Arc<VectorStore>, embedder: Arc<dyn EmbeddingProvider>, top_k: usize) -> Self {
        Self {
            store,
            embedder,
            top_k,
            min_score: None,
        }
    }

    pub fn with_min_score(mut self, min_score: Option<f32>) -> Self {
        self.min_score = min_score;
        self
    }

    async fn search(&self, question: &str) -> Result<Vec<Document>> {
        let mut vectors = self.embedder.embed(&[question.to_string()]).await?;
        let query_vec = vectors
            .pop()
            .ok_or_else(|| RagError::Embedding("no embedding returned for the question".into()))?;

        let hits = self.store.search(&query_vec, self.top_k, self.min_score)?;
        debug!(
            hits = hits.len(),
            best = hits.first().map(|h| h.score).unwrap_or(0.0),
            "Vector search complete"
        );
        Ok(hits.into_iter().map(|h| h.document).collect())
    }
}

impl Retriever for VectorRetriever {
    fn retrieve<'a>(&'a self, question: &'a str) -> BoxFuture<'a, Result<Vec<Document>>> {
        Box::pin(async move {
            self.search(question)
                .await
                .map_err(|e| e.at_step(Step::Retrieve))
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    const VOCAB: [&str; 4] = ["agent", "prompt", "attack", "memory"];

    /// Embeds text as keyword counts over a tiny vocabulary.
    pub(crate) struct KeywordEmbedder;

    impl EmbeddingProvider for KeywordEmbedder {
        fn embed(&self, texts: &[String]) -> BoxFuture<'_, Result<Vec<Vec<f32>>>> {
            let vectors = texts
                .iter()
                .map(|t| {
                    let lower = t.to_lowercase();
                    VOCAB
                        .iter()
                        .map(|w| lower.matches(w).count() as f32)
                        .collect()
                })
                .collect();
            Box::pin(async move { Ok(vectors) })
        }

        fn dimensions(&self) -> usize {
            VOCAB.len()
        }
    }

    struct BrokenEmbedder;

    impl EmbeddingProvider for BrokenEmbedder {
        fn embed(&self, _texts: &[String]) -> BoxFuture<'_, Result<Vec<Vec<f32>>>> {
            Box::pin(async { Err(RagError::Embedding("HTTP 503".into())) })
        }

        fn dimensions(&self) -> usize {
            0
        }
    }

    async fn seeded_store() -> Arc<VectorStore> {
        let store = VectorStore::in_memory("rag-chroma").unwrap();
        let docs = vec![
            Document::new("An agent uses memory to plan."),
            Document::new("Prompt engineering steers a model."),
            Document::new("Adversarial attack on prompts."),
        ];
        let vectors = KeywordEmbedder
            .embed(&docs.iter().map(|d| d.content.clone()).collect::<Vec<_>>())
            .await
            .unwrap();
        store.add(&docs, &vectors).unwrap();
        Arc::new(store)
    }

    #[tokio::test]
    async fn test_retrieve_returns_closest_first() {
        let retriever = VectorRetriever::new(seeded_store().await, Arc::new(KeywordEmbedder), 2);
        let docs = retriever
            .retrieve("What are the types of agent memory?")
            .await
            .unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].content, "An agent uses memory to plan.");
    }

    #[tokio::test]
    async fn test_retrieve_empty_index_is_not_an_error() {
        let store = Arc::new(VectorStore::in_memory("empty").unwrap());
        let retriever = VectorRetriever::new(store, Arc::new(KeywordEmbedder), 4);
        let docs = retriever.retrieve("agent memory").await.unwrap();
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn test_min_score_can_exclude_everything() {
        let retriever = VectorRetriever::new(seeded_store().await, Arc::new(KeywordEmbedder), 4)
            .with_min_score(Some(0.99));
        let docs = retriever.retrieve("Who won the Super Bowl?").await.unwrap();
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn test_embedding_failure_is_retrieval_error() {
        let retriever = VectorRetriever::new(seeded_store().await, Arc::new(BrokenEmbedder), 4);
        let err = retriever.retrieve("agent memory").await.unwrap_err();
        assert!(matches!(err, RagError::Retrieval(ref m) if m.contains("HTTP 503")));
    }
}
