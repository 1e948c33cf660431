use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use adaptrag_core::config::EmbeddingConfig;
use adaptrag_core::error::{RagError, Result};

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1";
const OLLAMA_EMBEDDINGS_URL: &str = "http://localhost:11434/v1";

/// Trait for embedding providers (OpenAI-compatible APIs).
pub trait EmbeddingProvider: Send + Sync + 'static {
    /// Embed a batch of texts into vectors, one per input, in order.
    fn embed(&self, texts: &[String]) -> BoxFuture<'_, Result<Vec<Vec<f32>>>>;
    /// Number of dimensions in the embedding vectors.
    fn dimensions(&self) -> usize;
}

/// HTTP-based embedding provider compatible with OpenAI, Ollama, etc.
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dims: usize,
}

impl HttpEmbeddingProvider {
    pub fn new(base_url: &str, api_key: Option<&str>, model: &str, dims: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(String::from),
            model: model.to_string(),
            dims,
        }
    }

    /// Build from config; `api_key` is the resolved key for the provider.
    pub fn from_config(config: &EmbeddingConfig, api_key: Option<&str>) -> Self {
        let base_url = config.base_url.as_deref().unwrap_or(match config.provider.as_str() {
            "ollama" => OLLAMA_EMBEDDINGS_URL,
            _ => OPENAI_EMBEDDINGS_URL,
        });
        Self::new(base_url, api_key, &config.model, config.dimensions)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

impl EmbeddingProvider for HttpEmbeddingProvider {
    fn embed(&self, texts: &[String]) -> BoxFuture<'_, Result<Vec<Vec<f32>>>> {
        let texts = texts.to_vec();
        Box::pin(async move {
            if texts.is_empty() {
                return Ok(vec![]);
            }
            let expected = texts.len();
            let url = format!("{}/embeddings", self.base_url);

            let mut req = self.client.post(&url).json(&EmbeddingRequest {
                model: self.model.clone(),
                input: texts,
            });

            if let Some(ref key) = self.api_key {
                req = req.bearer_auth(key);
            }

            let resp = req
                .send()
                .await
                .map_err(|e| RagError::Embedding(format!("request failed: {}", e)))?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                return Err(RagError::Embedding(format!("API error {}: {}", status, body)));
            }

            let body: EmbeddingResponse = resp
                .json()
                .await
                .map_err(|e| RagError::Embedding(format!("failed to parse response: {}", e)))?;

            order_embeddings(body.data, expected)
        })
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

/// Put embeddings back in input order and check the count.
fn order_embeddings(mut data: Vec<EmbeddingData>, expected: usize) -> Result<Vec<Vec<f32>>> {
    if data.len() != expected {
        return Err(RagError::Embedding(format!(
            "expected {} embeddings, got {}",
            expected,
            data.len()
        )));
    }
    if data.iter().all(|d| d.index.is_some()) {
        data.sort_by_key(|d| d.index);
    }
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let sim = cosine_similarity(&[1.0, 0.0, 0.0], &[1.0, 0.0, 0.0]);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let sim = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_mismatched_dims() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_order_embeddings_by_index() {
        let data = vec![
            EmbeddingData {
                index: Some(1),
                embedding: vec![2.0],
            },
            EmbeddingData {
                index: Some(0),
                embedding: vec![1.0],
            },
        ];
        let ordered = order_embeddings(data, 2).unwrap();
        assert_eq!(ordered, vec![vec![1.0], vec![2.0]]);
    }

    #[test]
    fn test_order_embeddings_count_mismatch() {
        let data = vec![EmbeddingData {
            index: None,
            embedding: vec![1.0],
        }];
        assert!(matches!(order_embeddings(data, 3), Err(RagError::Embedding(_))));
    }

    #[test]
    fn test_from_config_base_urls() {
        let mut config = EmbeddingConfig::default();
        let p = HttpEmbeddingProvider::from_config(&config, Some("sk"));
        assert_eq!(p.base_url, "https://api.openai.com/v1");
        assert_eq!(p.dimensions(), 1536);

        config.provider = "ollama".into();
        let p = HttpEmbeddingProvider::from_config(&config, None);
        assert_eq!(p.base_url, "http://localhost:11434/v1");

        config.base_url = Some("http://embed.local/v1/".into());
        let p = HttpEmbeddingProvider::from_config(&config, None);
        assert_eq!(p.base_url, "http://embed.local/v1");
    }
}
