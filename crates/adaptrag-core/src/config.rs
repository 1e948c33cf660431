use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Top-level adaptrag configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub workflow: WorkflowConfig,
    pub model: ModelConfig,
    #[serde(default)]
    pub fallback_models: Vec<ModelConfig>,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub web_search: WebSearchConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub secrets: SecretsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Upper bound on executed steps per run; guards against a cyclic transition table.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
        }
    }
}

fn default_max_steps() -> usize { 8 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model_id: default_model_id(),
            api_key: None,
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            retry: None,
        }
    }
}

fn default_provider() -> String { "openai".to_string() }
fn default_model_id() -> String { "gpt-4o-mini".to_string() }
fn default_max_tokens() -> u32 { 1024 }
fn default_temperature() -> f32 { 0.0 }

/// Retry configuration for LLM requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

/// Embedding model configuration for the document index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider name: "openai", "ollama", or any OpenAI-compatible API.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    /// Model name (e.g., "text-embedding-3-small", "nomic-embed-text").
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Base URL for the embedding API (e.g., "http://localhost:11434/v1").
    #[serde(default)]
    pub base_url: Option<String>,
    /// API key. Falls back to the chat model's key when unset.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_embedding_dims")]
    pub dimensions: usize,
    /// Texts per embedding request while building the index.
    #[serde(default = "default_embedding_batch")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            base_url: None,
            api_key: None,
            dimensions: default_embedding_dims(),
            batch_size: default_embedding_batch(),
        }
    }
}

fn default_embedding_provider() -> String { "openai".to_string() }
fn default_embedding_model() -> String { "text-embedding-3-small".to_string() }
fn default_embedding_dims() -> usize { 1536 }
fn default_embedding_batch() -> usize { 64 }

/// Document index construction and retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Source pages loaded into the index at startup.
    #[serde(default = "default_index_urls")]
    pub urls: Vec<String>,
    #[serde(default = "default_collection")]
    pub collection_name: String,
    /// Chunk size in cl100k_base tokens.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub chunk_overlap: usize,
    /// Documents returned per retrieval.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Drop chunks scoring below this cosine similarity.
    #[serde(default)]
    pub min_score: Option<f32>,
    /// SQLite file for the index. In-memory when unset.
    #[serde(default)]
    pub db_path: Option<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            urls: default_index_urls(),
            collection_name: default_collection(),
            chunk_size: default_chunk_size(),
            chunk_overlap: 0,
            top_k: default_top_k(),
            min_score: None,
            db_path: None,
        }
    }
}

fn default_index_urls() -> Vec<String> {
    vec![
        "https://lilianweng.github.io/posts/2023-06-23-agent/".to_string(),
        "https://lilianweng.github.io/posts/2023-03-15-prompt-engineering/".to_string(),
        "https://lilianweng.github.io/posts/2023-10-25-adv-attack-llm/".to_string(),
    ]
}
fn default_collection() -> String { "rag-chroma".to_string() }
fn default_chunk_size() -> usize { 500 }
fn default_top_k() -> usize { 4 }

/// Web search fallback configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchConfig {
    /// "placeholder" (no network) or "tavily".
    #[serde(default = "default_search_provider")]
    pub provider: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_search_results")]
    pub max_results: usize,
    #[serde(default = "default_placeholder_answer")]
    pub placeholder_answer: String,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            provider: default_search_provider(),
            api_key: None,
            max_results: default_search_results(),
            placeholder_answer: default_placeholder_answer(),
        }
    }
}

fn default_search_provider() -> String { "placeholder".to_string() }
fn default_search_results() -> usize { 3 }
fn default_placeholder_answer() -> String {
    "This question requires a web search, which is currently a placeholder.".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String { "0.0.0.0:8000".to_string() }

/// Environment variables that must be present before serving.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretsConfig {
    #[serde(default = "default_required_secrets")]
    pub required: Vec<String>,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            required: default_required_secrets(),
        }
    }
}

fn default_required_secrets() -> Vec<String> {
    vec!["OPENAI_API_KEY".to_string(), "TAVILY_API_KEY".to_string()]
}

const REDACTED: &str = "********";

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| RagError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        let mut config: AppConfig =
            toml::from_str(&expanded).map_err(|e| RagError::Config(e.to_string()))?;
        config.fill_keys_from(non_empty_env);
        config.validate()?;
        Ok(config)
    }

    /// Fill API keys the file leaves unset from `OPENAI_API_KEY` / `TAVILY_API_KEY`.
    fn fill_keys_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let unset = |key: &Option<String>| key.as_deref().map_or(true, |k| k.trim().is_empty());
        if unset(&self.model.api_key) {
            self.model.api_key = lookup("OPENAI_API_KEY");
        }
        if unset(&self.web_search.api_key) {
            self.web_search.api_key = lookup("TAVILY_API_KEY");
        }
    }

    /// Build a config from defaults and the standard environment variables.
    pub fn from_env() -> Self {
        let model = ModelConfig {
            api_key: non_empty_env("OPENAI_API_KEY"),
            ..ModelConfig::default()
        };
        let web_search = WebSearchConfig {
            api_key: non_empty_env("TAVILY_API_KEY"),
            ..WebSearchConfig::default()
        };
        AppConfig {
            workflow: WorkflowConfig::default(),
            model,
            fallback_models: vec![],
            embedding: EmbeddingConfig::default(),
            index: IndexConfig::default(),
            web_search,
            gateway: GatewayConfig::default(),
            secrets: SecretsConfig::default(),
        }
    }

    /// Check internal consistency of the settings.
    pub fn validate(&self) -> Result<()> {
        if self.workflow.max_steps == 0 {
            return Err(RagError::Config("workflow.max_steps must be > 0".into()));
        }
        if self.index.chunk_size == 0 {
            return Err(RagError::Config("index.chunk_size must be > 0".into()));
        }
        if self.index.chunk_overlap >= self.index.chunk_size {
            return Err(RagError::Config(format!(
                "index.chunk_overlap ({}) must be smaller than index.chunk_size ({})",
                self.index.chunk_overlap, self.index.chunk_size
            )));
        }
        if self.index.top_k == 0 {
            return Err(RagError::Config("index.top_k must be > 0".into()));
        }
        if self.embedding.batch_size == 0 {
            return Err(RagError::Config("embedding.batch_size must be > 0".into()));
        }
        match self.web_search.provider.as_str() {
            "placeholder" => {}
            "tavily" => {
                if self.web_search.api_key.as_deref().unwrap_or("").is_empty() {
                    return Err(RagError::Config(
                        "web_search.provider = \"tavily\" requires web_search.api_key".into(),
                    ));
                }
            }
            other => {
                return Err(RagError::Config(format!(
                    "unknown web_search.provider '{}'",
                    other
                )))
            }
        }
        Ok(())
    }

    /// Fail unless every required secret is set in the environment.
    pub fn require_secrets(&self) -> Result<()> {
        for name in &self.secrets.required {
            if non_empty_env(name).is_none() {
                return Err(RagError::MissingSecret(name.clone()));
            }
        }
        Ok(())
    }

    /// API key for the embedding provider.
    pub fn embedding_api_key(&self) -> Option<&str> {
        self.embedding
            .api_key
            .as_deref()
            .or(self.model.api_key.as_deref())
    }

    /// Copy of this config with API keys masked, for display.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        let mask = |key: &mut Option<String>| {
            if key.is_some() {
                *key = Some(REDACTED.to_string());
            }
        };
        mask(&mut config.model.api_key);
        for fb in &mut config.fallback_models {
            mask(&mut fb.api_key);
        }
        mask(&mut config.embedding.api_key);
        mask(&mut config.web_search.api_key);
        config
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}
