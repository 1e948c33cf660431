pub mod openai;
pub mod retry;
pub mod streaming;
pub mod structured;

use std::sync::Arc;

use adaptrag_core::config::{ModelConfig, RetryConfig};
use adaptrag_core::traits::LlmClient;

pub use openai::OpenAiClient;
pub use retry::RetryingClient;
pub use structured::{collect_text, extract_json, StructuredLlm};

/// Create an LLM client based on the provider name.
///
/// Every supported provider speaks the OpenAI chat-completions dialect.
pub fn create_client(config: &ModelConfig) -> Box<dyn LlmClient> {
    match config.provider.as_str() {
        "ollama" | "vllm" | "groq" | "openrouter" | "openai" => Box::new(OpenAiClient::new()),
        other => {
            tracing::warn!(provider = %other, "Unknown provider, using OpenAI-compatible client");
            Box::new(OpenAiClient::new())
        }
    }
}

/// Build the shared client, wrapping it with retries and fallbacks when configured.
pub fn build_client(model: &ModelConfig, fallback_models: &[ModelConfig]) -> Arc<dyn LlmClient> {
    let primary = create_client(model);
    if fallback_models.is_empty() && model.retry.is_none() {
        return Arc::from(primary);
    }

    let retry_config = model.retry.clone().unwrap_or_else(RetryConfig::default);
    let fallbacks: Vec<_> = fallback_models
        .iter()
        .map(|mc| (mc.clone(), create_client(mc)))
        .collect();
    Arc::new(RetryingClient::new(primary, fallbacks, retry_config))
}
