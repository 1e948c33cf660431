use std::sync::Arc;

use futures::stream::{BoxStream, StreamExt};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use adaptrag_core::config::ModelConfig;
use adaptrag_core::error::{RagError, Result};
use adaptrag_core::traits::LlmClient;
use adaptrag_core::types::{ChatMessage, OutputSchema, StopReason, StreamDelta};

/// Drain a delta stream into its text. Stream errors abort the collection.
pub async fn collect_text(mut stream: BoxStream<'_, Result<StreamDelta>>) -> Result<String> {
    let mut text = String::new();
    while let Some(delta) = stream.next().await {
        match delta? {
            StreamDelta::TextDelta(chunk) => text.push_str(&chunk),
            StreamDelta::Stop(StopReason::MaxTokens) => {
                warn!("LLM response truncated at max_tokens");
            }
            StreamDelta::Usage {
                input_tokens,
                output_tokens,
            } => {
                debug!(input_tokens, output_tokens, "LLM usage");
            }
            StreamDelta::Stop(_) => {}
        }
    }
    Ok(text)
}

/// Extract JSON from a response that may contain markdown code fences.
pub fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim();
        }
    }
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            return after[..end].trim();
        }
    }
    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            if end > start {
                return &trimmed[start..=end];
            }
        }
    }
    trimmed
}

/// A chat model bound to a config, returning schema-constrained JSON.
#[derive(Clone)]
pub struct StructuredLlm {
    llm: Arc<dyn LlmClient>,
    config: ModelConfig,
}

impl StructuredLlm {
    pub fn new(llm: Arc<dyn LlmClient>, config: ModelConfig) -> Self {
        Self { llm, config }
    }

    /// Run a system + human prompt and parse the reply into `T`.
    ///
    /// Transport failures come back as `LlmRequest`/`LlmStream`; a reply that
    /// does not match `T` is `LlmParse`.
    pub async fn invoke<T: DeserializeOwned>(
        &self,
        system: &str,
        human: String,
        schema: &OutputSchema,
    ) -> Result<T> {
        let messages = vec![ChatMessage::system(system), ChatMessage::user(human)];
        let stream = self
            .llm
            .chat_stream(&self.config, messages, Some(schema))
            .await?;
        let response = collect_text(stream).await?;

        serde_json::from_str::<T>(extract_json(&response)).map_err(|e| {
            warn!(schema = %schema.name, error = %e, response = %response, "Structured output did not match schema");
            RagError::LlmParse(format!("{}: {}", schema.name, e))
        })
    }
}
