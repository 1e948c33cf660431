use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{BoxStream, StreamExt};
use tracing::{info, warn};

use adaptrag_core::config::{ModelConfig, RetryConfig};
use adaptrag_core::error::{RagError, Result};
use adaptrag_core::traits::LlmClient;
use adaptrag_core::types::*;

type DeltaStream<'a> = BoxStream<'a, Result<StreamDelta>>;

/// Retries transient failures of the primary model with exponential backoff,
/// then tries each fallback model once, in order.
pub struct RetryingClient {
    primary: Box<dyn LlmClient>,
    fallbacks: Vec<(ModelConfig, Box<dyn LlmClient>)>,
    retry_config: RetryConfig,
}

impl RetryingClient {
    pub fn new(
        primary: Box<dyn LlmClient>,
        fallbacks: Vec<(ModelConfig, Box<dyn LlmClient>)>,
        retry_config: RetryConfig,
    ) -> Self {
        Self {
            primary,
            fallbacks,
            retry_config,
        }
    }

    async fn call_primary<'a>(
        &'a self,
        config: &'a ModelConfig,
        messages: &[ChatMessage],
        schema: Option<&'a OutputSchema>,
    ) -> Result<DeltaStream<'a>> {
        let max_retries = self.retry_config.max_retries;
        let mut attempt = 0;
        loop {
            let err = match self.primary.chat_stream(config, messages.to_vec(), schema).await {
                Ok(stream) => match first_delta(stream).await {
                    Ok(stream) => return Ok(stream),
                    Err(e) => e,
                },
                Err(e) => e,
            };
            if attempt >= max_retries || !is_retryable(&err) {
                return Err(err);
            }

            let backoff = calculate_backoff(attempt, &self.retry_config);
            warn!(
                attempt = attempt + 1,
                max_retries,
                backoff_ms = backoff.as_millis() as u64,
                error = %err,
                "Retrying LLM request"
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }

    async fn call_fallbacks<'a>(
        &'a self,
        messages: &[ChatMessage],
        schema: Option<&'a OutputSchema>,
    ) -> Option<DeltaStream<'a>> {
        for (fb_config, fb_client) in &self.fallbacks {
            match fb_client.chat_stream(fb_config, messages.to_vec(), schema).await {
                Ok(stream) => {
                    info!(
                        model = %fb_config.model_id,
                        provider = %fb_config.provider,
                        "Fell back to alternative model"
                    );
                    return Some(stream);
                }
                Err(e) => {
                    warn!(model = %fb_config.model_id, error = %e, "Fallback model failed");
                }
            }
        }
        None
    }
}

/// Wait for the first delta, so a stream that breaks before producing any
/// output fails the attempt instead of reaching the caller.
async fn first_delta(mut stream: DeltaStream<'_>) -> Result<DeltaStream<'_>> {
    match stream.next().await {
        Some(Err(e)) => Err(e),
        Some(Ok(delta)) => Ok(futures::stream::iter(Some(Ok(delta))).chain(stream).boxed()),
        None => Ok(stream),
    }
}

/// Rate limits, server errors, timeouts and broken streams are transient.
fn is_retryable(e: &RagError) -> bool {
    match e {
        RagError::LlmRequest(msg) => {
            let status = msg
                .split_whitespace()
                .find_map(|word| word.trim_end_matches(':').parse::<u16>().ok());
            match status {
                Some(code) => code == 429 || (500..600).contains(&code),
                None => ["timeout", "timed out", "connection"]
                    .iter()
                    .any(|needle| msg.contains(needle)),
            }
        }
        RagError::LlmStream(_) => true,
        _ => false,
    }
}

/// Exponential backoff capped at `max_backoff_ms`, with 0.8x to 1.2x jitter.
fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let base = config
        .initial_backoff_ms
        .saturating_mul(1u64 << attempt.min(20))
        .min(config.max_backoff_ms);
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((base as f64 * jitter) as u64)
}

impl LlmClient for RetryingClient {
    fn chat_stream<'a>(
        &'a self,
        config: &'a ModelConfig,
        messages: Vec<ChatMessage>,
        schema: Option<&'a OutputSchema>,
    ) -> BoxFuture<'a, Result<BoxStream<'a, Result<StreamDelta>>>> {
        Box::pin(async move {
            let primary_err = match self.call_primary(config, &messages, schema).await {
                Ok(stream) => return Ok(stream),
                Err(e) => e,
            };

            if self.fallbacks.is_empty() {
                return Err(primary_err);
            }
            info!(error = %primary_err, "Primary model exhausted, trying fallback models");
            match self.call_fallbacks(&messages, schema).await {
                Some(stream) => Ok(stream),
                None => Err(primary_err),
            }
        })
    }
}
