use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use adaptrag_core::config::WebSearchConfig;
use adaptrag_core::error::{RagError, Result};
use adaptrag_core::traits::WebSearchFallback;
use adaptrag_core::types::{join_contents, Document, FallbackOutput, Step};

const TAVILY_SEARCH_URL: &str = "https://api.tavily.com/search";

/// Build the fallback named by `web_search.provider`.
pub fn build_fallback(config: &WebSearchConfig) -> Result<Arc<dyn WebSearchFallback>> {
    match config.provider.as_str() {
        "placeholder" => Ok(Arc::new(PlaceholderWebSearch::new(
            config.placeholder_answer.clone(),
        ))),
        "tavily" => {
            let api_key = config
                .api_key
                .clone()
                .filter(|k| !k.is_empty())
                .ok_or_else(|| RagError::Config("web_search.api_key is required for tavily".into()))?;
            info!(max_results = config.max_results, "Using Tavily web search");
            Ok(Arc::new(TavilyWebSearch::new(api_key, config.max_results)?))
        }
        other => Err(RagError::Config(format!(
            "unknown web_search.provider '{}'",
            other
        ))),
    }
}

/// Answers every question with a fixed text and no documents.
pub struct PlaceholderWebSearch {
    answer: String,
}

impl PlaceholderWebSearch {
    pub fn new(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
        }
    }
}

impl Default for PlaceholderWebSearch {
    fn default() -> Self {
        Self::new(WebSearchConfig::default().placeholder_answer)
    }
}

impl WebSearchFallback for PlaceholderWebSearch {
    fn search<'a>(&'a self, _question: &'a str) -> BoxFuture<'a, Result<FallbackOutput>> {
        Box::pin(async move {
            Ok(FallbackOutput {
                generation: self.answer.clone(),
                documents: vec![],
            })
        })
    }
}

/// Web search through the Tavily search API.
pub struct TavilyWebSearch {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    max_results: usize,
}

#[derive(Serialize)]
struct TavilyRequest<'a> {
    query: &'a str,
    max_results: usize,
    include_answer: bool,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    url: String,
    #[serde(default)]
    content: String,
}

impl TavilyWebSearch {
    pub fn new(api_key: String, max_results: usize) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RagError::Config(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http,
            endpoint: TAVILY_SEARCH_URL.to_string(),
            api_key,
            max_results,
        })
    }

    /// Point at a different search endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn query(&self, question: &str) -> Result<FallbackOutput> {
        debug!(endpoint = %self.endpoint, "Querying web search");
        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&TavilyRequest {
                query: question,
                max_results: self.max_results,
                include_answer: true,
            })
            .send()
            .await
            .map_err(|e| RagError::Generation(format!("web search request failed: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(RagError::Generation(format!(
                "web search API error {}: {}",
                status, body
            )));
        }

        let body: TavilyResponse = resp
            .json()
            .await
            .map_err(|e| RagError::Generation(format!("bad web search response: {}", e)))?;
        into_output(body)
    }
}

/// Results become documents; the answer is the API's own summary when it
/// gives one, otherwise the snippets joined.
fn into_output(response: TavilyResponse) -> Result<FallbackOutput> {
    let documents: Vec<Document> = response
        .results
        .into_iter()
        .map(|r| {
            Document::new(r.content)
                .with_metadata("source", serde_json::Value::String(r.url))
                .with_metadata("title", serde_json::Value::String(r.title))
        })
        .collect();

    let generation = match response.answer.filter(|a| !a.trim().is_empty()) {
        Some(answer) => answer,
        None if !documents.is_empty() => join_contents(&documents),
        None => return Err(RagError::Generation("web search returned no results".into())),
    };

    Ok(FallbackOutput {
        generation,
        documents,
    })
}

impl WebSearchFallback for TavilyWebSearch {
    fn search<'a>(&'a self, question: &'a str) -> BoxFuture<'a, Result<FallbackOutput>> {
        Box::pin(async move {
            self.query(question)
                .await
                .map_err(|e| e.at_step(Step::WebSearch))
        })
    }
}
