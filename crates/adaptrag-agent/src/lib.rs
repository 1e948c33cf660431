pub mod generator;
pub mod grader;
pub mod graph;
pub mod prompts;
pub mod router;
pub mod web_search;

use std::sync::Arc;

use adaptrag_core::config::AppConfig;
use adaptrag_core::error::Result;
use adaptrag_core::traits::{
    AnswerGenerator, LlmClient, QuestionRouter, RelevanceGrader, Retriever, WebSearchFallback,
};
use adaptrag_llm::StructuredLlm;

pub use generator::LlmGenerator;
pub use grader::LlmGrader;
pub use graph::{Edge, TransitionTable, WorkflowEngine};
pub use router::LlmRouter;
pub use web_search::{build_fallback, PlaceholderWebSearch, TavilyWebSearch};

/// The injected collaborators a workflow run consumes.
///
/// Built once at startup and shared read-only by every run.
#[derive(Clone)]
pub struct Capabilities {
    pub router: Arc<dyn QuestionRouter>,
    pub retriever: Arc<dyn Retriever>,
    pub grader: Arc<dyn RelevanceGrader>,
    pub generator: Arc<dyn AnswerGenerator>,
    pub fallback: Arc<dyn WebSearchFallback>,
}

impl Capabilities {
    /// LLM-backed router, grader and generator sharing one chat client,
    /// plus the configured web-search fallback.
    pub fn from_config(
        config: &AppConfig,
        llm: Arc<dyn LlmClient>,
        retriever: Arc<dyn Retriever>,
    ) -> Result<Self> {
        let structured = StructuredLlm::new(llm, config.model.clone());
        Ok(Self {
            router: Arc::new(LlmRouter::new(structured.clone())),
            retriever,
            grader: Arc::new(LlmGrader::new(structured.clone())),
            generator: Arc::new(LlmGenerator::new(structured)),
            fallback: build_fallback(&config.web_search)?,
        })
    }
}
