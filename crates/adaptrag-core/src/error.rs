use thiserror::Error;

use crate::types::{Branch, Step};

#[derive(Debug, Error)]
pub enum RagError {
    // Workflow errors (fatal to the current run)
    #[error("Classification failed: {0}")]
    Classification(String),

    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    #[error("Grading failed: {0}")]
    Grading(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Workflow engine error: {0}")]
    Engine(#[from] EngineError),

    // Config errors (fatal at startup)
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    #[error("Missing required secret: {0}")]
    MissingSecret(String),

    // LLM errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM streaming error: {0}")]
    LlmStream(String),

    #[error("LLM response parse error: {0}")]
    LlmParse(String),

    // Index errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Document loader error: {url}: {message}")]
    Loader { url: String, message: String },

    #[error("Database error: {0}")]
    Database(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Violations of the workflow state machine itself.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("no transition from {from} on branch {branch}")]
    UnmappedTransition { from: Step, branch: Branch },

    #[error("step {0} cannot be executed as a node")]
    NotExecutable(Step),

    #[error("run exceeded {0} steps")]
    StepLimitExceeded(usize),

    #[error("generation already written, refusing to overwrite")]
    GenerationOverwrite,

    #[error("run finished without a generation")]
    MissingGeneration,
}

impl RagError {
    /// Attribute a plumbing error to the taxonomy class of the step that raised it.
    ///
    /// Errors that already carry a workflow class pass through unchanged.
    pub fn at_step(self, step: Step) -> Self {
        if self.is_workflow_error() {
            return self;
        }
        let message = self.to_string();
        match step {
            Step::Route => RagError::Classification(message),
            Step::Retrieve => RagError::Retrieval(message),
            Step::GradeDocuments => RagError::Grading(message),
            Step::Generate | Step::WebSearch => RagError::Generation(message),
            Step::Done => self,
        }
    }

    /// Whether this error belongs to the per-run workflow taxonomy.
    pub fn is_workflow_error(&self) -> bool {
        matches!(
            self,
            RagError::Classification(_)
                | RagError::Retrieval(_)
                | RagError::Grading(_)
                | RagError::Generation(_)
                | RagError::Engine(_)
        )
    }

    /// Whether this error must stop the process before it serves traffic.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            RagError::Config(_) | RagError::ConfigNotFound(_) | RagError::MissingSecret(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RagError>;
