use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;

/// Separator placed between document contents when building generation context.
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// Unique identifier for a single workflow invocation.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unit of retrieved evidence.
///
/// `metadata` is carried through the workflow untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: HashMap::new(),
        }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// The `source` metadata entry, if it is a string.
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(|v| v.as_str())
    }
}

/// Join document contents in order, separated by a blank line.
pub fn join_contents(documents: &[Document]) -> String {
    documents
        .iter()
        .map(|d| d.content.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

/// The value threaded through one workflow run.
///
/// Nodes consume a state and return a new one. The question is fixed at
/// construction and `generation` can be written at most once.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryState {
    question: String,
    documents: Vec<Document>,
    generation: Option<String>,
}

impl QueryState {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            documents: Vec::new(),
            generation: None,
        }
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn generation(&self) -> Option<&str> {
        self.generation.as_deref()
    }

    pub fn has_generation(&self) -> bool {
        self.generation.is_some()
    }

    /// Replace the document sequence.
    pub fn with_documents(self, documents: Vec<Document>) -> Self {
        Self { documents, ..self }
    }

    /// Write the generation. Fails if one was already written in this run.
    pub fn with_generation(
        self,
        generation: impl Into<String>,
    ) -> std::result::Result<Self, EngineError> {
        if self.generation.is_some() {
            return Err(EngineError::GenerationOverwrite);
        }
        Ok(Self {
            generation: Some(generation.into()),
            ..self
        })
    }

    /// Generation context built from the current documents.
    pub fn context(&self) -> String {
        join_contents(&self.documents)
    }

    pub fn into_generation(self) -> Option<String> {
        self.generation
    }
}

/// Evidence source chosen by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Datasource {
    Vectorstore,
    WebSearch,
}

impl Datasource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vectorstore => "vectorstore",
            Self::WebSearch => "web_search",
        }
    }

    /// The branch the engine follows out of the route entry.
    pub fn branch(&self) -> Branch {
        match self {
            Self::Vectorstore => Branch::Vectorstore,
            Self::WebSearch => Branch::WebSearch,
        }
    }
}

impl std::fmt::Display for Datasource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Datasource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "vectorstore" => Ok(Self::Vectorstore),
            "web_search" => Ok(Self::WebSearch),
            other => Err(format!("unknown datasource '{}'", other)),
        }
    }
}

/// Binary relevance verdict for one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relevance {
    Relevant,
    NotRelevant,
}

impl Relevance {
    /// Parse a `yes`/`no` binary score.
    pub fn from_binary_score(score: &str) -> Option<Self> {
        match score.trim().to_ascii_lowercase().as_str() {
            "yes" => Some(Self::Relevant),
            "no" => Some(Self::NotRelevant),
            _ => None,
        }
    }
}

/// What a web-search fallback hands back to the workflow.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FallbackOutput {
    pub generation: String,
    pub documents: Vec<Document>,
}

/// A state of the workflow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Virtual entry, resolved once by the router.
    Route,
    Retrieve,
    GradeDocuments,
    Generate,
    WebSearch,
    /// Terminal.
    Done,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Route => "route",
            Self::Retrieve => "retrieve",
            Self::GradeDocuments => "grade_documents",
            Self::Generate => "generate",
            Self::WebSearch => "web_search",
            Self::Done => "done",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision value selecting an outgoing transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    Always,
    Vectorstore,
    WebSearch,
    Generate,
    Fallback,
}

impl Branch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::Vectorstore => "vectorstore",
            Self::WebSearch => "web_search",
            Self::Generate => "generate",
            Self::Fallback => "fallback",
        }
    }
}

impl std::fmt::Display for Branch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role in a chat exchange.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// A single chat message sent to an LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
        }
    }
}

/// JSON schema the LLM response must conform to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSchema {
    pub name: String,
    pub schema: serde_json::Value,
}

impl OutputSchema {
    pub fn new(name: impl Into<String>, schema: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }
}

/// Stop reason from the LLM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    ContentFilter,
}

/// A streaming delta from the LLM.
#[derive(Debug, Clone)]
pub enum StreamDelta {
    /// A chunk of text content.
    TextDelta(String),

    /// The response is complete.
    Stop(StopReason),

    /// Usage information.
    Usage {
        input_tokens: u64,
        output_tokens: u64,
    },
}

/// Timing for one executed node.
#[derive(Debug, Clone, Serialize)]
pub struct NodeTiming {
    pub step: Step,
    pub elapsed_ms: u64,
}

/// Report of one completed workflow run.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowRun {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub route: Datasource,
    /// Executed nodes in order. The virtual route entry is not included.
    pub path: Vec<Step>,
    pub timings: Vec<NodeTiming>,
    pub total_elapsed_ms: u64,
    pub state: QueryState,
}

impl WorkflowRun {
    pub fn generation(&self) -> Option<&str> {
        self.state.generation()
    }
}

/// Progress event broadcast while a run executes.
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    RunStarted { run_id: RunId, question: String },
    Routed { run_id: RunId, datasource: Datasource },
    NodeStarted { run_id: RunId, step: Step },
    NodeFinished { run_id: RunId, step: Step, elapsed_ms: u64 },
    RunComplete { run_id: RunId, path: Vec<Step>, total_elapsed_ms: u64 },
    RunFailed { run_id: RunId, error: String },
}
