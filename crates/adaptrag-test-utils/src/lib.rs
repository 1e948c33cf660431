//! Deterministic doubles for every capability the workflow consumes.
//!
//! Each double counts its calls and records its inputs so tests can assert
//! on what the engine asked for, not only on what it returned.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::stream::BoxStream;

use adaptrag_core::config::ModelConfig;
use adaptrag_core::error::{RagError, Result};
use adaptrag_core::traits::{
    AnswerGenerator, LlmClient, QuestionRouter, RelevanceGrader, Retriever, WebSearchFallback,
};
use adaptrag_core::types::{
    ChatMessage, Datasource, Document, FallbackOutput, OutputSchema, Relevance, StopReason,
    StreamDelta,
};

pub const PLACEHOLDER_ANSWER: &str =
    "This question requires a web search, which is currently a placeholder.";

/// Build a document with a `source` metadata entry.
pub fn doc(content: &str) -> Document {
    Document::new(content).with_metadata("source", serde_json::json!("test://fixture"))
}

/// Shared call counter handed out by every double.
pub type CallCounter = Arc<AtomicUsize>;

fn bump(counter: &CallCounter) {
    counter.fetch_add(1, Ordering::SeqCst);
}

fn failure(message: &str) -> RagError {
    RagError::LlmRequest(message.to_string())
}

// ── LLM ─────────────────────────────────────────────────────────

/// LLM client that replays a fixed script of replies, one per request.
pub struct ScriptedLlm {
    script: Mutex<VecDeque<Result<String>>>,
    calls: CallCounter,
    seen: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
}

impl ScriptedLlm {
    pub fn new(script: Vec<Result<String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Arc::new(AtomicUsize::new(0)),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Reply with the same text to a single request.
    pub fn replying(text: &str) -> Self {
        Self::new(vec![Ok(text.to_string())])
    }

    pub fn call_counter(&self) -> CallCounter {
        self.calls.clone()
    }

    /// Messages of every request received, in order.
    pub fn seen_messages(&self) -> Arc<Mutex<Vec<Vec<ChatMessage>>>> {
        self.seen.clone()
    }
}

impl LlmClient for ScriptedLlm {
    fn chat_stream<'a>(
        &'a self,
        _config: &'a ModelConfig,
        messages: Vec<ChatMessage>,
        _schema: Option<&'a OutputSchema>,
    ) -> BoxFuture<'a, Result<BoxStream<'a, Result<StreamDelta>>>> {
        Box::pin(async move {
            bump(&self.calls);
            self.seen.lock().unwrap().push(messages);
            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(failure("script exhausted")));
            let text = next?;

            // Split the reply so consumers exercise multi-delta assembly.
            let mid = text
                .char_indices()
                .nth(text.chars().count() / 2)
                .map(|(i, _)| i)
                .unwrap_or(0);
            let (head, tail) = text.split_at(mid);
            let deltas = vec![
                Ok(StreamDelta::TextDelta(head.to_string())),
                Ok(StreamDelta::TextDelta(tail.to_string())),
                Ok(StreamDelta::Stop(StopReason::EndTurn)),
            ];
            Ok(Box::pin(futures::stream::iter(deltas)) as BoxStream<'a, Result<StreamDelta>>)
        })
    }
}

// ── Router ──────────────────────────────────────────────────────

pub struct MockRouter {
    outcome: std::result::Result<Datasource, String>,
    calls: CallCounter,
}

impl MockRouter {
    pub fn returning(datasource: Datasource) -> Self {
        Self {
            outcome: Ok(datasource),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            outcome: Err(message.to_string()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_counter(&self) -> CallCounter {
        self.calls.clone()
    }
}

impl QuestionRouter for MockRouter {
    fn route<'a>(&'a self, _question: &'a str) -> BoxFuture<'a, Result<Datasource>> {
        Box::pin(async move {
            bump(&self.calls);
            self.outcome.clone().map_err(|m| failure(&m))
        })
    }
}

// ── Retriever ───────────────────────────────────────────────────

pub struct MockRetriever {
    outcome: std::result::Result<Vec<Document>, String>,
    calls: CallCounter,
}

impl MockRetriever {
    pub fn returning(documents: Vec<Document>) -> Self {
        Self {
            outcome: Ok(documents),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn empty() -> Self {
        Self::returning(vec![])
    }

    pub fn failing(message: &str) -> Self {
        Self {
            outcome: Err(message.to_string()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_counter(&self) -> CallCounter {
        self.calls.clone()
    }
}

impl Retriever for MockRetriever {
    fn retrieve<'a>(&'a self, _question: &'a str) -> BoxFuture<'a, Result<Vec<Document>>> {
        Box::pin(async move {
            bump(&self.calls);
            self.outcome.clone().map_err(|m| failure(&m))
        })
    }
}

// ── Grader ──────────────────────────────────────────────────────

pub struct MockGrader {
    outcome: std::result::Result<Relevance, String>,
    calls: CallCounter,
    graded: Arc<Mutex<Vec<Document>>>,
}

impl MockGrader {
    pub fn returning(relevance: Relevance) -> Self {
        Self {
            outcome: Ok(relevance),
            calls: Arc::new(AtomicUsize::new(0)),
            graded: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            outcome: Err(message.to_string()),
            calls: Arc::new(AtomicUsize::new(0)),
            graded: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn call_counter(&self) -> CallCounter {
        self.calls.clone()
    }

    /// Documents passed to `grade`, in call order.
    pub fn graded(&self) -> Arc<Mutex<Vec<Document>>> {
        self.graded.clone()
    }
}

impl RelevanceGrader for MockGrader {
    fn grade<'a>(
        &'a self,
        _question: &'a str,
        document: &'a Document,
    ) -> BoxFuture<'a, Result<Relevance>> {
        Box::pin(async move {
            bump(&self.calls);
            self.graded.lock().unwrap().push(document.clone());
            self.outcome.clone().map_err(|m| failure(&m))
        })
    }
}

// ── Generator ───────────────────────────────────────────────────

pub struct MockGenerator {
    outcome: std::result::Result<String, String>,
    calls: CallCounter,
    contexts: Arc<Mutex<Vec<String>>>,
}

impl MockGenerator {
    pub fn returning(answer: &str) -> Self {
        Self {
            outcome: Ok(answer.to_string()),
            calls: Arc::new(AtomicUsize::new(0)),
            contexts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            outcome: Err(message.to_string()),
            calls: Arc::new(AtomicUsize::new(0)),
            contexts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn call_counter(&self) -> CallCounter {
        self.calls.clone()
    }

    /// Context strings passed to `generate`, in call order.
    pub fn contexts(&self) -> Arc<Mutex<Vec<String>>> {
        self.contexts.clone()
    }
}

impl AnswerGenerator for MockGenerator {
    fn generate<'a>(
        &'a self,
        _question: &'a str,
        context: &'a str,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            bump(&self.calls);
            self.contexts.lock().unwrap().push(context.to_string());
            self.outcome.clone().map_err(|m| failure(&m))
        })
    }
}

// ── Web search fallback ─────────────────────────────────────────

pub struct MockFallback {
    outcome: std::result::Result<FallbackOutput, String>,
    calls: CallCounter,
}

impl MockFallback {
    /// The reference placeholder: fixed answer, no documents.
    pub fn placeholder() -> Self {
        Self::returning(FallbackOutput {
            generation: PLACEHOLDER_ANSWER.to_string(),
            documents: vec![],
        })
    }

    pub fn returning(output: FallbackOutput) -> Self {
        Self {
            outcome: Ok(output),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            outcome: Err(message.to_string()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_counter(&self) -> CallCounter {
        self.calls.clone()
    }
}

impl WebSearchFallback for MockFallback {
    fn search<'a>(&'a self, _question: &'a str) -> BoxFuture<'a, Result<FallbackOutput>> {
        Box::pin(async move {
            bump(&self.calls);
            self.outcome.clone().map_err(|m| failure(&m))
        })
    }
}

/// Read a counter.
pub fn calls(counter: &CallCounter) -> usize {
    counter.load(Ordering::SeqCst)
}
