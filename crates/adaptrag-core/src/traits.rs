use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::config::ModelConfig;
use crate::error::Result;
use crate::types::*;

/// LLM client: streaming chat completions.
pub trait LlmClient: Send + Sync + 'static {
    /// Send a chat request and receive a stream of deltas.
    ///
    /// When `schema` is set the backend is asked to constrain its output to it.
    fn chat_stream<'a>(
        &'a self,
        config: &'a ModelConfig,
        messages: Vec<ChatMessage>,
        schema: Option<&'a OutputSchema>,
    ) -> BoxFuture<'a, Result<BoxStream<'a, Result<StreamDelta>>>>;
}

/// Router: picks the evidence source for a question.
pub trait QuestionRouter: Send + Sync + 'static {
    fn route<'a>(&'a self, question: &'a str) -> BoxFuture<'a, Result<Datasource>>;
}

/// Retriever: ordered candidate documents from the local index.
///
/// An empty result is a valid answer, not an error.
pub trait Retriever: Send + Sync + 'static {
    fn retrieve<'a>(&'a self, question: &'a str) -> BoxFuture<'a, Result<Vec<Document>>>;
}

/// Grader: binary relevance of one document to a question.
pub trait RelevanceGrader: Send + Sync + 'static {
    fn grade<'a>(
        &'a self,
        question: &'a str,
        document: &'a Document,
    ) -> BoxFuture<'a, Result<Relevance>>;
}

/// Generator: answer text from a question and a context string.
pub trait AnswerGenerator: Send + Sync + 'static {
    fn generate<'a>(&'a self, question: &'a str, context: &'a str)
        -> BoxFuture<'a, Result<String>>;
}

/// Web search fallback: alternate evidence source that also answers.
pub trait WebSearchFallback: Send + Sync + 'static {
    fn search<'a>(&'a self, question: &'a str) -> BoxFuture<'a, Result<FallbackOutput>>;
}
