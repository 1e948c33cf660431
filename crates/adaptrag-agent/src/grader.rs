use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::debug;

use adaptrag_core::error::{RagError, Result};
use adaptrag_core::traits::RelevanceGrader;
use adaptrag_core::types::{Document, OutputSchema, Relevance, Step};
use adaptrag_llm::StructuredLlm;

use crate::prompts::{grader_human, GRADER_SYSTEM};

#[derive(Debug, Deserialize)]
struct GradeDocuments {
    binary_score: String,
}

fn grade_schema() -> OutputSchema {
    OutputSchema::new(
        "grade_documents",
        serde_json::json!({
            "type": "object",
            "properties": {
                "binary_score": {
                    "type": "string",
                    "enum": ["yes", "no"],
                    "description": "Document is relevant to the question, 'yes' or 'no'."
                }
            },
            "required": ["binary_score"],
            "additionalProperties": false
        }),
    )
}

/// Binary relevance grading through a structured-output chat call.
pub struct LlmGrader {
    llm: StructuredLlm,
    schema: OutputSchema,
}

impl LlmGrader {
    pub fn new(llm: StructuredLlm) -> Self {
        Self {
            llm,
            schema: grade_schema(),
        }
    }

    async fn score(&self, question: &str, document: &Document) -> Result<Relevance> {
        let reply: GradeDocuments = self
            .llm
            .invoke(
                GRADER_SYSTEM,
                grader_human(&document.content, question),
                &self.schema,
            )
            .await?;

        let relevance = Relevance::from_binary_score(&reply.binary_score).ok_or_else(|| {
            RagError::Grading(format!(
                "unexpected binary_score '{}'",
                reply.binary_score
            ))
        })?;
        debug!(?relevance, "Document graded");
        Ok(relevance)
    }
}

impl RelevanceGrader for LlmGrader {
    fn grade<'a>(
        &'a self,
        question: &'a str,
        document: &'a Document,
    ) -> BoxFuture<'a, Result<Relevance>> {
        Box::pin(async move {
            self.score(question, document)
                .await
                .map_err(|e| e.at_step(Step::GradeDocuments))
        })
    }
}
