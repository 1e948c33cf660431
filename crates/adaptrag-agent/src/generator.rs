use futures::future::BoxFuture;
use serde::Deserialize;

use adaptrag_core::error::Result;
use adaptrag_core::traits::AnswerGenerator;
use adaptrag_core::types::{OutputSchema, Step};
use adaptrag_llm::StructuredLlm;

use crate::prompts::{generator_human, GENERATOR_SYSTEM};

#[derive(Debug, Deserialize)]
struct Generate {
    generation: String,
}

fn generate_schema() -> OutputSchema {
    OutputSchema::new(
        "generate",
        serde_json::json!({
            "type": "object",
            "properties": {
                "generation": {
                    "type": "string",
                    "description": "The generated answer."
                }
            },
            "required": ["generation"],
            "additionalProperties": false
        }),
    )
}

/// Answers from the question and the joined document context.
pub struct LlmGenerator {
    llm: StructuredLlm,
    schema: OutputSchema,
}

impl LlmGenerator {
    pub fn new(llm: StructuredLlm) -> Self {
        Self {
            llm,
            schema: generate_schema(),
        }
    }
}

impl AnswerGenerator for LlmGenerator {
    fn generate<'a>(
        &'a self,
        question: &'a str,
        context: &'a str,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let reply: Generate = self
                .llm
                .invoke(
                    GENERATOR_SYSTEM,
                    generator_human(question, context),
                    &self.schema,
                )
                .await
                .map_err(|e| e.at_step(Step::Generate))?;
            Ok(reply.generation)
        })
    }
}
