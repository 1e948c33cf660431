use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::debug;

use adaptrag_core::error::{RagError, Result};
use adaptrag_core::traits::QuestionRouter;
use adaptrag_core::types::{Datasource, OutputSchema, Step};
use adaptrag_llm::StructuredLlm;

use crate::prompts::ROUTER_SYSTEM;

#[derive(Debug, Deserialize)]
struct RouteQuery {
    datasource: String,
}

fn route_schema() -> OutputSchema {
    OutputSchema::new(
        "route_query",
        serde_json::json!({
            "type": "object",
            "properties": {
                "datasource": {
                    "type": "string",
                    "enum": ["vectorstore", "web_search"],
                    "description": "Route the question to the vectorstore or to web search."
                }
            },
            "required": ["datasource"],
            "additionalProperties": false
        }),
    )
}

/// Routes a question with a structured-output chat call.
pub struct LlmRouter {
    llm: StructuredLlm,
    schema: OutputSchema,
}

impl LlmRouter {
    pub fn new(llm: StructuredLlm) -> Self {
        Self {
            llm,
            schema: route_schema(),
        }
    }

    async fn classify(&self, question: &str) -> Result<Datasource> {
        if question.trim().is_empty() {
            return Err(RagError::Classification("question is empty".into()));
        }

        let reply: RouteQuery = self
            .llm
            .invoke(ROUTER_SYSTEM, question.to_string(), &self.schema)
            .await?;

        let datasource = reply
            .datasource
            .parse::<Datasource>()
            .map_err(RagError::Classification)?;
        debug!(datasource = %datasource, "Question routed");
        Ok(datasource)
    }
}

impl QuestionRouter for LlmRouter {
    fn route<'a>(&'a self, question: &'a str) -> BoxFuture<'a, Result<Datasource>> {
        Box::pin(async move {
            self.classify(question)
                .await
                .map_err(|e| e.at_step(Step::Route))
        })
    }
}
