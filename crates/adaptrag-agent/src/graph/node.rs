//! Node functions. Each consumes the state and returns the next state plus
//! the branch it decided.

use adaptrag_core::error::Result;
use adaptrag_core::traits::{AnswerGenerator, RelevanceGrader, Retriever, WebSearchFallback};
use adaptrag_core::types::{Branch, QueryState, Relevance};

#[derive(Debug)]
pub struct NodeOutput {
    pub state: QueryState,
    pub branch: Branch,
}

impl NodeOutput {
    fn always(state: QueryState) -> Self {
        Self {
            state,
            branch: Branch::Always,
        }
    }
}

pub async fn retrieve(state: QueryState, retriever: &dyn Retriever) -> Result<NodeOutput> {
    let documents = retriever.retrieve(state.question()).await?;
    Ok(NodeOutput::always(state.with_documents(documents)))
}

/// Grade only the first document. A negative verdict discards all of them.
pub async fn grade_documents(
    state: QueryState,
    grader: &dyn RelevanceGrader,
) -> Result<NodeOutput> {
    let relevance = match state.documents().first() {
        Some(first) => Some(grader.grade(state.question(), first).await?),
        None => None,
    };

    let state = match relevance {
        Some(Relevance::NotRelevant) => state.with_documents(vec![]),
        _ => state,
    };

    let branch = decide_to_generate(&state);
    Ok(NodeOutput { state, branch })
}

/// Post-grading decision: generate from what survived, or fall back.
pub fn decide_to_generate(state: &QueryState) -> Branch {
    if state.documents().is_empty() {
        Branch::Fallback
    } else {
        Branch::Generate
    }
}

pub async fn generate(state: QueryState, generator: &dyn AnswerGenerator) -> Result<NodeOutput> {
    let context = state.context();
    let generation = generator.generate(state.question(), &context).await?;
    Ok(NodeOutput::always(state.with_generation(generation)?))
}

pub async fn web_search(
    state: QueryState,
    fallback: &dyn WebSearchFallback,
) -> Result<NodeOutput> {
    let output = fallback.search(state.question()).await?;
    let state = state
        .with_documents(output.documents)
        .with_generation(output.generation)?;
    Ok(NodeOutput::always(state))
}
