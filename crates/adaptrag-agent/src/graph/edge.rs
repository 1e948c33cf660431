use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use adaptrag_core::error::EngineError;
use adaptrag_core::types::{Branch, Step};

/// A transition between two steps of the workflow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from: Step,
    /// Decision value that selects this edge.
    #[serde(default = "default_branch")]
    pub branch: Branch,
    pub to: Step,
}

fn default_branch() -> Branch {
    Branch::Always
}

impl Edge {
    /// Create an unconditional edge.
    pub fn always(from: Step, to: Step) -> Self {
        Self {
            from,
            branch: Branch::Always,
            to,
        }
    }

    /// Create an edge taken when the source step decides `branch`.
    pub fn on(from: Step, branch: Branch, to: Step) -> Self {
        Self { from, branch, to }
    }
}

/// Lookup table from `(step, branch)` to the next step.
///
/// A decision with no entry is an engine error, never a silent stop.
#[derive(Debug, Clone, Default)]
pub struct TransitionTable {
    edges: HashMap<(Step, Branch), Step>,
}

impl TransitionTable {
    /// Build a table; a later edge with the same source and branch wins.
    pub fn new(edges: impl IntoIterator<Item = Edge>) -> Self {
        Self {
            edges: edges
                .into_iter()
                .map(|e| ((e.from, e.branch), e.to))
                .collect(),
        }
    }

    /// The adaptive RAG graph.
    ///
    /// ```text
    /// route --vectorstore--> retrieve --> grade_documents --generate--> generate --> done
    ///   |                                       |
    ///   +--web_search--> web_search <--fallback-+
    ///                        |
    ///                        +--> done
    /// ```
    pub fn adaptive_rag() -> Self {
        Self::new([
            Edge::on(Step::Route, Branch::Vectorstore, Step::Retrieve),
            Edge::on(Step::Route, Branch::WebSearch, Step::WebSearch),
            Edge::always(Step::Retrieve, Step::GradeDocuments),
            Edge::on(Step::GradeDocuments, Branch::Generate, Step::Generate),
            Edge::on(Step::GradeDocuments, Branch::Fallback, Step::WebSearch),
            Edge::always(Step::Generate, Step::Done),
            Edge::always(Step::WebSearch, Step::Done),
        ])
    }

    pub fn next(&self, from: Step, branch: Branch) -> Result<Step, EngineError> {
        self.edges
            .get(&(from, branch))
            .copied()
            .ok_or(EngineError::UnmappedTransition { from, branch })
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adaptive_rag_table() {
        let t = TransitionTable::adaptive_rag();
        assert_eq!(t.len(), 7);
        assert_eq!(t.next(Step::Route, Branch::Vectorstore), Ok(Step::Retrieve));
        assert_eq!(t.next(Step::Route, Branch::WebSearch), Ok(Step::WebSearch));
        assert_eq!(t.next(Step::Retrieve, Branch::Always), Ok(Step::GradeDocuments));
        assert_eq!(t.next(Step::GradeDocuments, Branch::Generate), Ok(Step::Generate));
        assert_eq!(t.next(Step::GradeDocuments, Branch::Fallback), Ok(Step::WebSearch));
        assert_eq!(t.next(Step::Generate, Branch::Always), Ok(Step::Done));
        assert_eq!(t.next(Step::WebSearch, Branch::Always), Ok(Step::Done));
    }

    #[test]
    fn test_unmapped_transition() {
        let t = TransitionTable::adaptive_rag();
        assert_eq!(
            t.next(Step::Retrieve, Branch::Fallback),
            Err(EngineError::UnmappedTransition {
                from: Step::Retrieve,
                branch: Branch::Fallback
            })
        );
        assert!(TransitionTable::default().next(Step::Route, Branch::Always).is_err());
    }

    #[test]
    fn test_edge_deserializes_with_default_branch() {
        let edge: Edge =
            serde_json::from_str(r#"{"from": "generate", "to": "done"}"#).unwrap();
        assert_eq!(edge, Edge::always(Step::Generate, Step::Done));

        let edge: Edge = serde_json::from_str(
            r#"{"from": "grade_documents", "branch": "fallback", "to": "web_search"}"#,
        )
        .unwrap();
        assert_eq!(edge.branch, Branch::Fallback);
    }
}
