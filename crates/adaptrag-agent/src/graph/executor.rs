use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, error, info};

use adaptrag_core::config::AppConfig;
use adaptrag_core::error::{EngineError, RagError, Result};
use adaptrag_core::event::EventBus;
use adaptrag_core::types::{
    Datasource, NodeTiming, QueryState, RunId, Step, WorkflowEvent, WorkflowRun,
};

use super::edge::TransitionTable;
use super::node::{self, NodeOutput};
use crate::Capabilities;

const DEFAULT_MAX_STEPS: usize = 8;

/// Executes the workflow graph for one question at a time.
///
/// The engine holds no per-run state, so one instance serves any number of
/// concurrent `invoke` calls. Each run routes the question once, then walks
/// the transition table from the chosen entry until it reaches `Done`.
pub struct WorkflowEngine {
    capabilities: Capabilities,
    table: TransitionTable,
    events: Option<Arc<EventBus>>,
    max_steps: usize,
}

struct Walk {
    route: Datasource,
    path: Vec<Step>,
    timings: Vec<NodeTiming>,
    state: QueryState,
}

impl WorkflowEngine {
    pub fn new(capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            table: TransitionTable::adaptive_rag(),
            events: None,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    /// Engine over `capabilities` with the configured step budget.
    pub fn from_config(config: &AppConfig, capabilities: Capabilities) -> Self {
        Self::new(capabilities).with_max_steps(config.workflow.max_steps)
    }

    /// Replace the transition table.
    pub fn with_table(mut self, table: TransitionTable) -> Self {
        self.table = table;
        self
    }

    /// Publish progress events on `bus`.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    fn publish(&self, event: WorkflowEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }

    /// Run one question through the graph.
    pub async fn invoke(&self, question: &str) -> Result<WorkflowRun> {
        let run_id = RunId::new();
        let started_at = Utc::now();
        let start = Instant::now();

        info!(run_id = %run_id, "Workflow run started");
        self.publish(WorkflowEvent::RunStarted {
            run_id: run_id.clone(),
            question: question.to_string(),
        });

        match self.walk(&run_id, question).await {
            Ok(walk) => {
                let total_elapsed_ms = start.elapsed().as_millis() as u64;
                info!(
                    run_id = %run_id,
                    route = %walk.route,
                    steps = walk.path.len(),
                    elapsed_ms = total_elapsed_ms,
                    "Workflow run complete"
                );
                self.publish(WorkflowEvent::RunComplete {
                    run_id: run_id.clone(),
                    path: walk.path.clone(),
                    total_elapsed_ms,
                });
                Ok(WorkflowRun {
                    run_id,
                    started_at,
                    route: walk.route,
                    path: walk.path,
                    timings: walk.timings,
                    total_elapsed_ms,
                    state: walk.state,
                })
            }
            Err(e) => {
                error!(run_id = %run_id, error = %e, "Workflow run failed");
                self.publish(WorkflowEvent::RunFailed {
                    run_id,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn walk(&self, run_id: &RunId, question: &str) -> Result<Walk> {
        if question.trim().is_empty() {
            return Err(RagError::Classification("question is empty".into()));
        }

        let route = self
            .capabilities
            .router
            .route(question)
            .await
            .map_err(|e| e.at_step(Step::Route))?;
        debug!(run_id = %run_id, datasource = %route, "Question routed");
        self.publish(WorkflowEvent::Routed {
            run_id: run_id.clone(),
            datasource: route,
        });

        let mut state = QueryState::new(question);
        let mut path = Vec::new();
        let mut timings = Vec::new();
        let mut current = self.table.next(Step::Route, route.branch())?;

        while !current.is_terminal() {
            if path.len() >= self.max_steps {
                return Err(EngineError::StepLimitExceeded(self.max_steps).into());
            }

            self.publish(WorkflowEvent::NodeStarted {
                run_id: run_id.clone(),
                step: current,
            });
            let node_start = Instant::now();

            let output = self
                .execute(current, state)
                .await
                .map_err(|e| e.at_step(current))?;

            let elapsed_ms = node_start.elapsed().as_millis() as u64;
            info!(run_id = %run_id, step = %current, elapsed_ms, "Node executed");
            self.publish(WorkflowEvent::NodeFinished {
                run_id: run_id.clone(),
                step: current,
                elapsed_ms,
            });

            path.push(current);
            timings.push(NodeTiming {
                step: current,
                elapsed_ms,
            });
            state = output.state;
            current = self.table.next(current, output.branch)?;
        }

        if !state.has_generation() {
            return Err(EngineError::MissingGeneration.into());
        }

        Ok(Walk {
            route,
            path,
            timings,
            state,
        })
    }

    async fn execute(&self, step: Step, state: QueryState) -> Result<NodeOutput> {
        let caps = &self.capabilities;
        match step {
            Step::Retrieve => node::retrieve(state, caps.retriever.as_ref()).await,
            Step::GradeDocuments => node::grade_documents(state, caps.grader.as_ref()).await,
            Step::Generate => node::generate(state, caps.generator.as_ref()).await,
            Step::WebSearch => node::web_search(state, caps.fallback.as_ref()).await,
            Step::Route | Step::Done => Err(EngineError::NotExecutable(step).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::edge::Edge;
    use adaptrag_core::types::{Branch, Document, FallbackOutput, Relevance};
    use adaptrag_test_utils::{
        calls, doc, MockFallback, MockGenerator, MockGrader, MockRetriever, MockRouter,
        PLACEHOLDER_ANSWER,
    };

    struct Fixture {
        router: MockRouter,
        retriever: MockRetriever,
        grader: MockGrader,
        generator: MockGenerator,
        fallback: MockFallback,
    }

    impl Fixture {
        fn new(route: Datasource) -> Self {
            Self {
                router: MockRouter::returning(route),
                retriever: MockRetriever::returning(vec![doc("A"), doc("B")]),
                grader: MockGrader::returning(Relevance::Relevant),
                generator: MockGenerator::returning("G"),
                fallback: MockFallback::placeholder(),
            }
        }

        fn engine(self) -> WorkflowEngine {
            WorkflowEngine::new(Capabilities {
                router: Arc::new(self.router),
                retriever: Arc::new(self.retriever),
                grader: Arc::new(self.grader),
                generator: Arc::new(self.generator),
                fallback: Arc::new(self.fallback),
            })
        }
    }

    #[tokio::test]
    async fn test_vectorstore_relevant_generates() {
        let f = Fixture::new(Datasource::Vectorstore);
        let contexts = f.generator.contexts();
        let fallback_calls = f.fallback.call_counter();
        let run = f.engine().invoke("What are the types of agent memory?").await.unwrap();

        assert_eq!(run.route, Datasource::Vectorstore);
        assert_eq!(
            run.path,
            vec![Step::Retrieve, Step::GradeDocuments, Step::Generate]
        );
        assert_eq!(run.generation(), Some("G"));
        assert_eq!(run.state.documents().len(), 2);
        assert_eq!(*contexts.lock().unwrap(), vec!["A\n\nB".to_string()]);
        assert_eq!(calls(&fallback_calls), 0);
        assert_eq!(run.timings.len(), 3);
    }

    /// Sends draft questions to web search, everything else to the index.
    /// Yields before answering so concurrent runs interleave.
    struct KeywordRouter;

    impl adaptrag_core::traits::QuestionRouter for KeywordRouter {
        fn route<'a>(
            &'a self,
            question: &'a str,
        ) -> futures::future::BoxFuture<'a, adaptrag_core::error::Result<Datasource>> {
            Box::pin(async move {
                tokio::task::yield_now().await;
                if question.contains("draft") {
                    Ok(Datasource::WebSearch)
                } else {
                    Ok(Datasource::Vectorstore)
                }
            })
        }
    }

    #[tokio::test]
    async fn test_concurrent_runs_keep_separate_state() {
        let f = Fixture::new(Datasource::Vectorstore);
        let engine = Arc::new(WorkflowEngine::new(Capabilities {
            router: Arc::new(KeywordRouter),
            retriever: Arc::new(f.retriever),
            grader: Arc::new(f.grader),
            generator: Arc::new(f.generator),
            fallback: Arc::new(f.fallback),
        }));

        let (memory, draft) = tokio::join!(
            engine.invoke("What are the types of agent memory?"),
            engine.invoke("Who will the Bears draft first?"),
        );
        let memory = memory.unwrap();
        let draft = draft.unwrap();

        assert_ne!(memory.run_id, draft.run_id);
        assert_eq!(memory.state.question(), "What are the types of agent memory?");
        assert_eq!(memory.route, Datasource::Vectorstore);
        assert_eq!(memory.state.documents().len(), 2);
        assert_eq!(memory.generation(), Some("G"));

        assert_eq!(draft.state.question(), "Who will the Bears draft first?");
        assert_eq!(draft.route, Datasource::WebSearch);
        assert_eq!(draft.path, vec![Step::WebSearch]);
        assert!(draft.state.documents().is_empty());
        assert_eq!(draft.generation(), Some(PLACEHOLDER_ANSWER));
    }

    #[tokio::test]
    async fn test_web_search_route_skips_retrieval() {
        let f = Fixture::new(Datasource::WebSearch);
        let retriever_calls = f.retriever.call_counter();
        let generator_calls = f.generator.call_counter();
        let run = f
            .engine()
            .invoke("Who will the Bears draft first in the NFL draft?")
            .await
            .unwrap();

        assert_eq!(run.path, vec![Step::WebSearch]);
        assert_eq!(run.generation(), Some(PLACEHOLDER_ANSWER));
        assert!(run.state.documents().is_empty());
        assert_eq!(calls(&retriever_calls), 0);
        assert_eq!(calls(&generator_calls), 0);
    }

    #[tokio::test]
    async fn test_empty_retrieval_falls_back_without_grading() {
        let mut f = Fixture::new(Datasource::Vectorstore);
        f.retriever = MockRetriever::empty();
        let grader_calls = f.grader.call_counter();
        let run = f.engine().invoke("q").await.unwrap();

        assert_eq!(
            run.path,
            vec![Step::Retrieve, Step::GradeDocuments, Step::WebSearch]
        );
        assert_eq!(run.generation(), Some(PLACEHOLDER_ANSWER));
        assert_eq!(calls(&grader_calls), 0);
    }

    #[tokio::test]
    async fn test_irrelevant_first_document_vetoes_all() {
        let mut f = Fixture::new(Datasource::Vectorstore);
        f.grader = MockGrader::returning(Relevance::NotRelevant);
        let generator_calls = f.generator.call_counter();
        let run = f.engine().invoke("q").await.unwrap();

        assert_eq!(
            run.path,
            vec![Step::Retrieve, Step::GradeDocuments, Step::WebSearch]
        );
        assert!(run.state.documents().is_empty());
        assert_eq!(run.generation(), Some(PLACEHOLDER_ANSWER));
        assert_eq!(calls(&generator_calls), 0);
    }

    #[tokio::test]
    async fn test_grader_sees_only_first_document_once() {
        let f = Fixture::new(Datasource::Vectorstore);
        let grader_calls = f.grader.call_counter();
        let graded = f.grader.graded();
        f.engine().invoke("q").await.unwrap();

        assert_eq!(calls(&grader_calls), 1);
        assert_eq!(graded.lock().unwrap()[0].content, "A");
    }

    #[tokio::test]
    async fn test_fallback_documents_land_in_state() {
        let mut f = Fixture::new(Datasource::WebSearch);
        f.fallback = MockFallback::returning(FallbackOutput {
            generation: "from the web".into(),
            documents: vec![Document::new("snippet")],
        });
        let run = f.engine().invoke("q").await.unwrap();
        assert_eq!(run.generation(), Some("from the web"));
        assert_eq!(run.state.documents().len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_runs_are_identical() {
        let engine = Fixture::new(Datasource::Vectorstore).engine();
        let first = engine.invoke("q").await.unwrap();
        let second = engine.invoke("q").await.unwrap();
        assert_eq!(first.path, second.path);
        assert_eq!(first.generation(), second.generation());
        assert_ne!(first.run_id, second.run_id);
    }

    #[tokio::test]
    async fn test_error_classes_by_step() {
        let mut f = Fixture::new(Datasource::Vectorstore);
        f.router = MockRouter::failing("router down");
        let err = f.engine().invoke("q").await.unwrap_err();
        assert!(matches!(err, RagError::Classification(_)));

        let mut f = Fixture::new(Datasource::Vectorstore);
        f.retriever = MockRetriever::failing("index unavailable");
        let err = f.engine().invoke("q").await.unwrap_err();
        assert!(matches!(err, RagError::Retrieval(_)));

        let mut f = Fixture::new(Datasource::Vectorstore);
        f.grader = MockGrader::failing("grader down");
        let err = f.engine().invoke("q").await.unwrap_err();
        assert!(matches!(err, RagError::Grading(_)));

        let mut f = Fixture::new(Datasource::Vectorstore);
        f.generator = MockGenerator::failing("generator down");
        let err = f.engine().invoke("q").await.unwrap_err();
        assert!(matches!(err, RagError::Generation(_)));

        let mut f = Fixture::new(Datasource::WebSearch);
        f.fallback = MockFallback::failing("search down");
        let err = f.engine().invoke("q").await.unwrap_err();
        assert!(matches!(err, RagError::Generation(_)));
    }

    #[tokio::test]
    async fn test_empty_question_never_reaches_router() {
        let f = Fixture::new(Datasource::Vectorstore);
        let router_calls = f.router.call_counter();
        let err = f.engine().invoke("  ").await.unwrap_err();
        assert!(matches!(err, RagError::Classification(_)));
        assert_eq!(calls(&router_calls), 0);
    }

    #[tokio::test]
    async fn test_unmapped_transition_is_engine_error() {
        let table = TransitionTable::new([
            Edge::on(Step::Route, Branch::Vectorstore, Step::Retrieve),
            Edge::always(Step::Retrieve, Step::GradeDocuments),
            Edge::on(Step::GradeDocuments, Branch::Generate, Step::Generate),
            Edge::always(Step::Generate, Step::Done),
        ]);
        let mut f = Fixture::new(Datasource::Vectorstore);
        f.grader = MockGrader::returning(Relevance::NotRelevant);
        let err = f.engine().with_table(table).invoke("q").await.unwrap_err();
        assert!(matches!(
            err,
            RagError::Engine(EngineError::UnmappedTransition {
                from: Step::GradeDocuments,
                branch: Branch::Fallback
            })
        ));
    }

    #[tokio::test]
    async fn test_cyclic_table_hits_step_limit() {
        let table = TransitionTable::new([
            Edge::on(Step::Route, Branch::Vectorstore, Step::Retrieve),
            Edge::always(Step::Retrieve, Step::GradeDocuments),
            Edge::on(Step::GradeDocuments, Branch::Generate, Step::Retrieve),
        ]);
        let err = Fixture::new(Datasource::Vectorstore)
            .engine()
            .with_table(table)
            .with_max_steps(5)
            .invoke("q")
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Engine(EngineError::StepLimitExceeded(5))));
    }

    #[tokio::test]
    async fn test_run_without_generation_is_engine_error() {
        let table = TransitionTable::new([
            Edge::on(Step::Route, Branch::Vectorstore, Step::Retrieve),
            Edge::always(Step::Retrieve, Step::Done),
        ]);
        let err = Fixture::new(Datasource::Vectorstore)
            .engine()
            .with_table(table)
            .invoke("q")
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Engine(EngineError::MissingGeneration)));
    }

    #[tokio::test]
    async fn test_second_generation_write_is_engine_error() {
        let table = TransitionTable::new([
            Edge::on(Step::Route, Branch::Vectorstore, Step::Retrieve),
            Edge::always(Step::Retrieve, Step::GradeDocuments),
            Edge::on(Step::GradeDocuments, Branch::Generate, Step::Generate),
            Edge::always(Step::Generate, Step::WebSearch),
            Edge::always(Step::WebSearch, Step::Done),
        ]);
        let err = Fixture::new(Datasource::Vectorstore)
            .engine()
            .with_table(table)
            .invoke("q")
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Engine(EngineError::GenerationOverwrite)));
    }

    #[tokio::test]
    async fn test_route_step_is_not_executable() {
        let table = TransitionTable::new([Edge::on(Step::Route, Branch::WebSearch, Step::Route)]);
        let err = Fixture::new(Datasource::WebSearch)
            .engine()
            .with_table(table)
            .invoke("q")
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Engine(EngineError::NotExecutable(Step::Route))));
    }

    #[tokio::test]
    async fn test_events_trace_the_run() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let engine = Fixture::new(Datasource::WebSearch)
            .engine()
            .with_event_bus(bus.clone());
        engine.invoke("q").await.unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(events.len(), 5);
        assert!(matches!(events[0], WorkflowEvent::RunStarted { .. }));
        assert!(matches!(
            events[1],
            WorkflowEvent::Routed {
                datasource: Datasource::WebSearch,
                ..
            }
        ));
        assert!(matches!(
            events[2],
            WorkflowEvent::NodeStarted {
                step: Step::WebSearch,
                ..
            }
        ));
        assert!(matches!(events[3], WorkflowEvent::NodeFinished { .. }));
        assert!(matches!(events[4], WorkflowEvent::RunComplete { .. }));
    }

    #[tokio::test]
    async fn test_failed_run_publishes_run_failed() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let mut f = Fixture::new(Datasource::Vectorstore);
        f.retriever = MockRetriever::failing("boom");
        let _ = f.engine().with_event_bus(bus.clone()).invoke("q").await;

        let mut last = None;
        while let Ok(event) = rx.try_recv() {
            last = Some(event);
        }
        assert!(matches!(last, Some(WorkflowEvent::RunFailed { ref error, .. }) if error.contains("boom")));
    }
}
