use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use adaptrag_agent::WorkflowEngine;
use adaptrag_core::config::GatewayConfig;

use crate::routes;
use crate::state::AppState;

/// Build the HTTP router over shared state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(routes::root))
        .route("/ask", post(routes::ask))
        .route("/ask_test", post(routes::ask_test))
        .route("/api/health", get(routes::health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// HTTP gateway server built on axum.
pub struct GatewayServer {
    config: GatewayConfig,
    engine: Arc<WorkflowEngine>,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig, engine: Arc<WorkflowEngine>) -> Self {
        Self { config, engine }
    }

    /// Run the gateway server until the cancellation token is triggered.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let state = Arc::new(AppState {
            engine: self.engine.clone(),
        });
        let app = router(state);

        let listener = TcpListener::bind(&self.config.bind).await?;
        info!(bind = %self.config.bind, "Gateway listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("Gateway shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adaptrag_agent::Capabilities;
    use adaptrag_core::types::{Datasource, Relevance};
    use adaptrag_test_utils::{
        calls, doc, CallCounter, MockFallback, MockGenerator, MockGrader, MockRetriever,
        MockRouter, PLACEHOLDER_ANSWER,
    };
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn app_with(router_mock: MockRouter, retriever: MockRetriever) -> (Router, CallCounter) {
        let router_calls = router_mock.call_counter();
        let engine = WorkflowEngine::new(Capabilities {
            router: Arc::new(router_mock),
            retriever: Arc::new(retriever),
            grader: Arc::new(MockGrader::returning(Relevance::Relevant)),
            generator: Arc::new(MockGenerator::returning("Short-term and long-term memory.")),
            fallback: Arc::new(MockFallback::placeholder()),
        });
        let state = Arc::new(AppState {
            engine: Arc::new(engine),
        });
        (router(state), router_calls)
    }

    fn app(route: Datasource) -> (Router, CallCounter) {
        app_with(
            MockRouter::returning(route),
            MockRetriever::returning(vec![doc("Memory can be short-term or long-term.")]),
        )
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_root_message() {
        let (app, _) = app(Datasource::Vectorstore);
        let resp = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert!(body["message"]
            .as_str()
            .unwrap()
            .starts_with("Welcome to the Adaptive RAG API."));
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app(Datasource::Vectorstore);
        let resp = app
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(resp).await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_ask_vectorstore_answer() {
        let (app, _) = app(Datasource::Vectorstore);
        let resp = app
            .oneshot(post_json(
                "/ask",
                serde_json::json!({"question": "What are the types of agent memory?"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["answer"], "Short-term and long-term memory.");
    }

    #[tokio::test]
    async fn test_ask_web_search_placeholder() {
        let (app, _) = app(Datasource::WebSearch);
        let resp = app
            .oneshot(post_json(
                "/ask",
                serde_json::json!({"question": "Who will the Bears draft first?"}),
            ))
            .await
            .unwrap();
        let body = json_body(resp).await;
        assert_eq!(body["answer"], PLACEHOLDER_ANSWER);
    }

    #[tokio::test]
    async fn test_ask_failure_is_500() {
        let (app, _) = app_with(
            MockRouter::returning(Datasource::Vectorstore),
            MockRetriever::failing("index unavailable"),
        );
        let resp = app
            .oneshot(post_json("/ask", serde_json::json!({"question": "q"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(resp).await;
        assert!(body["error"].as_str().unwrap().contains("Retrieval failed"));
    }

    #[tokio::test]
    async fn test_ask_empty_question_is_400() {
        let (app, router_calls) = app(Datasource::Vectorstore);
        let resp = app
            .oneshot(post_json("/ask", serde_json::json!({"question": ""})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(calls(&router_calls), 0);
    }

    #[tokio::test]
    async fn test_ask_test_bypasses_workflow() {
        let (app, router_calls) = app(Datasource::Vectorstore);
        let resp = app
            .oneshot(post_json("/ask_test", serde_json::json!({"question": "ping"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(
            body["answer"],
            "This is a fixed test answer for the question 'ping'."
        );
        assert_eq!(calls(&router_calls), 0);
    }
}
