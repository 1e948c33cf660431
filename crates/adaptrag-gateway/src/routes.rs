use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::state::AppState;

/// Answer reported when a run ends without a generation.
pub const NO_ANSWER: &str = "Failed to generate an answer.";

#[derive(Debug, Deserialize)]
pub struct QuestionRequest {
    pub question: String,
}

#[derive(Debug, Serialize)]
pub struct AnswerResponse {
    pub answer: String,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(serde_json::json!({ "error": message.into() })))
}

// GET /
pub async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Welcome to the Adaptive RAG API. POST a question to /ask.",
    }))
}

// GET /api/health
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// POST /ask, one workflow run per request
pub async fn ask(
    State(state): State<Arc<AppState>>,
    Json(body): Json<QuestionRequest>,
) -> Result<Json<AnswerResponse>, ApiError> {
    if body.question.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "question must not be empty"));
    }

    match state.engine.invoke(&body.question).await {
        Ok(run) => {
            info!(run_id = %run.run_id, route = %run.route, "Answered question");
            let answer = run
                .state
                .into_generation()
                .unwrap_or_else(|| NO_ANSWER.to_string());
            Ok(Json(AnswerResponse { answer }))
        }
        Err(e) => {
            warn!(error = %e, "Workflow run failed");
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

// POST /ask_test, fixed answer that never touches the workflow
pub async fn ask_test(Json(body): Json<QuestionRequest>) -> Json<AnswerResponse> {
    info!(question = %body.question, "Received test question");
    Json(AnswerResponse {
        answer: format!(
            "This is a fixed test answer for the question '{}'.",
            body.question
        ),
    })
}
