use std::sync::Arc;

use adaptrag_agent::WorkflowEngine;

/// Shared application state for axum handlers.
pub struct AppState {
    pub engine: Arc<WorkflowEngine>,
}
