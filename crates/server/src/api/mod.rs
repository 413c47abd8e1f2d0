//! # Worker API
//!
//! Task intake and inspection endpoints for one running agent.
//!
//! ```text
//! POST /api/v1/tasks              TaskContext → TaskResult (409 when busy)
//! GET  /api/v1/status             identity snapshot
//! GET  /api/v1/messages?from=     messages addressed to this agent
//! POST /api/v1/messages           send a coordination message
//! GET  /api/v1/assistant/status   instance pool occupancy
//! ```

pub mod agent;

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use hive_core::assistant::AssistantPool;
use hive_core::{SwarmAgent, WorkerError};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<SwarmAgent>,
    pub pool: Option<AssistantPool>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/tasks", post(agent::submit_task))
        .route("/api/v1/status", get(agent::get_status))
        .route(
            "/api/v1/messages",
            get(agent::list_messages).post(agent::send_message),
        )
        .route("/api/v1/assistant/status", get(agent::assistant_status))
        .with_state(state)
}

/// `WorkerError` rendered as `{error, code, details}`
pub struct ApiError(WorkerError);

impl From<WorkerError> for ApiError {
    fn from(e: WorkerError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            WorkerError::TaskExecution { .. } => StatusCode::CONFLICT,
            WorkerError::Config(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = json!({
            "error": self.0.to_string(),
            "code": self.0.code(),
            "details": self.0.details(),
        });
        (status, Json(body)).into_response()
    }
}
