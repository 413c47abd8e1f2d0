//! Handlers for the agent endpoints.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use hive_core::models::{AgentIdentity, CoordinationMessage, TaskContext, TaskResult};
use hive_core::WorkerError;

use super::{ApiError, AppState};

/// Run a task on this agent and wait for its result.
///
/// The task runs on its own tokio task, so a client that disconnects
/// mid-request does not abandon it.
pub async fn submit_task(
    State(state): State<AppState>,
    Json(context): Json<TaskContext>,
) -> Result<Json<TaskResult>, ApiError> {
    tracing::info!(task_id = %context.task_id, "task received");
    let agent = state.agent.clone();
    let result = tokio::spawn(async move { agent.execute_task(context).await })
        .await
        .map_err(|e| WorkerError::Environment(format!("task runner failed: {}", e)))??;
    Ok(Json(result))
}

pub async fn get_status(State(state): State<AppState>) -> Json<AgentIdentity> {
    Json(state.agent.identity())
}

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    pub from: Option<String>,
}

pub async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
) -> Json<Vec<CoordinationMessage>> {
    Json(state.agent.get_messages(query.from.as_deref()).await)
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    /// Omit to broadcast
    pub to_agent: Option<String>,
    pub message_type: Option<String>,
    pub content: Value,
    pub correlation_id: Option<String>,
}

pub async fn send_message(
    State(state): State<AppState>,
    Json(req): Json<SendMessageRequest>,
) -> Json<Value> {
    let mut message = state.agent.message(req.content);
    if let Some(to) = req.to_agent {
        message = message.to(to);
    }
    if let Some(message_type) = req.message_type {
        message = message.with_type(message_type);
    }
    if let Some(id) = req.correlation_id {
        message = message.with_correlation_id(id);
    }

    let sent = state.agent.send_message(message).await;
    Json(json!({ "sent": sent }))
}

pub async fn assistant_status(State(state): State<AppState>) -> Json<Value> {
    match &state.pool {
        Some(pool) => Json(json!({ "enabled": true, "pool": pool.status() })),
        None => Json(json!({ "enabled": false, "pool": null })),
    }
}
