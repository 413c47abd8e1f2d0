//! # Coordinator Client
//!
//! Keeps the agent's presence in the remote coordinator:
//!
//! ```text
//! POST   {base}/api/v1/agents/register
//! POST   {base}/api/v1/agents/{id}/heartbeat
//! DELETE {base}/api/v1/agents/{id}
//! ```
//!
//! Any non-2xx response is an error. Whether an error is fatal is decided
//! by the caller (registration is, the rest are logged).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkerError};
use crate::models::{AgentIdentity, AgentStatus, AgentType};

/// Capability block of the registration body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityPayload {
    pub languages: Vec<String>,
    pub frameworks: Vec<String>,
    pub domains: Vec<String>,
    pub tools: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    pub agent_id: String,
    #[serde(rename = "type")]
    pub agent_type: AgentType,
    pub name: String,
    pub capabilities: CapabilityPayload,
    pub status: AgentStatus,
}

impl From<&AgentIdentity> for Registration {
    fn from(identity: &AgentIdentity) -> Self {
        let caps = &identity.capabilities;
        Self {
            agent_id: identity.id.clone(),
            agent_type: identity.agent_type,
            name: identity.name.clone(),
            capabilities: CapabilityPayload {
                languages: caps.languages.clone(),
                frameworks: caps.frameworks.clone(),
                domains: caps.domains.clone(),
                tools: caps.tools.clone(),
            },
            status: identity.status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub tasks_completed: u64,
    pub success_rate: f64,
    pub average_time: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    pub agent_id: String,
    pub status: AgentStatus,
    pub current_task: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub performance: PerformanceSnapshot,
}

impl From<&AgentIdentity> for Heartbeat {
    fn from(identity: &AgentIdentity) -> Self {
        Self {
            agent_id: identity.id.clone(),
            status: identity.status,
            current_task: identity.current_task.clone(),
            timestamp: Utc::now(),
            performance: PerformanceSnapshot {
                tasks_completed: identity.performance.tasks_completed,
                success_rate: identity.performance.success_rate,
                average_time: identity.performance.average_time,
            },
        }
    }
}

/// Remote coordinator as seen by an agent
#[async_trait]
pub trait CoordinatorApi: Send + Sync {
    async fn register(&self, registration: &Registration) -> Result<()>;
    async fn unregister(&self, agent_id: &str) -> Result<()>;
    async fn heartbeat(&self, heartbeat: &Heartbeat) -> Result<()>;
}

/// HTTP implementation of [`CoordinatorApi`]
pub struct HttpCoordinator {
    base_url: String,
    client: reqwest::Client,
}

impl HttpCoordinator {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("hive-agent/0.1")
            .build()?;
        Ok(Self::with_client(base_url, client))
    }

    pub fn with_client(base_url: &str, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn agent_url(&self, agent_id: &str, suffix: &str) -> String {
        format!(
            "{}/api/v1/agents/{}{}",
            self.base_url,
            urlencoding::encode(agent_id),
            suffix
        )
    }
}

fn check_status(response: reqwest::Response, action: &str) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(WorkerError::Coordinator(format!(
            "{} returned {}",
            action, status
        )))
    }
}

#[async_trait]
impl CoordinatorApi for HttpCoordinator {
    async fn register(&self, registration: &Registration) -> Result<()> {
        let url = format!("{}/api/v1/agents/register", self.base_url);
        let response = self.client.post(&url).json(registration).send().await?;
        check_status(response, "register")
    }

    async fn unregister(&self, agent_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.agent_url(agent_id, ""))
            .send()
            .await?;
        check_status(response, "unregister")
    }

    async fn heartbeat(&self, heartbeat: &Heartbeat) -> Result<()> {
        let response = self
            .client
            .post(self.agent_url(&heartbeat.agent_id, "/heartbeat"))
            .json(heartbeat)
            .send()
            .await?;
        check_status(response, "heartbeat")
    }
}

/// Coordinator that accepts everything; used for local one-shot runs
pub struct LocalCoordinator;

#[async_trait]
impl CoordinatorApi for LocalCoordinator {
    async fn register(&self, registration: &Registration) -> Result<()> {
        tracing::debug!(agent_id = %registration.agent_id, "local registration");
        Ok(())
    }

    async fn unregister(&self, _agent_id: &str) -> Result<()> {
        Ok(())
    }

    async fn heartbeat(&self, _heartbeat: &Heartbeat) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AgentCapabilities;
    use axum::{
        extract::{Path, State},
        http::StatusCode,
        routing::{delete, post},
        Json, Router,
    };
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    type Seen = Arc<Mutex<Vec<(String, Value)>>>;

    async fn spawn_mock(register_status: StatusCode) -> (String, Seen) {
        let seen: Seen = Arc::default();

        let app = Router::new()
            .route(
                "/api/v1/agents/register",
                post(move |State(seen): State<Seen>, Json(body): Json<Value>| async move {
                    seen.lock().unwrap().push(("register".into(), body));
                    register_status
                }),
            )
            .route(
                "/api/v1/agents/:id/heartbeat",
                post(
                    |State(seen): State<Seen>, Path(id): Path<String>, Json(body): Json<Value>| async move {
                        seen.lock().unwrap().push((format!("heartbeat:{}", id), body));
                        StatusCode::OK
                    },
                ),
            )
            .route(
                "/api/v1/agents/:id",
                delete(|State(seen): State<Seen>, Path(id): Path<String>| async move {
                    seen.lock().unwrap().push((format!("delete:{}", id), Value::Null));
                    StatusCode::NO_CONTENT
                }),
            )
            .with_state(seen.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}/", addr), seen)
    }

    fn identity() -> AgentIdentity {
        AgentIdentity::new(
            AgentType::Researcher,
            AgentCapabilities::new(["python"]).with_tools(["grep"]),
        )
        .with_id("agent-1")
    }

    #[tokio::test]
    async fn test_register_heartbeat_unregister() {
        let (url, seen) = spawn_mock(StatusCode::CREATED).await;
        let client = HttpCoordinator::new(&url).unwrap();
        assert!(!client.base_url().ends_with('/'));

        let identity = identity();
        client.register(&Registration::from(&identity)).await.unwrap();
        client.heartbeat(&Heartbeat::from(&identity)).await.unwrap();
        client.unregister(&identity.id).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].1["type"], "researcher");
        assert_eq!(seen[0].1["name"], "researcher-agent-1");
        assert_eq!(seen[0].1["capabilities"]["tools"][0], "grep");
        assert_eq!(seen[1].0, "heartbeat:agent-1");
        assert_eq!(seen[1].1["performance"]["tasks_completed"], 0);
        assert_eq!(seen[1].1["status"], "idle");
        assert_eq!(seen[2].0, "delete:agent-1");
    }

    #[tokio::test]
    async fn test_non_2xx_is_an_error() {
        let (url, _seen) = spawn_mock(StatusCode::SERVICE_UNAVAILABLE).await;
        let client = HttpCoordinator::new(&url).unwrap();

        let err = client
            .register(&Registration::from(&identity()))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Coordinator(_)));
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_unreachable_coordinator() {
        let client = HttpCoordinator::new("http://127.0.0.1:1").unwrap();
        let err = client.unregister("agent-1").await.unwrap_err();
        assert!(matches!(err, WorkerError::Http(_)));
    }
}
