//! # Pipeline Stages
//!
//! Local research → code → test chain over three agents.
//!
//! ```text
//! Researching ──► Coding ──► Testing ──► Complete
//!      │            │           │
//!      └────────────┴───────────┴──────► Failed
//! ```
//!
//! Each stage's output lands in the next stage's `previous_results` under
//! the producer key (`"research"`, `"code"`).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::agent::SwarmAgent;
use crate::models::{Problem, TaskContext, TaskResult};

/// Stage of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Researching,
    Coding,
    Testing,
    Complete,
    Failed,
}

impl PipelineStage {
    /// Key the stage output is stored under for later stages
    pub fn producer_key(&self) -> Option<&'static str> {
        match self {
            PipelineStage::Researching => Some("research"),
            PipelineStage::Coding => Some("code"),
            PipelineStage::Testing => Some("test"),
            PipelineStage::Complete | PipelineStage::Failed => None,
        }
    }
}

/// The pipeline state machine
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub stage: PipelineStage,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            stage: PipelineStage::Researching,
        }
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance to the next stage
    pub fn advance(&mut self) {
        self.stage = match self.stage {
            PipelineStage::Researching => PipelineStage::Coding,
            PipelineStage::Coding => PipelineStage::Testing,
            PipelineStage::Testing => PipelineStage::Complete,
            PipelineStage::Complete => PipelineStage::Complete,
            PipelineStage::Failed => PipelineStage::Failed,
        };
    }

    pub fn fail(&mut self) {
        self.stage = PipelineStage::Failed;
    }

    /// Complete or failed
    pub fn is_complete(&self) -> bool {
        matches!(self.stage, PipelineStage::Complete | PipelineStage::Failed)
    }

    pub fn is_success(&self) -> bool {
        self.stage == PipelineStage::Complete
    }
}

/// The agents that run each stage
pub struct PipelineAgents {
    pub researcher: Arc<SwarmAgent>,
    pub coder: Arc<SwarmAgent>,
    pub tester: Arc<SwarmAgent>,
}

impl PipelineAgents {
    fn for_stage(&self, stage: PipelineStage) -> Option<&Arc<SwarmAgent>> {
        match stage {
            PipelineStage::Researching => Some(&self.researcher),
            PipelineStage::Coding => Some(&self.coder),
            PipelineStage::Testing => Some(&self.tester),
            PipelineStage::Complete | PipelineStage::Failed => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: PipelineStage,
    pub result: TaskResult,
}

/// Everything a pipeline run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub problem_id: String,
    /// Final stage, `complete` or `failed`
    pub stage: PipelineStage,
    pub stages: Vec<StageResult>,
}

impl PipelineReport {
    pub fn is_success(&self) -> bool {
        self.stage == PipelineStage::Complete
    }
}

/// Run `problem` through research, code and test, stopping at the first
/// failed stage
#[tracing::instrument(skip(problem, agents), fields(problem_id = %problem.id))]
pub async fn run_pipeline(problem: Problem, agents: &PipelineAgents) -> PipelineReport {
    let mut pipeline = Pipeline::new();
    let mut stages = Vec::new();
    let mut previous: Vec<(&'static str, Value)> = Vec::new();

    while !pipeline.is_complete() {
        let stage = pipeline.stage;
        let (Some(agent), Some(key)) = (agents.for_stage(stage), stage.producer_key()) else {
            break;
        };

        let task_id = format!("{}-{}", problem.id, key);
        let mut context = TaskContext::new(&task_id, problem.clone(), agent.identity().agent_type);
        for (producer, output) in &previous {
            context = context.with_previous_result(*producer, output.clone());
        }

        tracing::info!(stage = ?stage, task_id = %task_id, "running pipeline stage");
        let result = match agent.execute_task(context).await {
            Ok(result) => result,
            Err(e) => TaskResult::failed(&task_id, &agent.id(), &e.to_string(), 0.0),
        };

        if result.is_success() {
            if let Some(output) = &result.output {
                previous.push((key, output.clone()));
            }
            pipeline.advance();
        } else {
            tracing::warn!(
                stage = ?stage,
                error = result.error.as_deref().unwrap_or_default(),
                "pipeline stage failed"
            );
            pipeline.fail();
        }
        stages.push(StageResult { stage, result });
    }

    PipelineReport {
        problem_id: problem.id,
        stage: pipeline.stage,
        stages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkerConfig;
    use crate::memory::InMemoryStore;
    use crate::models::{AgentCapabilities, AgentType, TaskStatus};
    use crate::skills::TaskExecutor;
    use crate::swarm::coordinator::LocalCoordinator;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    /// Echoes which earlier outputs it was handed
    struct StageExecutor {
        agent_type: AgentType,
        fail: bool,
    }

    #[async_trait]
    impl TaskExecutor for StageExecutor {
        fn agent_type(&self) -> AgentType {
            self.agent_type
        }

        fn capabilities(&self) -> AgentCapabilities {
            AgentCapabilities::new(["python"])
        }

        async fn execute(&self, context: &TaskContext) -> anyhow::Result<Value> {
            if self.fail {
                anyhow::bail!("{} stage broke", self.agent_type);
            }
            let mut seen: Vec<&String> = context.previous_results.keys().collect();
            seen.sort();
            Ok(json!({ "by": self.agent_type, "seen": seen }))
        }
    }

    fn agent(agent_type: AgentType, fail: bool) -> Arc<SwarmAgent> {
        Arc::new(SwarmAgent::new(
            WorkerConfig::default(),
            Arc::new(StageExecutor { agent_type, fail }),
            Arc::new(LocalCoordinator),
            Arc::new(InMemoryStore::new()),
        ))
    }

    #[test]
    fn test_pipeline_advance() {
        let mut pipeline = Pipeline::new();
        assert_eq!(pipeline.stage, PipelineStage::Researching);

        pipeline.advance();
        assert_eq!(pipeline.stage, PipelineStage::Coding);
        pipeline.advance();
        pipeline.advance();
        assert!(pipeline.is_success());

        pipeline.fail();
        pipeline.advance();
        assert_eq!(pipeline.stage, PipelineStage::Failed);
        assert!(pipeline.is_complete());
    }

    #[tokio::test]
    async fn test_outputs_feed_later_stages() {
        let agents = PipelineAgents {
            researcher: agent(AgentType::Researcher, false),
            coder: agent(AgentType::Coder, false),
            tester: agent(AgentType::Tester, false),
        };
        let report = run_pipeline(Problem::new("p-9", "Add caching"), &agents).await;

        assert!(report.is_success());
        assert_eq!(report.stages.len(), 3);
        assert_eq!(report.stages[0].result.task_id, "p-9-research");

        let tester_output = report.stages[2].result.output.as_ref().unwrap();
        assert_eq!(tester_output["by"], "tester");
        assert_eq!(tester_output["seen"], json!(["code", "research"]));
        assert_eq!(report.stages[1].result.output.as_ref().unwrap()["seen"], json!(["research"]));
    }

    #[tokio::test]
    async fn test_stops_at_first_failure() {
        let agents = PipelineAgents {
            researcher: agent(AgentType::Researcher, false),
            coder: agent(AgentType::Coder, true),
            tester: agent(AgentType::Tester, false),
        };
        let report = run_pipeline(Problem::new("p-9", "Add caching"), &agents).await;

        assert_eq!(report.stage, PipelineStage::Failed);
        assert_eq!(report.stages.len(), 2);
        let failed = &report.stages[1].result;
        assert_eq!(failed.status, TaskStatus::Failed);
        assert!(failed.error.as_deref().unwrap().contains("coder stage broke"));
        assert_eq!(agents.tester.identity().performance.tasks_completed, 0);
    }
}
