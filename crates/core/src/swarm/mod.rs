//! # Swarm Runtime
//!
//! One agent's presence in the swarm and the local pipeline built on it.
//!
//! ## Agent Flow
//!
//! ```text
//! start() → register → heartbeat loop
//!             │
//! execute_task() → TaskExecutor → TaskReporter (store, hooks, events)
//!             │
//! stop()  → cancel in-flight → unregister → executor shutdown
//! ```

pub mod agent;
pub mod coordinator;
pub mod events;
pub mod heartbeat;
pub mod init;
pub mod pipeline;
pub mod reporter;

pub use agent::SwarmAgent;
pub use coordinator::{CoordinatorApi, Heartbeat, HttpCoordinator, LocalCoordinator, Registration};
pub use events::{SwarmEvent, SwarmEventKind};
pub use heartbeat::{spawn_heartbeat, HeartbeatHandle};
pub use init::{build_agent, build_pipeline_agents, AgentBuilder, AgentRuntime};
pub use pipeline::{run_pipeline, Pipeline, PipelineAgents, PipelineReport, PipelineStage, StageResult};
pub use reporter::{result_key, TaskReporter};
