//! # Hive Core
//!
//! Agent runtime for the Hive swarm: lifecycle and task execution engine,
//! coordinator client, coordination memory, assistant integration and the
//! researcher/coder/tester skills.
//!
//! ## Architecture
//!
//! - `models/` - Agent identity, problems, task contexts and results
//! - `swarm/` - Agent lifecycle, heartbeat, reporting and the local pipeline
//! - `skills/` - Task executors per agent type
//! - `assistant/` - External assistant CLI wrapper and instance pool
//! - `memory/` - Coordination store and inter-agent messaging
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hive_core::{build_agent, WorkerConfig};
//!
//! let config = WorkerConfig::load(None).await?;
//! let runtime = build_agent(config)?;
//! runtime.agent.start().await?;
//! let result = runtime.agent.execute_task(context).await?;
//! runtime.agent.stop().await;
//! ```

pub mod assistant;
pub mod config;
pub mod error;
pub mod logging;
pub mod memory;
pub mod models;
pub mod skills;
pub mod swarm;

pub use config::{ConfigOverrides, WorkerConfig};
pub use error::{Result, WorkerError};
pub use logging::{init_logging, LogConfig};
pub use swarm::{build_agent, build_pipeline_agents, run_pipeline, AgentBuilder, AgentRuntime, SwarmAgent};
