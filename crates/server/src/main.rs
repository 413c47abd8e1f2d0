//! Hive worker binary
//!
//! Runs one swarm agent behind a small intake API, or executes a single
//! task / the local research → code → test pipeline from the command line.

mod api;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use tokio::net::TcpListener;

use hive_core::models::{AgentType, Problem, TaskContext};
use hive_core::{
    build_agent, build_pipeline_agents, init_logging, run_pipeline, AgentBuilder,
    ConfigOverrides, WorkerConfig,
};

#[derive(Parser, Clone)]
#[command(author, version, about = "Hive - coding agent swarm worker")]
struct Args {
    /// Config file (defaults to .hive/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Clone)]
enum CliCommand {
    /// Register with the coordinator and serve tasks until Ctrl-C
    Worker {
        #[arg(short, long)]
        agent_type: Option<AgentType>,
        #[arg(long)]
        coordinator_url: Option<String>,
        /// Port for the intake API
        #[arg(short, long, default_value = "8081")]
        port: u16,
    },
    /// Execute one task locally and print the result
    Run {
        #[arg(short, long)]
        agent_type: AgentType,
        /// TaskContext JSON file
        #[arg(short, long)]
        task: PathBuf,
    },
    /// Run the research → code → test pipeline on a problem
    Solve {
        /// Problem JSON file
        #[arg(short, long)]
        problem: PathBuf,
    },
}

async fn load_config(path: Option<&Path>, overrides: ConfigOverrides) -> anyhow::Result<WorkerConfig> {
    let mut config = WorkerConfig::load(path)
        .await
        .context("failed to load worker config")?;
    config.merge(overrides);
    config.validate()?;
    init_logging(&config.log_config());
    Ok(config)
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid JSON in {}", path.display()))
}

async fn run_worker(config: WorkerConfig, port: u16) -> anyhow::Result<()> {
    let runtime = build_agent(config)?;
    let agent = runtime.agent.clone();
    agent.start().await.context("agent failed to start")?;

    let app = api::router(api::AppState {
        agent: agent.clone(),
        pool: runtime.pool.clone(),
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!(agent_id = %agent.id(), %addr, "worker API listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for Ctrl-C: {}", e);
            }
            tracing::info!("shutdown requested");
        })
        .await;

    agent.stop().await;
    served.context("worker API failed")
}

async fn run_task(config: WorkerConfig, task: &Path) -> anyhow::Result<()> {
    let context: TaskContext = read_json(task).await?;
    let runtime = AgentBuilder::new(config).local().build()?;

    let result = runtime.agent.execute_task(context).await;
    runtime.agent.stop().await;

    println!("{}", serde_json::to_string_pretty(&result?)?);
    Ok(())
}

async fn run_solve(config: WorkerConfig, problem: &Path) -> anyhow::Result<()> {
    let problem: Problem = read_json(problem).await?;
    let agents = build_pipeline_agents(&config)?;

    let report = run_pipeline(problem, &agents).await;
    for agent in [&agents.researcher, &agents.coder, &agents.tester] {
        agent.stop().await;
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.is_success() {
        anyhow::bail!("pipeline failed for problem {}", report.problem_id);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let config_path = args.config.as_deref();

    match args.command {
        CliCommand::Worker {
            agent_type,
            coordinator_url,
            port,
        } => {
            let overrides = ConfigOverrides {
                agent_type,
                coordinator_url,
                ..Default::default()
            };
            run_worker(load_config(config_path, overrides).await?, port).await
        }
        CliCommand::Run { agent_type, task } => {
            let overrides = ConfigOverrides {
                agent_type: Some(agent_type),
                ..Default::default()
            };
            run_task(load_config(config_path, overrides).await?, &task).await
        }
        CliCommand::Solve { problem } => {
            let config = load_config(config_path, ConfigOverrides::default()).await?;
            run_solve(config, &problem).await
        }
    }
}
