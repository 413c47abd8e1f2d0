//! # Assistant Pool
//!
//! Bounded set of assistant instances for parallel work. Each instance owns
//! a scratch directory that lives as long as the instance.
//!
//! ```text
//! acquire() ──► semaphore permit ──► idle instance (or a new one)
//!                                        │
//!                InstanceGuard ◄─────────┘
//!                     │ drop
//!                     └──► back to idle list, permit released
//! ```
//!
//! Release happens in `Drop`, so success, error, timeout and cancellation
//! all return the instance.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::cli::{build_args, run_json_command};
use super::{Assistant, AssistantOperation, AssistantRequest, AssistantResponse};
use crate::config::{AssistantConfig, EnvironmentConfig};
use crate::error::{Result, WorkerError};

/// Snapshot of pool occupancy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatus {
    pub authenticated: bool,
    pub max_instances: usize,
    pub active_instances: usize,
    pub busy_instances: usize,
    pub queued_requests: usize,
}

struct Instance {
    id: String,
    work_dir: TempDir,
    runs: u64,
}

struct PoolInner {
    command: Vec<String>,
    max_instances: usize,
    default_timeout: Duration,
    semaphore: Arc<Semaphore>,
    idle: Mutex<Vec<Instance>>,
    live: AtomicUsize,
    waiting: AtomicUsize,
    closed: AtomicBool,
    auth_token: RwLock<Option<String>>,
    env: HashMap<String, String>,
    work_root: Option<PathBuf>,
}

impl PoolInner {
    fn idle(&self) -> std::sync::MutexGuard<'_, Vec<Instance>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn new_instance(&self) -> Result<Instance> {
        let id = format!("claude-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);
        let mut builder = tempfile::Builder::new();
        let prefix = format!("hive-{}-", id);
        builder.prefix(&prefix);

        let work_dir = match &self.work_root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
        .map_err(|e| WorkerError::Environment(format!("failed to create work dir: {}", e)))?;

        self.live.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(instance_id = %id, work_dir = %work_dir.path().display(), "created assistant instance");
        Ok(Instance {
            id,
            work_dir,
            runs: 0,
        })
    }

    fn release(&self, instance: Instance) {
        if self.closed.load(Ordering::SeqCst) {
            self.live.fetch_sub(1, Ordering::SeqCst);
            return;
        }
        self.idle().push(instance);
    }
}

/// Exclusive use of one instance. Returned to the pool on drop.
pub struct InstanceGuard {
    instance: Option<Instance>,
    inner: Arc<PoolInner>,
    // Dropped after `Drop::drop` has put the instance back
    _permit: OwnedSemaphorePermit,
}

impl InstanceGuard {
    pub fn id(&self) -> &str {
        self.instance.as_ref().map(|i| i.id.as_str()).unwrap_or_default()
    }

    pub fn work_dir(&self) -> &Path {
        self.instance
            .as_ref()
            .map(|i| i.work_dir.path())
            .unwrap_or_else(|| Path::new("."))
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        if let Some(mut instance) = self.instance.take() {
            instance.runs += 1;
            tracing::trace!(instance_id = %instance.id, runs = instance.runs, "released assistant instance");
            self.inner.release(instance);
        }
    }
}

struct WaitingGuard<'a>(&'a AtomicUsize);

impl<'a> WaitingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Bounded pool of assistant instances
#[derive(Clone)]
pub struct AssistantPool {
    inner: Arc<PoolInner>,
}

impl AssistantPool {
    pub fn new(command: Vec<String>, max_instances: usize) -> Self {
        Self::build(
            command,
            max_instances,
            Duration::from_secs(300),
            &EnvironmentConfig::default(),
            None,
        )
    }

    pub fn from_config(config: &AssistantConfig, environment: &EnvironmentConfig) -> Self {
        Self::build(
            config.command.clone(),
            config.max_instances,
            Duration::from_secs(config.timeout_secs),
            environment,
            config.auth_token.clone(),
        )
    }

    fn build(
        command: Vec<String>,
        max_instances: usize,
        default_timeout: Duration,
        environment: &EnvironmentConfig,
        auth_token: Option<String>,
    ) -> Self {
        let max_instances = max_instances.max(1);
        Self {
            inner: Arc::new(PoolInner {
                command,
                max_instances,
                default_timeout,
                semaphore: Arc::new(Semaphore::new(max_instances)),
                idle: Mutex::new(Vec::new()),
                live: AtomicUsize::new(0),
                waiting: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
                auth_token: RwLock::new(auth_token),
                env: environment.variables.clone(),
                work_root: environment.work_root.clone(),
            }),
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.inner.default_timeout
    }

    fn auth_token(&self) -> Option<String> {
        self.inner
            .auth_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Wait for a free slot and hand out an instance
    pub async fn acquire(&self) -> Result<InstanceGuard> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(WorkerError::Assistant("assistant pool is shut down".to_string()));
        }

        let permit = {
            let _waiting = WaitingGuard::enter(&self.inner.waiting);
            self.inner
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::Assistant("assistant pool is shut down".to_string()))?
        };

        let reused = self.inner.idle().pop();
        let instance = match reused {
            Some(instance) => instance,
            None => self.inner.new_instance()?,
        };

        Ok(InstanceGuard {
            instance: Some(instance),
            inner: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    fn instance_envs(&self, guard: &InstanceGuard) -> HashMap<String, String> {
        let mut envs = self.inner.env.clone();
        envs.insert("CLAUDE_INSTANCE_ID".to_string(), guard.id().to_string());
        envs.insert(
            "CLAUDE_WORK_DIR".to_string(),
            guard.work_dir().display().to_string(),
        );
        envs.insert("CLAUDE_HEADLESS".to_string(), "true".to_string());
        envs.insert(
            "CLAUDE_MAX_PARALLEL".to_string(),
            self.inner.max_instances.to_string(),
        );
        if let Some(token) = self.auth_token() {
            envs.insert("CLAUDE_AUTH_TOKEN".to_string(), token);
        }
        envs
    }

    /// Run one operation on a pooled instance.
    ///
    /// Always yields JSON: the CLI result, or `{"error": .., "success": false}`
    /// on spawn failure, non-zero exit, unparsable output or timeout.
    #[tracing::instrument(skip(self, params, timeout), fields(operation = %operation))]
    pub async fn execute_on_instance(
        &self,
        operation: AssistantOperation,
        params: Value,
        timeout: Duration,
    ) -> Value {
        let guard = match self.acquire().await {
            Ok(guard) => guard,
            Err(e) => return failure(e.to_string()),
        };

        let args = match build_args(operation, &params, guard.work_dir()).await {
            Ok(args) => args,
            Err(e) => return failure(e.to_string()),
        };

        let envs = self.instance_envs(&guard);
        let cwd = params
            .get("working_dir")
            .and_then(Value::as_str)
            .map(PathBuf::from)
            .unwrap_or_else(|| guard.work_dir().to_path_buf());

        tracing::debug!(instance_id = %guard.id(), "running assistant operation");
        let allow_text = operation == AssistantOperation::Generate;
        match run_json_command(&self.inner.command, &args, &envs, Some(&cwd), timeout, allow_text)
            .await
        {
            Ok(output) => output,
            Err(error) => {
                tracing::warn!(instance_id = %guard.id(), "assistant operation failed: {}", error);
                failure(error)
            }
        }
    }

    /// Analyze, plan, fix and test a multi-file problem, fanning out across
    /// instances for the per-file phases.
    pub async fn solve_problem_parallel(
        &self,
        problem_id: &str,
        description: &str,
        files: &[String],
    ) -> Value {
        let timeout = self.inner.default_timeout;
        tracing::info!(problem_id, files = files.len(), "solving problem in parallel");

        let analyses = join_all(files.iter().map(|file| {
            self.execute_on_instance(AssistantOperation::Analyze, json!({ "file": file }), timeout)
        }))
        .await;

        let strategy = self
            .execute_on_instance(
                AssistantOperation::Generate,
                json!({
                    "requirements": format!("Create a solution strategy for: {}", description),
                    "context": { "problem_id": problem_id, "files": files, "analyses": analyses },
                }),
                timeout,
            )
            .await;

        let fixes = join_all(files.iter().map(|file| {
            self.execute_on_instance(
                AssistantOperation::Fix,
                json!({ "file": file, "issue": description }),
                timeout,
            )
        }))
        .await;

        let fixed: Vec<&String> = files
            .iter()
            .zip(&fixes)
            .filter(|(_, fix)| fix.get("success").and_then(Value::as_bool) != Some(false))
            .map(|(file, _)| file)
            .collect();

        let tests = join_all(fixed.iter().map(|file| {
            self.execute_on_instance(
                AssistantOperation::Test,
                json!({ "file": file, "framework": "pytest" }),
                timeout,
            )
        }))
        .await;

        json!({
            "problem_id": problem_id,
            "analyses": analyses,
            "strategy": strategy,
            "fixes": fixes,
            "tests": tests,
            "instance_count": self.status().active_instances,
        })
    }

    /// Ask the CLI whether it is logged in and cache its token.
    ///
    /// `auth status` must exit cleanly and report "Logged in".
    pub async fn detect_auth(&self) -> bool {
        if self.auth_token().is_some() {
            return true;
        }

        let timeout = Duration::from_secs(10);
        let none = HashMap::new();
        let status = run_json_command(
            &self.inner.command,
            &["auth".to_string(), "status".to_string()],
            &none,
            None,
            timeout,
            true,
        )
        .await;
        match &status {
            Ok(value) if value.to_string().contains("Logged in") => {}
            Ok(_) => {
                tracing::info!("assistant CLI is not logged in");
                return false;
            }
            Err(e) => {
                tracing::warn!("assistant auth status failed: {}", e);
                return false;
            }
        }

        let token = run_json_command(
            &self.inner.command,
            &["auth".to_string(), "token".to_string()],
            &none,
            None,
            timeout,
            true,
        )
        .await;

        let token = match token {
            Ok(value) => value
                .get("token")
                .or_else(|| value.get("output"))
                .and_then(Value::as_str)
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            Err(e) => {
                tracing::warn!("assistant auth token failed: {}", e);
                None
            }
        };

        let found = token.is_some();
        *self
            .inner
            .auth_token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = token;
        found
    }

    pub fn status(&self) -> PoolStatus {
        let busy = self.inner.max_instances - self.inner.semaphore.available_permits();
        PoolStatus {
            authenticated: self.auth_token().is_some(),
            max_instances: self.inner.max_instances,
            active_instances: self.inner.live.load(Ordering::SeqCst),
            busy_instances: busy,
            queued_requests: self.inner.waiting.load(Ordering::SeqCst),
        }
    }

    /// Drop idle instances and their work dirs. Busy instances are removed
    /// when they come back.
    pub fn cleanup(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        let drained: Vec<Instance> = self.inner.idle().drain(..).collect();
        self.inner.live.fetch_sub(drained.len(), Ordering::SeqCst);
        tracing::debug!(removed = drained.len(), "assistant pool cleaned up");
    }
}

fn failure(error: String) -> Value {
    json!({ "error": error, "success": false })
}

#[async_trait]
impl Assistant for AssistantPool {
    async fn call(&self, request: AssistantRequest) -> AssistantResponse {
        let started = Instant::now();
        let output = self
            .execute_on_instance(request.operation, request.params(), request.timeout)
            .await;
        AssistantResponse::from_output(output, started.elapsed().as_secs_f64())
    }
}
