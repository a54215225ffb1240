use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};
use time::OffsetDateTime;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{
    percentage, Execution, ExecutionConfig, ExecutionKind, ExecutionStatus, ExecutionSummary,
    ExecutionTarget, NewExecution, Progress, ResultStatus, TestResult,
};
use crate::queue::{ExecutionJob, JobQueue};
use crate::repositories::{ExecutionStore, VariableStore};
use crate::services::Orchestrator;

const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Worker and housekeeping settings
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Executions processed at once by this process
    pub worker_concurrency: usize,
    /// How long one dequeue call blocks
    pub dequeue_timeout_seconds: u64,
    pub temp_var_max_age: Duration,
    pub cleanup_interval: Duration,
}

impl EngineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            worker_concurrency: config.worker_concurrency,
            dequeue_timeout_seconds: 5,
            temp_var_max_age: Duration::from_secs(config.temp_var_max_age_hours * 3600),
            cleanup_interval: Duration::from_secs(config.cleanup_interval_seconds.max(1)),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_concurrency: 4,
            dequeue_timeout_seconds: 5,
            temp_var_max_age: Duration::from_secs(24 * 3600),
            cleanup_interval: Duration::from_secs(3600),
        }
    }
}

/// What to run
#[derive(Debug, Clone)]
pub enum Submission {
    Single { test_case_id: Uuid },
    Batch { test_case_ids: Vec<Uuid>, parallel: bool },
    Suite { suite_id: Uuid },
}

impl Submission {
    pub fn kind(&self) -> ExecutionKind {
        match self {
            Self::Single { .. } => ExecutionKind::Single,
            Self::Batch { .. } => ExecutionKind::Batch,
            Self::Suite { .. } => ExecutionKind::Suite,
        }
    }

    fn into_target(self) -> (ExecutionTarget, bool) {
        match self {
            Self::Single { test_case_id } => (ExecutionTarget::TestCase(test_case_id), false),
            Self::Batch {
                test_case_ids,
                parallel,
            } => (ExecutionTarget::TestCases(test_case_ids), parallel),
            Self::Suite { suite_id } => (ExecutionTarget::Suite(suite_id), false),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub submission: Submission,
    pub environment_id: Uuid,
    pub variables: Map<String, Value>,
    pub user_id: Uuid,
}

/// Poll snapshot of an execution
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionView {
    pub id: Uuid,
    pub kind: ExecutionKind,
    pub status: ExecutionStatus,
    pub progress: Progress,
    pub result: Option<ExecutionSummary>,
    pub error: Option<String>,
    pub cancel_requested: bool,
    #[serde(skip)]
    pub user_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub finished_at: Option<OffsetDateTime>,
}

impl From<Execution> for ExecutionView {
    fn from(e: Execution) -> Self {
        Self {
            id: e.id,
            kind: e.kind,
            status: e.status,
            progress: e.progress,
            result: e.summary,
            error: e.error_message,
            cancel_requested: e.cancel_requested,
            user_id: e.user_id,
            created_at: e.created_at,
            started_at: e.started_at,
            finished_at: e.finished_at,
        }
    }
}

/// Best-effort cancellation acknowledgement
#[derive(Debug, Clone, Serialize)]
pub struct CancelAck {
    pub execution_id: Uuid,
    pub status: ExecutionStatus,
    /// False when the execution had already finished
    pub accepted: bool,
    pub message: String,
}

/// Result counts by status
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSummary {
    pub total: usize,
    pub pass: usize,
    pub fail: usize,
    pub error: usize,
    pub skip: usize,
    pub pass_rate: f64,
}

impl ResultSummary {
    pub fn from_results(results: &[TestResult]) -> Self {
        let count = |status: ResultStatus| results.iter().filter(|r| r.status == status).count();
        let pass = count(ResultStatus::Pass);

        Self {
            total: results.len(),
            pass,
            fail: count(ResultStatus::Fail),
            error: count(ResultStatus::Error),
            skip: count(ResultStatus::Skip),
            pass_rate: percentage(pass, results.len()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResults {
    pub execution_id: Uuid,
    pub status: ExecutionStatus,
    pub summary: ResultSummary,
    pub results: Vec<TestResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub queue_length: u64,
    pub workers: usize,
}

/// Submission, polling and cancellation front of the orchestrator, plus its worker loops
pub struct ExecutionEngine {
    orchestrator: Orchestrator,
    executions: Arc<dyn ExecutionStore>,
    variables: Arc<dyn VariableStore>,
    queue: Arc<dyn JobQueue>,
    config: EngineConfig,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ExecutionEngine {
    pub fn new(
        orchestrator: Orchestrator,
        executions: Arc<dyn ExecutionStore>,
        variables: Arc<dyn VariableStore>,
        queue: Arc<dyn JobQueue>,
        config: EngineConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            orchestrator,
            executions,
            variables,
            queue,
            config,
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Create a pending execution and queue it. Returns at once.
    ///
    /// A queue failure marks the execution failed; the id is still returned.
    pub async fn submit(&self, request: SubmitRequest) -> AppResult<Uuid> {
        if let Submission::Batch { test_case_ids, .. } = &request.submission {
            if test_case_ids.is_empty() {
                return Err(AppError::Validation(
                    "test_case_ids must not be empty".to_string(),
                ));
            }
        }

        let kind = request.submission.kind();
        let (target, parallel) = request.submission.into_target();
        let execution = Execution::pending(NewExecution {
            kind,
            target,
            config: ExecutionConfig {
                environment_id: request.environment_id,
                variables: request.variables,
                parallel,
            },
            user_id: request.user_id,
        });

        let execution = self.executions.create_execution(execution).await?;
        let execution_id = execution.id;

        if let Err(e) = self.queue.enqueue(ExecutionJob::new(execution_id, kind)).await {
            tracing::error!(execution_id = %execution_id, error = %e, "Failed to enqueue execution");
            if let Err(e) = self
                .executions
                .transition(
                    execution_id,
                    ExecutionStatus::Failed,
                    Some(format!("Failed to enqueue execution: {}", e)),
                )
                .await
            {
                tracing::error!(execution_id = %execution_id, error = %e, "Failed to mark execution as failed");
            }
            return Ok(execution_id);
        }

        tracing::info!(
            execution_id = %execution_id,
            kind = kind.as_str(),
            user_id = %request.user_id,
            "Execution submitted"
        );
        Ok(execution_id)
    }

    pub async fn poll(&self, execution_id: Uuid) -> AppResult<ExecutionView> {
        Ok(self.load(execution_id).await?.into())
    }

    /// The execution, when it belongs to `user_id`
    pub async fn authorize(&self, execution_id: Uuid, user_id: Uuid) -> AppResult<Execution> {
        let execution = self.load(execution_id).await?;
        if execution.user_id != user_id {
            return Err(AppError::NotFound("Execution".to_string()));
        }
        Ok(execution)
    }

    pub async fn cancel(&self, execution_id: Uuid) -> AppResult<CancelAck> {
        let before = self.load(execution_id).await?;
        if before.status.is_terminal() {
            return Ok(CancelAck {
                execution_id,
                status: before.status,
                accepted: false,
                message: format!("Execution already {}", before.status),
            });
        }

        let after = self.executions.request_cancel(execution_id).await?;
        let message = match after.status {
            ExecutionStatus::Cancelled => "Execution cancelled".to_string(),
            ExecutionStatus::Running => {
                "Cancellation requested; running test cases will finish first".to_string()
            }
            other => format!("Execution already {}", other),
        };

        tracing::info!(execution_id = %execution_id, status = %after.status, "Cancellation requested");

        Ok(CancelAck {
            execution_id,
            status: after.status,
            accepted: matches!(
                after.status,
                ExecutionStatus::Cancelled | ExecutionStatus::Running
            ),
            message,
        })
    }

    pub async fn results(&self, execution_id: Uuid) -> AppResult<ExecutionResults> {
        let execution = self.load(execution_id).await?;
        let results = self.executions.list_results(execution_id).await?;

        Ok(ExecutionResults {
            execution_id,
            status: execution.status,
            summary: ResultSummary::from_results(&results),
            results,
        })
    }

    pub async fn list_executions(&self, user_id: Uuid, limit: u64) -> AppResult<Vec<ExecutionView>> {
        let executions = self.executions.list_executions_by_user(user_id, limit).await?;
        Ok(executions.into_iter().map(ExecutionView::from).collect())
    }

    pub async fn queue_stats(&self) -> AppResult<QueueStats> {
        Ok(QueueStats {
            queue_length: self.queue.queue_length().await?,
            workers: self.config.worker_concurrency,
        })
    }

    /// Soft-delete temporary variables older than the configured max age
    pub async fn sweep_expired_variables(&self) -> AppResult<u64> {
        let cutoff = OffsetDateTime::now_utc() - self.config.temp_var_max_age;
        let expired = self.variables.expire_temporary(cutoff).await?;
        if expired > 0 {
            tracing::info!(expired, "Expired temporary variables");
        }
        Ok(expired)
    }

    /// Poll until the execution is terminal
    pub async fn wait_for(&self, execution_id: Uuid, timeout: Duration) -> AppResult<ExecutionView> {
        let wait = async {
            loop {
                let view = self.poll(execution_id).await?;
                if view.status.is_terminal() {
                    return Ok::<_, AppError>(view);
                }
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
        };

        tokio::time::timeout(timeout, wait).await.map_err(|_| {
            AppError::Internal(format!(
                "Execution {} did not finish within {:?}",
                execution_id, timeout
            ))
        })?
    }

    /// Spawn the worker loops and the variable sweeper
    pub async fn start(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock().await;
        if !tasks.is_empty() {
            return;
        }

        for worker in 0..self.config.worker_concurrency.max(1) {
            let engine = self.clone();
            let shutdown_rx = self.shutdown_tx.subscribe();
            tasks.push(tokio::spawn(async move {
                engine.run_worker_loop(worker, shutdown_rx).await;
            }));
        }

        let engine = self.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();
        tasks.push(tokio::spawn(async move {
            engine.run_sweeper(shutdown_rx).await;
        }));

        tracing::info!(workers = self.config.worker_concurrency.max(1), "Execution engine started");
    }

    /// Stop taking jobs and wait for in-flight executions to finish
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);

        let tasks: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Engine task ended abnormally");
            }
        }

        tracing::info!("Execution engine stopped");
    }

    /// Dequeue and run executions until shutdown is signalled
    pub async fn run_worker_loop(&self, worker: usize, mut shutdown_rx: watch::Receiver<bool>) {
        tracing::debug!(worker, "Worker started, waiting for executions...");

        loop {
            // Check for shutdown
            if *shutdown_rx.borrow() {
                break;
            }

            let dequeued = tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                dequeued = self.queue.dequeue(self.config.dequeue_timeout_seconds) => dequeued,
            };

            match dequeued {
                Ok(Some(job)) => {
                    let execution_id = job.execution_id;
                    tracing::info!(
                        worker,
                        execution_id = %execution_id,
                        kind = job.kind.as_str(),
                        "Processing execution"
                    );

                    match self.orchestrator.run(execution_id).await {
                        Ok(execution) => {
                            tracing::info!(
                                worker,
                                execution_id = %execution_id,
                                status = %execution.status,
                                "Execution processed"
                            );
                        }
                        Err(e) => {
                            tracing::error!(worker, execution_id = %execution_id, error = %e, "Execution processing failed");
                        }
                    }
                }
                Ok(None) => {
                    // No job available, continue loop (dequeue already waited)
                }
                Err(e) => {
                    tracing::error!(worker, error = %e, "Error dequeuing execution");
                    // Brief sleep on error to prevent tight loop
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }

        tracing::debug!(worker, "Worker stopped");
    }

    async fn run_sweeper(&self, mut shutdown_rx: watch::Receiver<bool>) {
        // tokio panics on a zero period
        let period = self.config.cleanup_interval.max(MIN_SWEEP_INTERVAL);
        let mut interval = tokio::time::interval(period);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.sweep_expired_variables().await {
                        tracing::warn!(error = %e, "Failed to expire temporary variables");
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    }

    async fn load(&self, execution_id: Uuid) -> AppResult<Execution> {
        self.executions
            .get_execution(execution_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Execution".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewVariable, ScopeKey};
    use crate::queue::InMemoryQueue;
    use crate::repositories::MemoryStore;
    use crate::services::HttpTransport;
    use async_trait::async_trait;

    struct BrokenQueue;

    #[async_trait]
    impl JobQueue for BrokenQueue {
        async fn enqueue(&self, _job: ExecutionJob) -> AppResult<()> {
            Err(AppError::Queue("connection refused".to_string()))
        }

        async fn dequeue(&self, _timeout_seconds: u64) -> AppResult<Option<ExecutionJob>> {
            Ok(None)
        }

        async fn queue_length(&self) -> AppResult<u64> {
            Ok(0)
        }
    }

    fn engine_with(store: &MemoryStore, queue: Arc<dyn JobQueue>) -> ExecutionEngine {
        engine_with_config(store, queue, EngineConfig::default())
    }

    fn engine_with_config(
        store: &MemoryStore,
        queue: Arc<dyn JobQueue>,
        config: EngineConfig,
    ) -> ExecutionEngine {
        let transport = HttpTransport::new(Duration::from_secs(1), true).unwrap();
        let orchestrator = Orchestrator::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            transport,
            2,
        );
        ExecutionEngine::new(
            orchestrator,
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            queue,
            config,
        )
    }

    fn single(user_id: Uuid) -> SubmitRequest {
        SubmitRequest {
            submission: Submission::Single {
                test_case_id: Uuid::new_v4(),
            },
            environment_id: Uuid::new_v4(),
            variables: Map::new(),
            user_id,
        }
    }

    #[tokio::test]
    async fn test_submit_enqueues_pending_execution() {
        let store = MemoryStore::new();
        let queue = Arc::new(InMemoryQueue::new());
        let engine = engine_with(&store, queue.clone());

        let id = engine.submit(single(Uuid::new_v4())).await.unwrap();

        let view = engine.poll(id).await.unwrap();
        assert_eq!(view.status, ExecutionStatus::Pending);
        assert_eq!(queue.queue_length().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_enqueue_failure_still_returns_id() {
        let store = MemoryStore::new();
        let engine = engine_with(&store, Arc::new(BrokenQueue));

        let id = engine.submit(single(Uuid::new_v4())).await.unwrap();

        let view = engine.poll(id).await.unwrap();
        assert_eq!(view.status, ExecutionStatus::Failed);
        assert!(view.error.unwrap().contains("enqueue"));
    }

    #[tokio::test]
    async fn test_empty_batch_rejected() {
        let store = MemoryStore::new();
        let engine = engine_with(&store, Arc::new(InMemoryQueue::new()));

        let mut request = single(Uuid::new_v4());
        request.submission = Submission::Batch {
            test_case_ids: vec![],
            parallel: true,
        };

        assert!(matches!(
            engine.submit(request).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_poll_unknown_execution() {
        let store = MemoryStore::new();
        let engine = engine_with(&store, Arc::new(InMemoryQueue::new()));

        assert!(matches!(
            engine.poll(Uuid::new_v4()).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_pending_then_terminal() {
        let store = MemoryStore::new();
        let engine = engine_with(&store, Arc::new(InMemoryQueue::new()));
        let id = engine.submit(single(Uuid::new_v4())).await.unwrap();

        let ack = engine.cancel(id).await.unwrap();
        assert!(ack.accepted);
        assert_eq!(ack.status, ExecutionStatus::Cancelled);

        let ack = engine.cancel(id).await.unwrap();
        assert!(!ack.accepted);
        assert_eq!(ack.status, ExecutionStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_authorize_hides_foreign_executions() {
        let store = MemoryStore::new();
        let engine = engine_with(&store, Arc::new(InMemoryQueue::new()));
        let owner = Uuid::new_v4();
        let id = engine.submit(single(owner)).await.unwrap();

        assert!(engine.authorize(id, owner).await.is_ok());
        assert!(matches!(
            engine.authorize(id, Uuid::new_v4()).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_worker_runs_submitted_execution() {
        let store = MemoryStore::new();
        let engine = Arc::new(engine_with(&store, Arc::new(InMemoryQueue::new())));
        engine.start().await;

        // Unknown environment: the execution fails, but it is picked up and finished
        let id = engine.submit(single(Uuid::new_v4())).await.unwrap();
        let view = engine.wait_for(id, Duration::from_secs(5)).await.unwrap();

        assert_eq!(view.status, ExecutionStatus::Failed);
        assert!(view.started_at.is_some());

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_sweep_expires_nothing_recent() {
        let store = MemoryStore::new();
        let engine = engine_with(&store, Arc::new(InMemoryQueue::new()));
        store
            .create(NewVariable::temporary(
                "batch_x_1",
                "token",
                &Value::String("abc".to_string()),
                None,
            ))
            .await
            .unwrap();

        assert_eq!(engine.sweep_expired_variables().await.unwrap(), 0);
        assert_eq!(
            store
                .list_active(&ScopeKey::Temporary("batch_x_1".to_string()))
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_sweeper_survives_zero_interval() {
        let store = MemoryStore::new();
        let config = EngineConfig {
            cleanup_interval: Duration::ZERO,
            temp_var_max_age: Duration::ZERO,
            ..EngineConfig::default()
        };
        let engine = Arc::new(engine_with_config(
            &store,
            Arc::new(InMemoryQueue::new()),
            config,
        ));
        let session = ScopeKey::Temporary("batch_y_1".to_string());
        store
            .create(NewVariable::temporary(
                "batch_y_1",
                "token",
                &Value::String("abc".to_string()),
                None,
            ))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        engine.start().await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(store.list_active(&session).await.unwrap().is_empty());
        engine.shutdown().await;
    }

    #[test]
    fn test_engine_config_clamps_zero_interval() {
        let mut config = Config::with_defaults("secret");
        config.cleanup_interval_seconds = 0;

        let engine_config = EngineConfig::from_config(&config);
        assert_eq!(engine_config.cleanup_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_result_summary_counts() {
        let exec = Uuid::new_v4();
        let results = vec![
            TestResult::new(exec, Uuid::new_v4(), ResultStatus::Pass),
            TestResult::new(exec, Uuid::new_v4(), ResultStatus::Fail),
            TestResult::error(exec, Uuid::new_v4(), "timeout"),
            TestResult::skipped(exec, Uuid::new_v4()),
        ];

        let summary = ResultSummary::from_results(&results);

        assert_eq!(summary.total, 4);
        assert_eq!(summary.pass, 1);
        assert_eq!(summary.fail, 1);
        assert_eq!(summary.error, 1);
        assert_eq!(summary.skip, 1);
        assert_eq!(summary.pass_rate, 25.0);
    }
}
