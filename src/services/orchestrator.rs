use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use serde::Serialize;
use serde_json::{json, Map, Value};
use time::OffsetDateTime;
use tokio::sync::{Mutex, Semaphore};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    ApiDefinition, Environment, Execution, ExecutionKind, ExecutionStatus, ExecutionSummary,
    ExecutionTarget, NewVariable, PreparedRequest, Progress, ResultStatus, TestCase, TestResult,
    Variable, VariableScope,
};
use crate::repositories::{CatalogStore, ExecutionStore, VariableStore};
use crate::services::assertion::validate_all_assertions;
use crate::services::request_builder::{build_request, is_absolute_url};
use crate::services::resolver::{
    active_variables, validate_variables, ScopeContext, ScopeSnapshot, VariableResolver,
    VariableValidation,
};
use crate::services::transport::{round2, HttpTransport};

/// Runs executions: resolves, sends, asserts and records every test case
#[derive(Clone)]
pub struct Orchestrator {
    catalog: Arc<dyn CatalogStore>,
    variables: Arc<dyn VariableStore>,
    executions: Arc<dyn ExecutionStore>,
    transport: HttpTransport,
    max_concurrency: usize,
}

/// Per-execution state shared by its test cases
struct CaseRun {
    execution_id: Uuid,
    user_id: Uuid,
    session_id: String,
    environment: Environment,
    progress: Mutex<Progress>,
}

impl CaseRun {
    fn scope(&self) -> ScopeContext {
        ScopeContext {
            environment_id: Some(self.environment.id),
            user_id: Some(self.user_id),
            session_id: Some(self.session_id.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentStatus {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub has_base_url: bool,
}

/// A visible variable with sensitive values masked
#[derive(Debug, Clone, Serialize)]
pub struct VariablePreview {
    pub name: String,
    pub scope: VariableScope,
    pub value: String,
    pub is_sensitive: bool,
}

impl From<&Variable> for VariablePreview {
    fn from(var: &Variable) -> Self {
        Self {
            name: var.name.clone(),
            scope: var.scope.scope(),
            value: var.display_value().to_string(),
            is_sensitive: var.is_sensitive,
        }
    }
}

/// Readiness of one test case against one environment
#[derive(Debug, Clone, Serialize)]
pub struct Readiness {
    pub test_case_id: Uuid,
    pub environment: EnvironmentStatus,
    pub available_variables: usize,
    /// Highest precedence first
    pub variables: Vec<VariablePreview>,
    pub validation: VariableValidation,
    pub ready: bool,
}

impl Orchestrator {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        variables: Arc<dyn VariableStore>,
        executions: Arc<dyn ExecutionStore>,
        transport: HttpTransport,
        max_concurrency: usize,
    ) -> Self {
        Self {
            catalog,
            variables,
            executions,
            transport,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Drive a pending execution to a terminal state.
    ///
    /// Executions that are no longer pending are returned untouched. Only
    /// store failures escalate to `Failed`; per-case problems become results.
    pub async fn run(&self, execution_id: Uuid) -> AppResult<Execution> {
        let execution = self.load_execution(execution_id).await?;
        if execution.status != ExecutionStatus::Pending {
            tracing::info!(
                execution_id = %execution_id,
                status = %execution.status,
                "Execution is not pending, skipping"
            );
            return Ok(execution);
        }

        let execution = match self
            .executions
            .transition(execution_id, ExecutionStatus::Running, None)
            .await
        {
            Ok(execution) => execution,
            Err(AppError::InvalidTransition { from, .. }) => {
                tracing::info!(execution_id = %execution_id, status = %from, "Execution left pending before start");
                return self.load_execution(execution_id).await;
            }
            Err(e) => return Err(e),
        };

        let session_id = session_id_for(&execution);
        tracing::info!(
            execution_id = %execution_id,
            kind = execution.kind.as_str(),
            session_id = %session_id,
            "Execution started"
        );

        let outcome = self.execute(&execution, &session_id).await;
        self.cleanup_session(&session_id).await;

        let finished = match outcome {
            Ok(summary) => self.complete(execution_id, summary).await,
            Err(e) => Err(e),
        };

        match finished {
            Ok(execution) => Ok(execution),
            Err(e) => {
                tracing::error!(execution_id = %execution_id, error = %e, "Execution failed");
                self.executions
                    .transition(execution_id, ExecutionStatus::Failed, Some(e.to_string()))
                    .await
            }
        }
    }

    async fn execute(&self, execution: &Execution, session_id: &str) -> AppResult<ExecutionSummary> {
        self.executions
            .record_session(execution.id, session_id)
            .await?;

        let environment_id = execution.config.environment_id;
        let environment = self
            .catalog
            .get_environment(environment_id)
            .await?
            .filter(|e| e.is_active)
            .ok_or_else(|| {
                AppError::Validation(format!("Environment {} not found or inactive", environment_id))
            })?;

        self.materialize_overrides(session_id, &execution.config.variables, execution.user_id)
            .await?;

        let case_ids = self.case_ids(&execution.target).await?;
        let parallel = execution.kind == ExecutionKind::Batch && execution.config.parallel;

        let progress = Progress {
            total: case_ids.len(),
            ..Progress::default()
        };
        self.executions
            .update_progress(execution.id, progress)
            .await?;

        let run = Arc::new(CaseRun {
            execution_id: execution.id,
            user_id: execution.user_id,
            session_id: session_id.to_string(),
            environment,
            progress: Mutex::new(progress),
        });

        let results = if parallel {
            self.run_parallel(run, case_ids).await?
        } else {
            self.run_sequential(run, case_ids).await?
        };

        let total = results.len();
        let success_count = results
            .iter()
            .filter(|r| r.status == ResultStatus::Pass)
            .count();

        Ok(ExecutionSummary {
            total,
            success_count,
            failed_count: total - success_count,
            execution_mode: if parallel { "parallel" } else { "sequential" }.to_string(),
        })
    }

    async fn complete(&self, execution_id: Uuid, summary: ExecutionSummary) -> AppResult<Execution> {
        self.executions
            .record_summary(execution_id, summary.clone())
            .await?;

        let status = if self.cancel_requested(execution_id).await? {
            ExecutionStatus::Cancelled
        } else {
            ExecutionStatus::Completed
        };
        let execution = self.executions.transition(execution_id, status, None).await?;

        tracing::info!(
            execution_id = %execution_id,
            status = %status,
            total = summary.total,
            success = summary.success_count,
            failed = summary.failed_count,
            "Execution finished"
        );
        Ok(execution)
    }

    /// Ordered, de-duplicated test case ids for a target
    async fn case_ids(&self, target: &ExecutionTarget) -> AppResult<Vec<Uuid>> {
        match target {
            ExecutionTarget::TestCase(id) => Ok(vec![*id]),
            ExecutionTarget::TestCases(ids) => {
                let mut seen = HashSet::new();
                Ok(ids.iter().copied().filter(|id| seen.insert(*id)).collect())
            }
            ExecutionTarget::Suite(suite_id) => {
                let cases = self.catalog.list_suite_cases(*suite_id).await?;
                if cases.is_empty() {
                    return Err(AppError::Validation(
                        "test suite is empty or does not exist".to_string(),
                    ));
                }
                Ok(cases.into_iter().map(|c| c.id).collect())
            }
        }
    }

    async fn run_sequential(&self, run: Arc<CaseRun>, case_ids: Vec<Uuid>) -> AppResult<Vec<TestResult>> {
        let mut results = Vec::with_capacity(case_ids.len());
        for case_id in case_ids {
            results.push(self.run_and_record(&run, case_id).await?);
        }
        Ok(results)
    }

    async fn run_parallel(&self, run: Arc<CaseRun>, case_ids: Vec<Uuid>) -> AppResult<Vec<TestResult>> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));

        let handles: Vec<_> = case_ids
            .into_iter()
            .map(|case_id| {
                let this = self.clone();
                let run = run.clone();
                let semaphore = semaphore.clone();

                tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.map_err(|e| {
                        AppError::Internal(format!("Concurrency limiter closed: {}", e))
                    })?;
                    this.run_and_record(&run, case_id).await
                })
            })
            .collect();

        // Siblings always run to completion; the first store failure is reported afterwards
        let mut results = Vec::with_capacity(handles.len());
        let mut first_error = None;
        for joined in join_all(handles).await {
            match joined {
                Ok(Ok(result)) => results.push(result),
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    first_error.get_or_insert(AppError::Internal(format!(
                        "Test case task aborted: {}",
                        e
                    )));
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(results),
        }
    }

    /// Run (or skip, when cancelled) one case, persist its result and publish progress
    async fn run_and_record(&self, run: &CaseRun, case_id: Uuid) -> AppResult<TestResult> {
        let result = if self.cancel_requested(run.execution_id).await? {
            tracing::info!(execution_id = %run.execution_id, test_case_id = %case_id, "Skipping test case after cancellation");
            TestResult::skipped(run.execution_id, case_id)
        } else {
            self.run_case(run, case_id).await?
        };

        let result = self.executions.insert_result(result).await?;

        let mut progress = run.progress.lock().await;
        progress.completed += 1;
        if result.status == ResultStatus::Pass {
            progress.success += 1;
        } else {
            progress.failed += 1;
        }
        self.executions
            .update_progress(run.execution_id, *progress)
            .await?;

        Ok(result)
    }

    /// Per-case problems come back as an `error` result; `Err` means a store failed
    async fn run_case(&self, run: &CaseRun, case_id: Uuid) -> AppResult<TestResult> {
        let started = Instant::now();
        let execution_id = run.execution_id;

        let Some(case) = self
            .catalog
            .get_test_case(case_id)
            .await?
            .filter(|c| c.is_active)
        else {
            tracing::warn!(execution_id = %execution_id, test_case_id = %case_id, "Test case not found or inactive");
            return Ok(TestResult::error(
                execution_id,
                case_id,
                format!("Test case {} not found or inactive", case_id),
            ));
        };

        let Some(api) = self.catalog.get_api(case.api_id).await? else {
            tracing::warn!(execution_id = %execution_id, test_case_id = %case_id, api_id = %case.api_id, "API definition not found");
            return Ok(TestResult::error(
                execution_id,
                case_id,
                format!("API definition {} not found", case.api_id),
            ));
        };

        let resolver =
            VariableResolver::load(self.variables.as_ref(), &run.scope(), &Map::new()).await?;

        let request = match build_request(&run.environment, &api, &case.request, &resolver) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(execution_id = %execution_id, test_case_id = %case_id, error = %e, "Failed to build request");
                let mut result = TestResult::error(execution_id, case_id, e.to_string());
                result.duration_ms = elapsed_ms(started);
                return Ok(result);
            }
        };

        let mut result = match self.transport.send(&request).await {
            Ok(response) => {
                let report = validate_all_assertions(&case.assertions, &response);
                let status = if report.all_passed {
                    ResultStatus::Pass
                } else {
                    tracing::debug!(
                        execution_id = %execution_id,
                        test_case_id = %case_id,
                        failed = report.failed,
                        "Assertions failed"
                    );
                    ResultStatus::Fail
                };

                let mut result = TestResult::new(execution_id, case_id, status);
                result.response = Some(response);
                result.assertions = report;
                result
            }
            Err(e) => {
                tracing::warn!(
                    execution_id = %execution_id,
                    test_case_id = %case_id,
                    kind = e.kind(),
                    error = %e,
                    "Transport failure"
                );
                TestResult::error(execution_id, case_id, e.to_string())
            }
        };

        result.request = Some(request);
        result.duration_ms = elapsed_ms(started);

        tracing::info!(
            execution_id = %execution_id,
            test_case_id = %case_id,
            status = result.status.as_str(),
            duration_ms = result.duration_ms,
            "Test case finished"
        );
        Ok(result)
    }

    async fn materialize_overrides(
        &self,
        session_id: &str,
        overrides: &Map<String, Value>,
        user_id: Uuid,
    ) -> AppResult<()> {
        for (name, value) in overrides {
            self.variables
                .create(NewVariable::temporary(session_id, name.clone(), value, Some(user_id)))
                .await?;
        }
        Ok(())
    }

    /// Best-effort; never fails the execution
    async fn cleanup_session(&self, session_id: &str) {
        match self.variables.purge_session(session_id).await {
            Ok(purged) => {
                tracing::debug!(session_id = %session_id, purged, "Temporary variables cleaned up")
            }
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Failed to clean up temporary variables")
            }
        }
    }

    async fn cancel_requested(&self, execution_id: Uuid) -> AppResult<bool> {
        Ok(self
            .executions
            .get_execution(execution_id)
            .await?
            .map(|e| e.cancel_requested)
            .unwrap_or(false))
    }

    async fn load_execution(&self, execution_id: Uuid) -> AppResult<Execution> {
        self.executions
            .get_execution(execution_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Execution".to_string()))
    }

    /// Check environment state and variable coverage for a test case without sending anything
    pub async fn prepare(
        &self,
        test_case_id: Uuid,
        environment_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Readiness> {
        let (case, api, environment) = self.load_case(test_case_id, environment_id).await?;

        let ctx = ScopeContext {
            environment_id: Some(environment.id),
            user_id: Some(user_id),
            session_id: None,
        };
        let visible = active_variables(self.variables.as_ref(), &ctx).await?;
        let snapshot = ScopeSnapshot::from_variables(&visible);

        let template = json!({
            "base_url": environment.base_url,
            "url": api.url,
            "headers": api.headers,
            "query_params": api.query_params,
            "request": case.request.to_value(),
        });
        let validation = validate_variables(&template, &snapshot);

        let has_base_url = environment.has_base_url();
        let ready = environment.is_active
            && (has_base_url || is_absolute_url(&api.url))
            && validation.is_valid;

        Ok(Readiness {
            test_case_id,
            environment: EnvironmentStatus {
                id: environment.id,
                name: environment.name,
                is_active: environment.is_active,
                has_base_url,
            },
            available_variables: snapshot.names().len(),
            variables: visible.iter().map(VariablePreview::from).collect(),
            validation,
            ready,
        })
    }

    /// Resolve a test case into the request it would send
    pub async fn dry_run(
        &self,
        test_case_id: Uuid,
        environment_id: Uuid,
        user_id: Uuid,
        overrides: &Map<String, Value>,
    ) -> AppResult<PreparedRequest> {
        let (case, api, environment) = self.load_case(test_case_id, environment_id).await?;

        let ctx = ScopeContext {
            environment_id: Some(environment.id),
            user_id: Some(user_id),
            session_id: None,
        };
        let resolver = VariableResolver::load(self.variables.as_ref(), &ctx, overrides).await?;

        build_request(&environment, &api, &case.request, &resolver)
            .map_err(|e| AppError::Validation(e.to_string()))
    }

    async fn load_case(
        &self,
        test_case_id: Uuid,
        environment_id: Uuid,
    ) -> AppResult<(TestCase, ApiDefinition, Environment)> {
        let case = self
            .catalog
            .get_test_case(test_case_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Test case".to_string()))?;
        let api = self
            .catalog
            .get_api(case.api_id)
            .await?
            .ok_or_else(|| AppError::NotFound("API definition".to_string()))?;
        let environment = self
            .catalog
            .get_environment(environment_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Environment".to_string()))?;

        Ok((case, api, environment))
    }
}

/// `{kind}_{execution_id}_{unix_micros}`
pub fn session_id_for(execution: &Execution) -> String {
    let micros = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000;
    format!("{}_{}_{}", execution.kind.as_str(), execution.id, micros)
}

fn elapsed_ms(started: Instant) -> f64 {
    round2(started.elapsed().as_secs_f64() * 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AssertionRule, AssertionType, ExecutionConfig, NewExecution, Operator, RequestTemplate,
        ScopeKey,
    };
    use crate::repositories::MemoryStore;
    use crate::services::request_builder::string_map;
    use std::time::Duration;

    struct Fixture {
        store: MemoryStore,
        orchestrator: Orchestrator,
        environment_id: Uuid,
        user_id: Uuid,
    }

    /// A base URL nothing listens on
    fn closed_port_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("http://127.0.0.1:{}", port)
    }

    async fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let environment_id = Uuid::new_v4();
        store
            .insert_environment(Environment {
                id: environment_id,
                name: "dev".to_string(),
                base_url: closed_port_url(),
                headers: string_map([("X-Env", "dev")]),
                query_params: Map::new(),
                is_active: true,
            })
            .await;

        let transport = HttpTransport::new(Duration::from_secs(2), true).unwrap();
        let orchestrator = Orchestrator::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            transport,
            4,
        );

        Fixture {
            store,
            orchestrator,
            environment_id,
            user_id: Uuid::new_v4(),
        }
    }

    async fn seed_case(store: &MemoryStore, method: &str, url: &str) -> Uuid {
        let api_id = Uuid::new_v4();
        store
            .insert_api(ApiDefinition {
                id: api_id,
                name: "users".to_string(),
                method: method.to_string(),
                url: url.to_string(),
                headers: Map::new(),
                query_params: Map::new(),
            })
            .await;

        let case_id = Uuid::new_v4();
        store
            .insert_test_case(TestCase {
                id: case_id,
                name: "list users".to_string(),
                api_id,
                request: RequestTemplate::default(),
                assertions: vec![AssertionRule::new(
                    AssertionType::StatusCode,
                    Operator::Eq,
                    json!(200),
                )],
                suite_id: None,
                sort_order: 0,
                is_active: true,
            })
            .await;
        case_id
    }

    async fn submit(fx: &Fixture, kind: ExecutionKind, target: ExecutionTarget) -> Uuid {
        submit_with(fx, kind, target, Map::new()).await
    }

    async fn submit_with(
        fx: &Fixture,
        kind: ExecutionKind,
        target: ExecutionTarget,
        variables: Map<String, Value>,
    ) -> Uuid {
        let execution = Execution::pending(NewExecution {
            kind,
            target,
            config: ExecutionConfig {
                environment_id: fx.environment_id,
                variables,
                parallel: false,
            },
            user_id: fx.user_id,
        });
        fx.store.create_execution(execution).await.unwrap().id
    }

    #[tokio::test]
    async fn test_missing_test_case_becomes_error_result() {
        let fx = fixture().await;
        let missing = Uuid::new_v4();
        let id = submit(&fx, ExecutionKind::Single, ExecutionTarget::TestCase(missing)).await;

        let execution = fx.orchestrator.run(id).await.unwrap();

        assert_eq!(execution.status, ExecutionStatus::Completed);
        let results = fx.store.list_results(id).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, ResultStatus::Error);
        assert!(results[0].error_message.as_deref().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_unsupported_method_is_per_case_error() {
        let fx = fixture().await;
        let case_id = seed_case(&fx.store, "FETCH", "/users").await;
        let id = submit(&fx, ExecutionKind::Single, ExecutionTarget::TestCase(case_id)).await;

        let execution = fx.orchestrator.run(id).await.unwrap();

        assert_eq!(execution.status, ExecutionStatus::Completed);
        let results = fx.store.list_results(id).await.unwrap();
        assert_eq!(results[0].status, ResultStatus::Error);
        assert!(results[0].request.is_none());
    }

    #[tokio::test]
    async fn test_connection_failure_keeps_request_snapshot() {
        let fx = fixture().await;
        let case_id = seed_case(&fx.store, "get", "/users").await;
        let id = submit(&fx, ExecutionKind::Single, ExecutionTarget::TestCase(case_id)).await;

        fx.orchestrator.run(id).await.unwrap();

        let results = fx.store.list_results(id).await.unwrap();
        assert_eq!(results[0].status, ResultStatus::Error);
        let request = results[0].request.as_ref().unwrap();
        assert_eq!(request.method, "GET");
        assert!(request.url.ends_with("/users"));
        assert_eq!(request.headers.get("X-Env").map(String::as_str), Some("dev"));
    }

    #[tokio::test]
    async fn test_batch_collapses_duplicate_ids() {
        let fx = fixture().await;
        let a = seed_case(&fx.store, "GET", "/a").await;
        let b = seed_case(&fx.store, "GET", "/b").await;
        let id = submit(
            &fx,
            ExecutionKind::Batch,
            ExecutionTarget::TestCases(vec![a, b, a]),
        )
        .await;

        let execution = fx.orchestrator.run(id).await.unwrap();

        let summary = execution.summary.unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.failed_count, 2);
        assert_eq!(summary.execution_mode, "sequential");
        assert_eq!(execution.progress.completed, 2);
        assert_eq!(fx.store.list_results(id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_suite_fails_execution() {
        let fx = fixture().await;
        let id = submit(&fx, ExecutionKind::Suite, ExecutionTarget::Suite(Uuid::new_v4())).await;

        let execution = fx.orchestrator.run(id).await.unwrap();

        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert_eq!(
            execution.error_message.as_deref(),
            Some("Validation error: test suite is empty or does not exist")
        );
    }

    #[tokio::test]
    async fn test_inactive_environment_fails_execution() {
        let fx = fixture().await;
        let case_id = seed_case(&fx.store, "GET", "/users").await;
        let id = submit(&fx, ExecutionKind::Single, ExecutionTarget::TestCase(case_id)).await;
        fx.store
            .insert_environment(Environment {
                id: fx.environment_id,
                name: "dev".to_string(),
                base_url: "http://localhost".to_string(),
                headers: Map::new(),
                query_params: Map::new(),
                is_active: false,
            })
            .await;

        let execution = fx.orchestrator.run(id).await.unwrap();

        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert!(fx.store.list_results(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_overrides_are_purged_after_run() {
        let fx = fixture().await;
        let case_id = seed_case(&fx.store, "GET", "/users").await;
        let mut overrides = Map::new();
        overrides.insert("token".to_string(), json!("abc"));
        overrides.insert("limit".to_string(), json!(5));
        overrides.insert("debug".to_string(), json!(true));
        let id = submit_with(
            &fx,
            ExecutionKind::Batch,
            ExecutionTarget::TestCases(vec![case_id]),
            overrides,
        )
        .await;

        let execution = fx.orchestrator.run(id).await.unwrap();

        let session = execution.session_id.unwrap();
        assert!(session.starts_with(&format!("batch_{}_", id)));
        let remaining = fx
            .store
            .list_active(&ScopeKey::Temporary(session))
            .await
            .unwrap();
        assert!(remaining.is_empty());
        assert!(fx.store.all_variables().await.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_start_is_not_run() {
        let fx = fixture().await;
        let case_id = seed_case(&fx.store, "GET", "/users").await;
        let id = submit(&fx, ExecutionKind::Single, ExecutionTarget::TestCase(case_id)).await;
        fx.store.request_cancel(id).await.unwrap();

        let execution = fx.orchestrator.run(id).await.unwrap();

        assert_eq!(execution.status, ExecutionStatus::Cancelled);
        assert!(execution.started_at.is_none());
        assert!(fx.store.list_results(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_terminal_execution_is_left_alone() {
        let fx = fixture().await;
        let case_id = seed_case(&fx.store, "GET", "/users").await;
        let id = submit(&fx, ExecutionKind::Single, ExecutionTarget::TestCase(case_id)).await;

        fx.orchestrator.run(id).await.unwrap();
        let again = fx.orchestrator.run(id).await.unwrap();

        assert_eq!(again.status, ExecutionStatus::Completed);
        assert_eq!(fx.store.list_results(id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dry_run_resolves_without_sending() {
        let fx = fixture().await;
        let case_id = seed_case(&fx.store, "post", "/users/{{user_id}}").await;
        let mut overrides = Map::new();
        overrides.insert("user_id".to_string(), json!(42));

        let request = fx
            .orchestrator
            .dry_run(case_id, fx.environment_id, fx.user_id, &overrides)
            .await
            .unwrap();

        assert_eq!(request.method, "POST");
        assert!(request.url.ends_with("/users/42"));
    }

    #[tokio::test]
    async fn test_prepare_reports_missing_variables() {
        let fx = fixture().await;
        let case_id = seed_case(&fx.store, "GET", "/users/{{user_id}}?t={{timestamp()}}").await;

        let readiness = fx
            .orchestrator
            .prepare(case_id, fx.environment_id, fx.user_id)
            .await
            .unwrap();

        assert!(!readiness.ready);
        assert!(readiness.environment.has_base_url);
        assert_eq!(readiness.validation.missing, vec!["user_id".to_string()]);

        fx.store
            .create(NewVariable {
                name: "user_id".to_string(),
                value: "7".to_string(),
                var_type: Default::default(),
                scope: ScopeKey::Environment(fx.environment_id),
                description: None,
                created_by: None,
                is_sensitive: false,
            })
            .await
            .unwrap();

        let readiness = fx
            .orchestrator
            .prepare(case_id, fx.environment_id, fx.user_id)
            .await
            .unwrap();
        assert!(readiness.ready);
        assert_eq!(readiness.available_variables, 1);
    }

    #[tokio::test]
    async fn test_prepare_masks_sensitive_values() {
        let fx = fixture().await;
        let case_id = seed_case(&fx.store, "GET", "/users").await;
        for (scope, name, value, is_sensitive) in [
            (ScopeKey::Personal(fx.user_id), "api_key", "s3cr3t", true),
            (ScopeKey::Global, "region", "eu", false),
        ] {
            fx.store
                .create(NewVariable {
                    name: name.to_string(),
                    value: value.to_string(),
                    var_type: Default::default(),
                    scope,
                    description: None,
                    created_by: None,
                    is_sensitive,
                })
                .await
                .unwrap();
        }

        let readiness = fx
            .orchestrator
            .prepare(case_id, fx.environment_id, fx.user_id)
            .await
            .unwrap();

        let shown: Vec<_> = readiness
            .variables
            .iter()
            .map(|v| (v.name.as_str(), v.scope, v.value.as_str()))
            .collect();
        assert_eq!(
            shown,
            vec![
                ("api_key", VariableScope::Personal, "***"),
                ("region", VariableScope::Global, "eu"),
            ]
        );
        assert!(readiness.variables[0].is_sensitive);
    }

    #[tokio::test]
    async fn test_prepare_unknown_test_case() {
        let fx = fixture().await;
        let err = fx
            .orchestrator
            .prepare(Uuid::new_v4(), fx.environment_id, fx.user_id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
