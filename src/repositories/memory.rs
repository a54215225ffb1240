use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    ApiDefinition, Environment, Execution, ExecutionStatus, ExecutionSummary, NewVariable,
    Progress, ScopeKey, TestCase, TestResult, Variable, VariableScope,
};
use crate::repositories::{apply_transition, CatalogStore, ExecutionStore, VariableStore};

/// In-memory store for tests and single-process deployments
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

#[derive(Default)]
struct MemoryStoreInner {
    variables: Vec<Variable>,
    test_cases: HashMap<Uuid, TestCase>,
    apis: HashMap<Uuid, ApiDefinition>,
    environments: HashMap<Uuid, Environment>,
    executions: HashMap<Uuid, Execution>,
    results: Vec<TestResult>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_test_case(&self, test_case: TestCase) {
        let mut inner = self.inner.lock().await;
        inner.test_cases.insert(test_case.id, test_case);
    }

    pub async fn insert_api(&self, api: ApiDefinition) {
        let mut inner = self.inner.lock().await;
        inner.apis.insert(api.id, api);
    }

    pub async fn insert_environment(&self, environment: Environment) {
        let mut inner = self.inner.lock().await;
        inner.environments.insert(environment.id, environment);
    }

    /// Every stored variable, active or not
    pub async fn all_variables(&self) -> Vec<Variable> {
        self.inner.lock().await.variables.clone()
    }
}

#[async_trait]
impl VariableStore for MemoryStore {
    async fn list_active(&self, scope: &ScopeKey) -> AppResult<Vec<Variable>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .variables
            .iter()
            .filter(|v| v.is_active && &v.scope == scope)
            .cloned()
            .collect())
    }

    async fn create(&self, input: NewVariable) -> AppResult<Variable> {
        let mut inner = self.inner.lock().await;
        if inner
            .variables
            .iter()
            .any(|v| v.is_active && v.scope == input.scope && v.name == input.name)
        {
            return Err(AppError::Conflict(format!("Variable {}", input.name)));
        }

        let now = OffsetDateTime::now_utc();
        let variable = Variable {
            id: Uuid::new_v4(),
            name: input.name,
            value: input.value,
            var_type: input.var_type,
            scope: input.scope,
            description: input.description,
            created_by: input.created_by,
            is_sensitive: input.is_sensitive,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        inner.variables.push(variable.clone());
        Ok(variable)
    }

    // Temporary variables are dropped outright, not soft-deleted
    async fn purge_session(&self, session_id: &str) -> AppResult<u64> {
        let mut inner = self.inner.lock().await;
        let before = inner.variables.len();
        inner.variables.retain(|var| {
            !(var.is_active && matches!(&var.scope, ScopeKey::Temporary(s) if s == session_id))
        });
        Ok((before - inner.variables.len()) as u64)
    }

    async fn expire_temporary(&self, cutoff: OffsetDateTime) -> AppResult<u64> {
        let mut inner = self.inner.lock().await;
        let before = inner.variables.len();
        inner.variables.retain(|var| {
            !(var.is_active
                && var.scope.scope() == VariableScope::Temporary
                && var.created_at < cutoff)
        });
        Ok((before - inner.variables.len()) as u64)
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn get_test_case(&self, id: Uuid) -> AppResult<Option<TestCase>> {
        Ok(self.inner.lock().await.test_cases.get(&id).cloned())
    }

    async fn get_api(&self, id: Uuid) -> AppResult<Option<ApiDefinition>> {
        Ok(self.inner.lock().await.apis.get(&id).cloned())
    }

    async fn get_environment(&self, id: Uuid) -> AppResult<Option<Environment>> {
        Ok(self.inner.lock().await.environments.get(&id).cloned())
    }

    async fn list_suite_cases(&self, suite_id: Uuid) -> AppResult<Vec<TestCase>> {
        let inner = self.inner.lock().await;
        let mut cases: Vec<TestCase> = inner
            .test_cases
            .values()
            .filter(|c| c.is_active && c.suite_id == Some(suite_id))
            .cloned()
            .collect();
        cases.sort_by_key(|c| (c.sort_order, c.id));
        Ok(cases)
    }
}

#[async_trait]
impl ExecutionStore for MemoryStore {
    async fn create_execution(&self, execution: Execution) -> AppResult<Execution> {
        let mut inner = self.inner.lock().await;
        if inner.executions.contains_key(&execution.id) {
            return Err(AppError::Conflict(format!("Execution {}", execution.id)));
        }
        inner.executions.insert(execution.id, execution.clone());
        Ok(execution)
    }

    async fn get_execution(&self, id: Uuid) -> AppResult<Option<Execution>> {
        Ok(self.inner.lock().await.executions.get(&id).cloned())
    }

    async fn list_executions_by_user(
        &self,
        user_id: Uuid,
        limit: u64,
    ) -> AppResult<Vec<Execution>> {
        let inner = self.inner.lock().await;
        let mut executions: Vec<Execution> = inner
            .executions
            .values()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();

        // Sort by created_at descending
        executions.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(executions.into_iter().take(limit as usize).collect())
    }

    async fn transition(
        &self,
        id: Uuid,
        to: ExecutionStatus,
        error_message: Option<String>,
    ) -> AppResult<Execution> {
        let mut inner = self.inner.lock().await;
        let execution = inner
            .executions
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("Execution".to_string()))?;
        apply_transition(execution, to, error_message)?;
        Ok(execution.clone())
    }

    async fn update_progress(&self, id: Uuid, progress: Progress) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        let execution = inner
            .executions
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("Execution".to_string()))?;
        execution.progress = progress;
        Ok(())
    }

    async fn record_summary(&self, id: Uuid, summary: ExecutionSummary) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        let execution = inner
            .executions
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("Execution".to_string()))?;
        execution.summary = Some(summary);
        Ok(())
    }

    async fn record_session(&self, id: Uuid, session_id: &str) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        let execution = inner
            .executions
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("Execution".to_string()))?;
        execution.session_id = Some(session_id.to_string());
        Ok(())
    }

    async fn request_cancel(&self, id: Uuid) -> AppResult<Execution> {
        let mut inner = self.inner.lock().await;
        let execution = inner
            .executions
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("Execution".to_string()))?;

        match execution.status {
            ExecutionStatus::Pending => {
                execution.cancel_requested = true;
                apply_transition(execution, ExecutionStatus::Cancelled, None)?;
            }
            ExecutionStatus::Running => execution.cancel_requested = true,
            _ => {}
        }
        Ok(execution.clone())
    }

    async fn insert_result(&self, result: TestResult) -> AppResult<TestResult> {
        let mut inner = self.inner.lock().await;
        if inner.results.iter().any(|r| {
            r.execution_id == result.execution_id && r.test_case_id == result.test_case_id
        }) {
            return Err(AppError::Conflict(format!(
                "Result for test case {}",
                result.test_case_id
            )));
        }
        inner.results.push(result.clone());
        Ok(result)
    }

    async fn list_results(&self, execution_id: Uuid) -> AppResult<Vec<TestResult>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .results
            .iter()
            .filter(|r| r.execution_id == execution_id)
            .cloned()
            .collect())
    }
}
