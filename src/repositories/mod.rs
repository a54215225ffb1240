pub mod catalog;
pub mod execution;
pub mod memory;
pub mod variable;

pub use catalog::CatalogRepository;
pub use execution::ExecutionRepository;
pub use memory::MemoryStore;
pub use variable::VariableRepository;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{
    ApiDefinition, Environment, Execution, ExecutionStatus, ExecutionSummary, NewVariable,
    Progress, ScopeKey, TestCase, TestResult, Variable,
};

/// Scoped variable records
#[async_trait]
pub trait VariableStore: Send + Sync {
    /// All active variables in one scope namespace
    async fn list_active(&self, scope: &ScopeKey) -> AppResult<Vec<Variable>>;

    /// Create a variable. Conflict when an active one with the same name exists in the namespace.
    async fn create(&self, input: NewVariable) -> AppResult<Variable>;

    /// Retire every temporary variable of a session
    async fn purge_session(&self, session_id: &str) -> AppResult<u64>;

    /// Retire temporary variables created before `cutoff`
    async fn expire_temporary(&self, cutoff: OffsetDateTime) -> AppResult<u64>;
}

/// Read-only access to test cases, API definitions and environments
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn get_test_case(&self, id: Uuid) -> AppResult<Option<TestCase>>;

    async fn get_api(&self, id: Uuid) -> AppResult<Option<ApiDefinition>>;

    async fn get_environment(&self, id: Uuid) -> AppResult<Option<Environment>>;

    /// Active test cases of a suite, by sort order
    async fn list_suite_cases(&self, suite_id: Uuid) -> AppResult<Vec<TestCase>>;
}

/// Execution and result records
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn create_execution(&self, execution: Execution) -> AppResult<Execution>;

    async fn get_execution(&self, id: Uuid) -> AppResult<Option<Execution>>;

    /// Most recent first
    async fn list_executions_by_user(&self, user_id: Uuid, limit: u64)
        -> AppResult<Vec<Execution>>;

    /// Move to `to`. InvalidTransition when the current status does not allow it.
    async fn transition(
        &self,
        id: Uuid,
        to: ExecutionStatus,
        error_message: Option<String>,
    ) -> AppResult<Execution>;

    async fn update_progress(&self, id: Uuid, progress: Progress) -> AppResult<()>;

    async fn record_summary(&self, id: Uuid, summary: ExecutionSummary) -> AppResult<()>;

    async fn record_session(&self, id: Uuid, session_id: &str) -> AppResult<()>;

    /// Pending executions are cancelled at once; running ones are flagged.
    /// Terminal executions are returned unchanged.
    async fn request_cancel(&self, id: Uuid) -> AppResult<Execution>;

    /// Conflict when a result for (execution, test case) already exists
    async fn insert_result(&self, result: TestResult) -> AppResult<TestResult>;

    /// Results in insertion order
    async fn list_results(&self, execution_id: Uuid) -> AppResult<Vec<TestResult>>;
}

/// Apply a status change in place, stamping start and finish times
pub(crate) fn apply_transition(
    execution: &mut Execution,
    to: ExecutionStatus,
    error_message: Option<String>,
) -> AppResult<()> {
    if !execution.status.can_transition_to(to) {
        return Err(crate::error::AppError::InvalidTransition {
            from: execution.status,
            to,
        });
    }

    let now = OffsetDateTime::now_utc();
    if to == ExecutionStatus::Running {
        execution.started_at = Some(now);
    }
    if to.is_terminal() {
        execution.finished_at = Some(now);
    }
    if error_message.is_some() {
        execution.error_message = error_message;
    }
    execution.status = to;
    Ok(())
}
