use async_trait::async_trait;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde::de::DeserializeOwned;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::entity::execution::{self, Column, Entity as ExecutionEntity};
use crate::entity::test_result::{self, Column as ResultColumn, Entity as ResultEntity};
use crate::error::{AppError, AppResult};
use crate::models::{
    Execution, ExecutionKind, ExecutionStatus, ExecutionSummary, Progress, ResultStatus,
    TestResult,
};
use crate::repositories::ExecutionStore;

/// Execution and result repository backed by Postgres
#[derive(Clone)]
pub struct ExecutionRepository {
    db: DatabaseConnection,
}

impl ExecutionRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn find(&self, id: Uuid) -> AppResult<Execution> {
        ExecutionEntity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Execution".to_string()))?
            .try_into()
    }
}

#[async_trait]
impl ExecutionStore for ExecutionRepository {
    async fn create_execution(&self, execution: Execution) -> AppResult<Execution> {
        let model = execution::ActiveModel {
            id: Set(execution.id),
            kind: Set(execution.kind.as_str().to_string()),
            status: Set(execution.status.as_str().to_string()),
            target: Set(serde_json::to_value(&execution.target)?),
            config: Set(serde_json::to_value(&execution.config)?),
            user_id: Set(execution.user_id),
            session_id: Set(execution.session_id.clone()),
            progress: Set(serde_json::to_value(execution.progress)?),
            cancel_requested: Set(execution.cancel_requested),
            summary: Set(execution
                .summary
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?),
            error_message: Set(execution.error_message.clone()),
            created_at: Set(execution.created_at),
            started_at: Set(execution.started_at),
            finished_at: Set(execution.finished_at),
        };

        let result = model.insert(&self.db).await?;
        result.try_into()
    }

    async fn get_execution(&self, id: Uuid) -> AppResult<Option<Execution>> {
        let model = ExecutionEntity::find_by_id(id).one(&self.db).await?;
        model.map(Execution::try_from).transpose()
    }

    async fn list_executions_by_user(
        &self,
        user_id: Uuid,
        limit: u64,
    ) -> AppResult<Vec<Execution>> {
        let models = ExecutionEntity::find()
            .filter(Column::UserId.eq(user_id))
            .order_by_desc(Column::CreatedAt)
            .limit(limit)
            .all(&self.db)
            .await?;

        models.into_iter().map(Execution::try_from).collect()
    }

    async fn transition(
        &self,
        id: Uuid,
        to: ExecutionStatus,
        error_message: Option<String>,
    ) -> AppResult<Execution> {
        let sources: Vec<&'static str> = ExecutionStatus::sources_of(to)
            .iter()
            .map(|s| s.as_str())
            .collect();
        let now = OffsetDateTime::now_utc();

        let mut update = ExecutionEntity::update_many()
            .col_expr(Column::Status, Expr::value(to.as_str()));
        if to == ExecutionStatus::Running {
            update = update.col_expr(Column::StartedAt, Expr::value(Some(now)));
        }
        if to.is_terminal() {
            update = update.col_expr(Column::FinishedAt, Expr::value(Some(now)));
        }
        if let Some(message) = error_message {
            update = update.col_expr(Column::ErrorMessage, Expr::value(Some(message)));
        }

        // compare-and-set on the current status keeps transitions forward-only
        let result = update
            .filter(Column::Id.eq(id))
            .filter(Column::Status.is_in(sources))
            .exec(&self.db)
            .await?;

        let execution = self.find(id).await?;
        if result.rows_affected == 0 {
            return Err(AppError::InvalidTransition {
                from: execution.status,
                to,
            });
        }
        Ok(execution)
    }

    async fn update_progress(&self, id: Uuid, progress: Progress) -> AppResult<()> {
        ExecutionEntity::update_many()
            .col_expr(Column::Progress, Expr::value(serde_json::to_value(progress)?))
            .filter(Column::Id.eq(id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn record_summary(&self, id: Uuid, summary: ExecutionSummary) -> AppResult<()> {
        ExecutionEntity::update_many()
            .col_expr(
                Column::Summary,
                Expr::value(Some(serde_json::to_value(summary)?)),
            )
            .filter(Column::Id.eq(id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn record_session(&self, id: Uuid, session_id: &str) -> AppResult<()> {
        ExecutionEntity::update_many()
            .col_expr(Column::SessionId, Expr::value(Some(session_id.to_string())))
            .filter(Column::Id.eq(id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn request_cancel(&self, id: Uuid) -> AppResult<Execution> {
        let now = OffsetDateTime::now_utc();

        // Pending: cancel at once
        let cancelled = ExecutionEntity::update_many()
            .col_expr(Column::Status, Expr::value(ExecutionStatus::Cancelled.as_str()))
            .col_expr(Column::CancelRequested, Expr::value(true))
            .col_expr(Column::FinishedAt, Expr::value(Some(now)))
            .filter(Column::Id.eq(id))
            .filter(Column::Status.eq(ExecutionStatus::Pending.as_str()))
            .exec(&self.db)
            .await?;

        // Running: flag for cooperative cancellation
        if cancelled.rows_affected == 0 {
            ExecutionEntity::update_many()
                .col_expr(Column::CancelRequested, Expr::value(true))
                .filter(Column::Id.eq(id))
                .filter(Column::Status.eq(ExecutionStatus::Running.as_str()))
                .exec(&self.db)
                .await?;
        }

        self.find(id).await
    }

    async fn insert_result(&self, result: TestResult) -> AppResult<TestResult> {
        let model = test_result::ActiveModel {
            id: Set(result.id),
            execution_id: Set(result.execution_id),
            test_case_id: Set(result.test_case_id),
            status: Set(result.status.as_str().to_string()),
            request: Set(result
                .request
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?),
            response: Set(result
                .response
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?),
            assertions: Set(serde_json::to_value(&result.assertions)?),
            duration_ms: Set(result.duration_ms),
            error_message: Set(result.error_message.clone()),
            created_at: Set(result.created_at),
        };

        // uq_test_results_pair turns a second write into a Conflict
        let inserted = model.insert(&self.db).await?;
        inserted.try_into()
    }

    async fn list_results(&self, execution_id: Uuid) -> AppResult<Vec<TestResult>> {
        let models = ResultEntity::find()
            .filter(ResultColumn::ExecutionId.eq(execution_id))
            .order_by_asc(ResultColumn::CreatedAt)
            .all(&self.db)
            .await?;

        models.into_iter().map(TestResult::try_from).collect()
    }
}

fn decode<T: DeserializeOwned>(value: serde_json::Value, what: &str) -> AppResult<T> {
    serde_json::from_value(value)
        .map_err(|e| AppError::Database(format!("Invalid {} column: {}", what, e)))
}

// Conversions from SeaORM models to our domain models

impl TryFrom<execution::Model> for Execution {
    type Error = AppError;

    fn try_from(m: execution::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: m.id,
            kind: ExecutionKind::parse(&m.kind)
                .ok_or_else(|| AppError::Database(format!("Unknown execution kind: {}", m.kind)))?,
            status: ExecutionStatus::parse(&m.status).ok_or_else(|| {
                AppError::Database(format!("Unknown execution status: {}", m.status))
            })?,
            target: decode(m.target, "target")?,
            config: decode(m.config, "config")?,
            user_id: m.user_id,
            session_id: m.session_id,
            progress: decode(m.progress, "progress")?,
            cancel_requested: m.cancel_requested,
            summary: m.summary.map(|s| decode(s, "summary")).transpose()?,
            error_message: m.error_message,
            created_at: m.created_at,
            started_at: m.started_at,
            finished_at: m.finished_at,
        })
    }
}

impl TryFrom<test_result::Model> for TestResult {
    type Error = AppError;

    fn try_from(m: test_result::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: m.id,
            execution_id: m.execution_id,
            test_case_id: m.test_case_id,
            status: ResultStatus::parse(&m.status)
                .ok_or_else(|| AppError::Database(format!("Unknown result status: {}", m.status)))?,
            request: m.request.map(|r| decode(r, "request")).transpose()?,
            response: m.response.map(|r| decode(r, "response")).transpose()?,
            assertions: decode(m.assertions, "assertions")?,
            duration_ms: m.duration_ms,
            error_message: m.error_message,
            created_at: m.created_at,
        })
    }
}
