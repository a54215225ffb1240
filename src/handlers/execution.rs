use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::engine::{
    CancelAck, ExecutionResults, ExecutionView, QueueStats, ResultSummary, SubmitRequest,
    Submission,
};
use crate::error::AppResult;
use crate::handlers::ListParams;
use crate::middlewares::AuthUser;
use crate::models::{ExecutionSummary, Progress, TestResult};
use crate::state::AppState;

// ============ Request DTOs ============

/// Run one test case
#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitSingleRequest {
    pub test_case_id: Uuid,
    pub environment_id: Uuid,
    /// Override variables, visible as temporary variables during the run
    #[serde(default)]
    #[schema(value_type = Object)]
    pub variables: Map<String, Value>,
}

/// Run an ordered list of test cases
#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitBatchRequest {
    pub test_case_ids: Vec<Uuid>,
    pub environment_id: Uuid,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub variables: Map<String, Value>,
    /// Run test cases concurrently (default: false)
    #[serde(default)]
    pub parallel: bool,
}

/// Run every active test case of a suite, in suite order
#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitSuiteRequest {
    pub suite_id: Uuid,
    pub environment_id: Uuid,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub variables: Map<String, Value>,
}

// ============ Response DTOs ============

#[derive(Debug, Serialize, ToSchema)]
pub struct SubmitResponse {
    pub execution_id: Uuid,
    pub status: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProgressResponse {
    pub total: usize,
    pub completed: usize,
    pub success: usize,
    pub failed: usize,
}

impl From<Progress> for ProgressResponse {
    fn from(p: Progress) -> Self {
        Self {
            total: p.total,
            completed: p.completed,
            success: p.success,
            failed: p.failed,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SummaryResponse {
    pub total: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub execution_mode: String,
}

impl From<ExecutionSummary> for SummaryResponse {
    fn from(s: ExecutionSummary) -> Self {
        Self {
            total: s.total,
            success_count: s.success_count,
            failed_count: s.failed_count,
            execution_mode: s.execution_mode,
        }
    }
}

/// Execution status response
#[derive(Debug, Serialize, ToSchema)]
pub struct ExecutionResponse {
    pub id: Uuid,
    pub kind: String,
    pub status: String,
    pub progress: ProgressResponse,
    pub result: Option<SummaryResponse>,
    pub error: Option<String>,
    pub cancel_requested: bool,
    #[schema(value_type = String)]
    pub created_at: time::OffsetDateTime,
    #[schema(value_type = Option<String>)]
    pub started_at: Option<time::OffsetDateTime>,
    #[schema(value_type = Option<String>)]
    pub finished_at: Option<time::OffsetDateTime>,
}

impl From<ExecutionView> for ExecutionResponse {
    fn from(v: ExecutionView) -> Self {
        Self {
            id: v.id,
            kind: v.kind.as_str().to_string(),
            status: v.status.as_str().to_string(),
            progress: v.progress.into(),
            result: v.result.map(Into::into),
            error: v.error,
            cancel_requested: v.cancel_requested,
            created_at: v.created_at,
            started_at: v.started_at,
            finished_at: v.finished_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ExecutionListResponse {
    pub data: Vec<ExecutionResponse>,
    pub limit: u64,
}

/// One test case outcome
#[derive(Debug, Serialize, ToSchema)]
pub struct ResultResponse {
    pub id: Uuid,
    pub test_case_id: Uuid,
    pub status: String,
    /// Resolved request that was sent
    pub request: Option<Value>,
    /// Normalized response snapshot
    pub response: Option<Value>,
    /// Assertion report with per-rule outcomes
    pub assertions: Value,
    pub duration_ms: f64,
    pub error_message: Option<String>,
    #[schema(value_type = String)]
    pub created_at: time::OffsetDateTime,
}

impl From<TestResult> for ResultResponse {
    fn from(r: TestResult) -> Self {
        Self {
            id: r.id,
            test_case_id: r.test_case_id,
            status: r.status.as_str().to_string(),
            request: r.request.and_then(|q| serde_json::to_value(q).ok()),
            response: r.response.and_then(|s| serde_json::to_value(s).ok()),
            assertions: serde_json::to_value(&r.assertions).unwrap_or(Value::Null),
            duration_ms: r.duration_ms,
            error_message: r.error_message,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ResultSummaryResponse {
    pub total: usize,
    pub pass: usize,
    pub fail: usize,
    pub error: usize,
    pub skip: usize,
    pub pass_rate: f64,
}

impl From<ResultSummary> for ResultSummaryResponse {
    fn from(s: ResultSummary) -> Self {
        Self {
            total: s.total,
            pass: s.pass,
            fail: s.fail,
            error: s.error,
            skip: s.skip,
            pass_rate: s.pass_rate,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ExecutionResultsResponse {
    pub execution_id: Uuid,
    pub status: String,
    pub summary: ResultSummaryResponse,
    pub results: Vec<ResultResponse>,
}

impl From<ExecutionResults> for ExecutionResultsResponse {
    fn from(r: ExecutionResults) -> Self {
        Self {
            execution_id: r.execution_id,
            status: r.status.as_str().to_string(),
            summary: r.summary.into(),
            results: r.results.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CancelResponse {
    pub execution_id: Uuid,
    pub status: String,
    pub accepted: bool,
    pub message: String,
}

impl From<CancelAck> for CancelResponse {
    fn from(a: CancelAck) -> Self {
        Self {
            execution_id: a.execution_id,
            status: a.status.as_str().to_string(),
            accepted: a.accepted,
            message: a.message,
        }
    }
}

/// Queue statistics
#[derive(Debug, Serialize, ToSchema)]
pub struct QueueStatsResponse {
    pub queue_length: u64,
    pub workers: usize,
}

impl From<QueueStats> for QueueStatsResponse {
    fn from(s: QueueStats) -> Self {
        Self {
            queue_length: s.queue_length,
            workers: s.workers,
        }
    }
}

// ============ Handlers ============

async fn accept(
    state: &AppState,
    request: SubmitRequest,
) -> AppResult<(StatusCode, Json<SubmitResponse>)> {
    let execution_id = state.engine.submit(request).await?;
    let view = state.engine.poll(execution_id).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            execution_id,
            status: view.status.as_str().to_string(),
        }),
    ))
}

/// Submit a single test case execution
#[utoipa::path(
    post,
    path = "/api/executions/single",
    request_body = SubmitSingleRequest,
    responses(
        (status = 202, description = "Execution queued", body = SubmitResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Executions"
)]
pub async fn submit_single(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<SubmitSingleRequest>,
) -> AppResult<(StatusCode, Json<SubmitResponse>)> {
    let request = SubmitRequest {
        submission: Submission::Single {
            test_case_id: payload.test_case_id,
        },
        environment_id: payload.environment_id,
        variables: payload.variables,
        user_id: user.id,
    };
    accept(&state, request).await
}

/// Submit a batch execution
#[utoipa::path(
    post,
    path = "/api/executions/batch",
    request_body = SubmitBatchRequest,
    responses(
        (status = 202, description = "Execution queued", body = SubmitResponse),
        (status = 400, description = "Empty test case list"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Executions"
)]
pub async fn submit_batch(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<SubmitBatchRequest>,
) -> AppResult<(StatusCode, Json<SubmitResponse>)> {
    let request = SubmitRequest {
        submission: Submission::Batch {
            test_case_ids: payload.test_case_ids,
            parallel: payload.parallel,
        },
        environment_id: payload.environment_id,
        variables: payload.variables,
        user_id: user.id,
    };
    accept(&state, request).await
}

/// Submit a suite execution
#[utoipa::path(
    post,
    path = "/api/executions/suite",
    request_body = SubmitSuiteRequest,
    responses(
        (status = 202, description = "Execution queued", body = SubmitResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Executions"
)]
pub async fn submit_suite(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<SubmitSuiteRequest>,
) -> AppResult<(StatusCode, Json<SubmitResponse>)> {
    let request = SubmitRequest {
        submission: Submission::Suite {
            suite_id: payload.suite_id,
        },
        environment_id: payload.environment_id,
        variables: payload.variables,
        user_id: user.id,
    };
    accept(&state, request).await
}

/// Get execution status and progress
#[utoipa::path(
    get,
    path = "/api/executions/{id}",
    params(
        ("id" = Uuid, Path, description = "Execution ID")
    ),
    responses(
        (status = 200, description = "Execution status", body = ExecutionResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Execution not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Executions"
)]
pub async fn get_execution(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ExecutionResponse>> {
    let execution = state.engine.authorize(id, user.id).await?;
    Ok(Json(ExecutionView::from(execution).into()))
}

/// Get the results of an execution
#[utoipa::path(
    get,
    path = "/api/executions/{id}/results",
    params(
        ("id" = Uuid, Path, description = "Execution ID")
    ),
    responses(
        (status = 200, description = "Results with status summary", body = ExecutionResultsResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Execution not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Executions"
)]
pub async fn get_execution_results(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ExecutionResultsResponse>> {
    state.engine.authorize(id, user.id).await?;
    let results = state.engine.results(id).await?;
    Ok(Json(results.into()))
}

/// Cancel an execution
#[utoipa::path(
    delete,
    path = "/api/executions/{id}",
    params(
        ("id" = Uuid, Path, description = "Execution ID")
    ),
    responses(
        (status = 200, description = "Cancellation acknowledgement", body = CancelResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Execution not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Executions"
)]
pub async fn cancel_execution(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<CancelResponse>> {
    state.engine.authorize(id, user.id).await?;
    let ack = state.engine.cancel(id).await?;
    Ok(Json(ack.into()))
}

/// List the caller's recent executions
#[utoipa::path(
    get,
    path = "/api/executions",
    params(ListParams),
    responses(
        (status = 200, description = "Recent executions, newest first", body = ExecutionListResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Executions"
)]
pub async fn list_executions(
    user: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<ExecutionListResponse>> {
    let limit = params.limit();
    let executions = state.engine.list_executions(user.id, limit).await?;

    Ok(Json(ExecutionListResponse {
        data: executions.into_iter().map(Into::into).collect(),
        limit,
    }))
}

/// Get queue statistics
#[utoipa::path(
    get,
    path = "/api/executions/stats",
    responses(
        (status = 200, description = "Queue statistics", body = QueueStatsResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Executions"
)]
pub async fn get_queue_stats(
    _user: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<QueueStatsResponse>> {
    let stats = state.engine.queue_stats().await?;
    Ok(Json(stats.into()))
}
