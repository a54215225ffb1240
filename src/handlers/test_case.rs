use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middlewares::AuthUser;
use crate::models::PreparedRequest;
use crate::services::{Readiness, VariablePreview, VariableValidation};
use crate::state::AppState;

// ============ Request/Response DTOs ============

/// Check a test case against an environment
#[derive(Debug, Deserialize, ToSchema)]
pub struct ValidateRequest {
    pub environment_id: Uuid,
}

/// Resolve a test case without sending it
#[derive(Debug, Deserialize, ToSchema)]
pub struct DryRunRequest {
    pub environment_id: Uuid,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub variables: Map<String, Value>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EnvironmentStatusResponse {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub has_base_url: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VariableValidationResponse {
    pub used: Vec<String>,
    pub available: Vec<String>,
    pub missing: Vec<String>,
    pub is_valid: bool,
}

impl From<VariableValidation> for VariableValidationResponse {
    fn from(v: VariableValidation) -> Self {
        Self {
            used: v.used,
            available: v.available,
            missing: v.missing,
            is_valid: v.is_valid,
        }
    }
}

/// Visible variable; sensitive values read `***`
#[derive(Debug, Serialize, ToSchema)]
pub struct VariablePreviewResponse {
    pub name: String,
    pub scope: String,
    pub value: String,
    pub is_sensitive: bool,
}

impl From<VariablePreview> for VariablePreviewResponse {
    fn from(v: VariablePreview) -> Self {
        Self {
            name: v.name,
            scope: v.scope.as_str().to_string(),
            value: v.value,
            is_sensitive: v.is_sensitive,
        }
    }
}

/// Readiness report
#[derive(Debug, Serialize, ToSchema)]
pub struct ValidateResponse {
    pub test_case_id: Uuid,
    pub environment: EnvironmentStatusResponse,
    pub available_variables: usize,
    pub variables: Vec<VariablePreviewResponse>,
    pub validation: VariableValidationResponse,
    pub ready: bool,
}

impl From<Readiness> for ValidateResponse {
    fn from(r: Readiness) -> Self {
        Self {
            test_case_id: r.test_case_id,
            environment: EnvironmentStatusResponse {
                id: r.environment.id,
                name: r.environment.name,
                is_active: r.environment.is_active,
                has_base_url: r.environment.has_base_url,
            },
            available_variables: r.available_variables,
            variables: r.variables.into_iter().map(Into::into).collect(),
            validation: r.validation.into(),
            ready: r.ready,
        }
    }
}

/// Request preview
#[derive(Debug, Serialize, ToSchema)]
pub struct DryRunResponse {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub query_params: BTreeMap<String, String>,
    pub body: Option<Value>,
}

impl From<PreparedRequest> for DryRunResponse {
    fn from(r: PreparedRequest) -> Self {
        Self {
            method: r.method,
            url: r.url,
            headers: r.headers,
            query_params: r.query_params,
            body: r.body,
        }
    }
}

// ============ Handlers ============

/// Validate variables and environment for a test case
#[utoipa::path(
    post,
    path = "/api/test-cases/{id}/validate",
    params(
        ("id" = Uuid, Path, description = "Test case ID")
    ),
    request_body = ValidateRequest,
    responses(
        (status = 200, description = "Readiness report", body = ValidateResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Test case, API or environment not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Test Cases"
)]
pub async fn validate_test_case(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ValidateRequest>,
) -> AppResult<Json<ValidateResponse>> {
    let readiness = state
        .engine
        .orchestrator()
        .prepare(id, payload.environment_id, user.id)
        .await?;

    Ok(Json(readiness.into()))
}

/// Preview the resolved request for a test case
#[utoipa::path(
    post,
    path = "/api/test-cases/{id}/dry-run",
    params(
        ("id" = Uuid, Path, description = "Test case ID")
    ),
    request_body = DryRunRequest,
    responses(
        (status = 200, description = "Resolved request", body = DryRunResponse),
        (status = 400, description = "Request cannot be built"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Test case, API or environment not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Test Cases"
)]
pub async fn dry_run_test_case(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DryRunRequest>,
) -> AppResult<Json<DryRunResponse>> {
    let request = state
        .engine
        .orchestrator()
        .dry_run(id, payload.environment_id, user.id, &payload.variables)
        .await?;

    Ok(Json(request.into()))
}
