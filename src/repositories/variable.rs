use async_trait::async_trait;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::entity::variable::{self, ActiveModel, Column, Entity as VariableEntity};
use crate::error::{AppError, AppResult};
use crate::models::{NewVariable, ScopeKey, Variable, VariableScope, VariableType};
use crate::repositories::VariableStore;

/// Variable repository backed by Postgres
#[derive(Clone)]
pub struct VariableRepository {
    db: DatabaseConnection,
}

impl VariableRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

/// Split a scope key into its (scope, scope_key) columns
pub fn scope_columns(key: &ScopeKey) -> (&'static str, String) {
    let scope = key.scope().as_str();
    let value = match key {
        ScopeKey::Global => String::new(),
        ScopeKey::Environment(id) | ScopeKey::Personal(id) => id.to_string(),
        ScopeKey::Temporary(session) => session.clone(),
    };
    (scope, value)
}

pub fn scope_from_columns(scope: &str, value: &str) -> AppResult<ScopeKey> {
    let parse_id = |v: &str| {
        Uuid::parse_str(v)
            .map_err(|e| AppError::Database(format!("Invalid scope key {:?}: {}", v, e)))
    };

    match VariableScope::parse(scope) {
        Some(VariableScope::Global) => Ok(ScopeKey::Global),
        Some(VariableScope::Environment) => Ok(ScopeKey::Environment(parse_id(value)?)),
        Some(VariableScope::Personal) => Ok(ScopeKey::Personal(parse_id(value)?)),
        Some(VariableScope::Temporary) => Ok(ScopeKey::Temporary(value.to_string())),
        None => Err(AppError::Database(format!("Unknown variable scope: {}", scope))),
    }
}

#[async_trait]
impl VariableStore for VariableRepository {
    async fn list_active(&self, scope: &ScopeKey) -> AppResult<Vec<Variable>> {
        let (scope, key) = scope_columns(scope);
        let models = VariableEntity::find()
            .filter(Column::Scope.eq(scope))
            .filter(Column::ScopeKey.eq(key))
            .filter(Column::IsActive.eq(true))
            .order_by_asc(Column::Name)
            .all(&self.db)
            .await?;

        models.into_iter().map(Variable::try_from).collect()
    }

    async fn create(&self, input: NewVariable) -> AppResult<Variable> {
        let (scope, key) = scope_columns(&input.scope);
        let now = OffsetDateTime::now_utc();

        let model = ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name.clone()),
            value: Set(input.value),
            var_type: Set(input.var_type.as_str().to_string()),
            scope: Set(scope.to_string()),
            scope_key: Set(key),
            description: Set(input.description),
            created_by: Set(input.created_by),
            is_sensitive: Set(input.is_sensitive),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };

        // the partial unique index rejects a second active name in the namespace
        let result = model.insert(&self.db).await.map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => AppError::Conflict(format!("Variable {}", input.name)),
            other => other,
        })?;
        result.try_into()
    }

    async fn purge_session(&self, session_id: &str) -> AppResult<u64> {
        let result = VariableEntity::update_many()
            .col_expr(Column::IsActive, Expr::value(false))
            .col_expr(Column::UpdatedAt, Expr::value(OffsetDateTime::now_utc()))
            .filter(Column::Scope.eq(VariableScope::Temporary.as_str()))
            .filter(Column::ScopeKey.eq(session_id))
            .filter(Column::IsActive.eq(true))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected)
    }

    async fn expire_temporary(&self, cutoff: OffsetDateTime) -> AppResult<u64> {
        let result = VariableEntity::update_many()
            .col_expr(Column::IsActive, Expr::value(false))
            .col_expr(Column::UpdatedAt, Expr::value(OffsetDateTime::now_utc()))
            .filter(Column::Scope.eq(VariableScope::Temporary.as_str()))
            .filter(Column::CreatedAt.lt(cutoff))
            .filter(Column::IsActive.eq(true))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected)
    }
}

// Conversion from SeaORM model to our domain model
impl TryFrom<variable::Model> for Variable {
    type Error = AppError;

    fn try_from(m: variable::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: m.id,
            scope: scope_from_columns(&m.scope, &m.scope_key)?,
            var_type: VariableType::parse(&m.var_type).unwrap_or_default(),
            name: m.name,
            value: m.value,
            description: m.description,
            created_by: m.created_by,
            is_sensitive: m.is_sensitive,
            is_active: m.is_active,
            created_at: m.created_at,
            updated_at: m.updated_at,
        })
    }
}
