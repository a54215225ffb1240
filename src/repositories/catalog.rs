use async_trait::async_trait;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::entity::api::{self, Entity as ApiEntity};
use crate::entity::environment::{self, Entity as EnvironmentEntity};
use crate::entity::test_case::{self, Column as TestCaseColumn, Entity as TestCaseEntity};
use crate::error::{AppError, AppResult};
use crate::models::{ApiDefinition, Environment, TestCase};
use crate::repositories::CatalogStore;

/// Read-only catalog repository backed by Postgres
#[derive(Clone)]
pub struct CatalogRepository {
    db: DatabaseConnection,
}

impl CatalogRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CatalogStore for CatalogRepository {
    async fn get_test_case(&self, id: Uuid) -> AppResult<Option<TestCase>> {
        let model = TestCaseEntity::find_by_id(id).one(&self.db).await?;
        model.map(TestCase::try_from).transpose()
    }

    async fn get_api(&self, id: Uuid) -> AppResult<Option<ApiDefinition>> {
        let model = ApiEntity::find_by_id(id).one(&self.db).await?;
        Ok(model.map(Into::into))
    }

    async fn get_environment(&self, id: Uuid) -> AppResult<Option<Environment>> {
        let model = EnvironmentEntity::find_by_id(id).one(&self.db).await?;
        Ok(model.map(Into::into))
    }

    async fn list_suite_cases(&self, suite_id: Uuid) -> AppResult<Vec<TestCase>> {
        let models = TestCaseEntity::find()
            .filter(TestCaseColumn::SuiteId.eq(suite_id))
            .filter(TestCaseColumn::IsActive.eq(true))
            .order_by_asc(TestCaseColumn::SortOrder)
            .order_by_asc(TestCaseColumn::Id)
            .all(&self.db)
            .await?;

        models.into_iter().map(TestCase::try_from).collect()
    }
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

// Conversions from SeaORM models to our domain models

impl From<environment::Model> for Environment {
    fn from(m: environment::Model) -> Self {
        Self {
            id: m.id,
            name: m.name,
            base_url: m.base_url,
            headers: object(m.headers),
            query_params: object(m.query_params),
            is_active: m.is_active,
        }
    }
}

impl From<api::Model> for ApiDefinition {
    fn from(m: api::Model) -> Self {
        Self {
            id: m.id,
            name: m.name,
            method: m.method,
            url: m.url,
            headers: object(m.headers),
            query_params: object(m.query_params),
        }
    }
}

impl TryFrom<test_case::Model> for TestCase {
    type Error = AppError;

    fn try_from(m: test_case::Model) -> Result<Self, Self::Error> {
        let request = serde_json::from_value(m.request).map_err(|e| {
            AppError::Database(format!("Invalid request template for test case {}: {}", m.id, e))
        })?;
        let assertions = serde_json::from_value(m.assertions).map_err(|e| {
            AppError::Database(format!("Invalid assertions for test case {}: {}", m.id, e))
        })?;

        Ok(Self {
            id: m.id,
            name: m.name,
            api_id: m.api_id,
            request,
            assertions,
            suite_id: m.suite_id,
            sort_order: m.sort_order,
            is_active: m.is_active,
        })
    }
}
