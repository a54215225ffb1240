use serde_json::{json, Map, Value};
use uuid::Uuid;

use apirun::models::{
    ApiDefinition, AssertionRule, AssertionType, Environment, NewVariable, Operator,
    RequestTemplate, ScopeKey, TestCase, Variable,
};
use apirun::repositories::{MemoryStore, VariableStore};
use apirun::services::AuthService;
use apirun::state::AppState;

/// Authentication info for tests
pub struct TestAuth {
    pub user_id: Uuid,
    pub email: String,
    pub token: String,
}

impl TestAuth {
    /// Get the Authorization header value
    pub fn auth_header(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

/// Factory for creating test data
pub struct Factory<'a> {
    state: &'a AppState,
    store: &'a MemoryStore,
}

impl<'a> Factory<'a> {
    pub fn new(state: &'a AppState, store: &'a MemoryStore) -> Self {
        Self { state, store }
    }

    /// Mint a token for a fresh user id
    pub fn create_user(&self) -> TestAuth {
        let user_id = Uuid::new_v4();
        let email = format!("test-{}@example.com", user_id);
        let token = AuthService::generate_token(user_id, &email, &self.state.config).unwrap();

        TestAuth {
            user_id,
            email,
            token,
        }
    }

    pub async fn create_environment(&self, base_url: &str) -> Environment {
        let environment = Environment {
            id: Uuid::new_v4(),
            name: "test".to_string(),
            base_url: base_url.to_string(),
            headers: Map::new(),
            query_params: Map::new(),
            is_active: true,
        };
        self.store.insert_environment(environment.clone()).await;
        environment
    }

    pub async fn create_api(&self, method: &str, url: &str) -> ApiDefinition {
        let api = ApiDefinition {
            id: Uuid::new_v4(),
            name: format!("{} {}", method, url),
            method: method.to_string(),
            url: url.to_string(),
            headers: Map::new(),
            query_params: Map::new(),
        };
        self.store.insert_api(api.clone()).await;
        api
    }

    /// Test case expecting `expected_status`
    pub async fn create_test_case(&self, method: &str, url: &str, expected_status: u16) -> TestCase {
        self.create_test_case_with(
            method,
            url,
            RequestTemplate::default(),
            vec![status_is(expected_status)],
        )
        .await
    }

    pub async fn create_test_case_with(
        &self,
        method: &str,
        url: &str,
        request: RequestTemplate,
        assertions: Vec<AssertionRule>,
    ) -> TestCase {
        let api = self.create_api(method, url).await;
        let test_case = TestCase {
            id: Uuid::new_v4(),
            name: format!("{} {}", method, url),
            api_id: api.id,
            request,
            assertions,
            suite_id: None,
            sort_order: 0,
            is_active: true,
        };
        self.store.insert_test_case(test_case.clone()).await;
        test_case
    }

    pub async fn add_to_suite(&self, mut test_case: TestCase, suite_id: Uuid, sort_order: i32) -> TestCase {
        test_case.suite_id = Some(suite_id);
        test_case.sort_order = sort_order;
        self.store.insert_test_case(test_case.clone()).await;
        test_case
    }

    pub async fn create_variable(&self, scope: ScopeKey, name: &str, value: &str) -> Variable {
        self.store
            .create(NewVariable {
                name: name.to_string(),
                value: value.to_string(),
                var_type: Default::default(),
                scope,
                description: None,
                created_by: None,
                is_sensitive: false,
            })
            .await
            .unwrap()
    }
}

pub fn status_is(code: u16) -> AssertionRule {
    AssertionRule::new(AssertionType::StatusCode, Operator::Eq, json!(code))
}

pub fn json_path(field: &str, operator: Operator, expected: Value) -> AssertionRule {
    AssertionRule::new(AssertionType::JsonPath, operator, expected).with_field(field)
}
