use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// API definition a test case is written against
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiDefinition {
    pub id: Uuid,
    pub name: String,
    pub method: String, // GET, POST, PUT, DELETE, PATCH, HEAD, OPTIONS
    pub url: String,    // relative to the environment base URL, or absolute
    #[serde(default)]
    pub headers: Map<String, Value>,
    #[serde(default)]
    pub query_params: Map<String, Value>,
}
