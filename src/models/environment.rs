use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Target environment: base URL plus default headers and query parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    pub id: Uuid,
    pub name: String,     // e.g., "dev", "staging"
    pub base_url: String, // may be empty when every API uses absolute URLs
    #[serde(default)]
    pub headers: Map<String, Value>,
    #[serde(default)]
    pub query_params: Map<String, Value>,
    pub is_active: bool,
}

impl Environment {
    pub fn has_base_url(&self) -> bool {
        !self.base_url.trim().is_empty()
    }
}
