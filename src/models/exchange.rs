use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fully resolved request, ready to send
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparedRequest {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub query_params: BTreeMap<String, String>,
    pub body: Option<Value>,
}

/// Normalized response snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeResponse {
    pub status_code: u16,
    /// Wall time in milliseconds, two decimals
    pub elapsed_ms: f64,
    /// Header names are lowercase; repeated headers are joined with ", "
    pub headers: BTreeMap<String, String>,
    /// Decoded JSON, or `{"text": raw, "content_type": ct}` when not JSON
    pub body: Value,
    pub url: String,
    pub method: String,
}
