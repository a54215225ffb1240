use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, Url};
use serde_json::json;

use crate::models::{ExchangeResponse, PreparedRequest};

/// Transport-level failures. An HTTP error status is not one of these.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Request timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Request failed: {0}")]
    Other(String),
}

impl TransportError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Connection(_) => "connection",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Other(_) => "other",
        }
    }
}

/// Executes one exchange per call with an explicit timeout
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration, accept_invalid_certs: bool) -> Result<Self, TransportError> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .map_err(|e| TransportError::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, timeout })
    }

    pub async fn send(&self, request: &PreparedRequest) -> Result<ExchangeResponse, TransportError> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| TransportError::InvalidRequest(format!("Invalid HTTP method: {}", e)))?;

        let mut url = Url::parse(&request.url)
            .map_err(|e| TransportError::InvalidRequest(format!("Invalid URL {}: {}", request.url, e)))?;
        if !request.query_params.is_empty() {
            url.query_pairs_mut().extend_pairs(request.query_params.iter());
        }

        let mut builder = self
            .client
            .request(method, url)
            .headers(build_headers(&request.headers)?)
            .timeout(self.timeout);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let start = Instant::now();
        let response = builder.send().await.map_err(|e| self.classify(e))?;

        let status_code = response.status().as_u16();
        let final_url = response.url().to_string();
        let headers = collect_headers(response.headers());
        let content_type = headers.get("content-type").cloned().unwrap_or_default();

        let bytes = response.bytes().await.map_err(|e| self.classify(e))?;
        let elapsed_ms = round2(start.elapsed().as_secs_f64() * 1000.0);

        let body = serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            json!({
                "text": String::from_utf8_lossy(&bytes),
                "content_type": content_type,
            })
        });

        Ok(ExchangeResponse {
            status_code,
            elapsed_ms,
            headers,
            body,
            url: final_url,
            method: request.method.clone(),
        })
    }

    fn classify(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else if err.is_connect() {
            TransportError::Connection(err.to_string())
        } else if err.is_builder() {
            TransportError::InvalidRequest(err.to_string())
        } else {
            TransportError::Other(err.to_string())
        }
    }
}

fn build_headers(headers: &BTreeMap<String, String>) -> Result<HeaderMap, TransportError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TransportError::InvalidRequest(format!("Invalid header name {}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| TransportError::InvalidRequest(format!("Invalid header value for {}: {}", name, e)))?;
        map.insert(name, value);
    }
    Ok(map)
}

/// Lowercase names; repeated headers joined with ", "
fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut out: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).to_string();
        out.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    out
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
