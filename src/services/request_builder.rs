use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::models::{ApiDefinition, Environment, PreparedRequest, RequestTemplate};
use crate::services::assertion::string_form;
use crate::services::resolver::VariableResolver;

pub const SUPPORTED_METHODS: [&str; 7] = ["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS"];

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum BuildError {
    #[error("Unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    #[error("Relative URL {0:?} requires an environment base URL")]
    MissingBaseUrl(String),
}

/// Resolve and merge environment, API and test case values into one request.
///
/// Headers and query parameters merge environment < API < test case, later wins.
/// Header names collide case-insensitively.
pub fn build_request(
    environment: &Environment,
    api: &ApiDefinition,
    template: &RequestTemplate,
    resolver: &VariableResolver,
) -> Result<PreparedRequest, BuildError> {
    let method = normalize_method(&api.method)?;

    let base_url = resolver.resolve_str(&environment.base_url);
    let path = resolver.resolve_str(&api.url);
    let url = join_url(&base_url, &path)?;

    let mut headers = HeaderMerge::default();
    for layer in [&environment.headers, &api.headers, &template.headers] {
        for (name, value) in resolver.resolve_map(layer) {
            headers.insert(name, string_form(&value));
        }
    }

    let mut query_params = BTreeMap::new();
    for layer in [
        &environment.query_params,
        &api.query_params,
        &template.query_params,
    ] {
        for (name, value) in resolver.resolve_map(layer) {
            query_params.insert(name, string_form(&value));
        }
    }

    let body = template
        .body
        .as_ref()
        .map(|b| resolver.resolve_value(b))
        .filter(has_content);

    Ok(PreparedRequest {
        method,
        url,
        headers: headers.into_map(),
        query_params,
        body,
    })
}

pub fn normalize_method(method: &str) -> Result<String, BuildError> {
    let upper = method.trim().to_ascii_uppercase();
    if SUPPORTED_METHODS.contains(&upper.as_str()) {
        Ok(upper)
    } else {
        Err(BuildError::UnsupportedMethod(method.to_string()))
    }
}

/// Absolute URLs are kept; relative ones are joined to `base` on a single slash
pub fn join_url(base: &str, path: &str) -> Result<String, BuildError> {
    let path = path.trim();
    if is_absolute_url(path) {
        return Ok(path.to_string());
    }

    let base = base.trim();
    if base.is_empty() {
        return Err(BuildError::MissingBaseUrl(path.to_string()));
    }
    if path.is_empty() {
        return Ok(base.to_string());
    }

    Ok(format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    ))
}

pub fn is_absolute_url(url: &str) -> bool {
    let lower = url.trim().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn has_content(body: &Value) -> bool {
    match body {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => true,
    }
}

#[derive(Default)]
struct HeaderMerge {
    entries: Vec<(String, String)>,
}

impl HeaderMerge {
    fn insert(&mut self, name: String, value: String) {
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.entries.push((name, value));
    }

    fn into_map(self) -> BTreeMap<String, String> {
        self.entries.into_iter().collect()
    }
}

/// Header or query map from string pairs
pub fn string_map<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect()
}
