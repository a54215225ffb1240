use std::collections::{BTreeSet, HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{ScopeKey, Variable, VariableScope};
use crate::repositories::VariableStore;
use crate::services::functions::{FunctionCall, FunctionError};

static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{([^}]+)\}\}").unwrap());

/// Which namespaces are visible to one resolution
#[derive(Debug, Clone, Default)]
pub struct ScopeContext {
    pub environment_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub session_id: Option<String>,
}

impl ScopeContext {
    pub fn key_for(&self, scope: VariableScope) -> Option<ScopeKey> {
        match scope {
            VariableScope::Global => Some(ScopeKey::Global),
            VariableScope::Environment => self.environment_id.map(ScopeKey::Environment),
            VariableScope::Personal => self.user_id.map(ScopeKey::Personal),
            VariableScope::Temporary => self.session_id.clone().map(ScopeKey::Temporary),
        }
    }
}

/// Parsed placeholder body
#[derive(Debug, PartialEq)]
pub enum Placeholder<'a> {
    Function(Result<FunctionCall, FunctionError>),
    Scoped(VariableScope, &'a str),
    Unscoped(&'a str),
    UnknownScope(&'a str),
}

impl<'a> Placeholder<'a> {
    pub fn parse(inner: &'a str) -> Placeholder<'a> {
        let inner = inner.trim();
        if let Some(call) = FunctionCall::parse(inner) {
            return Placeholder::Function(call);
        }
        match inner.split_once('.') {
            Some((prefix, name)) => match VariableScope::from_prefix(prefix.trim()) {
                Some(scope) => Placeholder::Scoped(scope, name.trim()),
                None => Placeholder::UnknownScope(prefix.trim()),
            },
            None => Placeholder::Unscoped(inner),
        }
    }
}

/// Active variables of every scope present in `ctx`, highest precedence first
pub async fn active_variables(store: &dyn VariableStore, ctx: &ScopeContext) -> AppResult<Vec<Variable>> {
    let mut variables = Vec::new();
    for scope in VariableScope::PRECEDENCE {
        if let Some(key) = ctx.key_for(scope) {
            variables.extend(store.list_active(&key).await?);
        }
    }
    Ok(variables)
}

/// Variable values visible to one test case, loaded once and then read synchronously
#[derive(Debug, Clone, Default)]
pub struct ScopeSnapshot {
    overrides: HashMap<String, String>,
    scopes: HashMap<VariableScope, HashMap<String, String>>,
}

impl ScopeSnapshot {
    /// Load every active variable of the scopes present in `ctx`.
    /// Scopes without a context key are skipped.
    pub async fn load(
        store: &dyn VariableStore,
        ctx: &ScopeContext,
        overrides: &Map<String, Value>,
    ) -> AppResult<Self> {
        let variables = active_variables(store, ctx).await?;
        Ok(Self::from_variables(&variables).with_overrides(overrides))
    }

    pub fn from_variables(variables: &[Variable]) -> Self {
        let mut snapshot = Self::default();
        for var in variables {
            snapshot.insert(var.scope.scope(), var.name.clone(), var.substitution_text());
        }
        snapshot
    }

    pub fn with_overrides(mut self, overrides: &Map<String, Value>) -> Self {
        for (name, value) in overrides {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            self.overrides.insert(name.clone(), text);
        }
        self
    }

    pub fn insert(&mut self, scope: VariableScope, name: impl Into<String>, text: impl Into<String>) {
        self.scopes
            .entry(scope)
            .or_default()
            .insert(name.into(), text.into());
    }

    /// Unscoped lookup: overrides, then temporary > personal > environment > global
    pub fn lookup(&self, name: &str) -> Option<&str> {
        if let Some(text) = self.overrides.get(name) {
            return Some(text);
        }
        VariableScope::PRECEDENCE
            .iter()
            .find_map(|scope| self.lookup_scoped(*scope, name))
    }

    pub fn lookup_scoped(&self, scope: VariableScope, name: &str) -> Option<&str> {
        self.scopes
            .get(&scope)
            .and_then(|vars| vars.get(name))
            .map(String::as_str)
    }

    /// Distinct names reachable through an unscoped placeholder
    pub fn names(&self) -> HashSet<&str> {
        self.overrides
            .keys()
            .chain(self.scopes.values().flat_map(|vars| vars.keys()))
            .map(String::as_str)
            .collect()
    }
}

/// Synchronous placeholder substitution against a loaded snapshot
pub struct VariableResolver {
    snapshot: ScopeSnapshot,
}

impl VariableResolver {
    pub fn new(snapshot: ScopeSnapshot) -> Self {
        Self { snapshot }
    }

    pub async fn load(
        store: &dyn VariableStore,
        ctx: &ScopeContext,
        overrides: &Map<String, Value>,
    ) -> AppResult<Self> {
        Ok(Self::new(ScopeSnapshot::load(store, ctx, overrides).await?))
    }

    /// Resolve every placeholder in a nested value. Map keys and non-string scalars are kept.
    pub fn resolve_value(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.resolve_str(s)),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.resolve_value(v)))
                    .collect(),
            ),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.resolve_value(v)).collect()),
            other => other.clone(),
        }
    }

    pub fn resolve_map(&self, map: &Map<String, Value>) -> Map<String, Value> {
        map.iter()
            .map(|(k, v)| (k.clone(), self.resolve_value(v)))
            .collect()
    }

    pub fn resolve_str(&self, text: &str) -> String {
        PLACEHOLDER_RE
            .replace_all(text, |caps: &Captures| {
                self.evaluate(&caps[1])
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }

    fn evaluate(&self, inner: &str) -> Option<String> {
        match Placeholder::parse(inner) {
            Placeholder::Function(Ok(call)) => match call.evaluate() {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(placeholder = %inner.trim(), error = %e, "Template function failed");
                    None
                }
            },
            Placeholder::Function(Err(e)) => {
                tracing::warn!(placeholder = %inner.trim(), error = %e, "Template function failed");
                None
            }
            Placeholder::Scoped(scope, name) => {
                let found = self.snapshot.lookup_scoped(scope, name).map(str::to_string);
                if found.is_none() {
                    tracing::warn!(scope = scope.as_str(), name = %name, "Unresolved variable");
                }
                found
            }
            Placeholder::Unscoped(name) => {
                let found = self.snapshot.lookup(name).map(str::to_string);
                if found.is_none() {
                    tracing::warn!(name = %name, "Unresolved variable");
                }
                found
            }
            Placeholder::UnknownScope(prefix) => {
                tracing::warn!(placeholder = %inner.trim(), prefix = %prefix, "Unknown variable scope");
                None
            }
        }
    }
}

/// Names referenced by placeholders, function calls excluded. Sorted, distinct.
pub fn extract_variables(template: &Value) -> Vec<String> {
    let mut names = BTreeSet::new();
    collect_names(template, &mut names);
    names.into_iter().collect()
}

fn collect_names(value: &Value, names: &mut BTreeSet<String>) {
    match value {
        Value::String(s) => {
            for caps in PLACEHOLDER_RE.captures_iter(s) {
                let inner = caps[1].trim();
                if !matches!(Placeholder::parse(inner), Placeholder::Function(_)) {
                    names.insert(inner.to_string());
                }
            }
        }
        Value::Object(map) => map.values().for_each(|v| collect_names(v, names)),
        Value::Array(items) => items.iter().for_each(|v| collect_names(v, names)),
        _ => {}
    }
}

/// Set of variable references that can be satisfied
pub trait Availability {
    fn is_available(&self, reference: &str) -> bool;
}

impl Availability for HashSet<String> {
    fn is_available(&self, reference: &str) -> bool {
        if self.contains(reference) {
            return true;
        }
        match Placeholder::parse(reference) {
            Placeholder::Scoped(_, name) => self.contains(name),
            _ => false,
        }
    }
}

impl Availability for ScopeSnapshot {
    fn is_available(&self, reference: &str) -> bool {
        match Placeholder::parse(reference) {
            Placeholder::Scoped(scope, name) => self.lookup_scoped(scope, name).is_some(),
            Placeholder::Unscoped(name) => self.lookup(name).is_some(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableValidation {
    pub used: Vec<String>,
    pub available: Vec<String>,
    pub missing: Vec<String>,
    pub is_valid: bool,
}

/// Report which referenced variables the available set satisfies
pub fn validate_variables(template: &Value, available: &impl Availability) -> VariableValidation {
    let used = extract_variables(template);
    let (found, missing): (Vec<String>, Vec<String>) = used
        .iter()
        .cloned()
        .partition(|name| available.is_available(name));

    VariableValidation {
        is_valid: missing.is_empty(),
        used,
        available: found,
        missing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewVariable;
    use crate::repositories::MemoryStore;
    use serde_json::json;

    fn resolver(entries: &[(VariableScope, &str, &str)]) -> VariableResolver {
        let mut snapshot = ScopeSnapshot::default();
        for (scope, name, text) in entries {
            snapshot.insert(*scope, *name, *text);
        }
        VariableResolver::new(snapshot)
    }

    #[test]
    fn test_temporary_wins_over_other_scopes() {
        let r = resolver(&[
            (VariableScope::Global, "x", "global"),
            (VariableScope::Environment, "x", "env"),
            (VariableScope::Personal, "x", "user"),
            (VariableScope::Temporary, "x", "temp"),
        ]);
        assert_eq!(r.resolve_str("{{x}}"), "temp");

        let r = resolver(&[
            (VariableScope::Global, "x", "global"),
            (VariableScope::Environment, "x", "env"),
        ]);
        assert_eq!(r.resolve_str("{{x}}"), "env");
    }

    #[test]
    fn test_empty_value_still_wins() {
        let r = resolver(&[
            (VariableScope::Personal, "token", ""),
            (VariableScope::Global, "token", "fallback"),
        ]);
        assert_eq!(r.resolve_str("[{{token}}]"), "[]");
    }

    #[test]
    fn test_overrides_sit_above_temporary() {
        let mut snapshot = ScopeSnapshot::default().with_overrides(
            json!({"x": "override", "n": 5}).as_object().unwrap(),
        );
        snapshot.insert(VariableScope::Temporary, "x", "temp");
        let r = VariableResolver::new(snapshot);

        assert_eq!(r.resolve_str("{{x}}-{{n}}"), "override-5");
    }

    #[test]
    fn test_unresolved_passes_through() {
        let r = resolver(&[]);
        assert_eq!(r.resolve_str("{{name}}"), "{{name}}");
        assert_eq!(r.resolve_str("{{nope.name}}"), "{{nope.name}}");
        assert_eq!(r.resolve_str("{{unknownFn()}}"), "{{unknownFn()}}");
        assert_eq!(r.resolve_str("{{randomInt(9, 1)}}"), "{{randomInt(9, 1)}}");
    }

    #[test]
    fn test_identity_without_placeholders() {
        let r = resolver(&[(VariableScope::Global, "x", "1")]);
        let template = json!({"a": [1, true, null, "plain {text}"], "b": {"c": 2.5}});
        assert_eq!(r.resolve_value(&template), template);
    }

    #[test]
    fn test_scoped_lookup_and_whitespace() {
        let r = resolver(&[
            (VariableScope::Environment, "host", "api.local"),
            (VariableScope::Global, "host", "global.local"),
        ]);
        assert_eq!(r.resolve_str("{{ env.host }}"), "api.local");
        assert_eq!(r.resolve_str("{{global.host}}"), "global.local");
        assert_eq!(r.resolve_str("{{user.host}}"), "{{user.host}}");
    }

    #[test]
    fn test_functions_evaluate_per_occurrence() {
        let r = resolver(&[]);
        let out = r.resolve_str("{{uuid()}} {{uuid()}}");
        let parts: Vec<&str> = out.split(' ').collect();
        assert_eq!(parts.len(), 2);
        assert_ne!(parts[0], parts[1]);
        assert_eq!(r.resolve_str("{{ base64('a') }}"), "YQ==");
    }

    #[test]
    fn test_nested_structures_keep_order() {
        let r = resolver(&[(VariableScope::Global, "id", "42")]);
        let template = json!({
            "z": "{{id}}",
            "a": ["x", "{{id}}", {"k": "v{{id}}"}],
            "n": 7
        });
        let resolved = r.resolve_value(&template);

        assert_eq!(resolved, json!({"z": "42", "a": ["x", "42", {"k": "v42"}], "n": 7}));
        let keys: Vec<&String> = resolved.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["z", "a", "n"]);
    }

    #[test]
    fn test_extract_and_validate() {
        let template = json!({
            "headers": {"Authorization": "Bearer {{token}}"},
            "body": {"id": "{{uuid()}}", "region": "{{env.region}}", "x": "{{missing}}"}
        });

        assert_eq!(
            extract_variables(&template),
            vec!["env.region", "missing", "token"]
        );

        let available: HashSet<String> = ["token", "region"].iter().map(|s| s.to_string()).collect();
        let report = validate_variables(&template, &available);
        assert_eq!(report.available, vec!["env.region", "token"]);
        assert_eq!(report.missing, vec!["missing"]);
        assert!(!report.is_valid);
    }

    #[tokio::test]
    async fn test_snapshot_skips_absent_scopes() {
        let store = MemoryStore::new();
        let env_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();

        for (scope, value) in [
            (ScopeKey::Global, "g"),
            (ScopeKey::Environment(env_id), "e"),
            (ScopeKey::Personal(user_id), "p"),
        ] {
            store
                .create(NewVariable {
                    name: "x".to_string(),
                    value: value.to_string(),
                    var_type: Default::default(),
                    scope,
                    description: None,
                    created_by: None,
                    is_sensitive: false,
                })
                .await
                .unwrap();
        }

        let ctx = ScopeContext {
            environment_id: Some(env_id),
            user_id: None,
            session_id: None,
        };
        let r = VariableResolver::load(&store, &ctx, &Map::new()).await.unwrap();
        assert_eq!(r.resolve_str("{{x}}"), "e");
        assert_eq!(r.resolve_str("{{user.x}}"), "{{user.x}}");
    }
}
