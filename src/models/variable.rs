use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Variable namespace level. Governs visibility and lookup precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableScope {
    Global,
    Environment,
    Personal,
    Temporary,
}

impl VariableScope {
    /// Unscoped lookup order, highest precedence first
    pub const PRECEDENCE: [VariableScope; 4] = [
        Self::Temporary,
        Self::Personal,
        Self::Environment,
        Self::Global,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Environment => "environment",
            Self::Personal => "personal",
            Self::Temporary => "temporary",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "global" => Some(Self::Global),
            "environment" => Some(Self::Environment),
            "personal" => Some(Self::Personal),
            "temporary" => Some(Self::Temporary),
            _ => None,
        }
    }

    /// Map a placeholder prefix (`{{env.name}}`) to its scope
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "global" => Some(Self::Global),
            "env" => Some(Self::Environment),
            "user" => Some(Self::Personal),
            "temp" => Some(Self::Temporary),
            _ => None,
        }
    }
}

/// Declared type of a stored variable value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableType {
    #[default]
    String,
    Number,
    Boolean,
    Json,
    File,
}

impl VariableType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Json => "json",
            Self::File => "file",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "string" => Some(Self::String),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "json" => Some(Self::Json),
            "file" => Some(Self::File),
            _ => None,
        }
    }

    /// Infer the type of an override value supplied as JSON
    pub fn infer(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Number(_) => Self::Number,
            serde_json::Value::Bool(_) => Self::Boolean,
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => Self::Json,
            _ => Self::String,
        }
    }
}

/// A scope together with the key that selects one namespace inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "key", rename_all = "snake_case")]
pub enum ScopeKey {
    Global,
    Environment(Uuid),
    Personal(Uuid),
    Temporary(String),
}

impl ScopeKey {
    pub fn scope(&self) -> VariableScope {
        match self {
            Self::Global => VariableScope::Global,
            Self::Environment(_) => VariableScope::Environment,
            Self::Personal(_) => VariableScope::Personal,
            Self::Temporary(_) => VariableScope::Temporary,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    pub id: Uuid,
    pub name: String,
    /// Serialized value; interpret through `typed_value`
    pub value: String,
    #[serde(rename = "type")]
    pub var_type: VariableType,
    pub scope: ScopeKey,
    pub description: Option<String>,
    pub created_by: Option<Uuid>,
    pub is_sensitive: bool,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Variable {
    /// Interpret the serialized value according to the declared type.
    /// Values that do not parse fall back to the raw string.
    pub fn typed_value(&self) -> serde_json::Value {
        use serde_json::Value;

        match self.var_type {
            VariableType::String | VariableType::File => Value::String(self.value.clone()),
            VariableType::Number => {
                let raw = self.value.trim();
                let parsed = if raw.contains('.') {
                    raw.parse::<f64>()
                        .ok()
                        .and_then(serde_json::Number::from_f64)
                } else {
                    raw.parse::<i64>().ok().map(serde_json::Number::from)
                };
                parsed
                    .map(Value::Number)
                    .unwrap_or_else(|| Value::String(self.value.clone()))
            }
            VariableType::Boolean => Value::Bool(matches!(
                self.value.trim().to_lowercase().as_str(),
                "true" | "1" | "yes" | "on"
            )),
            VariableType::Json => serde_json::from_str(&self.value)
                .unwrap_or_else(|_| Value::String(self.value.clone())),
        }
    }

    /// Text substituted for a placeholder referencing this variable
    pub fn substitution_text(&self) -> String {
        match self.typed_value() {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        }
    }

    /// Value safe to show in listings
    pub fn display_value(&self) -> &str {
        if self.is_sensitive {
            "***"
        } else {
            &self.value
        }
    }
}

/// Input for creating a variable
#[derive(Debug, Clone, Deserialize)]
pub struct NewVariable {
    pub name: String,
    pub value: String,
    #[serde(rename = "type", default)]
    pub var_type: VariableType,
    pub scope: ScopeKey,
    pub description: Option<String>,
    pub created_by: Option<Uuid>,
    #[serde(default)]
    pub is_sensitive: bool,
}

impl NewVariable {
    /// Session-scoped override materialized for one execution
    pub fn temporary(
        session_id: &str,
        name: impl Into<String>,
        value: &serde_json::Value,
        created_by: Option<Uuid>,
    ) -> Self {
        let text = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        Self {
            name: name.into(),
            value: text,
            var_type: VariableType::infer(value),
            scope: ScopeKey::Temporary(session_id.to_string()),
            description: None,
            created_by,
            is_sensitive: false,
        }
    }
}
