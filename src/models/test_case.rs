use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Per-request overrides. Every string may contain `{{...}}` placeholders.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestTemplate {
    #[serde(default)]
    pub headers: Map<String, Value>,
    #[serde(default)]
    pub query_params: Map<String, Value>,
    #[serde(default)]
    pub body: Option<Value>,
}

impl RequestTemplate {
    /// The template as one JSON document, for placeholder scanning
    pub fn to_value(&self) -> Value {
        let mut doc = Map::new();
        doc.insert("headers".to_string(), Value::Object(self.headers.clone()));
        doc.insert(
            "query_params".to_string(),
            Value::Object(self.query_params.clone()),
        );
        doc.insert("body".to_string(), self.body.clone().unwrap_or(Value::Null));
        Value::Object(doc)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub id: Uuid,
    pub name: String,
    pub api_id: Uuid,
    #[serde(default)]
    pub request: RequestTemplate,
    #[serde(default)]
    pub assertions: Vec<AssertionRule>,
    pub suite_id: Option<Uuid>,
    #[serde(default)]
    pub sort_order: i32,
    pub is_active: bool,
}

/// What part of the exchange a rule inspects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssertionType {
    StatusCode,
    ResponseTime,
    JsonPath,
    Regex,
    Contains,
    Equals,
    /// Unrecognized type; the rule fails when evaluated
    #[serde(other)]
    Unknown,
}

impl AssertionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StatusCode => "status_code",
            Self::ResponseTime => "response_time",
            Self::JsonPath => "json_path",
            Self::Regex => "regex",
            Self::Contains => "contains",
            Self::Equals => "equals",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
    Contains,
    NotContains,
    Regex,
    #[serde(other)]
    Unknown,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Lt => "lt",
            Self::Gte => "gte",
            Self::Lte => "lte",
            Self::Contains => "contains",
            Self::NotContains => "not_contains",
            Self::Regex => "regex",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertionRule {
    #[serde(rename = "type")]
    pub kind: AssertionType,
    #[serde(default)]
    pub field: Option<String>,
    pub operator: Operator,
    #[serde(default)]
    pub expected: Value,
    #[serde(default)]
    pub description: Option<String>,
}

impl AssertionRule {
    pub fn new(kind: AssertionType, operator: Operator, expected: Value) -> Self {
        Self {
            kind,
            field: None,
            operator,
            expected,
            description: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Description used in outcome messages
    pub fn label(&self) -> String {
        match &self.description {
            Some(desc) if !desc.is_empty() => desc.clone(),
            _ => format!(
                "{} {} {}",
                self.kind.as_str(),
                self.operator.as_str(),
                self.expected
            ),
        }
    }
}

/// Outcome of one rule against one exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertionOutcome {
    pub rule: AssertionRule,
    pub actual: Value,
    pub expected: Value,
    pub passed: bool,
    pub message: String,
}

/// Aggregate over all rules of a test case
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssertionReport {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: f64,
    pub all_passed: bool,
    pub results: Vec<AssertionOutcome>,
}

impl AssertionReport {
    pub fn from_outcomes(results: Vec<AssertionOutcome>) -> Self {
        let total = results.len();
        let passed = results.iter().filter(|r| r.passed).count();

        Self {
            total,
            passed,
            failed: total - passed,
            pass_rate: percentage(passed, total),
            all_passed: passed == total,
            results,
        }
    }
}

/// Percentage rounded to two decimals; zero when `total` is zero
pub fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    ((part as f64 / total as f64) * 10000.0).round() / 100.0
}
