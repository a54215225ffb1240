use std::io;

use regex::Regex;
use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::Value;

use crate::models::{
    AssertionOutcome, AssertionReport, AssertionRule, AssertionType, ExchangeResponse, Operator,
};
use crate::services::json_path;

/// Evaluate every rule against one exchange. Rules never abort each other.
pub fn validate_all_assertions(
    rules: &[AssertionRule],
    response: &ExchangeResponse,
) -> AssertionReport {
    let outcomes = rules
        .iter()
        .map(|rule| evaluate_rule(rule, response))
        .collect();
    AssertionReport::from_outcomes(outcomes)
}

pub fn evaluate_rule(rule: &AssertionRule, response: &ExchangeResponse) -> AssertionOutcome {
    let label = rule.label();
    let expected = rule.expected.clone();

    let (actual, verdict) = match extract_actual(rule, response) {
        Ok(actual) => {
            let verdict = compare(rule.operator, &actual, &expected);
            (actual, verdict)
        }
        Err(e) => (Value::Null, Err(e)),
    };

    let (passed, message) = match verdict {
        Ok(true) => (true, format!("✓ {}", label)),
        Ok(false) => (
            false,
            format!(
                "✗ {} - actual: {}, expected: {}",
                label,
                string_form(&actual),
                string_form(&expected)
            ),
        ),
        Err(e) => (false, format!("✗ {} - {}", label, e)),
    };

    if !passed {
        tracing::debug!(rule = %label, message = %message, "Assertion failed");
    }

    AssertionOutcome {
        rule: rule.clone(),
        actual,
        expected,
        passed,
        message,
    }
}

fn extract_actual(rule: &AssertionRule, response: &ExchangeResponse) -> Result<Value, String> {
    match rule.kind {
        AssertionType::StatusCode => Ok(Value::from(response.status_code)),
        AssertionType::ResponseTime => Ok(Value::from(response.elapsed_ms)),
        AssertionType::JsonPath => {
            let field = rule
                .field
                .as_deref()
                .filter(|f| !f.trim().is_empty())
                .ok_or_else(|| "json_path assertion requires a field".to_string())?;
            json_path::query(&response.body, field).map_err(|e| e.to_string())
        }
        AssertionType::Contains | AssertionType::Regex => Ok(Value::String(body_text(&response.body))),
        AssertionType::Equals => match rule.field.as_deref().filter(|f| !f.trim().is_empty()) {
            Some(field) => json_path::query(&response.body, field).map_err(|e| e.to_string()),
            None => Ok(response.body.clone()),
        },
        AssertionType::Unknown => Err("unsupported assertion type".to_string()),
    }
}

fn compare(operator: Operator, actual: &Value, expected: &Value) -> Result<bool, String> {
    match operator {
        Operator::Eq => Ok(values_equal(actual, expected)),
        Operator::Ne => Ok(!values_equal(actual, expected)),
        Operator::Gt | Operator::Lt | Operator::Gte | Operator::Lte => {
            let (Some(a), Some(e)) = (as_number(actual), as_number(expected)) else {
                return Err(format!(
                    "cannot compare non-numeric values: actual: {}, expected: {}",
                    string_form(actual),
                    string_form(expected)
                ));
            };
            Ok(match operator {
                Operator::Gt => a > e,
                Operator::Lt => a < e,
                Operator::Gte => a >= e,
                _ => a <= e,
            })
        }
        Operator::Contains => Ok(string_form(actual).contains(&string_form(expected))),
        Operator::NotContains => Ok(!string_form(actual).contains(&string_form(expected))),
        Operator::Regex => {
            let pattern = string_form(expected);
            let re = Regex::new(&pattern)
                .map_err(|e| format!("invalid regex {:?}: {}", pattern, e))?;
            Ok(re.is_match(&string_form(actual)))
        }
        Operator::Unknown => Err("unsupported operator".to_string()),
    }
}

/// Native equality; numbers compare by value; mismatched kinds compare by string form.
/// Null only equals null.
pub fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Number(a), Value::Number(e)) => a.as_f64() == e.as_f64(),
        (Value::String(_), Value::String(_))
        | (Value::Bool(_), Value::Bool(_))
        | (Value::Array(_), Value::Array(_))
        | (Value::Object(_), Value::Object(_)) => actual == expected,
        _ => string_form(actual) == string_form(expected),
    }
}

/// Raw text for strings, empty for null, compact JSON otherwise
pub fn string_form(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Body as searched by `contains` and `regex`: raw text for strings, otherwise JSON
/// with `", "` and `": "` separators and non-ASCII characters left unescaped
pub fn body_text(value: &Value) -> String {
    match value {
        Value::Array(_) | Value::Object(_) => {
            let mut buf = Vec::new();
            let mut ser = serde_json::Serializer::with_formatter(&mut buf, SpacedFormatter);
            match value.serialize(&mut ser) {
                Ok(()) => String::from_utf8(buf).unwrap_or_else(|_| value.to_string()),
                Err(_) => value.to_string(),
            }
        }
        other => string_form(other),
    }
}

struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn response(status_code: u16, body: Value) -> ExchangeResponse {
        ExchangeResponse {
            status_code,
            elapsed_ms: 123.45,
            headers: BTreeMap::new(),
            body,
            url: "http://localhost/test".to_string(),
            method: "GET".to_string(),
        }
    }

    fn rule(kind: AssertionType, operator: Operator, expected: Value) -> AssertionRule {
        AssertionRule::new(kind, operator, expected)
    }

    #[test]
    fn test_empty_rule_list() {
        let report = validate_all_assertions(&[], &response(200, json!({})));
        assert_eq!(report.total, 0);
        assert!(report.all_passed);
        assert_eq!(report.pass_rate, 0.0);
    }

    #[test]
    fn test_status_code_eq() {
        let r = rule(AssertionType::StatusCode, Operator::Eq, json!(200));

        let ok = evaluate_rule(&r, &response(200, json!({})));
        assert!(ok.passed);
        assert_eq!(ok.message, "✓ status_code eq 200");

        let bad = evaluate_rule(&r, &response(404, json!({})));
        assert!(!bad.passed);
        assert_eq!(bad.actual, json!(404));
        assert_eq!(bad.message, "✗ status_code eq 200 - actual: 404, expected: 200");
    }

    #[test]
    fn test_mismatched_kinds_compare_by_string_form() {
        let r = rule(AssertionType::StatusCode, Operator::Eq, json!("200"));
        assert!(evaluate_rule(&r, &response(200, json!({}))).passed);

        let r = rule(AssertionType::JsonPath, Operator::Ne, json!("1")).with_field("$.id");
        assert!(!evaluate_rule(&r, &response(200, json!({"id": 1}))).passed);
    }

    #[test]
    fn test_null_equals_only_null() {
        assert!(values_equal(&Value::Null, &Value::Null));
        assert!(!values_equal(&Value::Null, &json!("")));
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(!values_equal(&json!([1]), &json!([2])));
    }

    #[test]
    fn test_numeric_operators() {
        let res = response(200, json!({"count": "12", "name": "x"}));

        let r = rule(AssertionType::ResponseTime, Operator::Lt, json!(500));
        assert!(evaluate_rule(&r, &res).passed);

        let r = rule(AssertionType::JsonPath, Operator::Gte, json!(12)).with_field("$.count");
        assert!(evaluate_rule(&r, &res).passed);

        let r = rule(AssertionType::JsonPath, Operator::Gt, json!(1)).with_field("$.name");
        let outcome = evaluate_rule(&r, &res);
        assert!(!outcome.passed);
        assert!(outcome.message.contains("non-numeric"));
    }

    #[test]
    fn test_contains_and_regex_on_body() {
        let res = response(200, json!({"message": "hello world"}));

        let r = rule(AssertionType::Contains, Operator::Contains, json!("hello"));
        assert!(evaluate_rule(&r, &res).passed);

        let r = rule(AssertionType::Contains, Operator::NotContains, json!("goodbye"));
        assert!(evaluate_rule(&r, &res).passed);

        let r = rule(AssertionType::Regex, Operator::Regex, json!(r"wor\w+"));
        assert!(evaluate_rule(&r, &res).passed);

        let r = rule(AssertionType::Regex, Operator::Regex, json!("(unclosed"));
        let outcome = evaluate_rule(&r, &res);
        assert!(!outcome.passed);
        assert!(outcome.message.contains("invalid regex"));
    }

    #[test]
    fn test_equals_whole_body_and_field() {
        let res = response(200, json!({"a": 1, "b": [1, 2]}));

        let r = rule(AssertionType::Equals, Operator::Eq, json!({"a": 1, "b": [1, 2]}));
        assert!(evaluate_rule(&r, &res).passed);

        let r = rule(AssertionType::Equals, Operator::Eq, json!([1, 2])).with_field("b");
        assert!(evaluate_rule(&r, &res).passed);
    }

    #[test]
    fn test_json_path_failures_are_isolated() {
        let res = response(200, json!({"a": 1}));
        let rules = vec![
            rule(AssertionType::JsonPath, Operator::Eq, json!(1)),
            rule(AssertionType::JsonPath, Operator::Eq, json!(1)).with_field("$.a["),
            rule(AssertionType::JsonPath, Operator::Eq, Value::Null).with_field("$.missing"),
            rule(AssertionType::Unknown, Operator::Eq, json!(1)),
            rule(AssertionType::StatusCode, Operator::Unknown, json!(200)),
            rule(AssertionType::JsonPath, Operator::Eq, json!(1)).with_field("$.a"),
        ];

        let report = validate_all_assertions(&rules, &res);
        assert_eq!(report.total, 6);
        assert_eq!(report.passed, 2);
        assert_eq!(report.failed, 4);
        assert_eq!(report.pass_rate, 33.33);
        assert!(!report.all_passed);
        assert!(report.results[0].message.contains("requires a field"));
        assert!(report.results[2].passed);
    }

    #[test]
    fn test_contains_matches_spaced_json_text() {
        let res = response(
            200,
            json!({"status": "ok", "data": {"items": [1, 2], "city": "Zürich"}}),
        );

        let r = rule(AssertionType::Contains, Operator::Contains, json!(r#""status": "ok""#));
        assert!(evaluate_rule(&r, &res).passed);

        let r = rule(AssertionType::Contains, Operator::Contains, json!(r#""items": [1, 2]"#));
        assert!(evaluate_rule(&r, &res).passed);

        let r = rule(AssertionType::Regex, Operator::Regex, json!(r#""city": "Z.rich""#));
        assert!(evaluate_rule(&r, &res).passed);

        assert_eq!(
            body_text(&res.body),
            r#"{"status": "ok", "data": {"items": [1, 2], "city": "Zürich"}}"#
        );
        assert_eq!(body_text(&json!([])), "[]");
        assert_eq!(body_text(&json!({})), "{}");
        assert_eq!(body_text(&json!("plain")), "plain");
    }
}
