//! Structural success judgment for GraphQL responses.
//!
//! A response counts as a success only when it carries real data: HTTP 200,
//! a JSON object body, no errors, and at least one substantive value under
//! `data`. A bare `{"data": {"film": null}}` is a miss.

use serde_json::Value;

/// Decides whether an execution produced a data-bearing response.
pub fn is_successful_response(status: Option<u16>, body: &Value) -> bool {
    if status != Some(200) {
        return false;
    }
    let Some(body) = body.as_object() else {
        return false;
    };
    if body.get("errors").is_some_and(is_truthy) {
        return false;
    }
    let Some(data) = body.get("data").and_then(Value::as_object) else {
        return false;
    };
    data.values().any(is_substantive)
}

/// A top-level `data` entry counts when it holds anything non-null: a list
/// with at least one non-null element, an object with a non-null member, or
/// a non-null scalar.
fn is_substantive(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Array(items) => items.iter().any(|item| !item.is_null()),
        Value::Object(members) => members.values().any(|member| !member.is_null()),
        _ => true,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(members) => !members.is_empty(),
    }
}
