//! Argument validation against tool descriptors
//!
//! Every offending field is reported, not just the first, so the model can
//! repair its call in one turn.

use crate::tools::ToolDescriptor;
use serde_json::Value;

/// Checks `args` against the descriptor's parameter schema
///
/// Null values are treated as absent. Returns one message per offending
/// field, parameters first in declaration order, then unknown fields.
///
/// # Examples
///
/// ```
/// use stratum::tools::{ParamType, ParameterSpec, ToolDescriptor};
/// use stratum::tools::validation::validate_arguments;
/// use serde_json::json;
///
/// let descriptor = ToolDescriptor::new(
///     "load_table",
///     "Load a CSV",
///     vec![ParameterSpec::required("key", ParamType::String, "Object key")],
/// );
/// assert!(validate_arguments(&descriptor, &json!({"key": "a.csv"})).is_ok());
///
/// let errors = validate_arguments(&descriptor, &json!({"bucket": 1})).unwrap_err();
/// assert_eq!(errors.len(), 2);
/// ```
pub fn validate_arguments(
    descriptor: &ToolDescriptor,
    args: &Value,
) -> std::result::Result<(), Vec<String>> {
    let map = match args {
        Value::Object(map) => map,
        other => {
            return Err(vec![format!(
                "arguments: expected an object, got {}",
                json_kind(other)
            )])
        }
    };

    let mut errors = Vec::new();

    for param in &descriptor.parameters {
        match map.get(&param.name) {
            None | Some(Value::Null) => {
                if param.required {
                    errors.push(format!("{}: missing required field", param.name));
                }
            }
            Some(value) if !param.kind.accepts(value) => {
                errors.push(format!(
                    "{}: expected {}, got {}",
                    param.name,
                    param.kind,
                    json_kind(value)
                ));
            }
            Some(_) => {}
        }
    }

    for key in map.keys() {
        if descriptor.parameter(key).is_none() {
            errors.push(format!("{}: unknown field", key));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
