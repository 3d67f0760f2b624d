//! Minimal JSON Schema checks for capability arguments.
//!
//! Supports the subset the declared capabilities use: an `object` root with
//! typed `properties`, a `required` list, and `minLength` on strings.
//! Unknown keywords are ignored.

use serde_json::{Map, Value};

/// Validate `args` against `schema`.
///
/// # Errors
///
/// Returns a human-readable description of the first violation found.
pub fn validate(schema: &Value, args: &Value) -> Result<(), String> {
    let object = match args {
        Value::Object(map) => map,
        other => {
            return Err(format!(
                "expected an object of arguments, got {}",
                type_name(other)
            ))
        }
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required.iter().filter_map(Value::as_str) {
            if object.get(field).map_or(true, Value::is_null) {
                return Err(format!("missing required field: {field}"));
            }
        }
    }

    let empty = Map::new();
    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    for (field, value) in object {
        if let Some(property) = properties.get(field) {
            check_property(field, property, value)?;
        }
    }

    Ok(())
}

fn check_property(field: &str, property: &Value, value: &Value) -> Result<(), String> {
    if let Some(expected) = property.get("type").and_then(Value::as_str) {
        if !matches_type(expected, value) {
            return Err(format!(
                "field '{field}' must be of type {expected}, got {}",
                type_name(value)
            ));
        }
    }

    if let (Some(min), Some(text)) = (
        property.get("minLength").and_then(Value::as_u64),
        value.as_str(),
    ) {
        let len = u64::try_from(text.chars().count()).unwrap_or(u64::MAX);
        if len < min {
            return Err(format!(
                "field '{field}' must be at least {min} character(s) long"
            ));
        }
    }

    Ok(())
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Normalise optional `arguments` into an object (absent means `{}`).
pub fn arguments_object(arguments: Option<Value>) -> Value {
    arguments.unwrap_or_else(|| Value::Object(Map::new()))
}
