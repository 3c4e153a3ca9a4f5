//! Witness values: minimal sample values synthesised from compiled schemas.
//!
//! Only a subset of constraints is honoured, so a witness is not guaranteed
//! to be valid against its schema. Numbers start at `minimum` and step just
//! above it when the minimum is exclusive, which can overshoot a tight
//! `maximum`. That is enough to probe whether one schema's values can be
//! accepted by another.

use serde_json::{Map, Value};

/// Step used above an exclusive `minimum` for `number` schemas.
const NUMBER_EPSILON: f64 = 1e-5;

/// Generate a witness value for a compiled schema.
///
/// Returns the first `enum` value when present; otherwise dispatches on
/// `type`, using the first entry of a type array and `integer` when no type
/// is declared.
pub fn generate(schema: &Value) -> Value {
    if let Some(first) = schema
        .get("enum")
        .and_then(Value::as_array)
        .and_then(|values| values.first())
    {
        return first.clone();
    }

    let declared = match schema.get("type") {
        Some(Value::Array(types)) => types.first().and_then(Value::as_str),
        Some(other) => other.as_str(),
        None => Some("integer"),
    };

    match declared {
        Some("boolean") => Value::Bool(false),
        Some("integer") => Value::from(integer_witness(schema)),
        Some("number") => Value::from(number_witness(schema)),
        Some("string") => Value::String(String::new()),
        Some("array") => array_witness(schema),
        Some("object") => object_witness(schema),
        _ => Value::Null,
    }
}

fn exclusive_minimum(schema: &Value) -> bool {
    schema
        .get("exclusiveMinimum")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn integer_witness(schema: &Value) -> i64 {
    match schema.get("minimum").and_then(Value::as_f64) {
        Some(minimum) => {
            let value = minimum as i64;
            if exclusive_minimum(schema) {
                value.saturating_add(1)
            } else {
                value
            }
        }
        None => 0,
    }
}

fn number_witness(schema: &Value) -> f64 {
    match schema.get("minimum").and_then(Value::as_f64) {
        Some(minimum) if exclusive_minimum(schema) => minimum + NUMBER_EPSILON,
        Some(minimum) => minimum,
        None => 0.0,
    }
}

/// One witness per positional `items` schema, or a single witness for a
/// homogeneous `items` schema. `minItems`/`maxItems` are ignored.
fn array_witness(schema: &Value) -> Value {
    let items = match schema.get("items") {
        Some(Value::Array(positional)) => positional.iter().map(generate).collect(),
        Some(item @ Value::Object(_)) => vec![generate(item)],
        _ => Vec::new(),
    };
    Value::Array(items)
}

/// Witnesses every `required` property that is also declared in `properties`.
fn object_witness(schema: &Value) -> Value {
    let mut object = Map::new();
    let (Some(properties), Some(required)) = (
        schema.get("properties").and_then(Value::as_object),
        schema.get("required").and_then(Value::as_array),
    ) else {
        return Value::Object(object);
    };

    for name in required.iter().filter_map(Value::as_str) {
        if let Some(property) = properties.get(name) {
            object.insert(name.to_string(), generate(property));
        }
    }
    Value::Object(object)
}
