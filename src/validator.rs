//! Validation of JSON values against compiled schemas.

use serde_json::Value;

use crate::error::{CompileError, SchemaError, ValidateError};

fn build(schema: &Value) -> Result<jsonschema::Validator, CompileError> {
    jsonschema::options()
        .with_format("uri", is_uri_reference)
        .build(schema)
        .map_err(|e| CompileError::InvalidSchema {
            message: e.to_string(),
        })
}

/// `uri` values are URI references: relative and empty ones are accepted,
/// while whitespace, control characters and broken `%` escapes are not.
fn is_uri_reference(s: &str) -> bool {
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        let valid = match c {
            '%' => {
                chars.next().is_some_and(|h| h.is_ascii_hexdigit())
                    && chars.next().is_some_and(|h| h.is_ascii_hexdigit())
            }
            ' ' | '"' | '<' | '>' | '\\' | '^' | '`' | '{' | '|' | '}' => false,
            c => !c.is_control() && !c.is_whitespace(),
        };
        if !valid {
            return false;
        }
    }
    true
}

fn collect_errors(validator: &jsonschema::Validator, value: &Value) -> Vec<SchemaError> {
    validator
        .iter_errors(value)
        .map(|e| SchemaError {
            path: e.instance_path.to_string(),
            message: e.to_string(),
        })
        .collect()
}

/// Validate `value` against an already-compiled schema.
///
/// Returns every validation error; an empty list means the value is valid.
///
/// # Errors
///
/// Returns `CompileError::InvalidSchema` if `schema` itself is not a usable
/// JSON Schema.
pub fn validate(schema: &Value, value: &Value) -> Result<Vec<SchemaError>, CompileError> {
    let validator = build(schema)?;
    Ok(collect_errors(&validator, value))
}

/// Validate each value in turn, stopping at the first invalid one.
///
/// Returns that value's errors, or an empty list if all are valid.
pub fn validate_all(schema: &Value, values: &[Value]) -> Result<Vec<SchemaError>, CompileError> {
    let validator = build(schema)?;
    for value in values {
        let errors = collect_errors(&validator, value);
        if !errors.is_empty() {
            return Ok(errors);
        }
    }
    Ok(Vec::new())
}

/// Like [`validate`], but treats any validation error as a failure.
///
/// # Errors
///
/// Returns `ValidateError::Invalid` listing the errors if `value` is invalid.
pub fn check(schema: &Value, value: &Value) -> Result<(), ValidateError> {
    let errors = validate(schema, value)?;
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidateError::Invalid { errors })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DRAFT4_META_SCHEMA;
    use serde_json::json;

    #[test]
    fn valid_value() {
        let schema = json!({
            "type": "object",
            "properties": { "name": { "type": "string" } },
            "required": ["name"]
        });
        assert!(validate(&schema, &json!({"name": "test"})).unwrap().is_empty());
    }

    #[test]
    fn wrong_type_has_path() {
        let schema = json!({
            "type": "object",
            "properties": { "name": { "type": "string" } }
        });
        let errors = validate(&schema, &json!({"name": 123})).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "/name");
    }

    #[test]
    fn collects_multiple_errors() {
        let schema = json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "age": { "type": "number" }
            },
            "required": ["name", "age"]
        });
        let errors = validate(&schema, &json!({"name": 1, "age": "old"})).unwrap();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn stamped_schema() {
        let schema = json!({"$schema": DRAFT4_META_SCHEMA, "type": "integer", "minimum": 1});
        assert!(!validate(&schema, &json!(0)).unwrap().is_empty());
        assert!(validate(&schema, &json!(1)).unwrap().is_empty());
    }

    #[test]
    fn validate_all_stops_at_first_invalid() {
        let schema = json!({"type": "string"});
        let errors = validate_all(&schema, &[json!("a"), json!(1), json!(true)]).unwrap();
        assert_eq!(errors.len(), 1);
        assert!(validate_all(&schema, &[json!("a"), json!("b")]).unwrap().is_empty());
    }

    #[test]
    fn uri_format_accepts_references() {
        let schema = json!({"$schema": DRAFT4_META_SCHEMA, "type": "string", "format": "uri"});
        for value in ["", "http://psi.example/transform/square", "relative/path", "#frag"] {
            assert!(validate(&schema, &json!(value)).unwrap().is_empty(), "{value}");
        }
        for value in ["has space", "bad%zz", "<tag>"] {
            assert!(!validate(&schema, &json!(value)).unwrap().is_empty(), "{value}");
        }
    }

    #[test]
    fn invalid_schema() {
        let result = validate(&json!({"type": 12}), &json!(1));
        assert!(matches!(result, Err(CompileError::InvalidSchema { .. })));
    }

    #[test]
    fn check_reports_invalid() {
        let result = check(&json!({"type": "boolean"}), &json!("yes"));
        assert!(matches!(result, Err(ValidateError::Invalid { errors }) if errors.len() == 1));
    }
}
