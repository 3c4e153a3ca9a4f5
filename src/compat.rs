//! Compatibility between a producer's emitted values and a consumer's input.

use serde_json::Value;
use tracing::trace;

use crate::compiler::Compiler;
use crate::error::CompileError;
use crate::generator::generate;
use crate::validator::{validate, validate_all};

/// Returns `true` if values described by `emits` are definitely not accepted
/// by `accepts`, and `false` if they might be.
///
/// Structurally equal schemas are always compatible. Otherwise both are
/// compiled; every enumerated value of `emits` (or one witness value when it
/// has no `enum`) is validated against `accepts`. Positional array schemas
/// whose `items` differ in length are incompatible regardless.
///
/// # Errors
///
/// Returns any error from compiling either schema.
pub fn is_incompatible(
    compiler: &Compiler,
    emits: &Value,
    accepts: &Value,
) -> Result<bool, CompileError> {
    if emits == accepts {
        return Ok(false);
    }

    let emits = compiler.compile_schema(emits)?;
    let accepts = compiler.compile_schema(accepts)?;

    let errors = match emits.get("enum").and_then(Value::as_array) {
        Some(values) => validate_all(&accepts, values)?,
        None => validate(&accepts, &generate(&emits))?,
    };
    if !errors.is_empty() {
        trace!(errors = errors.len(), "emitted values rejected");
        return Ok(true);
    }

    Ok(positional_lengths_differ(&emits, &accepts))
}

/// Only the top-level structure is inspected.
fn positional_lengths_differ(emits: &Value, accepts: &Value) -> bool {
    match (
        emits.get("items").and_then(Value::as_array),
        accepts.get("items").and_then(Value::as_array),
    ) {
        (Some(emitted), Some(accepted)) => emitted.len() != accepted.len(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::OfflineResolver;
    use crate::store::TemplateStore;
    use crate::types::DRAFT4_META_SCHEMA;
    use serde_json::json;
    use std::sync::Arc;

    fn compiler() -> Compiler {
        Compiler::new(
            Arc::new(TemplateStore::builtin().unwrap()),
            Arc::new(OfflineResolver),
            DRAFT4_META_SCHEMA,
        )
    }

    #[test]
    fn equal_schemas_skip_compilation() {
        // "$nothing" would fail to compile
        let c = compiler();
        assert!(!is_incompatible(&c, &json!("$nothing"), &json!("$nothing")).unwrap());
    }

    #[test]
    fn array_against_integer() {
        let c = compiler();
        let emits = json!({"$array": {"items": "$number"}});
        assert!(is_incompatible(&c, &emits, &json!({"type": "integer"})).unwrap());
        assert!(!is_incompatible(
            &c,
            &emits,
            &json!({"type": "array", "items": {"type": "number"}})
        )
        .unwrap());
    }

    #[test]
    fn primitive_pairs() {
        let c = compiler();
        assert!(is_incompatible(&c, &json!("$string"), &json!("$integer")).unwrap());
        assert!(!is_incompatible(&c, &json!("$integer"), &json!("$number")).unwrap());
        assert!(!is_incompatible(&c, &json!("$boolean"), &json!("$atomicValue")).unwrap());
    }

    #[test]
    fn enum_values_all_checked() {
        let c = compiler();
        let emits = json!({"$string": {"enum": ["a", "bbbb"]}});
        let short = json!({"$string": {"maxLength": 2}});
        assert!(is_incompatible(&c, &emits, &short).unwrap());
        assert!(!is_incompatible(&c, &emits, &json!("$string")).unwrap());
    }

    #[test]
    fn positional_length_mismatch() {
        let c = compiler();
        let emits = json!({"$array": {"items": ["$number", "$number"]}});
        let accepts = json!({"$array": {"items": ["$number", "$number", "$number"]}});
        assert!(is_incompatible(&c, &emits, &accepts).unwrap());
        let accepts = json!({"$array": {"items": ["$number", "$number"], "minItems": 2}});
        assert!(!is_incompatible(&c, &emits, &accepts).unwrap());
    }

    #[test]
    fn compile_errors_propagate() {
        let c = compiler();
        let result = is_incompatible(&c, &json!("$nothing"), &json!("$integer"));
        assert!(matches!(result, Err(CompileError::UnknownReference { .. })));
    }
}
