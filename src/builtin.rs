//! Built-in transformers: small, stateless functions addressed by name.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::trace;

use crate::error::{BadValueError, FunctionError};
use crate::function::{Description, Function, Transformer};
use crate::types::json_type_name;

/// Names of every built-in transformer, sorted.
pub const NAMES: &[&str] = &["average", "length", "product", "square", "str"];

/// Shared by every built-in.
const CREATED: &str = "2013-08-05T00:00Z";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Square,
    Average,
    Product,
    Str,
    Length,
}

impl Op {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "square" => Op::Square,
            "average" => Op::Average,
            "product" => Op::Product,
            "str" => Op::Str,
            "length" => Op::Length,
            _ => return None,
        })
    }
}

/// A built-in transformer.
///
/// Every built-in maps `null` to `null`.
#[derive(Debug, Clone)]
pub struct Builtin {
    name: &'static str,
    op: Op,
    accepts: Value,
    emits: Value,
    description: &'static str,
}

impl Builtin {
    /// The built-in called `name`, if there is one.
    pub fn named(name: &str) -> Option<Self> {
        let op = Op::from_name(name)?;
        let numbers = json!({"$array": {"items": "$number", "minItems": 1}});
        let (name, accepts, emits, description) = match op {
            Op::Square => (
                "square",
                json!("$number"),
                json!("$number"),
                "Calculates the square of a number",
            ),
            Op::Average => (
                "average",
                numbers,
                json!("$number"),
                "Calculates the average of an array of numbers",
            ),
            Op::Product => (
                "product",
                numbers,
                json!("$number"),
                "Calculates the product of an array of numbers",
            ),
            Op::Str => (
                "str",
                json!("$atomicValue"),
                json!("$string"),
                "Returns a string representation of a numerical, boolean or (already) string value",
            ),
            Op::Length => (
                "length",
                json!("$string"),
                json!("$integer"),
                "Counts the characters in a string",
            ),
        };
        Some(Self {
            name,
            op,
            accepts,
            emits,
            description,
        })
    }
}

fn wrong_type(expected: &str, actual: &Value) -> FunctionError {
    BadValueError::WrongType {
        expected: expected.to_string(),
        actual: json_type_name(actual).to_string(),
    }
    .into()
}

fn as_number(value: &Value) -> Result<f64, FunctionError> {
    value.as_f64().ok_or_else(|| wrong_type("number", value))
}

fn as_numbers(value: &Value) -> Result<Vec<f64>, FunctionError> {
    value
        .as_array()
        .ok_or_else(|| wrong_type("array", value))?
        .iter()
        .map(as_number)
        .collect()
}

impl Function for Builtin {
    fn apply(&self, value: &Value) -> Result<Value, FunctionError> {
        if value.is_null() {
            return Ok(Value::Null);
        }

        let result = match self.op {
            Op::Square => Value::from(as_number(value)?.powi(2)),
            Op::Average => {
                let numbers = as_numbers(value)?;
                if numbers.is_empty() {
                    return Err(BadValueError::Invalid {
                        message: "cannot average an empty array".to_string(),
                    }
                    .into());
                }
                Value::from(numbers.iter().sum::<f64>() / numbers.len() as f64)
            }
            Op::Product => Value::from(as_numbers(value)?.iter().product::<f64>()),
            Op::Str => match value {
                Value::String(s) => Value::String(s.clone()),
                Value::Number(n) => Value::String(n.to_string()),
                Value::Bool(b) => Value::String(b.to_string()),
                other => return Err(wrong_type("atomic", other)),
            },
            Op::Length => match value {
                Value::String(s) => Value::from(s.chars().count()),
                other => return Err(wrong_type("string", other)),
            },
        };
        Ok(result)
    }
}

impl Transformer for Builtin {
    fn name(&self) -> &str {
        self.name
    }

    fn describe(&self) -> Result<Description, FunctionError> {
        Ok(Description {
            accepts: self.accepts.clone(),
            emits: self.emits.clone(),
            description: Some(self.description.to_string()),
            provenance: json!({ "created": CREATED }),
        })
    }

    fn is_pure(&self) -> bool {
        true
    }
}

/// Lazily populated table of built-in singletons.
#[derive(Debug, Default)]
pub struct BuiltinTable {
    cache: Mutex<HashMap<&'static str, Arc<Builtin>>>,
}

impl BuiltinTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared instance of the built-in called `name`.
    pub fn load(&self, name: &str) -> Option<Arc<Builtin>> {
        let mut cache = self.cache.lock();
        if let Some(builtin) = cache.get(name) {
            return Some(Arc::clone(builtin));
        }
        let builtin = Arc::new(Builtin::named(name)?);
        trace!(name, "instantiated built-in transformer");
        cache.insert(builtin.name, Arc::clone(&builtin));
        Some(builtin)
    }

    pub fn names(&self) -> &'static [&'static str] {
        NAMES
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(name: &str, value: Value) -> Result<Value, FunctionError> {
        Builtin::named(name).unwrap().apply(&value)
    }

    #[test]
    fn every_name_is_defined() {
        for name in NAMES {
            let builtin = Builtin::named(name).unwrap();
            assert_eq!(builtin.name(), *name);
        }
        assert!(Builtin::named("cube").is_none());
    }

    #[test]
    fn square() {
        assert_eq!(apply("square", json!(3)).unwrap(), json!(9.0));
        assert_eq!(apply("square", json!(-1.5)).unwrap(), json!(2.25));
    }

    #[test]
    fn average_and_product() {
        assert_eq!(apply("average", json!([1, 2, 3, 6])).unwrap(), json!(3.0));
        assert_eq!(apply("product", json!([1, 2, 3, 4])).unwrap(), json!(24.0));
        assert!(matches!(
            apply("average", json!([])),
            Err(FunctionError::BadValue(BadValueError::Invalid { .. }))
        ));
    }

    #[test]
    fn str_and_length() {
        assert_eq!(apply("str", json!(12)).unwrap(), json!("12"));
        assert_eq!(apply("str", json!(true)).unwrap(), json!("true"));
        assert_eq!(apply("str", json!("x")).unwrap(), json!("x"));
        assert_eq!(apply("length", json!("héllo")).unwrap(), json!(5));
    }

    #[test]
    fn null_maps_to_null() {
        for name in NAMES {
            assert_eq!(apply(name, Value::Null).unwrap(), Value::Null);
        }
    }

    #[test]
    fn wrong_types_are_bad_values() {
        assert!(matches!(
            apply("square", json!("two")),
            Err(FunctionError::BadValue(BadValueError::WrongType { .. }))
        ));
        assert!(matches!(
            apply("product", json!([1, "2"])),
            Err(FunctionError::BadValue(BadValueError::WrongType { .. }))
        ));
        assert!(matches!(
            apply("str", json!([1])),
            Err(FunctionError::BadValue(BadValueError::WrongType { .. }))
        ));
    }

    #[test]
    fn table_returns_singletons() {
        let table = BuiltinTable::new();
        let a = table.load("square").unwrap();
        let b = table.load("square").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(table.load("cube").is_none());
    }

    #[test]
    fn description_is_pure_with_provenance() {
        let builtin = Builtin::named("length").unwrap();
        let description = builtin.describe().unwrap();
        assert_eq!(description.accepts, json!("$string"));
        assert_eq!(description.emits, json!("$integer"));
        assert_eq!(description.provenance["created"], CREATED);
        assert!(builtin.is_pure());
    }
}
