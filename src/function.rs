//! Functions and transformers: values in, values out.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FunctionError;

/// Something that can be applied to a JSON value.
pub trait Function: Send + Sync {
    fn apply(&self, value: &Value) -> Result<Value, FunctionError>;

    /// Apply to every value in order, failing on the first error.
    fn apply_all(&self, values: &[Value]) -> Result<Vec<Value>, FunctionError> {
        values.iter().map(|value| self.apply(value)).collect()
    }
}

impl<F: Function + ?Sized> Function for Arc<F> {
    fn apply(&self, value: &Value) -> Result<Value, FunctionError> {
        (**self).apply(value)
    }

    fn apply_all(&self, values: &[Value]) -> Result<Vec<Value>, FunctionError> {
        (**self).apply_all(values)
    }
}

impl<F: Function + ?Sized> Function for Box<F> {
    fn apply(&self, value: &Value) -> Result<Value, FunctionError> {
        (**self).apply(value)
    }

    fn apply_all(&self, values: &[Value]) -> Result<Vec<Value>, FunctionError> {
        (**self).apply_all(values)
    }
}

/// Public description of a transformer.
///
/// `accepts` and `emits` are uncompiled schema-language trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Description {
    pub accepts: Value,
    pub emits: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub provenance: Value,
}

/// A named function with declared input and output schemas.
pub trait Transformer: Function {
    fn name(&self) -> &str;

    fn describe(&self) -> Result<Description, FunctionError>;

    /// Whether applying this transformer has no side effects and always maps
    /// the same input to the same output.
    fn is_pure(&self) -> bool {
        false
    }
}

/// `then ∘ first`: the output of `first` is fed to `then`.
pub struct Joined {
    first: Box<dyn Function>,
    then: Box<dyn Function>,
}

impl Joined {
    pub fn new(first: Box<dyn Function>, then: Box<dyn Function>) -> Self {
        Self { first, then }
    }
}

impl Function for Joined {
    fn apply(&self, value: &Value) -> Result<Value, FunctionError> {
        self.then.apply(&self.first.apply(value)?)
    }

    fn apply_all(&self, values: &[Value]) -> Result<Vec<Value>, FunctionError> {
        self.then.apply_all(&self.first.apply_all(values)?)
    }
}

/// Right-fold `stages` into one function applying them in order.
///
/// Returns `None` when `stages` is empty.
pub fn compose<I>(stages: I) -> Option<Box<dyn Function>>
where
    I: IntoIterator<Item = Box<dyn Function>>,
    I::IntoIter: DoubleEndedIterator,
{
    stages
        .into_iter()
        .rev()
        .fold(None::<Box<dyn Function>>, |rest, stage| {
            Some(match rest {
                None => stage,
                Some(rest) => Box::new(Joined::new(stage, rest)) as Box<dyn Function>,
            })
        })
}
