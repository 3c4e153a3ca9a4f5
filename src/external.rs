//! Transformers hosted by another service.
//!
//! The locator serves the transformer's [`Description`] on a plain GET, and
//! applies it when called with a `value` query parameter holding the JSON
//! input, answering `{"value": output}`.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use crate::error::{ExternalError, FunctionError};
use crate::function::{Description, Function, Transformer};
use crate::loader::ExternalResolver;

/// Query parameter and response property carrying the value.
const VALUE_KEY: &str = "value";

/// Proxy for a transformer at a remote locator.
pub struct ExternalTransformer {
    locator: String,
    resolver: Arc<dyn ExternalResolver>,
    metadata: Mutex<Option<Description>>,
}

impl fmt::Debug for ExternalTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalTransformer")
            .field("locator", &self.locator)
            .field("described", &self.metadata.lock().is_some())
            .finish_non_exhaustive()
    }
}

impl ExternalTransformer {
    pub fn new(locator: impl Into<String>, resolver: Arc<dyn ExternalResolver>) -> Self {
        Self {
            locator: locator.into(),
            resolver,
            metadata: Mutex::new(None),
        }
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    /// Fetch the description again, replacing any cached copy.
    pub fn refresh(&self) -> Result<Description, FunctionError> {
        debug!(locator = %self.locator, "fetching transformer description");
        let document = self.resolver.fetch(&self.locator, &[])?;
        let description: Description =
            serde_json::from_value(document).map_err(|e| ExternalError::UnexpectedShape {
                locator: self.locator.clone(),
                message: e.to_string(),
            })?;
        *self.metadata.lock() = Some(description.clone());
        Ok(description)
    }
}

impl Function for ExternalTransformer {
    fn apply(&self, value: &Value) -> Result<Value, FunctionError> {
        let response = self
            .resolver
            .fetch(&self.locator, &[(VALUE_KEY, value.to_string())])?;
        let unexpected = |message: String| ExternalError::UnexpectedShape {
            locator: self.locator.clone(),
            message,
        };
        match response {
            Value::Object(mut object) => object.remove(VALUE_KEY).ok_or_else(|| {
                unexpected(format!("response has no \"{VALUE_KEY}\" property")).into()
            }),
            other => Err(unexpected(format!("expected an object, got {other}")).into()),
        }
    }
}

impl Transformer for ExternalTransformer {
    fn name(&self) -> &str {
        &self.locator
    }

    fn describe(&self) -> Result<Description, FunctionError> {
        let cached = self.metadata.lock().clone();
        match cached {
            Some(description) => Ok(description),
            None => self.refresh(),
        }
    }
}
