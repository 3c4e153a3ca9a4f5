//! Schema loading and external resource resolution.
//!
//! Schema-language text is loaded from files or strings. References to
//! fully-qualified locators (`http://...`) are fetched through an
//! [`ExternalResolver`], which the HTTP client implements when the `remote`
//! feature is enabled.

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;

use crate::error::{ExternalError, LoadError};

#[cfg(feature = "remote")]
use std::time::Duration;

/// Fetches JSON documents named by external locators.
///
/// Implementations may block; callers treat every fetch as slow I/O.
pub trait ExternalResolver: Send + Sync {
    /// Fetch the document at `locator`, adding `query` as URL parameters.
    fn fetch(&self, locator: &str, query: &[(&str, String)]) -> Result<Value, ExternalError>;
}

/// A resolver that refuses every locator.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineResolver;

impl ExternalResolver for OfflineResolver {
    fn fetch(&self, locator: &str, _query: &[(&str, String)]) -> Result<Value, ExternalError> {
        Err(ExternalError::Unsupported {
            locator: locator.to_string(),
        })
    }
}

/// A resolver serving documents from memory, keyed by exact locator.
///
/// Query parameters are ignored.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    documents: HashMap<String, Value>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, locator: impl Into<String>, document: Value) {
        self.documents.insert(locator.into(), document);
    }
}

impl ExternalResolver for StaticResolver {
    fn fetch(&self, locator: &str, _query: &[(&str, String)]) -> Result<Value, ExternalError> {
        self.documents
            .get(locator)
            .cloned()
            .ok_or_else(|| ExternalError::Network {
                locator: locator.to_string(),
                message: "no such document".to_string(),
            })
    }
}

/// Blocking HTTP resolver.
///
/// Requires the `remote` feature (enabled by default).
#[cfg(feature = "remote")]
#[derive(Debug, Clone)]
pub struct HttpResolver {
    client: reqwest::blocking::Client,
}

#[cfg(feature = "remote")]
impl HttpResolver {
    /// Create a resolver whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `ExternalError::Network` if the HTTP client can't be built.
    pub fn new(timeout: Duration) -> Result<Self, ExternalError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExternalError::Network {
                locator: String::new(),
                message: format!("cannot build HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }
}

#[cfg(feature = "remote")]
impl ExternalResolver for HttpResolver {
    fn fetch(&self, locator: &str, query: &[(&str, String)]) -> Result<Value, ExternalError> {
        use reqwest::header::{ACCEPT, CONTENT_TYPE};

        let network = |e: reqwest::Error| ExternalError::Network {
            locator: locator.to_string(),
            message: e.to_string(),
        };

        tracing::debug!(locator, params = query.len(), "GET");
        let response = self
            .client
            .get(locator)
            .query(query)
            .header(ACCEPT, "application/json")
            .send()
            .map_err(network)?;

        // Check for HTTP errors before parsing
        let response = response.error_for_status().map_err(network)?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.contains("json") {
            tracing::warn!(locator, content_type = %content_type, "response is not declared as JSON");
        }

        let body = response.text().map_err(network)?;
        serde_json::from_str(&body).map_err(|e| ExternalError::InvalidJson {
            locator: locator.to_string(),
            message: e.to_string(),
        })
    }
}

/// Load schema-language text from a file path.
///
/// # Errors
///
/// Returns `LoadError::FileNotFound` if the file doesn't exist,
/// or `LoadError::InvalidJson` if the file isn't valid JSON.
pub fn load_schema(path: &Path) -> Result<Value, LoadError> {
    if !path.exists() {
        return Err(LoadError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| LoadError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;

    load_schema_str(&content)
}

/// Load schema-language text from a string.
///
/// # Errors
///
/// Returns `LoadError::InvalidJson` if the string isn't valid JSON.
pub fn load_schema_str(content: &str) -> Result<Value, LoadError> {
    serde_json::from_str(content).map_err(|source| LoadError::InvalidJson { source })
}
