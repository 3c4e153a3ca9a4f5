//! Core types for schema-language compilation.

use std::time::Duration;

use serde_json::Value;

/// Meta-schema identifier stamped onto top-level compiled schemas by default.
pub const DRAFT4_META_SCHEMA: &str = "http://json-schema.org/draft-04/schema#";

/// `$`-prefixed keys that belong to JSON Schema itself and are never references.
pub const SCHEMA_META_KEYS: &[&str] = &["$ref", "$schema"];

/// Default timeout for HTTP requests (10 seconds).
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Check if a string is a fully-qualified external locator.
pub fn is_locator(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Classification of an object key in the schema language.
///
/// Detection runs before any pass-through copy; a reserved first character
/// never starts a literal pass-through key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyForm<'a> {
    /// `#name`: local schema declaration, never emitted.
    Local(&'a str),
    /// `$name`: parametrised reference to a named schema.
    Reference(&'a str),
    /// `allItems`: homogeneous array item schema.
    AllItems,
    /// `/*`: additional-properties schema.
    AdditionalProperties,
    /// `/name`, `/name=`, `?name`, `?name=`.
    Property {
        name: &'a str,
        required: bool,
        fixed: bool,
    },
    /// Anything else, including `$ref` and `$schema`.
    PassThrough(&'a str),
}

impl<'a> KeyForm<'a> {
    /// Classify an object key.
    pub fn parse(key: &'a str) -> Self {
        if key == "allItems" {
            return KeyForm::AllItems;
        }
        if key == "/*" {
            return KeyForm::AdditionalProperties;
        }
        if let Some(id) = key.strip_prefix('#') {
            return KeyForm::Local(id);
        }
        if let Some(id) = key.strip_prefix('$') {
            if !SCHEMA_META_KEYS.contains(&key) {
                return KeyForm::Reference(id);
            }
            return KeyForm::PassThrough(key);
        }

        let (rest, required) = if let Some(rest) = key.strip_prefix('/') {
            (rest, true)
        } else if let Some(rest) = key.strip_prefix('?') {
            (rest, false)
        } else {
            return KeyForm::PassThrough(key);
        };

        match rest.strip_suffix('=') {
            Some(name) => KeyForm::Property {
                name,
                required,
                fixed: true,
            },
            None => KeyForm::Property {
                name: rest,
                required,
                fixed: false,
            },
        }
    }
}

/// Options shared by every operation of an [`Engine`](crate::Engine).
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Identifier stamped as `$schema` onto top-level compiled schemas.
    pub meta_schema: String,
    /// Base URL of this service. Locators under it are rewritten to short
    /// local references when joining. Stored without a trailing slash.
    pub service_base: Option<String>,
    /// Timeout for the HTTP resolver.
    pub http_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            meta_schema: DRAFT4_META_SCHEMA.to_string(),
            service_base: None,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl EngineOptions {
    /// Create options with the draft-04 meta-schema and no service base.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the meta-schema identifier.
    pub fn meta_schema(mut self, meta_schema: impl Into<String>) -> Self {
        self.meta_schema = meta_schema.into();
        self
    }

    /// Set the base URL of this service.
    pub fn service_base(mut self, base: impl Into<String>) -> Self {
        let base = base.into();
        self.service_base = Some(base.trim_end_matches('/').to_string());
        self
    }

    /// Set the HTTP timeout.
    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_form_local_and_reference() {
        assert_eq!(KeyForm::parse("#local"), KeyForm::Local("local"));
        assert_eq!(KeyForm::parse("$integer"), KeyForm::Reference("integer"));
    }

    #[test]
    fn key_form_schema_meta_keys_pass_through() {
        assert_eq!(KeyForm::parse("$ref"), KeyForm::PassThrough("$ref"));
        assert_eq!(KeyForm::parse("$schema"), KeyForm::PassThrough("$schema"));
    }

    #[test]
    fn key_form_properties() {
        assert_eq!(
            KeyForm::parse("/key"),
            KeyForm::Property {
                name: "key",
                required: true,
                fixed: false
            }
        );
        assert_eq!(
            KeyForm::parse("?key="),
            KeyForm::Property {
                name: "key",
                required: false,
                fixed: true
            }
        );
        assert_eq!(
            KeyForm::parse("/key="),
            KeyForm::Property {
                name: "key",
                required: true,
                fixed: true
            }
        );
    }

    #[test]
    fn key_form_structural_keys() {
        assert_eq!(KeyForm::parse("allItems"), KeyForm::AllItems);
        assert_eq!(KeyForm::parse("/*"), KeyForm::AdditionalProperties);
        assert_eq!(KeyForm::parse("items"), KeyForm::PassThrough("items"));
    }

    #[test]
    fn locators() {
        assert!(is_locator("http://example.com/schema"));
        assert!(is_locator("https://example.com/schema"));
        assert!(!is_locator("integer"));
        assert!(!is_locator("Tsquare"));
    }

    #[test]
    fn service_base_drops_trailing_slash() {
        let opts = EngineOptions::new().service_base("http://localhost:9000/");
        assert_eq!(opts.service_base.as_deref(), Some("http://localhost:9000"));
        assert_eq!(opts.meta_schema, DRAFT4_META_SCHEMA);
    }
}
