//! PSI Schema
//!
//! Compiles the PSI schema language into JSON Schema, and composes
//! transformers into type-checked chains that travel as compact tokens.
//!
//! # Example
//!
//! ```
//! use psi_schema::{Engine, Function};
//! use serde_json::json;
//!
//! let engine = Engine::with_defaults().unwrap();
//!
//! let schema = engine
//!     .compile(&json!({"/key": "$integer", "?note": "$string"}))
//!     .unwrap();
//! assert_eq!(schema["type"], "object");
//! assert_eq!(schema["required"], json!(["key"]));
//!
//! // Count characters, then square the count
//! let chain = engine
//!     .join("Tlength", None, "Tsquare", Some("Squared length"))
//!     .unwrap();
//! let token = chain.encode().to_string();
//!
//! let chain = engine.decode(&token).unwrap();
//! let pipeline = engine.pipeline("Tlength", Some(&chain)).unwrap();
//! assert_eq!(pipeline.apply(&json!("four")).unwrap(), json!(16.0));
//! ```
//!
//! # Schema Language
//!
//! | Form | Compiles to |
//! |------|-------------|
//! | `"$integer"` | the `integer` template, a `#local`, or a fetched locator |
//! | `{"$integer": {"min": 0}}` | the template with `%min` replaced |
//! | `{"/a": s, "?b": t}` | object with `a` required and `b` optional |
//! | `{"/c=": v}` | property `c` fixed to `{"enum": [v]}` |
//! | `{"allItems": s}` | `{"items": s}` |
//! | `{"/*": s}` | `{"additionalProperties": s}` |
//! | `"@image/png"` | URI string of that media type |
//!
//! # Chains
//!
//! Joining checks that the producer's emits schema is compatible with the
//! consumer's accepts schema by validating a witness value (or every
//! enumerated value) before anything is appended. See [`Chain`].

mod builtin;
mod chain;
mod compat;
mod compiler;
mod context;
mod engine;
mod error;
mod external;
mod function;
mod generator;
mod loader;
mod predictor;
mod registry;
mod store;
mod template;
mod types;
mod validator;

pub use builtin::{Builtin, BuiltinTable, NAMES as BUILTIN_NAMES};
pub use chain::{Chain, Link, Pipeline, Reference, BUILTIN_TAG, CHAIN_QUERY_KEY, PREDICTOR_TAG};
pub use compat::is_incompatible;
pub use compiler::{add_enum, rich_value_schema, Compiler};
pub use context::ResolutionContext;
pub use engine::Engine;
pub use error::{
    BadValueError, ChainError, CompileError, ExternalError, FunctionError, LoadError, ModelError,
    SchemaError, ValidateError,
};
pub use external::ExternalTransformer;
pub use function::{compose, Description, Function, Joined, Transformer};
pub use generator::generate;
pub use loader::{load_schema, load_schema_str, ExternalResolver, OfflineResolver, StaticResolver};
pub use predictor::{
    Centroid, Linear, Model, NearestCentroid, Predictor, PredictorRegistry, PredictorState,
    FAMILIES as MODEL_FAMILIES,
};
pub use registry::FunctionRegistry;
pub use store::TemplateStore;
pub use template::{Template, TemplateArg};
pub use types::{is_locator, json_type_name, EngineOptions, KeyForm, DEFAULT_HTTP_TIMEOUT, DRAFT4_META_SCHEMA};
pub use validator::{check, validate, validate_all};

#[cfg(feature = "remote")]
pub use loader::HttpResolver;
