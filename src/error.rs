//! Error types for schema compilation, validation and transformer chains.
//!
//! Every operation family has its own tagged error so callers can branch on
//! the kind of failure without inspecting messages. Each top-level error also
//! maps onto a process exit code for the CLI:
//!
//! | Code | Meaning |
//! |------|---------|
//! | 1 | value rejected or join incompatible |
//! | 2 | bad input (schema, token, reference) |
//! | 3 | I/O or external resource failure |

use std::path::PathBuf;

use serde_json::Value;
use thiserror::Error;

/// A referenced resource outside this process could not be used.
#[derive(Debug, Clone, Error)]
pub enum ExternalError {
    #[error("failed to fetch {locator}: {message}")]
    Network { locator: String, message: String },

    #[error("response from {locator} is not valid JSON: {message}")]
    InvalidJson { locator: String, message: String },

    #[error("unexpected response from {locator}: {message}")]
    UnexpectedShape { locator: String, message: String },

    #[error("cannot fetch {locator}: remote resolution is not available")]
    Unsupported { locator: String },
}

/// Errors loading schema text or template files.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid template {path}: {source}")]
    InvalidTemplate {
        path: PathBuf,
        #[source]
        source: CompileError,
    },

    #[error(transparent)]
    External(#[from] ExternalError),
}

/// Errors compiling schema-language trees.
#[derive(Debug, Clone, Error)]
pub enum CompileError {
    #[error("schema with id \"{id}\" not found in current context")]
    UnknownReference { id: String },

    #[error("arguments to schema reference {reference} must be an object, got {actual}")]
    InvalidReferenceArguments { reference: String, actual: String },

    #[error("schema context already contains a schema with id '{id}'; it cannot be replaced")]
    DuplicateLocal { id: String },

    #[error("schema \"{id}\" refers back to itself")]
    CyclicReference { id: String },

    #[error("template '{name}' is invalid: {message}")]
    InvalidTemplate { name: String, message: String },

    #[error("template argument '{name}' is not valid JSON: {message}")]
    InvalidArgument { name: String, message: String },

    #[error("compiled schema must be an object, got {actual}")]
    NotAnObject { actual: String },

    #[error("unable to insert 'enum' property into schema: {schema}")]
    EnumInsertion { schema: Value },

    #[error("invalid schema: {message}")]
    InvalidSchema { message: String },

    #[error(transparent)]
    External(#[from] ExternalError),
}

/// Errors from validating a value against a schema.
#[derive(Debug, Error)]
pub enum ValidateError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("validation failed with {} error(s)", errors.len())]
    Invalid { errors: Vec<SchemaError> },
}

/// A function was given a value it cannot process.
#[derive(Debug, Clone, Error)]
pub enum BadValueError {
    #[error("value rejected: {}", join_errors(errors))]
    Rejected { errors: Vec<SchemaError> },

    #[error("expected array of size {expected} but was given one of size {actual}")]
    ArrayLengthMismatch { expected: usize, actual: usize },

    #[error("expected {expected} value, got {actual}")]
    WrongType { expected: String, actual: String },

    #[error("{message}")]
    Invalid { message: String },
}

/// Errors applying or describing a function.
#[derive(Debug, Clone, Error)]
pub enum FunctionError {
    #[error(transparent)]
    BadValue(#[from] BadValueError),

    #[error("transformer '{name}' is not ready: {status}")]
    NotReady { name: String, status: String },

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    External(#[from] ExternalError),
}

/// Errors constructing predictive models.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("unknown model family '{id}'")]
    UnknownFamily { id: String },

    #[error("invalid parameters for model family '{family}': {message}")]
    InvalidParameters { family: String, message: String },
}

/// Errors building, encoding or decoding transformer chains.
#[derive(Debug, Clone, Error)]
pub enum ChainError {
    #[error("malformed chain token: {message}")]
    MalformedToken { message: String },

    #[error("'{reference}' cannot be interpreted as a transformer reference")]
    InvalidReference { reference: String },

    #[error("no transformer found for reference '{reference}'")]
    UnknownReference { reference: String },

    #[error("'{locator}' is hosted at this service but is not a transformer or predictor")]
    NotLocal { locator: String },

    #[error("cannot perform join: producer does not appear to emit acceptable values\nemits: {emits}\naccepts: {accepts}")]
    Incompatible { emits: Value, accepts: Value },

    #[error("a value emitted by the first part of the join is not acceptable to the rest: {source}")]
    EnumDerivation {
        #[source]
        source: FunctionError,
    },

    #[error(transparent)]
    Function(#[from] FunctionError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    External(#[from] ExternalError),
}

/// Single validation error with path context.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SchemaError {
    /// JSON Pointer (RFC 6901) to the invalid field.
    pub path: String,
    /// Human-readable error message.
    pub message: String,
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "(root): {}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

fn join_errors(errors: &[SchemaError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl LoadError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            LoadError::FileNotFound { .. } | LoadError::ReadError { .. } => 3,
            LoadError::External(_) => 3,
            _ => 2,
        }
    }
}

impl CompileError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            CompileError::External(_) => 3,
            _ => 2,
        }
    }
}

impl ValidateError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            ValidateError::Compile(e) => e.exit_code(),
            ValidateError::Invalid { .. } => 1,
        }
    }
}

impl FunctionError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            FunctionError::BadValue(_) => 1,
            FunctionError::NotReady { .. } => 2,
            FunctionError::Compile(e) => e.exit_code(),
            FunctionError::External(_) => 3,
        }
    }
}

impl ChainError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            ChainError::Incompatible { .. } | ChainError::EnumDerivation { .. } => 1,
            ChainError::Function(e) => e.exit_code(),
            ChainError::Compile(e) => e.exit_code(),
            ChainError::External(_) => 3,
            _ => 2,
        }
    }
}
