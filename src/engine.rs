//! The engine: one entry point for compilation, validation and chains.

use std::sync::Arc;

use serde_json::Value;

use crate::chain::{Chain, Pipeline, Reference};
use crate::compat;
use crate::compiler::Compiler;
use crate::error::{ChainError, CompileError, SchemaError, ValidateError};
use crate::function::Transformer;
use crate::generator::generate;
use crate::loader::ExternalResolver;
use crate::predictor::PredictorRegistry;
use crate::registry::FunctionRegistry;
use crate::store::TemplateStore;
use crate::types::EngineOptions;
use crate::validator;

/// Compiles schemas and composes transformers.
///
/// An `Engine` holds no per-call state and can be shared between threads.
#[derive(Debug)]
pub struct Engine {
    compiler: Compiler,
    functions: FunctionRegistry,
    options: EngineOptions,
}

impl Engine {
    pub fn new(
        store: TemplateStore,
        resolver: Arc<dyn ExternalResolver>,
        predictors: Arc<PredictorRegistry>,
        options: EngineOptions,
    ) -> Self {
        let compiler = Compiler::new(
            Arc::new(store),
            Arc::clone(&resolver),
            options.meta_schema.clone(),
        );
        let functions = FunctionRegistry::new(predictors, resolver);
        Self {
            compiler,
            functions,
            options,
        }
    }

    /// An engine over `store` using the default resolver: HTTP when the
    /// `remote` feature is enabled, otherwise one refusing every locator.
    ///
    /// # Errors
    ///
    /// Returns `CompileError::External` if the HTTP client can't be built.
    pub fn with_store(store: TemplateStore, options: EngineOptions) -> Result<Self, CompileError> {
        #[cfg(feature = "remote")]
        let resolver: Arc<dyn ExternalResolver> =
            Arc::new(crate::loader::HttpResolver::new(options.http_timeout)?);
        #[cfg(not(feature = "remote"))]
        let resolver: Arc<dyn ExternalResolver> = Arc::new(crate::loader::OfflineResolver);

        Ok(Self::new(
            store,
            resolver,
            Arc::new(PredictorRegistry::new()),
            options,
        ))
    }

    /// An engine over the predefined templates with default options.
    pub fn with_defaults() -> Result<Self, CompileError> {
        Self::with_store(TemplateStore::builtin()?, EngineOptions::default())
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn compiler(&self) -> &Compiler {
        &self.compiler
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn templates(&self) -> &TemplateStore {
        self.compiler.store()
    }

    pub fn predictors(&self) -> &Arc<PredictorRegistry> {
        self.functions.predictors()
    }

    /// Compile a schema-language tree to a stamped JSON Schema.
    pub fn compile(&self, schema: &Value) -> Result<Value, CompileError> {
        self.compiler.compile_schema(schema)
    }

    /// Resolve the references in a value without stamping it.
    pub fn compile_value(&self, value: &Value) -> Result<Value, CompileError> {
        self.compiler.compile_value(value)
    }

    /// Validate `value` against an already-compiled schema.
    pub fn validate(&self, compiled: &Value, value: &Value) -> Result<Vec<SchemaError>, CompileError> {
        validator::validate(compiled, value)
    }

    /// Compile `schema`, then validate `value` against it.
    pub fn validate_schema(&self, schema: &Value, value: &Value) -> Result<(), ValidateError> {
        let compiled = self.compile(schema)?;
        validator::check(&compiled, value)
    }

    /// Resolve the references in `value` itself before validating it
    /// against `schema`.
    pub fn validate_with_resolution(
        &self,
        schema: &Value,
        value: &Value,
    ) -> Result<(), ValidateError> {
        let compiled = self.compile(schema)?;
        let value = self.compile_value(value)?;
        validator::check(&compiled, &value)
    }

    /// See [`compat::is_incompatible`].
    pub fn is_incompatible(&self, emits: &Value, accepts: &Value) -> Result<bool, CompileError> {
        compat::is_incompatible(&self.compiler, emits, accepts)
    }

    /// A sample value of the schema-language tree `schema`.
    pub fn witness(&self, schema: &Value) -> Result<Value, CompileError> {
        Ok(generate(&self.compile(schema)?))
    }

    /// The transformer named by a short reference or locator.
    pub fn transformer(&self, reference: &str) -> Result<Arc<dyn Transformer>, ChainError> {
        self.functions.resolve(&Reference::parse(reference)?)
    }

    /// Join `next` to the transformer `start`, or to the end of `existing`
    /// if given, returning the extended chain.
    pub fn join(
        &self,
        start: &str,
        existing: Option<&str>,
        next: &str,
        description: Option<&str>,
    ) -> Result<Chain, ChainError> {
        let producer = self.transformer(start)?;
        let existing = existing.map(Chain::decode).transpose()?;
        Chain::create(self, producer.as_ref(), existing, next, description)
    }

    pub fn decode(&self, token: &str) -> Result<Chain, ChainError> {
        Chain::decode(token)
    }

    /// A pipeline applying `start`, then every link of `chain` if given.
    pub fn pipeline(&self, start: &str, chain: Option<&Chain>) -> Result<Pipeline, ChainError> {
        let start = self.transformer(start)?;
        match chain {
            Some(chain) => chain.build_pipeline(self, start),
            None => {
                let accepts = self.compile(&start.describe()?.accepts)?;
                Ok(Pipeline::new(accepts, Box::new(start)))
            }
        }
    }
}
