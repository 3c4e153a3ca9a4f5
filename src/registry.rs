//! Resolution of chain references to live transformers.

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::builtin::BuiltinTable;
use crate::chain::Reference;
use crate::error::ChainError;
use crate::external::ExternalTransformer;
use crate::function::Transformer;
use crate::loader::ExternalResolver;
use crate::predictor::PredictorRegistry;

/// Every source of transformers a chain can name.
///
/// Built-ins are instantiated lazily and shared. Predictors come from an
/// injected [`PredictorRegistry`] so their owner can keep training and
/// registering them. External transformers are created per resolution.
pub struct FunctionRegistry {
    builtins: BuiltinTable,
    predictors: Arc<PredictorRegistry>,
    resolver: Arc<dyn ExternalResolver>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("builtins", &self.builtins)
            .field("predictors", &self.predictors.names())
            .finish_non_exhaustive()
    }
}

impl FunctionRegistry {
    pub fn new(predictors: Arc<PredictorRegistry>, resolver: Arc<dyn ExternalResolver>) -> Self {
        Self {
            builtins: BuiltinTable::new(),
            predictors,
            resolver,
        }
    }

    pub fn builtins(&self) -> &BuiltinTable {
        &self.builtins
    }

    pub fn predictors(&self) -> &Arc<PredictorRegistry> {
        &self.predictors
    }

    /// The transformer `reference` names.
    ///
    /// # Errors
    ///
    /// Returns `ChainError::UnknownReference` if no built-in or predictor
    /// has that name. External references always resolve; failures surface
    /// when they are described or applied.
    pub fn resolve(&self, reference: &Reference) -> Result<Arc<dyn Transformer>, ChainError> {
        trace!(reference = %reference, "resolving transformer");
        let unknown = || ChainError::UnknownReference {
            reference: reference.to_string(),
        };
        match reference {
            Reference::Builtin(name) => self
                .builtins
                .load(name)
                .map(|b| b as Arc<dyn Transformer>)
                .ok_or_else(unknown),
            Reference::Predictor(name) => self
                .predictors
                .get(name)
                .map(|p| p as Arc<dyn Transformer>)
                .ok_or_else(unknown),
            Reference::External(locator) => Ok(Arc::new(ExternalTransformer::new(
                locator.clone(),
                Arc::clone(&self.resolver),
            ))),
        }
    }
}
