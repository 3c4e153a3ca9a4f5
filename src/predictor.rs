//! Predictive-model transformers.
//!
//! A [`Predictor`] wraps a [`Model`] from a closed set of families. Models
//! are built from JSON parameters, so a trained model can be persisted and
//! restored by whoever owns it. Until training completes a predictor is not
//! ready and refuses both application and description.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{BadValueError, FunctionError, ModelError};
use crate::function::{Description, Function, Transformer};
use crate::types::json_type_name;

/// Ids of every supported model family, sorted.
pub const FAMILIES: &[&str] = &["linear", "nearest_centroid"];

/// Weighted sum of the features plus an intercept.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Linear {
    pub weights: Vec<f64>,
    #[serde(default)]
    pub intercept: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Centroid {
    pub label: Value,
    pub center: Vec<f64>,
}

/// Predicts the label of the centroid closest to the features.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NearestCentroid {
    pub centroids: Vec<Centroid>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Model {
    Linear(Linear),
    NearestCentroid(NearestCentroid),
}

impl Model {
    /// Build a model of `family` from its JSON parameters.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::UnknownFamily` for ids not in [`FAMILIES`] and
    /// `ModelError::InvalidParameters` when the parameters don't describe a
    /// usable model.
    pub fn from_params(family: &str, params: &Value) -> Result<Self, ModelError> {
        let invalid = |message: String| ModelError::InvalidParameters {
            family: family.to_string(),
            message,
        };

        let model = match family {
            "linear" => Model::Linear(
                serde_json::from_value(params.clone()).map_err(|e| invalid(e.to_string()))?,
            ),
            "nearest_centroid" => Model::NearestCentroid(
                serde_json::from_value(params.clone()).map_err(|e| invalid(e.to_string()))?,
            ),
            _ => {
                return Err(ModelError::UnknownFamily {
                    id: family.to_string(),
                })
            }
        };

        match &model {
            Model::Linear(linear) if linear.weights.is_empty() => {
                return Err(invalid("at least one weight is required".to_string()));
            }
            Model::NearestCentroid(nc) => {
                let first = nc
                    .centroids
                    .first()
                    .ok_or_else(|| invalid("at least one centroid is required".to_string()))?;
                if first.center.is_empty() {
                    return Err(invalid("centroids must have at least one dimension".to_string()));
                }
                if nc.centroids.iter().any(|c| c.center.len() != first.center.len()) {
                    return Err(invalid("centroids differ in dimension".to_string()));
                }
            }
            _ => {}
        }

        Ok(model)
    }

    pub fn family(&self) -> &'static str {
        match self {
            Model::Linear(_) => "linear",
            Model::NearestCentroid(_) => "nearest_centroid",
        }
    }

    /// Number of features the model expects.
    pub fn feature_count(&self) -> usize {
        match self {
            Model::Linear(linear) => linear.weights.len(),
            Model::NearestCentroid(nc) => nc.centroids.first().map_or(0, |c| c.center.len()),
        }
    }

    /// Schema-language description of the feature array.
    pub fn accepts(&self) -> Value {
        let items = vec![json!("$number"); self.feature_count()];
        json!({"$array": {"items": items}})
    }

    /// Schema-language description of a prediction.
    pub fn emits(&self) -> Value {
        match self {
            Model::Linear(_) => json!("$number"),
            Model::NearestCentroid(nc) => {
                let labels: Vec<Value> = nc.centroids.iter().map(|c| c.label.clone()).collect();
                json!({ "enum": labels })
            }
        }
    }

    /// `features` must already have [`feature_count`](Self::feature_count)
    /// entries.
    fn predict(&self, features: &[f64]) -> Value {
        match self {
            Model::Linear(linear) => {
                let sum: f64 = linear
                    .weights
                    .iter()
                    .zip(features)
                    .map(|(w, x)| w * x)
                    .sum();
                Value::from(sum + linear.intercept)
            }
            Model::NearestCentroid(nc) => nc
                .centroids
                .iter()
                .map(|c| (squared_distance(&c.center, features), &c.label))
                .min_by(|a, b| a.0.total_cmp(&b.0))
                .map_or(Value::Null, |(_, label)| label.clone()),
        }
    }
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Lifecycle of a predictor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredictorState {
    Training { status: String },
    Failed { reason: String },
    Ready,
}

impl fmt::Display for PredictorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredictorState::Training { status } => write!(f, "training ({status})"),
            PredictorState::Failed { reason } => write!(f, "failed ({reason})"),
            PredictorState::Ready => f.write_str("ready"),
        }
    }
}

/// A named, stateful transformer backed by a predictive model.
#[derive(Debug)]
pub struct Predictor {
    name: String,
    model: Model,
    description: Option<String>,
    provenance: Value,
    state: RwLock<PredictorState>,
}

impl Predictor {
    /// A predictor that is ready immediately.
    pub fn new(name: impl Into<String>, model: Model) -> Self {
        Self::with_state(name.into(), model, PredictorState::Ready)
    }

    /// A predictor whose model is still being trained.
    pub fn training(name: impl Into<String>, model: Model, status: impl Into<String>) -> Self {
        Self::with_state(
            name.into(),
            model,
            PredictorState::Training {
                status: status.into(),
            },
        )
    }

    fn with_state(name: String, model: Model, state: PredictorState) -> Self {
        let provenance = json!({ "model": model.family() });
        Self {
            name,
            model,
            description: None,
            provenance,
            state: RwLock::new(state),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_provenance(mut self, provenance: Value) -> Self {
        self.provenance = provenance;
        self
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn state(&self) -> PredictorState {
        self.state.read().clone()
    }

    pub fn set_state(&self, state: PredictorState) {
        debug!(name = %self.name, state = %state, "predictor state changed");
        *self.state.write() = state;
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.state.read(), PredictorState::Ready)
    }

    fn ensure_ready(&self) -> Result<(), FunctionError> {
        let state = self.state.read();
        if matches!(*state, PredictorState::Ready) {
            Ok(())
        } else {
            Err(FunctionError::NotReady {
                name: self.name.clone(),
                status: state.to_string(),
            })
        }
    }
}

impl Function for Predictor {
    fn apply(&self, value: &Value) -> Result<Value, FunctionError> {
        self.ensure_ready()?;

        let items = value.as_array().ok_or_else(|| BadValueError::WrongType {
            expected: "array".to_string(),
            actual: json_type_name(value).to_string(),
        })?;
        let expected = self.model.feature_count();
        if items.len() != expected {
            return Err(BadValueError::ArrayLengthMismatch {
                expected,
                actual: items.len(),
            }
            .into());
        }
        let features = items
            .iter()
            .map(|item| {
                item.as_f64().ok_or_else(|| BadValueError::WrongType {
                    expected: "number".to_string(),
                    actual: json_type_name(item).to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(self.model.predict(&features))
    }
}

impl Transformer for Predictor {
    fn name(&self) -> &str {
        &self.name
    }

    fn describe(&self) -> Result<Description, FunctionError> {
        self.ensure_ready()?;
        Ok(Description {
            accepts: self.model.accepts(),
            emits: self.model.emits(),
            description: self.description.clone(),
            provenance: self.provenance.clone(),
        })
    }
}

/// Named predictors plus the set of names reserved for in-flight training.
#[derive(Debug, Default)]
pub struct PredictorRegistry {
    predictors: RwLock<HashMap<String, Arc<Predictor>>>,
    reserved: Mutex<HashSet<String>>,
}

impl PredictorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `predictor` under its own name, replacing any previous one
    /// and releasing a reservation of that name.
    pub fn insert(&self, predictor: Predictor) -> Arc<Predictor> {
        let predictor = Arc::new(predictor);
        let name = predictor.name().to_string();
        self.predictors
            .write()
            .insert(name.clone(), Arc::clone(&predictor));
        self.reserved.lock().remove(&name);
        debug!(name = %name, "registered predictor");
        predictor
    }

    pub fn get(&self, name: &str) -> Option<Arc<Predictor>> {
        self.predictors.read().get(name).cloned()
    }

    pub fn remove(&self, name: &str) -> Option<Arc<Predictor>> {
        self.predictors.write().remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.predictors.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Reserve the first free name out of `lead`, `lead-2`, `lead-3`, ...
    ///
    /// A name is free when it is neither registered nor reserved.
    pub fn reserve_name(&self, lead: &str) -> String {
        let mut reserved = self.reserved.lock();
        let predictors = self.predictors.read();
        let taken = |name: &str| reserved.contains(name) || predictors.contains_key(name);

        let mut name = lead.to_string();
        let mut n = 2;
        while taken(&name) {
            name = format!("{lead}-{n}");
            n += 1;
        }
        drop(predictors);
        reserved.insert(name.clone());
        name
    }

    /// Give up a reservation without registering a predictor.
    pub fn release(&self, name: &str) -> bool {
        self.reserved.lock().remove(name)
    }
}
