//! Transformer chains: joining, encoding and pipeline construction.
//!
//! A chain is the ordered list of transformers applied after some starting
//! function. It travels as a compact token, the URL-safe base64 of a JSON
//! array with one element per link:
//!
//! ```text
//! ["Tsquare", "Iprice", ["http://other.example/transform/f", {"type": "number"}],
//!  ["Tstr", "$string", "Price as text"]]
//! ```
//!
//! A link is a bare reference string, or `[reference, emits?, description?]`
//! for the terminal link and for external references. References are `T`
//! followed by a built-in name, `I` followed by a predictor name, or a
//! locator. Only the terminal link carries a description.

use std::fmt;
use std::sync::{Arc, OnceLock};

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::compat::is_incompatible;
use crate::compiler::add_enum;
use crate::engine::Engine;
use crate::error::{BadValueError, ChainError, FunctionError};
use crate::function::{compose, Description, Function, Transformer};
use crate::types::is_locator;
use crate::validator::validate;

/// Tag of a built-in transformer reference.
pub const BUILTIN_TAG: char = 'T';
/// Tag of a predictor reference.
pub const PREDICTOR_TAG: char = 'I';
/// Query parameter carrying a nested chain token.
pub const CHAIN_QUERY_KEY: &str = "t";

const TRANSFORM_ROUTE: &str = "/transform/";
const INFER_ROUTE: &str = "/infer/";

const TOKEN_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// What a chain link points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Reference {
    Builtin(String),
    Predictor(String),
    External(String),
}

impl Reference {
    /// Parse the short form used in tokens.
    ///
    /// # Errors
    ///
    /// Returns `ChainError::InvalidReference` for anything that is neither a
    /// tagged name nor a locator.
    pub fn parse(s: &str) -> Result<Self, ChainError> {
        let reference = if let Some(name) = s.strip_prefix(BUILTIN_TAG) {
            Reference::Builtin(name.to_string())
        } else if let Some(name) = s.strip_prefix(PREDICTOR_TAG) {
            Reference::Predictor(name.to_string())
        } else if is_locator(s) {
            Reference::External(s.to_string())
        } else {
            return Err(ChainError::InvalidReference {
                reference: s.to_string(),
            });
        };

        match &reference {
            Reference::Builtin(name) | Reference::Predictor(name) if name.is_empty() => {
                Err(ChainError::InvalidReference {
                    reference: s.to_string(),
                })
            }
            _ => Ok(reference),
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self, Reference::External(_))
    }

    /// Full URI of the referenced transformer.
    ///
    /// Local references are placed under `service_base`, or left relative
    /// without one.
    pub fn uri(&self, service_base: Option<&str>) -> String {
        let base = service_base.unwrap_or_default();
        match self {
            Reference::Builtin(name) => format!("{base}{TRANSFORM_ROUTE}{name}"),
            Reference::Predictor(name) => format!("{base}{INFER_ROUTE}{name}"),
            Reference::External(locator) => locator.clone(),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Builtin(name) => write!(f, "{BUILTIN_TAG}{name}"),
            Reference::Predictor(name) => write!(f, "{PREDICTOR_TAG}{name}"),
            Reference::External(locator) => f.write_str(locator),
        }
    }
}

/// One stage of a chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    reference: Reference,
    /// Cached emits schema, resolved on demand when absent.
    emits: Option<Value>,
    description: Option<String>,
}

impl Link {
    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    pub fn emits(&self) -> Option<&Value> {
        self.emits.as_ref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn to_json(&self, is_last: bool) -> Value {
        let reference = Value::String(self.reference.to_string());
        if !is_last && !self.reference.is_external() {
            return reference;
        }

        // A description without emits keeps a null emits slot.
        let description = self.description.as_ref().filter(|_| is_last);
        let mut parts = vec![reference];
        if self.emits.is_some() || description.is_some() {
            parts.push(self.emits.clone().unwrap_or(Value::Null));
        }
        if let Some(description) = description {
            parts.push(Value::String(description.clone()));
        }
        Value::Array(parts)
    }

    fn from_json(value: &Value, is_last: bool) -> Result<Self, ChainError> {
        let malformed = |message: &str| ChainError::MalformedToken {
            message: format!("{message}: {value}"),
        };

        match value {
            Value::String(s) => Ok(Self {
                reference: Reference::parse(s)?,
                emits: None,
                description: None,
            }),
            Value::Array(parts) if (1..=3).contains(&parts.len()) => {
                let reference = parts[0]
                    .as_str()
                    .ok_or_else(|| malformed("link reference must be a string"))?;
                let emits = parts.get(1).filter(|emits| !emits.is_null()).cloned();
                let description = match parts.get(2) {
                    None | Some(Value::Null) => None,
                    Some(Value::String(description)) => Some(description.clone()),
                    Some(_) => return Err(malformed("link description must be a string")),
                };
                if description.is_some() && !is_last {
                    return Err(malformed("only the last link may have a description"));
                }
                Ok(Self {
                    reference: Reference::parse(reference)?,
                    emits,
                    description,
                })
            }
            _ => Err(malformed("link must be a string or an array of one to three elements")),
        }
    }
}

/// An ordered, non-empty list of links.
///
/// Two chains are equal when they encode to the same JSON.
#[derive(Debug, Clone)]
pub struct Chain {
    links: Vec<Link>,
    encoded: OnceLock<String>,
}

impl PartialEq for Chain {
    fn eq(&self, other: &Self) -> bool {
        self.to_json() == other.to_json()
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl Chain {
    fn empty() -> Self {
        Self {
            links: Vec::new(),
            encoded: OnceLock::new(),
        }
    }

    /// Start a new chain after `producer`, or extend `existing`, with the
    /// transformer `next` names.
    ///
    /// `next` is a short reference or a locator. Locators under this
    /// service's base are rewritten to short references, and a nested chain
    /// token in their `t` query parameter is spliced in after them.
    ///
    /// # Errors
    ///
    /// Returns `ChainError::Incompatible` if the current end of the chain
    /// emits values `next` does not accept, and `EnumDerivation` if one of
    /// the enumerated values it emits is rejected by the new links. Either
    /// way nothing is appended.
    pub fn create(
        engine: &Engine,
        producer: &dyn Transformer,
        existing: Option<Chain>,
        next: &str,
        description: Option<&str>,
    ) -> Result<Chain, ChainError> {
        match existing {
            Some(mut chain) => {
                chain.add(engine, next, description)?;
                Ok(chain)
            }
            None => {
                let must_accept = producer.describe()?.emits;
                let mut chain = Chain::empty();
                chain.append(engine, &must_accept, next, description)?;
                Ok(chain)
            }
        }
    }

    /// Append `next` after the current end of the chain.
    ///
    /// See [`create`](Self::create).
    pub fn add(
        &mut self,
        engine: &Engine,
        next: &str,
        description: Option<&str>,
    ) -> Result<(), ChainError> {
        let end = self.links.last().ok_or_else(empty_chain)?;
        let must_accept = link_emits(engine, end)?;
        self.append(engine, &must_accept, next, description)
    }

    fn append(
        &mut self,
        engine: &Engine,
        must_accept: &Value,
        next: &str,
        description: Option<&str>,
    ) -> Result<(), ChainError> {
        let (reference, nested) = localize(next, engine.options().service_base.as_deref())?;
        let transformer = engine.functions().resolve(&reference)?;
        let described = transformer.describe()?;
        check_compatible(engine, must_accept, &described.accepts)?;

        let start = self.links.len();
        let mut links = self.links.clone();
        links.push(Link {
            reference,
            emits: Some(described.emits),
            description: None,
        });
        if let Some(token) = nested {
            links.extend(Chain::decode(&token)?.links);
        }
        if let Some(end) = links.last_mut() {
            end.description = description.map(str::to_string);
        }

        derive_enum(engine, must_accept, &mut links[start..])?;

        debug!(next, links = links.len(), "joined transformer");
        self.links = links;
        self.encoded = OnceLock::new();
        Ok(())
    }

    /// Decode a chain token.
    ///
    /// Transformers are not resolved until the chain is extended or turned
    /// into a pipeline.
    ///
    /// # Errors
    ///
    /// Returns `ChainError::MalformedToken` if the token is not base64 of a
    /// non-empty JSON array of links, and `InvalidReference` for a link that
    /// names nothing.
    pub fn decode(token: &str) -> Result<Chain, ChainError> {
        let bytes = TOKEN_ENGINE
            .decode(token.trim())
            .map_err(|e| ChainError::MalformedToken {
                message: format!("not valid base64: {e}"),
            })?;
        let json: Value =
            serde_json::from_slice(&bytes).map_err(|e| ChainError::MalformedToken {
                message: format!("not valid JSON: {e}"),
            })?;
        let Value::Array(elements) = json else {
            return Err(ChainError::MalformedToken {
                message: "not a JSON array".to_string(),
            });
        };
        if elements.is_empty() {
            return Err(empty_chain());
        }

        let last = elements.len() - 1;
        let links = elements
            .iter()
            .enumerate()
            .map(|(i, element)| Link::from_json(element, i == last))
            .collect::<Result<Vec<_>, _>>()?;
        trace!(links = links.len(), "decoded chain");

        Ok(Self {
            links,
            encoded: OnceLock::from(token.trim().to_string()),
        })
    }

    /// The chain token. Computed once until the chain changes.
    pub fn encode(&self) -> &str {
        self.encoded
            .get_or_init(|| TOKEN_ENGINE.encode(self.to_json().to_string()))
    }

    pub fn to_json(&self) -> Value {
        let last = self.links.len().saturating_sub(1);
        Value::Array(
            self.links
                .iter()
                .enumerate()
                .map(|(i, link)| link.to_json(i == last))
                .collect(),
        )
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Emits schema of the last link, if known without resolving it.
    pub fn emits(&self) -> Option<&Value> {
        self.links.last().and_then(Link::emits)
    }

    pub fn description(&self) -> Option<&str> {
        self.links.last().and_then(Link::description)
    }

    /// Nested `{"transformer": uri, "joinedWith": {...}}` entries, one per
    /// link.
    pub fn provenance(&self, service_base: Option<&str>) -> Value {
        self.links.iter().rev().fold(Value::Null, |inner, link| {
            let mut entry = Map::new();
            entry.insert(
                "transformer".to_string(),
                Value::String(link.reference.uri(service_base)),
            );
            if !inner.is_null() {
                entry.insert("joinedWith".to_string(), inner);
            }
            Value::Object(entry)
        })
    }

    /// Description of `start` followed by this chain.
    ///
    /// `start_uri` identifies `start` in the provenance; any query is
    /// dropped.
    pub fn describe_joined(
        &self,
        engine: &Engine,
        start: &dyn Transformer,
        start_uri: &str,
    ) -> Result<Description, ChainError> {
        let start_description = start.describe()?;
        let end = self.links.last().ok_or_else(empty_chain)?;
        let emits = link_emits(engine, end)?;

        let description = match self.description() {
            Some(description) => description.to_string(),
            None => format!(
                "{} (transformed)",
                start_description.description.as_deref().unwrap_or(start.name())
            ),
        };

        let mut provenance = match start_description.provenance {
            Value::Object(provenance) => provenance,
            _ => Map::new(),
        };
        let uri = start_uri.split_once('?').map_or(start_uri, |(uri, _)| uri);
        provenance.insert("transformer".to_string(), Value::String(uri.to_string()));
        provenance.insert(
            "joinedWith".to_string(),
            self.provenance(engine.options().service_base.as_deref()),
        );

        Ok(Description {
            accepts: start_description.accepts,
            emits,
            description: Some(description),
            provenance: Value::Object(provenance),
        })
    }

    /// Compose `start` with every link of the chain.
    ///
    /// # Errors
    ///
    /// Returns `ChainError::Incompatible` if `start` emits values the first
    /// link does not accept, plus any error resolving a link.
    pub fn build_pipeline(
        &self,
        engine: &Engine,
        start: Arc<dyn Transformer>,
    ) -> Result<Pipeline, ChainError> {
        let first = self.links.first().ok_or_else(empty_chain)?;
        let first = engine.functions().resolve(&first.reference)?;
        let start_description = start.describe()?;
        check_compatible(engine, &start_description.emits, &first.describe()?.accepts)?;

        let mut stages: Vec<Box<dyn Function>> = vec![Box::new(start), Box::new(first)];
        for link in &self.links[1..] {
            stages.push(Box::new(engine.functions().resolve(&link.reference)?));
        }

        let accepts = engine.compiler().compile_schema(&start_description.accepts)?;
        let function = compose(stages).ok_or_else(empty_chain)?;
        Ok(Pipeline::new(accepts, function))
    }
}

fn empty_chain() -> ChainError {
    ChainError::MalformedToken {
        message: "chain has no links".to_string(),
    }
}

/// Rewrite a locator under `service_base` to a short reference plus any
/// nested chain token.
fn localize(
    next: &str,
    service_base: Option<&str>,
) -> Result<(Reference, Option<String>), ChainError> {
    if !is_locator(next) {
        return Ok((Reference::parse(next)?, None));
    }
    let external = || Ok((Reference::External(next.to_string()), None));

    let Some(rest) = service_base.and_then(|base| next.strip_prefix(base)) else {
        return external();
    };
    if !(rest.is_empty() || rest.starts_with('/') || rest.starts_with('?')) {
        return external();
    }

    let (path, query) = rest.split_once('?').unwrap_or((rest, ""));
    let not_local = || ChainError::NotLocal {
        locator: next.to_string(),
    };
    let reference = if let Some(id) = path.strip_prefix(TRANSFORM_ROUTE) {
        Reference::Builtin(id.to_string())
    } else if let Some(id) = path.strip_prefix(INFER_ROUTE) {
        Reference::Predictor(id.to_string())
    } else {
        return Err(not_local());
    };
    if let Reference::Builtin(id) | Reference::Predictor(id) = &reference {
        if id.is_empty() || id.contains('/') {
            return Err(not_local());
        }
    }

    let nested = query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == CHAIN_QUERY_KEY)
        .map(|(_, token)| token.to_string());
    trace!(locator = next, reference = %reference, "localized reference");
    Ok((reference, nested))
}

fn check_compatible(engine: &Engine, emits: &Value, accepts: &Value) -> Result<(), ChainError> {
    if is_incompatible(engine.compiler(), emits, accepts)? {
        return Err(ChainError::Incompatible {
            emits: emits.clone(),
            accepts: accepts.clone(),
        });
    }
    Ok(())
}

fn link_emits(engine: &Engine, link: &Link) -> Result<Value, ChainError> {
    match &link.emits {
        Some(emits) => Ok(emits.clone()),
        None => Ok(engine.functions().resolve(&link.reference)?.describe()?.emits),
    }
}

/// Carry the enumerated values `prev_emits` declares through `rest`.
///
/// Only done when `rest` ends without an enumeration of its own and every
/// transformer in it is pure. The terminal emits schema of `rest` is replaced
/// by one enumerating the transformed values.
fn derive_enum(engine: &Engine, prev_emits: &Value, rest: &mut [Link]) -> Result<(), ChainError> {
    let prev = engine.compiler().compile_schema(prev_emits)?;
    let Some(values) = prev.get("enum").and_then(Value::as_array) else {
        return Ok(());
    };
    let Some(end) = rest.last() else {
        return Ok(());
    };
    let end_emits = link_emits(engine, end)?;
    if engine.compiler().compile_schema(&end_emits)?.get("enum").is_some() {
        return Ok(());
    }

    let mut stages: Vec<Box<dyn Function>> = Vec::with_capacity(rest.len());
    for link in rest.iter() {
        let transformer = engine.functions().resolve(&link.reference)?;
        if !transformer.is_pure() {
            return Ok(());
        }
        stages.push(Box::new(transformer));
    }
    let Some(pipeline) = compose(stages) else {
        return Ok(());
    };

    let derived = pipeline
        .apply_all(values)
        .map_err(|source| ChainError::EnumDerivation { source })?;
    debug!(values = derived.len(), "derived enumerated emits");
    let emits = add_enum(&end_emits, &derived)?;
    if let Some(end) = rest.last_mut() {
        end.emits = Some(emits);
    }
    Ok(())
}

/// A composed function that knows the schema of its input.
pub struct Pipeline {
    accepts: Value,
    function: Box<dyn Function>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("accepts", &self.accepts)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    pub(crate) fn new(accepts: Value, function: Box<dyn Function>) -> Self {
        Self { accepts, function }
    }

    /// Compiled schema of the values the pipeline accepts.
    pub fn accepts(&self) -> &Value {
        &self.accepts
    }

    /// Validate `value` against [`accepts`](Self::accepts) before applying.
    ///
    /// # Errors
    ///
    /// Returns `BadValueError::Rejected` listing every validation error.
    pub fn apply_checked(&self, value: &Value) -> Result<Value, FunctionError> {
        let errors = validate(&self.accepts, value)?;
        if !errors.is_empty() {
            return Err(BadValueError::Rejected { errors }.into());
        }
        self.function.apply(value)
    }
}

impl Function for Pipeline {
    fn apply(&self, value: &Value) -> Result<Value, FunctionError> {
        self.function.apply(value)
    }

    fn apply_all(&self, values: &[Value]) -> Result<Vec<Value>, FunctionError> {
        self.function.apply_all(values)
    }
}
