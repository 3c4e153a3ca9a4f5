//! Schema-language to JSON Schema compilation.
//!
//! The schema language is JSON with a few reserved shorthands:
//!
//! | Form | Meaning |
//! |------|---------|
//! | `"$id"` | reference to a template, a local, or an external locator |
//! | `{"$id": {args}}` | parametrised reference; sibling keys are discarded |
//! | `"@media/type"` | rich value: a URI to content of that media type |
//! | `"#name": value` | local declaration, never emitted |
//! | `"/name": v`, `"?name": v` | required / optional object property |
//! | `"/name=": v`, `"?name=": v` | fixed-value property, `{"enum": [v]}` |
//! | `"allItems": v` | `"items": v` |
//! | `"/*": v` | `"additionalProperties": v` |
//!
//! Any other key or string is copied through, including `$ref` and `$schema`.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::{debug, trace};

use crate::context::ResolutionContext;
use crate::error::CompileError;
use crate::loader::ExternalResolver;
use crate::store::TemplateStore;
use crate::types::{is_locator, json_type_name, KeyForm};

/// Compiles schema-language trees against a template store.
///
/// A `Compiler` is immutable and can be shared between threads; each call
/// builds its own [`ResolutionContext`].
pub struct Compiler {
    store: Arc<TemplateStore>,
    resolver: Arc<dyn ExternalResolver>,
    meta_schema: String,
}

impl std::fmt::Debug for Compiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compiler")
            .field("templates", &self.store.len())
            .field("meta_schema", &self.meta_schema)
            .finish_non_exhaustive()
    }
}

impl Compiler {
    pub fn new(
        store: Arc<TemplateStore>,
        resolver: Arc<dyn ExternalResolver>,
        meta_schema: impl Into<String>,
    ) -> Self {
        Self {
            store,
            resolver,
            meta_schema: meta_schema.into(),
        }
    }

    pub fn store(&self) -> &TemplateStore {
        &self.store
    }

    pub fn resolver(&self) -> &Arc<dyn ExternalResolver> {
        &self.resolver
    }

    pub fn meta_schema(&self) -> &str {
        &self.meta_schema
    }

    /// A fresh context seeded from this compiler's templates.
    pub fn context(&self) -> ResolutionContext {
        ResolutionContext::new(Arc::clone(&self.store))
    }

    /// Compile a value, resolving its references, without stamping it.
    ///
    /// Use this for values that embed `$` references rather than schemas.
    pub fn compile_value(&self, node: &Value) -> Result<Value, CompileError> {
        self.compile_in(node, &mut self.context())
    }

    /// Compile a top-level schema and stamp it with the meta-schema.
    ///
    /// # Errors
    ///
    /// Returns `CompileError::NotAnObject` if the compiled result is not an
    /// object, plus any error from [`compile_in`](Self::compile_in).
    pub fn compile_schema(&self, node: &Value) -> Result<Value, CompileError> {
        match self.compile_value(node)? {
            Value::Object(mut schema) => {
                schema.insert(
                    "$schema".to_string(),
                    Value::String(self.meta_schema.clone()),
                );
                Ok(Value::Object(schema))
            }
            other => Err(CompileError::NotAnObject {
                actual: json_type_name(&other).to_string(),
            }),
        }
    }

    /// Compile `node` within an existing context.
    ///
    /// # Errors
    ///
    /// Returns `UnknownReference` for ids that are neither in the context nor
    /// locators, `InvalidReferenceArguments` when a `$id` key's value isn't an
    /// object, `DuplicateLocal`, `CyclicReference`, and `External` when a
    /// locator can't be fetched.
    pub fn compile_in(
        &self,
        node: &Value,
        ctx: &mut ResolutionContext,
    ) -> Result<Value, CompileError> {
        match node {
            Value::String(s) => {
                if let Some(id) = s.strip_prefix('$') {
                    self.expand(id, None, ctx)
                } else if let Some(media_type) = s.strip_prefix('@') {
                    Ok(rich_value_schema(media_type))
                } else {
                    Ok(node.clone())
                }
            }
            Value::Array(items) => items
                .iter()
                .map(|item| self.compile_in(item, ctx))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(object) => self.compile_object(object, ctx),
            _ => Ok(node.clone()),
        }
    }

    fn compile_object(
        &self,
        object: &Map<String, Value>,
        ctx: &mut ResolutionContext,
    ) -> Result<Value, CompileError> {
        // Locals first, so references anywhere in the unit can see them.
        let mut reference = None;
        for (key, value) in object {
            match KeyForm::parse(key) {
                KeyForm::Local(id) => ctx.declare(id, value)?,
                KeyForm::Reference(id) => reference = Some((key, id, value)),
                _ => {}
            }
        }

        if let Some((key, id, args)) = reference {
            let Value::Object(args) = args else {
                return Err(CompileError::InvalidReferenceArguments {
                    reference: key.clone(),
                    actual: args.to_string(),
                });
            };
            return self.expand(id, Some(args), ctx);
        }

        let mut compiled = Map::new();
        for (key, value) in object {
            match KeyForm::parse(key) {
                KeyForm::Local(_) | KeyForm::Reference(_) => {}
                KeyForm::AllItems => {
                    let items = self.compile_in(value, ctx)?;
                    compiled.insert("items".to_string(), items);
                }
                KeyForm::AdditionalProperties => {
                    let additional = self.compile_in(value, ctx)?;
                    compiled.insert("additionalProperties".to_string(), additional);
                    mark_object(&mut compiled);
                }
                KeyForm::Property {
                    name,
                    required,
                    fixed,
                } => {
                    mark_object(&mut compiled);
                    let mut property = self.compile_in(value, ctx)?;
                    if fixed {
                        property = json!({ "enum": [property] });
                    }
                    if required {
                        push_required(&mut compiled, name);
                    }
                    insert_property(&mut compiled, name, property);
                }
                KeyForm::PassThrough(key) => {
                    let value = self.compile_in(value, ctx)?;
                    compiled.insert(key.to_string(), value);
                }
            }
        }

        Ok(Value::Object(compiled))
    }

    /// Resolve `id` and compile what it refers to.
    fn expand(
        &self,
        id: &str,
        args: Option<&Map<String, Value>>,
        ctx: &mut ResolutionContext,
    ) -> Result<Value, CompileError> {
        if is_locator(id) {
            ctx.enter(id)?;
            debug!(locator = %id, "fetching external schema");
            let result = self
                .resolver
                .fetch(id, &[])
                .map_err(CompileError::from)
                .and_then(|fetched| self.compile_in(&fetched, ctx));
            ctx.leave();
            return result;
        }

        trace!(id, has_args = args.is_some(), "resolving reference");
        let resolved = ctx.lookup(id, args)?;
        if ctx.is_local(id) {
            ctx.enter(id)?;
        } else {
            ctx.enter_template(id, &resolved)?;
        }
        let result = self.compile_in(&resolved, ctx);
        ctx.leave();
        result
    }
}

/// The compiled form of `"@media/type"`.
pub fn rich_value_schema(media_type: &str) -> Value {
    json!({
        "type": "string",
        "format": "uri",
        "mediaType": media_type,
    })
}

/// Insert an `enum` of `values` into an uncompiled schema.
///
/// Supported shapes are a `"$id"` string, an object whose first key is a
/// `$id` reference with object arguments, and any other object.
///
/// # Errors
///
/// Returns `CompileError::EnumInsertion` for any other shape.
pub fn add_enum(schema: &Value, values: &[Value]) -> Result<Value, CompileError> {
    let insertion_error = || CompileError::EnumInsertion {
        schema: schema.clone(),
    };

    let mut object = match schema {
        Value::String(s) if s.starts_with('$') => {
            let mut wrapper = Map::new();
            wrapper.insert(s.clone(), Value::Object(Map::new()));
            wrapper
        }
        Value::Object(object) => object.clone(),
        _ => return Err(insertion_error()),
    };

    let enum_values = Value::Array(values.to_vec());
    let first_is_reference = object
        .keys()
        .next()
        .is_some_and(|key| matches!(KeyForm::parse(key), KeyForm::Reference(_)));

    if first_is_reference {
        match object.values_mut().next() {
            Some(Value::Object(args)) => {
                args.insert("enum".to_string(), enum_values);
            }
            _ => return Err(insertion_error()),
        }
    } else {
        object.insert("enum".to_string(), enum_values);
    }

    Ok(Value::Object(object))
}

fn mark_object(schema: &mut Map<String, Value>) {
    schema.insert("type".to_string(), Value::String("object".to_string()));
}

fn push_required(schema: &mut Map<String, Value>, name: &str) {
    match schema.get_mut("required").and_then(Value::as_array_mut) {
        Some(required) => required.push(Value::String(name.to_string())),
        None => {
            schema.insert("required".to_string(), json!([name]));
        }
    }
}

fn insert_property(schema: &mut Map<String, Value>, name: &str, property: Value) {
    match schema.get_mut("properties").and_then(Value::as_object_mut) {
        Some(properties) => {
            properties.insert(name.to_string(), property);
        }
        None => {
            let mut properties = Map::new();
            properties.insert(name.to_string(), property);
            schema.insert("properties".to_string(), Value::Object(properties));
        }
    }
}
