//! Per-compilation namespace of templates and local schema declarations.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::CompileError;
use crate::store::TemplateStore;

/// Deepest nesting of reference expansions in one compilation.
const MAX_EXPANSION_DEPTH: usize = 64;

/// Identifier namespace for one compilation unit.
///
/// Seeded from a shared [`TemplateStore`] and extended with every `#name`
/// declaration met while compiling the same top-level tree. A local declared
/// anywhere in the unit is visible to every later resolution, wherever it
/// occurs in the document.
///
/// Each compilation needs its own context; locals must not leak between
/// unrelated compilations.
#[derive(Debug)]
pub struct ResolutionContext {
    store: Arc<TemplateStore>,
    locals: HashMap<String, Value>,
    /// References currently being expanded, innermost last. Templates also
    /// record the body they expanded to.
    active: Vec<(String, Option<Value>)>,
}

impl ResolutionContext {
    pub fn new(store: Arc<TemplateStore>) -> Self {
        Self {
            store,
            locals: HashMap::new(),
            active: Vec::new(),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.locals.contains_key(id) || self.store.contains(id)
    }

    pub fn is_local(&self, id: &str) -> bool {
        self.locals.contains_key(id)
    }

    /// Register a local schema fragment, unresolved.
    ///
    /// Re-declaring a local with an identical value is accepted, since the
    /// same fragment may be compiled more than once in a unit.
    ///
    /// # Errors
    ///
    /// Returns `CompileError::DuplicateLocal` if `id` names a template or a
    /// local with a different value.
    pub fn declare(&mut self, id: &str, value: &Value) -> Result<(), CompileError> {
        let duplicate = || CompileError::DuplicateLocal { id: id.to_string() };
        if self.store.contains(id) {
            return Err(duplicate());
        }
        match self.locals.get(id) {
            Some(existing) if existing == value => Ok(()),
            Some(_) => Err(duplicate()),
            None => {
                self.locals.insert(id.to_string(), value.clone());
                Ok(())
            }
        }
    }

    /// Look up `id` and produce its uncompiled schema.
    ///
    /// Templates are substituted with `args`; locals ignore them.
    ///
    /// # Errors
    ///
    /// Returns `CompileError::UnknownReference` if `id` isn't in the context.
    pub fn lookup(&self, id: &str, args: Option<&Map<String, Value>>) -> Result<Value, CompileError> {
        if let Some(local) = self.locals.get(id) {
            return Ok(local.clone());
        }
        let template = self
            .store
            .get(id)
            .ok_or_else(|| CompileError::UnknownReference { id: id.to_string() })?;
        match args {
            Some(args) => template.substitute_object(args),
            None => Ok(template.render_default()),
        }
    }

    /// Mark `id` as being expanded.
    ///
    /// # Errors
    ///
    /// Returns `CompileError::CyclicReference` if `id` is already being
    /// expanded further up.
    pub(crate) fn enter(&mut self, id: &str) -> Result<(), CompileError> {
        self.push(id, None)
    }

    /// Mark template `id`, substituted to `body`, as being expanded.
    ///
    /// A template may legitimately appear inside its own arguments, so only
    /// a repeat of the same substituted body counts as a cycle.
    ///
    /// # Errors
    ///
    /// Returns `CompileError::CyclicReference` on a repeated expansion or
    /// when expansions nest too deeply.
    pub(crate) fn enter_template(&mut self, id: &str, body: &Value) -> Result<(), CompileError> {
        self.push(id, Some(body))
    }

    fn push(&mut self, id: &str, body: Option<&Value>) -> Result<(), CompileError> {
        let repeated = self
            .active
            .iter()
            .any(|(active, active_body)| active == id && active_body.as_ref() == body);
        if repeated || self.active.len() >= MAX_EXPANSION_DEPTH {
            return Err(CompileError::CyclicReference { id: id.to_string() });
        }
        self.active.push((id.to_string(), body.cloned()));
        Ok(())
    }

    pub(crate) fn leave(&mut self) {
        self.active.pop();
    }
}
