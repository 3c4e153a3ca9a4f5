//! The template store: named schema templates available to every compilation.
//!
//! The built-in library is embedded at compile time. A directory of `*.json`
//! files may be loaded on top of it, each file stem naming a template.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::debug;

use crate::error::{CompileError, LoadError};
use crate::template::Template;

macro_rules! builtin_templates {
    ($($name:literal),* $(,)?) => {
        &[$(($name, include_str!(concat!("../templates/", $name, ".json")))),*]
    };
}

/// Name and text of every predefined template.
const BUILTIN: &[(&str, &str)] = builtin_templates![
    "array",
    "arrayAttribute",
    "atomicAttribute",
    "atomicValue",
    "atomicValueSchema",
    "attribute",
    "boolean",
    "fixedAttribute",
    "integer",
    "nominalAttribute",
    "nominalValueSchema",
    "number",
    "numberAttribute",
    "numberSchema",
    "object",
    "relation",
    "richValueAttribute",
    "richValueSchema",
    "string",
    "uri",
];

/// Read-only collection of templates keyed by name.
#[derive(Debug, Clone, Default)]
pub struct TemplateStore {
    templates: BTreeMap<String, Template>,
}

impl TemplateStore {
    /// A store with no templates.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A store holding the predefined template library.
    ///
    /// # Errors
    ///
    /// Returns `CompileError::InvalidTemplate` if an embedded template is
    /// malformed.
    pub fn builtin() -> Result<Self, CompileError> {
        let mut store = Self::empty();
        for (name, text) in BUILTIN {
            store.insert(Template::new(*name, *text)?);
        }
        Ok(store)
    }

    /// Load every `*.json` file in `dir`, replacing templates of the same name.
    ///
    /// Returns the number of templates loaded.
    ///
    /// # Errors
    ///
    /// Returns `LoadError::FileNotFound` if `dir` doesn't exist, `ReadError`
    /// if it can't be listed or a file can't be read, and `InvalidTemplate`
    /// if a file is not a JSON object.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, LoadError> {
        if !dir.exists() {
            return Err(LoadError::FileNotFound {
                path: dir.to_path_buf(),
            });
        }

        let read_error = |source| LoadError::ReadError {
            path: dir.to_path_buf(),
            source,
        };
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(read_error)? {
            let path = entry.map_err(read_error)?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        for path in &paths {
            let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let text = std::fs::read_to_string(path).map_err(|source| LoadError::ReadError {
                path: path.clone(),
                source,
            })?;
            let template =
                Template::new(name, text).map_err(|source| LoadError::InvalidTemplate {
                    path: path.clone(),
                    source,
                })?;
            if self.contains(name) {
                debug!(name, path = %path.display(), "overriding template");
            }
            self.insert(template);
        }

        Ok(paths.len())
    }

    /// Add a template, replacing any existing one with the same name.
    pub fn insert(&mut self, template: Template) {
        self.templates.insert(template.name().to_string(), template);
    }

    pub fn get(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Template names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
