//! Named schema templates and variable substitution.
//!
//! A template is schema-language text in which some property values are
//! template variables of the form `"%name"`:
//!
//! ```json
//! { "type": "integer", "default": "%default", "minimum": "%min" }
//! ```
//!
//! Substitution replaces every occurrence of each supplied variable, removes
//! the properties whose variable was not supplied, and then inserts any
//! remaining arguments as new top-level properties.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::CompileError;

/// Argument value for a template variable.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateArg {
    /// Raw schema-language text, parsed as JSON before use.
    Text(String),
    /// An already-built tree, used as is.
    Node(Value),
}

impl TemplateArg {
    fn into_value(self, name: &str) -> Result<Value, CompileError> {
        match self {
            TemplateArg::Node(value) => Ok(value),
            TemplateArg::Text(text) => {
                serde_json::from_str(&text).map_err(|e| CompileError::InvalidArgument {
                    name: name.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }
}

impl From<Value> for TemplateArg {
    fn from(value: Value) -> Self {
        TemplateArg::Node(value)
    }
}

impl From<&str> for TemplateArg {
    fn from(text: &str) -> Self {
        TemplateArg::Text(text.to_string())
    }
}

/// An immutable schema template.
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    raw: String,
    schema: Map<String, Value>,
    /// Variable name (without `%`) to every property path holding it.
    variables: BTreeMap<String, Vec<Vec<String>>>,
}

impl Template {
    /// Parse a template from its text.
    ///
    /// # Errors
    ///
    /// Returns `CompileError::InvalidTemplate` if the text is not a JSON object.
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Result<Self, CompileError> {
        let name = name.into();
        let raw = text.into();

        let parsed: Value =
            serde_json::from_str(&raw).map_err(|e| CompileError::InvalidTemplate {
                name: name.clone(),
                message: e.to_string(),
            })?;
        let Value::Object(schema) = parsed else {
            return Err(CompileError::InvalidTemplate {
                name,
                message: "templates must be JSON objects".to_string(),
            });
        };

        let mut variables = BTreeMap::new();
        collect_variables(&schema, &mut Vec::new(), &mut variables);

        Ok(Self {
            name,
            raw,
            schema,
            variables,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The text the template was loaded from.
    pub fn raw_text(&self) -> &str {
        &self.raw
    }

    /// Names of the template's variables, sorted.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(String::as_str)
    }

    /// Property paths at which `variable` appears.
    pub fn variable_paths(&self, variable: &str) -> Option<&[Vec<String>]> {
        self.variables.get(variable).map(Vec::as_slice)
    }

    /// The template tree with variables left in place.
    pub fn render_raw(&self) -> Value {
        Value::Object(self.schema.clone())
    }

    /// The template with every variable unset.
    pub fn render_default(&self) -> Value {
        let mut schema = self.schema.clone();
        self.remove_unset(&mut schema);
        Value::Object(schema)
    }

    /// Substitute `args` into a private copy of the template.
    ///
    /// Arguments naming a variable replace every occurrence of it. Variables
    /// left unset have their properties removed. Arguments that name no
    /// variable are then inserted at the top level unless a property of that
    /// name already exists.
    ///
    /// # Errors
    ///
    /// Returns `CompileError::InvalidArgument` if a text argument isn't JSON.
    pub fn substitute<'a, I>(&self, args: I) -> Result<Value, CompileError>
    where
        I: IntoIterator<Item = (&'a str, TemplateArg)>,
    {
        let mut schema = self.schema.clone();
        let mut additional = Vec::new();

        for (name, arg) in args {
            let value = arg.into_value(name)?;
            match self.variables.get(name) {
                Some(paths) => {
                    for path in paths {
                        set_at_path(&mut schema, path, value.clone());
                    }
                }
                None => additional.push((name, value)),
            }
        }

        self.remove_unset(&mut schema);

        for (name, value) in additional {
            if !schema.contains_key(name) {
                schema.insert(name.to_string(), value);
            }
        }

        Ok(Value::Object(schema))
    }

    /// Substitute the properties of a JSON object as arguments.
    pub fn substitute_object(&self, args: &Map<String, Value>) -> Result<Value, CompileError> {
        self.substitute(
            args.iter()
                .map(|(name, value)| (name.as_str(), TemplateArg::Node(value.clone()))),
        )
    }

    fn remove_unset(&self, schema: &mut Map<String, Value>) {
        for (variable, paths) in &self.variables {
            for path in paths {
                if let Some((last, parents)) = path.split_last() {
                    let Some(parent) = object_at_path(schema, parents) else {
                        continue;
                    };
                    let unset = matches!(
                        parent.get(last),
                        Some(Value::String(s)) if s.strip_prefix('%') == Some(variable.as_str())
                    );
                    if unset {
                        parent.remove(last);
                    }
                }
            }
        }
    }
}

/// Returns the variable name if `value` is a `%name` marker.
fn variable_name(value: &Value) -> Option<&str> {
    let name = value.as_str()?.strip_prefix('%')?;
    let is_word = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    is_word.then_some(name)
}

fn collect_variables(
    object: &Map<String, Value>,
    path: &mut Vec<String>,
    variables: &mut BTreeMap<String, Vec<Vec<String>>>,
) {
    for (key, value) in object {
        path.push(key.clone());
        if let Some(name) = variable_name(value) {
            variables
                .entry(name.to_string())
                .or_default()
                .push(path.clone());
        } else if let Value::Object(nested) = value {
            collect_variables(nested, path, variables);
        }
        path.pop();
    }
}

fn object_at_path<'m>(
    object: &'m mut Map<String, Value>,
    path: &[String],
) -> Option<&'m mut Map<String, Value>> {
    let mut current = object;
    for key in path {
        current = current.get_mut(key)?.as_object_mut()?;
    }
    Some(current)
}

fn set_at_path(object: &mut Map<String, Value>, path: &[String], value: Value) {
    if let Some((last, parents)) = path.split_last() {
        if let Some(parent) = object_at_path(object, parents) {
            parent.insert(last.clone(), value);
        }
    }
}
