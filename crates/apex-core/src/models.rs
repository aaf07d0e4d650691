//! Named, pre-compiled schemas shared between routes.
//!
//! A model is registered once and referenced by name from any route
//! builder. Registering the same descriptor under several names compiles it
//! once.

use crate::schema::{Schema, SchemaError, Validator};
use indexmap::IndexMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct Model {
    schema: Schema,
    validator: Validator,
}

/// A registry of named models.
///
/// Persistent like the route builders: `register` returns a new registry
/// and clones are cheap.
#[derive(Debug, Clone, Default)]
pub struct Models {
    compiled: Arc<Vec<Model>>,
    names: Arc<IndexMap<String, usize>>,
}

impl Models {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `schema` as `name`.
    ///
    /// The first registration of a name wins; later ones are ignored. A
    /// schema structurally equal to one already compiled reuses its
    /// validator.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] if the schema does not compile.
    pub fn register(mut self, name: impl Into<String>, schema: Schema) -> Result<Self, SchemaError> {
        let name = name.into();
        if self.names.contains_key(&name) {
            return Ok(self);
        }

        let index = match self.compiled.iter().position(|m| m.schema == schema) {
            Some(index) => index,
            None => {
                let validator = schema.compile()?;
                let compiled = Arc::make_mut(&mut self.compiled);
                compiled.push(Model { schema, validator });
                compiled.len() - 1
            }
        };

        Arc::make_mut(&mut self.names).insert(name, index);
        Ok(self)
    }

    /// The validator registered as `name`.
    pub fn get(&self, name: &str) -> Option<Validator> {
        self.model(name).map(|m| m.validator.clone())
    }

    /// The descriptor registered as `name`.
    pub fn schema(&self, name: &str) -> Option<&Schema> {
        self.model(name).map(|m| &m.schema)
    }

    /// True if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.keys().map(String::as_str)
    }

    /// Number of registered names.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    fn model(&self, name: &str) -> Option<&Model> {
        self.names.get(name).and_then(|&i| self.compiled.get(i))
    }
}
