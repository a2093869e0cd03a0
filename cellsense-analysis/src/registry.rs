//! Named schema registry
//!
//! Loading happens in two phases. Raw [`SchemaDescription`]s are registered first under their
//! names; [`SchemaRegistry::build_all`] then builds every pending definition, so a
//! `resolveRef` may name any definition regardless of registration order. Built schemas can
//! also be registered directly.

use crate::builder::SchemaBuilder;
use crate::description::SchemaDescription;
use crate::error::SchemaError;
use crate::schema::{Schema, SchemaKind, SchemaRef};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    definitions: IndexMap<String, SchemaDescription>,
    schemas: IndexMap<String, SchemaRef>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a raw definition. Registering an identical definition again is a no-op.
    pub fn register_definition(
        &mut self,
        name: impl Into<String>,
        description: SchemaDescription,
    ) -> Result<(), SchemaError> {
        let name = name.into();
        match self.definitions.get(&name) {
            Some(existing) if *existing == description => Ok(()),
            Some(_) => Err(SchemaError::ConflictingDefinition(name)),
            None => {
                self.definitions.insert(name, description);
                Ok(())
            }
        }
    }

    /// Register a built schema under `name`, giving it that id if it has none.
    ///
    /// Re-registering a structurally equal schema returns the existing entry.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        schema: impl Into<SchemaRef>,
    ) -> Result<SchemaRef, SchemaError> {
        let name = name.into();
        let mut schema = schema.into();
        if schema.id.is_none() {
            Arc::make_mut(&mut schema).id = Some(name.clone());
        }
        match self.schemas.get(&name) {
            Some(existing) if **existing == *schema => Ok(Arc::clone(existing)),
            Some(_) => Err(SchemaError::ConflictingDefinition(name)),
            None => {
                tracing::trace!(name = %name, kind = schema.type_name(), "registered schema");
                self.schemas.insert(name, Arc::clone(&schema));
                Ok(schema)
            }
        }
    }

    /// Build every definition that has no built schema yet.
    pub fn build_all(&mut self) -> Result<(), SchemaError> {
        let pending: Vec<String> = self
            .definitions
            .keys()
            .filter(|name| !self.schemas.contains_key(*name))
            .cloned()
            .collect();
        let built = {
            let mut builder = SchemaBuilder::new(self);
            pending
                .iter()
                .map(|name| builder.resolve(name).map(|schema| (name.clone(), schema)))
                .collect::<Result<Vec<_>, _>>()?
        };
        tracing::debug!(count = built.len(), "built schema definitions");
        for (name, schema) in built {
            self.register(name, schema)?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<SchemaRef> {
        self.schemas.get(name).cloned()
    }

    pub fn definition(&self, name: &str) -> Option<&SchemaDescription> {
        self.definitions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Follow `ref` schemas until a concrete one is reached.
    pub fn resolve(&self, schema: &SchemaRef) -> Result<SchemaRef, SchemaError> {
        let mut current = Arc::clone(schema);
        let mut seen = HashSet::new();
        while let SchemaKind::Ref(name) = &current.kind {
            if !seen.insert(name.clone()) {
                return Err(SchemaError::CyclicReference(name.clone()));
            }
            current = self
                .get(name)
                .ok_or_else(|| SchemaError::UnknownReference(name.clone()))?;
        }
        Ok(current)
    }

    /// Check that every `ref` reachable from a registered schema names a registered schema.
    pub fn verify_refs(&self) -> Result<(), SchemaError> {
        let mut visited = HashSet::new();
        for schema in self.schemas.values() {
            self.verify_schema(schema, &mut visited)?;
        }
        Ok(())
    }

    fn verify_schema(
        &self,
        schema: &Schema,
        visited: &mut HashSet<*const Schema>,
    ) -> Result<(), SchemaError> {
        if !visited.insert(schema as *const Schema) {
            return Ok(());
        }
        for child in children(schema) {
            self.verify_schema(child, visited)?;
        }
        if let SchemaKind::Ref(name) = &schema.kind {
            if !self.contains(name) {
                return Err(SchemaError::UnknownReference(name.clone()));
            }
        }
        Ok(())
    }
}

/// Direct children of a schema node
pub fn children(schema: &Schema) -> Vec<&SchemaRef> {
    match &schema.kind {
        SchemaKind::Object(object) => object
            .properties
            .values()
            .chain(object.pattern_properties.values())
            .chain(object.property_names.iter())
            .chain(object.additional_properties.iter())
            .chain(object.base_schema.iter())
            .collect(),
        SchemaKind::Array { items } => items.iter().collect(),
        SchemaKind::AnyOf(branches) | SchemaKind::AllOf(branches) => branches.iter().collect(),
        _ => Vec::new(),
    }
}
