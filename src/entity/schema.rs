//! Registry of entity definitions.

use crate::entity::def::EntityDef;
use crate::error::{OrmError, Result};
use indexmap::IndexMap;
use std::sync::Arc;

/// All entity types known to a [`Context`](crate::Context), by name
#[derive(Debug, Clone, Default)]
pub struct Schema {
    entities: IndexMap<String, Arc<EntityDef>>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a definition; a later definition with the same name replaces the earlier one
    pub fn register(mut self, def: EntityDef) -> Self {
        self.entities.insert(def.name().to_string(), Arc::new(def));
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<EntityDef>> {
        self.entities
            .get(name)
            .cloned()
            .ok_or_else(|| OrmError::UnknownEntity(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }
}
