//! Materialized entities.
//!
//! An [`Entity`] is an immutable record of one [`EntityDef`] type. Its
//! attributes are fixed at hydration; the only mutable part is the relation
//! map, which relationship merges fill in. Within one [`Context`] every
//! `(type, identity)` pair maps to a single shared `Rc<Entity>`.

pub mod collection;
pub mod def;
pub mod schema;

pub use collection::{Collection, Related};
pub use def::{EntityDef, EntityDefBuilder, Field, RelationFactory, Scope};
pub use schema::Schema;

use crate::context::Context;
use crate::error::{OrmError, Result};
use crate::value::{value_key, TryGetable, ValueExtractionError};
use indexmap::IndexMap;
use sea_query::Value;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// Result of resolving a name through an entity's field table
#[derive(Debug, Clone)]
pub enum Resolved {
    Attribute(Value),
    Relation(Related),
}

pub struct Entity {
    def: Arc<EntityDef>,
    id: Option<String>,
    external_id: Option<String>,
    attributes: IndexMap<String, Value>,
    relations: RefCell<IndexMap<String, Related>>,
}

impl Entity {
    pub(crate) fn new(def: Arc<EntityDef>, id: String, attributes: IndexMap<String, Value>) -> Self {
        let external_id = def
            .external_key()
            .and_then(|column| attributes.get(column))
            .and_then(value_key);
        Self {
            def,
            id: Some(id),
            external_id,
            attributes,
            relations: RefCell::new(IndexMap::new()),
        }
    }

    /// A blank, non-persisted instance of `def`
    pub fn empty(def: Arc<EntityDef>) -> Self {
        Self {
            def,
            id: None,
            external_id: None,
            attributes: IndexMap::new(),
            relations: RefCell::new(IndexMap::new()),
        }
    }

    pub fn def(&self) -> &Arc<EntityDef> {
        &self.def
    }

    pub fn entity_type(&self) -> &str {
        self.def.name()
    }

    /// Primary key value coerced to a string; `None` for empty instances
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref()
    }

    /// Whether this instance was hydrated from a row
    pub fn exists(&self) -> bool {
        self.id.is_some()
    }

    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.attributes.get(attribute)
    }

    /// Typed read of one attribute; a missing attribute reads as null
    pub fn get_as<T: TryGetable>(&self, attribute: &str) -> std::result::Result<T, ValueExtractionError> {
        match self.attributes.get(attribute) {
            Some(value) => T::try_get(value.clone()),
            None => Err(ValueExtractionError::NullValue),
        }
    }

    /// String form of an attribute, for key matching; `None` when missing or null
    pub fn key_for(&self, attribute: &str) -> Option<String> {
        self.attributes.get(attribute).and_then(value_key)
    }

    pub fn attributes(&self) -> &IndexMap<String, Value> {
        &self.attributes
    }

    /// Always fails: entities are immutable once hydrated
    pub fn set(&self, attribute: &str, _value: impl Into<Value>) -> Result<()> {
        Err(OrmError::ImmutableEntity {
            entity: self.def.name().to_string(),
            attribute: attribute.to_string(),
        })
    }

    /// Already-merged relationship value, without loading
    pub fn relation(&self, name: &str) -> Option<Related> {
        self.relations.borrow().get(name).cloned()
    }

    pub fn relation_loaded(&self, name: &str) -> bool {
        self.relations.borrow().contains_key(name)
    }

    pub(crate) fn set_relation(&self, name: &str, value: Related) {
        self.relations.borrow_mut().insert(name.to_string(), value);
    }

    /// Drop merged relationships, releasing references to other entities
    pub(crate) fn forget_relations(&self) {
        self.relations.borrow_mut().clear();
    }

    /// Look `name` up in the field table.
    ///
    /// Attributes come straight from the row. Relationships are served from the
    /// relation map, loading them on first access. Returns `None` for names the
    /// type does not declare and the row did not carry.
    pub fn resolve(self: &Rc<Self>, ctx: &Context, name: &str) -> Result<Option<Resolved>> {
        match self.def.field(name) {
            Some(def::Field::Relation(_)) => self.load(ctx, name).map(|r| Some(Resolved::Relation(r))),
            Some(def::Field::Attribute) => Ok(Some(Resolved::Attribute(
                self.attributes.get(name).cloned().unwrap_or(Value::String(None)),
            ))),
            None => Ok(self.attributes.get(name).cloned().map(Resolved::Attribute)),
        }
    }

    /// Load one relationship for this entity alone, caching the result
    pub fn load(self: &Rc<Self>, ctx: &Context, name: &str) -> Result<Related> {
        if let Some(loaded) = self.relation(name) {
            return Ok(loaded);
        }
        crate::relation::lazy::load(ctx, self, name)
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("type", &self.def.name())
            .field("id", &self.id)
            .field("external_id", &self.external_id)
            .field("attributes", &self.attributes)
            .field(
                "relations",
                &self.relations.borrow().keys().cloned().collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_def() -> Arc<EntityDef> {
        Arc::new(
            EntityDef::builder("User", "users")
                .external_key("uuid")
                .attributes(["name", "age"])
                .build(),
        )
    }

    fn user() -> Entity {
        let mut attributes = IndexMap::new();
        attributes.insert("id".to_string(), Value::from(1));
        attributes.insert("uuid".to_string(), Value::from("u-1"));
        attributes.insert("name".to_string(), Value::from("Ada"));
        attributes.insert("age".to_string(), Value::Int(None));
        Entity::new(user_def(), "1".to_string(), attributes)
    }

    #[test]
    fn test_identity_and_external_identity() {
        let user = user();
        assert_eq!(user.id(), Some("1"));
        assert_eq!(user.external_id(), Some("u-1"));
        assert!(user.exists());
        assert_eq!(user.entity_type(), "User");
    }

    #[test]
    fn test_set_always_fails() {
        let user = user();
        let err = user.set("name", "Grace").unwrap_err();
        assert!(matches!(
            err,
            OrmError::ImmutableEntity { ref entity, ref attribute } if entity == "User" && attribute == "name"
        ));
        assert_eq!(user.get("name"), Some(&Value::from("Ada")));
    }

    #[test]
    fn test_typed_reads() {
        let user = user();
        assert_eq!(user.get_as::<String>("name"), Ok("Ada".to_string()));
        assert_eq!(user.get_as::<i32>("age"), Err(ValueExtractionError::NullValue));
        assert_eq!(user.get_as::<i32>("missing"), Err(ValueExtractionError::NullValue));
        assert_eq!(user.key_for("age"), None);
    }

    #[test]
    fn test_empty_instance() {
        let empty = Entity::empty(user_def());
        assert!(!empty.exists());
        assert!(empty.id().is_none());
        assert!(empty.attributes().is_empty());
    }

    #[test]
    fn test_relations_are_cached_and_forgotten() {
        let user = user();
        assert!(!user.relation_loaded("addresses"));
        user.set_relation("addresses", Related::Many(Collection::new()));
        assert!(user.relation_loaded("addresses"));
        user.forget_relations();
        assert!(user.relation("addresses").is_none());
    }
}
