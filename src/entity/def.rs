//! Entity type definitions.
//!
//! An [`EntityDef`] is the static description of one entity type: its table,
//! keys, attribute casts, and a field table mapping each name to either a plain
//! attribute or a relationship factory. Name resolution on an entity is a single
//! lookup in that table.

use crate::cast::{Cast, CastSpec};
use crate::error::Result;
use crate::query::Select;
use crate::relation::spec::{RelationSpec, Relations};
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// Factory producing a relationship declaration for the declaring type
pub type RelationFactory = Arc<dyn Fn(&Relations<'_>) -> Option<RelationSpec> + Send + Sync>;

/// Named query extension applied with [`Select::scope`]
pub type Scope = Arc<dyn Fn(Select) -> Result<Select> + Send + Sync>;

/// What a name on an entity type refers to
#[derive(Clone)]
pub enum Field {
    Attribute,
    Relation(RelationFactory),
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Attribute => write!(f, "Attribute"),
            Field::Relation(_) => write!(f, "Relation"),
        }
    }
}

/// Static description of one entity type
#[derive(Clone)]
pub struct EntityDef {
    name: String,
    table: String,
    primary_key: String,
    external_key: Option<String>,
    foreign_key: String,
    connection: Option<String>,
    casts: CastSpec,
    fields: IndexMap<String, Field>,
    scopes: IndexMap<String, Scope>,
}

impl fmt::Debug for EntityDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityDef")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("primary_key", &self.primary_key)
            .field("external_key", &self.external_key)
            .field("foreign_key", &self.foreign_key)
            .field("connection", &self.connection)
            .field("fields", &self.fields)
            .field("scopes", &self.scopes.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl EntityDef {
    /// Start a definition for entity type `name` stored in `table`
    ///
    /// ```
    /// use tidemark::EntityDef;
    ///
    /// let user = EntityDef::builder("User", "users")
    ///     .attributes(["name", "email"])
    ///     .has_many("addresses", "Address")
    ///     .build();
    /// assert_eq!(user.foreign_key(), "user_id");
    /// ```
    pub fn builder(name: impl Into<String>, table: impl Into<String>) -> EntityDefBuilder {
        EntityDefBuilder::new(name.into(), table.into())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn external_key(&self) -> Option<&str> {
        self.external_key.as_deref()
    }

    /// Canonical foreign-key column other tables use to reference this type
    pub fn foreign_key(&self) -> &str {
        &self.foreign_key
    }

    pub fn connection(&self) -> Option<&str> {
        self.connection.as_deref()
    }

    pub fn casts(&self) -> &CastSpec {
        &self.casts
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn is_relation(&self, name: &str) -> bool {
        matches!(self.fields.get(name), Some(Field::Relation(_)))
    }

    pub fn relation_names(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|(_, f)| matches!(f, Field::Relation(_)))
            .map(|(n, _)| n.as_str())
    }

    pub fn scope(&self, name: &str) -> Option<&Scope> {
        self.scopes.get(name)
    }

    /// `snake_case` form of the type name, used for default key and table names
    pub fn snake_name(&self) -> String {
        snake_case(&self.name)
    }
}

/// Builder for [`EntityDef`]
pub struct EntityDefBuilder {
    def: EntityDef,
    foreign_key_set: bool,
}

impl EntityDefBuilder {
    fn new(name: String, table: String) -> Self {
        let foreign_key = format!("{}_id", snake_case(&name));
        let mut fields = IndexMap::new();
        fields.insert("id".to_string(), Field::Attribute);
        Self {
            def: EntityDef {
                name,
                table,
                primary_key: "id".to_string(),
                external_key: None,
                foreign_key,
                connection: None,
                casts: CastSpec::new(),
                fields,
                scopes: IndexMap::new(),
            },
            foreign_key_set: false,
        }
    }

    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        let column = column.into();
        self.def.fields.shift_remove(&self.def.primary_key);
        self.def.fields.insert(column.clone(), Field::Attribute);
        if !self.foreign_key_set {
            self.def.foreign_key = format!("{}_{}", snake_case(&self.def.name), column);
        }
        self.def.primary_key = column;
        self
    }

    /// Secondary globally-unique key that also indexes instances in the identity map
    pub fn external_key(mut self, column: impl Into<String>) -> Self {
        let column = column.into();
        self.def.fields.insert(column.clone(), Field::Attribute);
        self.def.external_key = Some(column);
        self
    }

    pub fn foreign_key(mut self, column: impl Into<String>) -> Self {
        self.def.foreign_key = column.into();
        self.foreign_key_set = true;
        self
    }

    /// Run this type's queries on a named connection instead of the default one
    pub fn connection(mut self, name: impl Into<String>) -> Self {
        self.def.connection = Some(name.into());
        self
    }

    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        self.def.fields.insert(name.into(), Field::Attribute);
        self
    }

    pub fn attributes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self.def.fields.insert(name.into(), Field::Attribute);
        }
        self
    }

    /// Declare an attribute with a cast applied during hydration
    pub fn cast(mut self, name: impl Into<String>, cast: Cast) -> Self {
        let name = name.into();
        self.def.fields.insert(name.clone(), Field::Attribute);
        self.def.casts.insert(name, cast);
        self
    }

    /// Declare a relationship through a factory closure
    pub fn relation<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Relations<'_>) -> Option<RelationSpec> + Send + Sync + 'static,
    {
        self.def
            .fields
            .insert(name.into(), Field::Relation(Arc::new(factory)));
        self
    }

    pub fn belongs_to(self, name: impl Into<String>, related: impl Into<String>) -> Self {
        let related = related.into();
        self.relation(name, move |r| Some(r.belongs_to(related.clone()).into()))
    }

    pub fn has_one(self, name: impl Into<String>, related: impl Into<String>) -> Self {
        let related = related.into();
        self.relation(name, move |r| Some(r.has_one(related.clone()).into()))
    }

    pub fn has_many(self, name: impl Into<String>, related: impl Into<String>) -> Self {
        let related = related.into();
        self.relation(name, move |r| Some(r.has_many(related.clone()).into()))
    }

    pub fn belongs_to_many(self, name: impl Into<String>, related: impl Into<String>) -> Self {
        let related = related.into();
        self.relation(name, move |r| Some(r.belongs_to_many(related.clone()).into()))
    }

    /// Register a named query extension
    pub fn scope<F>(mut self, name: impl Into<String>, scope: F) -> Self
    where
        F: Fn(Select) -> Result<Select> + Send + Sync + 'static,
    {
        self.def.scopes.insert(name.into(), Arc::new(scope));
        self
    }

    pub fn build(self) -> EntityDef {
        self.def
    }
}

/// `OrderLine` -> `order_line`
pub(crate) fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}
