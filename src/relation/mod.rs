//! Relationship descriptors.
//!
//! A descriptor is built per relationship invocation from the declaring
//! type's [`RelationSpec`], with key names resolved against both definitions.
//! It owns the related type's query and drives one fetch cycle, either for a
//! single known parent (lazy loading) or for a batch of parents (eager
//! loading).
//!
//! - [`BelongsTo`]: the parent row holds the foreign key
//! - [`HasOne`] / [`HasMany`]: related rows hold a key back to the parent
//! - [`BelongsToMany`]: related rows are linked through a join table
//!
//! Results are merged onto parents by consulting the identity map's edges,
//! which are recorded while the batch rows are hydrated.

pub mod belongs_to;
pub mod belongs_to_many;
pub mod eager;
pub mod has_many;
pub mod has_one;
pub mod lazy;
pub mod spec;

pub use belongs_to::BelongsTo;
pub use belongs_to_many::BelongsToMany;
pub use eager::{Constraint, EagerPlan};
pub use has_many::HasMany;
pub use has_one::HasOne;
pub use spec::{
    BelongsToManySpec, BelongsToSpec, HasManySpec, HasOneSpec, RelationSpec, Relations,
};

use crate::context::Context;
use crate::entity::{Collection, Entity, EntityDef, Field, Related};
use crate::error::{OrmError, Result};
use crate::query::Select;
use crate::value::value_key;
use sea_query::Value;
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::Arc;

/// State shared by every descriptor variant
pub struct RelationCore {
    pub name: String,
    pub parent: Arc<EntityDef>,
    pub related: Arc<EntityDef>,
    pub query: Select,
}

impl RelationCore {
    fn new(name: &str, parent: Arc<EntityDef>, related: Arc<EntityDef>) -> Self {
        let query = Select::new(Arc::clone(&related));
        Self {
            name: name.to_string(),
            parent,
            related,
            query,
        }
    }

    /// Replace the query with `f(query)`
    pub fn map_query<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(Select) -> Result<Select>,
    {
        let placeholder = Select::new(Arc::clone(&self.related));
        let query = std::mem::replace(&mut self.query, placeholder);
        self.query = f(query)?;
        Ok(())
    }
}

/// Capabilities every relationship variant provides
pub trait Relation {
    fn core(&self) -> &RelationCore;

    fn core_mut(&mut self) -> &mut RelationCore;

    /// Whether merges assign a collection rather than a single value
    fn has_many(&self) -> bool;

    /// Constrain the query to one known parent; `false` when the parent has no usable key
    fn add_constraints(&mut self, parent: &Entity) -> Result<bool>;

    /// Constrain the query to a batch of parents; `false` when none has a usable key
    fn add_eager_constraints(&mut self, parents: &Collection) -> Result<bool>;

    /// Assign each parent its share of `results`
    fn match_results(&self, ctx: &Context, parents: &Collection, results: &Collection);

    /// Value merged onto a parent with no matching rows
    fn empty_value(&self) -> Related {
        if self.has_many() {
            Related::Many(Collection::new())
        } else {
            Related::One(None)
        }
    }

    fn name(&self) -> &str {
        &self.core().name
    }

    fn query(&self) -> &Select {
        &self.core().query
    }

    /// Attach nested relationship paths, resolved when this relationship fetches
    fn with(&mut self, plan: EagerPlan) -> Result<()> {
        self.core_mut().map_query(|q| Ok(q.with_plan(plan)))
    }

    /// Pass the query through a caller-supplied constraint
    fn constrain(&mut self, constraint: &Constraint) -> Result<()> {
        self.core_mut().map_query(|q| constraint(q))
    }

    /// The query as it will run, including any columns matching depends on
    fn fetch_query(&self) -> Select {
        self.query().clone()
    }

    fn fetch(&self, ctx: &Context) -> Result<Collection> {
        self.fetch_query().fetch(ctx)
    }

    /// Fetch once, then merge onto every parent
    fn add_results_to_parents(&self, ctx: &Context, parents: &Collection) -> Result<()> {
        let results = self.fetch(ctx)?;
        self.match_results(ctx, parents, &results);
        Ok(())
    }

    fn merge_empty(&self, parents: &Collection) {
        for parent in parents {
            parent.set_relation(self.name(), self.empty_value());
        }
    }

    /// Load and merge the relationship for one parent, returning the merged value
    fn get_results(&mut self, ctx: &Context, parent: &Rc<Entity>) -> Result<Related> {
        let parents: Collection = std::iter::once(Rc::clone(parent)).collect();
        if self.add_constraints(parent)? {
            self.add_results_to_parents(ctx, &parents)?;
        } else {
            self.merge_empty(&parents);
        }
        Ok(parent
            .relation(self.name())
            .unwrap_or_else(|| self.empty_value()))
    }
}

/// Build the descriptor for relationship `name` declared on `parent`
pub(crate) fn descriptor(ctx: &Context, parent: &Arc<EntityDef>, name: &str) -> Result<Box<dyn Relation>> {
    let factory = match parent.field(name) {
        Some(Field::Relation(factory)) => factory,
        Some(Field::Attribute) => {
            return Err(OrmError::relationship(
                parent.name(),
                name,
                "is an attribute, not a relationship",
            ))
        }
        None => {
            return Err(OrmError::relationship(
                parent.name(),
                name,
                "no such relationship is declared",
            ))
        }
    };

    let spec = factory(&Relations::new(parent)).ok_or_else(|| {
        OrmError::relationship(parent.name(), name, "declaration did not return a relationship")
    })?;
    let related = ctx.def(spec.related()).map_err(|_| {
        OrmError::relationship(
            parent.name(),
            name,
            format!("related type `{}` is not registered", spec.related()),
        )
    })?;

    let core = RelationCore::new(name, Arc::clone(parent), related);
    let relation: Box<dyn Relation> = match spec {
        RelationSpec::BelongsTo(spec) => Box::new(BelongsTo::new(core, spec)),
        RelationSpec::HasOne(spec) => Box::new(HasOne::new(ctx, core, spec)),
        RelationSpec::HasMany(spec) => Box::new(HasMany::new(ctx, core, spec)),
        RelationSpec::BelongsToMany(spec) => Box::new(BelongsToMany::new(ctx, core, spec)),
    };
    Ok(relation)
}

/// Distinct non-null values of `column` across `parents`, in parent order
pub(crate) fn parent_key_values(parents: &Collection, column: &str) -> Vec<Value> {
    let mut seen = HashSet::new();
    parents
        .iter()
        .filter_map(|parent| parent.get(column))
        .filter(|value| value_key(value).is_some_and(|key| seen.insert(key)))
        .cloned()
        .collect()
}

/// Members of `results` recorded as related to `(parent_type, parent_key)`, in result order
pub(crate) fn linked_results(
    ctx: &Context,
    parent_type: &str,
    parent_key: &str,
    related_type: &str,
    results: &Collection,
) -> Vec<Rc<Entity>> {
    let linked = ctx
        .identity_map()
        .related_identities(parent_type, parent_key, related_type);
    if linked.is_empty() {
        return Vec::new();
    }
    results
        .iter()
        .filter(|e| e.id().is_some_and(|id| linked.contains(id)))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Schema;

    fn ctx() -> Context {
        Context::builder(
            Schema::new()
                .register(
                    EntityDef::builder("User", "users")
                        .attribute("name")
                        .has_many("addresses", "Address")
                        .has_many("ghosts", "Ghost")
                        .relation("nothing", |_| None)
                        .build(),
                )
                .register(EntityDef::builder("Address", "addresses").build()),
        )
        .build()
    }

    fn definition_error(name: &str) -> String {
        let ctx = ctx();
        let user = ctx.def("User").unwrap();
        match descriptor(&ctx, &user, name) {
            Err(OrmError::RelationshipDefinition { reason, .. }) => reason,
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("`{name}` should not build a descriptor"),
        }
    }

    #[test]
    fn test_descriptor_rejects_bad_declarations() {
        assert!(definition_error("name").contains("attribute"));
        assert!(definition_error("missing").contains("no such relationship"));
        assert!(definition_error("nothing").contains("did not return"));
        assert!(definition_error("ghosts").contains("`Ghost`"));
    }

    #[test]
    fn test_descriptor_shape() {
        let ctx = ctx();
        let user = ctx.def("User").unwrap();
        let relation = descriptor(&ctx, &user, "addresses").unwrap();
        assert!(relation.has_many());
        assert_eq!(relation.name(), "addresses");
        assert!(matches!(relation.empty_value(), Related::Many(ref c) if c.is_empty()));
    }

    #[test]
    fn test_parent_key_values_skip_nulls_and_duplicates() {
        let def = Arc::new(EntityDef::builder("Address", "addresses").build());
        let parents: Collection = [(1, Some(7)), (2, None), (3, Some(7)), (4, Some(9))]
            .into_iter()
            .map(|(id, user)| {
                let mut attributes = indexmap::IndexMap::new();
                attributes.insert("id".to_string(), Value::from(id));
                attributes.insert("user_id".to_string(), Value::Int(user));
                Rc::new(Entity::new(Arc::clone(&def), id.to_string(), attributes))
            })
            .collect();
        assert_eq!(
            parent_key_values(&parents, "user_id"),
            vec![Value::from(7), Value::from(9)]
        );
    }
}
