//! Inverse side of a one-to-one or one-to-many relationship.

use super::{parent_key_values, BelongsToSpec, Relation, RelationCore};
use crate::context::Context;
use crate::entity::{Collection, Entity, Related};
use crate::error::Result;
use crate::query::Select;
use crate::value::is_null;
use std::collections::HashMap;
use std::rc::Rc;

/// The parent row carries `foreign_key`, matching the related `owner_key`
pub struct BelongsTo {
    core: RelationCore,
    foreign_key: String,
    owner_key: String,
}

impl BelongsTo {
    pub(crate) fn new(core: RelationCore, spec: BelongsToSpec) -> Self {
        let foreign_key = spec
            .foreign_key
            .unwrap_or_else(|| core.related.foreign_key().to_string());
        let owner_key = spec
            .owner_key
            .unwrap_or_else(|| core.related.primary_key().to_string());
        Self {
            core,
            foreign_key,
            owner_key,
        }
    }

    pub fn foreign_key(&self) -> &str {
        &self.foreign_key
    }

    pub fn owner_key(&self) -> &str {
        &self.owner_key
    }

    fn owner_is_primary_key(&self) -> bool {
        self.owner_key == self.core.related.primary_key()
    }
}

impl Relation for BelongsTo {
    fn core(&self) -> &RelationCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RelationCore {
        &mut self.core
    }

    fn has_many(&self) -> bool {
        false
    }

    fn add_constraints(&mut self, parent: &Entity) -> Result<bool> {
        let Some(value) = parent.get(&self.foreign_key).filter(|v| !is_null(v)).cloned() else {
            return Ok(false);
        };
        let owner_key = self.owner_key.clone();
        self.core.map_query(|q| Ok(q.where_eq(&owner_key, value)))?;
        Ok(true)
    }

    fn add_eager_constraints(&mut self, parents: &Collection) -> Result<bool> {
        let values = parent_key_values(parents, &self.foreign_key);
        if values.is_empty() {
            return Ok(false);
        }
        let owner_key = self.owner_key.clone();
        self.core.map_query(|q| Ok(q.where_in(&owner_key, values)))?;
        Ok(true)
    }

    fn fetch_query(&self) -> Select {
        let query = self.query().clone();
        if query.selects(&self.owner_key) {
            query
        } else {
            query.add_select(&self.owner_key)
        }
    }

    fn match_results(&self, ctx: &Context, parents: &Collection, results: &Collection) {
        let by_owner: HashMap<String, Rc<Entity>> = if self.owner_is_primary_key() {
            HashMap::new()
        } else {
            let mut map = HashMap::new();
            for entity in results {
                if let Some(key) = entity.key_for(&self.owner_key) {
                    map.entry(key).or_insert_with(|| Rc::clone(entity));
                }
            }
            map
        };

        for parent in parents {
            let owner = parent.key_for(&self.foreign_key).and_then(|key| {
                if self.owner_is_primary_key() {
                    ctx.identity_map()
                        .get(self.core.related.name(), &key)
                        .filter(|entity| results.contains(entity))
                } else {
                    by_owner.get(&key).cloned()
                }
            });
            parent.set_relation(&self.core.name, Related::One(owner));
        }
    }
}
