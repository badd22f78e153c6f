//! Many related rows per parent.

use super::has_one::{constrain_to_parent, constrain_to_parents, link_back, select_foreign_key};
use super::{linked_results, HasManySpec, Relation, RelationCore};
use crate::context::Context;
use crate::entity::{Collection, Entity, Related};
use crate::error::Result;
use crate::query::Select;

/// Related rows carry `foreign_key`, matching the parent's `local_key`.
///
/// With `index_by` set, each parent receives a map keyed by that related
/// column. Rows sharing an index value overwrite each other: the last row wins.
pub struct HasMany {
    core: RelationCore,
    foreign_key: String,
    local_key: String,
    index_by: Option<String>,
}

impl HasMany {
    pub(crate) fn new(ctx: &Context, core: RelationCore, spec: HasManySpec) -> Self {
        let foreign_key = spec
            .foreign_key
            .unwrap_or_else(|| core.parent.foreign_key().to_string());
        let local_key = spec
            .local_key
            .unwrap_or_else(|| core.parent.primary_key().to_string());
        let core = link_back(ctx, core, &foreign_key);
        Self {
            core,
            foreign_key,
            local_key,
            index_by: spec.index_by,
        }
    }

    pub fn foreign_key(&self) -> &str {
        &self.foreign_key
    }

    pub fn local_key(&self) -> &str {
        &self.local_key
    }

    pub fn index_by(&self) -> Option<&str> {
        self.index_by.as_deref()
    }

    fn shape(&self, related: Collection) -> Related {
        match &self.index_by {
            Some(column) => Related::Keyed(related.key_by(column)),
            None => Related::Many(related),
        }
    }
}

impl Relation for HasMany {
    fn core(&self) -> &RelationCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RelationCore {
        &mut self.core
    }

    fn has_many(&self) -> bool {
        true
    }

    fn empty_value(&self) -> Related {
        self.shape(Collection::new())
    }

    fn add_constraints(&mut self, parent: &Entity) -> Result<bool> {
        constrain_to_parent(&mut self.core, &self.foreign_key, &self.local_key, parent)
    }

    fn add_eager_constraints(&mut self, parents: &Collection) -> Result<bool> {
        constrain_to_parents(&mut self.core, &self.foreign_key, &self.local_key, parents)
    }

    fn fetch_query(&self) -> Select {
        select_foreign_key(self.query(), &self.foreign_key)
    }

    fn match_results(&self, ctx: &Context, parents: &Collection, results: &Collection) {
        for parent in parents {
            let related: Collection = parent
                .key_for(&self.local_key)
                .map(|key| {
                    linked_results(ctx, self.core.parent.name(), &key, self.core.related.name(), results)
                })
                .unwrap_or_default()
                .into_iter()
                .collect();
            parent.set_relation(&self.core.name, self.shape(related));
        }
    }
}
