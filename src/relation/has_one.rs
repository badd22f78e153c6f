//! One related row per parent.

use super::{linked_results, parent_key_values, HasOneSpec, Relation, RelationCore};
use crate::context::Context;
use crate::entity::{Collection, Entity, Related};
use crate::error::Result;
use crate::query::Select;
use crate::value::is_null;
use std::rc::Rc;

/// The related row carries `foreign_key`, matching the parent's `local_key`
pub struct HasOne {
    core: RelationCore,
    foreign_key: String,
    local_key: String,
    null_on_not_found: bool,
}

impl HasOne {
    pub(crate) fn new(ctx: &Context, core: RelationCore, spec: HasOneSpec) -> Self {
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
            null_on_not_found: spec.null_on_not_found,
        }
    }

    pub fn foreign_key(&self) -> &str {
        &self.foreign_key
    }

    pub fn local_key(&self) -> &str {
        &self.local_key
    }
}

/// Register `foreign_key` as pointing at the parent type and mark it as the
/// query's owning key, so hydration records parent edges from it.
pub(super) fn link_back(ctx: &Context, mut core: RelationCore, foreign_key: &str) -> RelationCore {
    ctx.identity_map_mut()
        .register_alias(&core.parent, Some(foreign_key));
    core.query = core.query.set_owning_key(foreign_key);
    core
}

/// Constrain `core` to rows whose `foreign_key` equals `parent`'s `local_key`
pub(super) fn constrain_to_parent(
    core: &mut RelationCore,
    foreign_key: &str,
    local_key: &str,
    parent: &Entity,
) -> Result<bool> {
    let Some(value) = parent.get(local_key).filter(|v| !is_null(v)).cloned() else {
        return Ok(false);
    };
    core.map_query(|q| Ok(q.where_eq(foreign_key, value)))?;
    Ok(true)
}

/// Constrain `core` to rows whose `foreign_key` is one of the parents' `local_key` values
pub(super) fn constrain_to_parents(
    core: &mut RelationCore,
    foreign_key: &str,
    local_key: &str,
    parents: &Collection,
) -> Result<bool> {
    let values = parent_key_values(parents, local_key);
    if values.is_empty() {
        return Ok(false);
    }
    core.map_query(|q| Ok(q.where_in(foreign_key, values)))?;
    Ok(true)
}

/// Keep the foreign key on the returned rows
pub(super) fn select_foreign_key(query: &Select, foreign_key: &str) -> Select {
    if query.selects(foreign_key) {
        query.clone()
    } else {
        query.clone().add_select(foreign_key)
    }
}

impl Relation for HasOne {
    fn core(&self) -> &RelationCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RelationCore {
        &mut self.core
    }

    fn has_many(&self) -> bool {
        false
    }

    fn empty_value(&self) -> Related {
        if self.null_on_not_found {
            Related::One(None)
        } else {
            Related::One(Some(Rc::new(Entity::empty(self.core.related.clone()))))
        }
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
            let first = parent.key_for(&self.local_key).and_then(|key| {
                linked_results(ctx, self.core.parent.name(), &key, self.core.related.name(), results)
                    .into_iter()
                    .next()
            });
            let value = match first {
                Some(entity) => Related::One(Some(entity)),
                None => self.empty_value(),
            };
            parent.set_relation(&self.core.name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::context::Context;
    use crate::entity::{EntityDef, Schema};
    use crate::mock::MockExecutor;
    use crate::row;
    use sea_query::Value;

    fn ctx(mock: &MockExecutor) -> Context {
        let schema = Schema::new()
            .register(
                EntityDef::builder("User", "users")
                    .attribute("uuid")
                    .relation("profile", |r| {
                        Some(r.has_one("Profile").foreign_key("user_uuid").local_key("uuid").into())
                    })
                    .build(),
            )
            .register(EntityDef::builder("Profile", "profiles").attribute("user_uuid").build());
        Context::builder(schema).default_connection(mock.clone()).build()
    }

    #[test]
    fn test_custom_local_key_links_by_that_column() {
        let mock = MockExecutor::new().append_query_results(vec![
            vec![
                row! { "id" => 1, "uuid" => "u-1" },
                row! { "id" => 2, "uuid" => "u-2" },
            ],
            vec![row! { "id" => 50, "user_uuid" => "u-2" }],
        ]);
        let ctx = ctx(&mock);

        let users = ctx.query("User").unwrap().with(["profile"]).fetch(&ctx).unwrap();

        let profiles: Vec<Option<String>> = users
            .iter()
            .map(|u| {
                u.relation("profile")
                    .and_then(|r| r.as_one().and_then(|p| p.id().map(str::to_string)))
            })
            .collect();
        assert_eq!(profiles, vec![None, Some("50".to_string())]);
        assert!(ctx.identity_map().related_identities("User", "u-2", "Profile").contains("50"));

        let (sql, values) = mock.log().remove(1);
        assert!(sql.contains(r#""profiles"."user_uuid" IN ($1, $2)"#), "{sql}");
        assert_eq!(values.0, vec![Value::from("u-1"), Value::from("u-2")]);
    }

    #[test]
    fn test_lazy_load_constrains_on_local_key_value() {
        let mock = MockExecutor::new().append_query_results(vec![
            vec![row! { "id" => 2, "uuid" => "u-2" }],
            vec![row! { "id" => 50, "user_uuid" => "u-2" }],
        ]);
        let ctx = ctx(&mock);
        let user = ctx.query("User").unwrap().fetch_first_or_fail(&ctx).unwrap();

        let profile = user.load(&ctx, "profile").unwrap();

        assert_eq!(profile.as_one().and_then(|p| p.id()), Some("50"));
        let (sql, values) = mock.log().remove(1);
        assert!(sql.contains(r#""profiles"."user_uuid" = $1"#), "{sql}");
        assert_eq!(values.0[0], Value::from("u-2"));
    }
}
