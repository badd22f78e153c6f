//! Many-to-many through a join table.

use super::{linked_results, parent_key_values, BelongsToManySpec, Relation, RelationCore};
use crate::context::Context;
use crate::entity::{Collection, Entity, Related};
use crate::error::Result;
use crate::identity_map::pivot_marker;
use crate::query::Select;
use crate::value::is_null;

/// Related rows are linked to parents through `join_table`.
///
/// The batched query joins the linking table and selects its parent column
/// under a marker alias, so every row also names the parent it was fetched for.
pub struct BelongsToMany {
    core: RelationCore,
    join_table: String,
    foreign_pivot_key: String,
    related_pivot_key: String,
    parent_key: String,
    related_key: String,
}

impl BelongsToMany {
    pub(crate) fn new(ctx: &Context, mut core: RelationCore, spec: BelongsToManySpec) -> Self {
        let join_table = spec.join_table.unwrap_or_else(|| {
            let mut names = [core.parent.snake_name(), core.related.snake_name()];
            names.sort();
            names.join("_")
        });
        let foreign_pivot_key = spec
            .foreign_pivot_key
            .unwrap_or_else(|| core.parent.foreign_key().to_string());
        let related_pivot_key = spec
            .related_pivot_key
            .unwrap_or_else(|| core.related.foreign_key().to_string());
        let parent_key = spec
            .parent_key
            .unwrap_or_else(|| core.parent.primary_key().to_string());
        let related_key = spec
            .related_key
            .unwrap_or_else(|| core.related.primary_key().to_string());

        ctx.identity_map_mut()
            .register_alias(&core.parent, Some(foreign_pivot_key.as_str()));
        core.query = core.query.join(
            &join_table,
            &format!("{join_table}.{related_pivot_key}"),
            &related_key,
        );

        Self {
            core,
            join_table,
            foreign_pivot_key,
            related_pivot_key,
            parent_key,
            related_key,
        }
    }

    pub fn join_table(&self) -> &str {
        &self.join_table
    }

    pub fn foreign_pivot_key(&self) -> &str {
        &self.foreign_pivot_key
    }

    pub fn related_pivot_key(&self) -> &str {
        &self.related_pivot_key
    }

    pub fn parent_key(&self) -> &str {
        &self.parent_key
    }

    pub fn related_key(&self) -> &str {
        &self.related_key
    }

    fn pivot_column(&self) -> String {
        format!("{}.{}", self.join_table, self.foreign_pivot_key)
    }
}

impl Relation for BelongsToMany {
    fn core(&self) -> &RelationCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RelationCore {
        &mut self.core
    }

    fn has_many(&self) -> bool {
        true
    }

    fn add_constraints(&mut self, parent: &Entity) -> Result<bool> {
        let Some(value) = parent.get(&self.parent_key).filter(|v| !is_null(v)).cloned() else {
            return Ok(false);
        };
        let column = self.pivot_column();
        self.core.map_query(|q| Ok(q.where_eq(&column, value)))?;
        Ok(true)
    }

    fn add_eager_constraints(&mut self, parents: &Collection) -> Result<bool> {
        let values = parent_key_values(parents, &self.parent_key);
        if values.is_empty() {
            return Ok(false);
        }
        let column = self.pivot_column();
        self.core.map_query(|q| Ok(q.where_in(&column, values)))?;
        Ok(true)
    }

    fn fetch_query(&self) -> Select {
        let marker = pivot_marker(&self.join_table, &self.foreign_pivot_key);
        let query = self.query().clone();
        if query.selected_columns().iter().any(|c| *c == marker) {
            query
        } else {
            query.add_hidden_column(&self.pivot_column(), marker)
        }
    }

    fn match_results(&self, ctx: &Context, parents: &Collection, results: &Collection) {
        for parent in parents {
            let related: Collection = parent
                .key_for(&self.parent_key)
                .map(|key| {
                    linked_results(ctx, self.core.parent.name(), &key, self.core.related.name(), results)
                })
                .unwrap_or_default()
                .into_iter()
                .collect();
            parent.set_relation(&self.core.name, Related::Many(related));
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

    #[test]
    fn test_custom_pivot_and_parent_key() {
        let schema = Schema::new()
            .register(
                EntityDef::builder("User", "users")
                    .attribute("uuid")
                    .relation("teams", |r| {
                        Some(
                            r.belongs_to_many("Team")
                                .join_table("memberships")
                                .foreign_pivot_key("member_uuid")
                                .related_pivot_key("team_code")
                                .parent_key("uuid")
                                .related_key("code")
                                .into(),
                        )
                    })
                    .build(),
            )
            .register(EntityDef::builder("Team", "teams").attribute("code").build());
        let marker = "__tm_src_ref__memberships__member_uuid";
        let mock = MockExecutor::new().append_query_results(vec![
            vec![
                row! { "id" => 1, "uuid" => "u-1" },
                row! { "id" => 2, "uuid" => "u-2" },
            ],
            vec![
                row! { "id" => 7, "code" => "core", marker => "u-1" },
                row! { "id" => 8, "code" => "ops", marker => "u-1" },
                row! { "id" => 7, "code" => "core", marker => "u-2" },
            ],
        ]);
        let ctx = Context::builder(schema).default_connection(mock.clone()).build();

        let users = ctx.query("User").unwrap().with(["teams"]).fetch(&ctx).unwrap();

        let teams: Vec<Vec<String>> = users
            .iter()
            .map(|u| {
                u.relation("teams")
                    .and_then(|r| r.as_many().map(|c| c.keys()))
                    .unwrap_or_default()
            })
            .collect();
        assert_eq!(teams, vec![vec!["7", "8"], vec!["7"]]);
        assert_eq!(ctx.identity_map().resolve_alias("member_uuid"), Some("User"));

        let (sql, values) = mock.log().remove(1);
        assert!(
            sql.contains(r#"INNER JOIN "memberships" ON "memberships"."team_code" = "teams"."code""#),
            "{sql}"
        );
        assert!(sql.contains(r#""memberships"."member_uuid" AS "__tm_src_ref__memberships__member_uuid""#), "{sql}");
        assert!(sql.contains(r#""memberships"."member_uuid" IN ($1, $2)"#), "{sql}");
        assert_eq!(values.0, vec![Value::from("u-1"), Value::from("u-2")]);

        let core = users.first().unwrap().relation("teams").unwrap();
        assert!(!core.as_many().unwrap().first().unwrap().attributes().contains_key(marker));
    }
}
