//! Execution methods for [`Select`].
//!
//! Fetching renders the statement, runs it on the entity type's connection,
//! hydrates each row through the identity map and finally eager-loads the
//! relationships registered with [`Select::with`].

use crate::context::Context;
use crate::entity::{Collection, Entity};
use crate::error::{OrmError, Result};
use crate::query::Select;
use crate::relation::eager::eager_load_relationships;
use crate::value::TryGetable;
use std::collections::HashSet;
use std::rc::Rc;

impl Select {
    /// Run the query and return every distinct entity, in row order
    pub fn fetch(&self, ctx: &Context) -> Result<Collection> {
        let (sql, values) = self.build();
        let rows = ctx.execute(self.def().connection(), &sql, &values)?;

        let mut seen = HashSet::new();
        let mut results = Collection::new();
        for row in rows {
            let entity = ctx.hydrate(self.def(), self.table_alias(), self.owning_key(), row)?;
            if seen.insert(Rc::as_ptr(&entity)) {
                results.push(entity);
            }
        }

        if !results.is_empty() && !self.eager_plan().is_empty() {
            eager_load_relationships(ctx, &results, self.eager_plan())?;
        }
        Ok(results)
    }

    /// First entity, or [`OrmError::EntityNotFound`] naming the type and its key
    pub fn fetch_first_or_fail(&self, ctx: &Context) -> Result<Rc<Entity>> {
        self.fetch_first_or_null(ctx)?
            .ok_or_else(|| OrmError::EntityNotFound {
                entity: self.def().name().to_string(),
                key: self.def().primary_key().to_string(),
                value: None,
            })
    }

    pub fn fetch_first_or_null(&self, ctx: &Context) -> Result<Option<Rc<Entity>>> {
        let results = self.clone().limit(1).fetch(ctx)?;
        Ok(results.first().cloned())
    }

    /// `SELECT COUNT(*)` over the current constraints
    pub fn count(&self, ctx: &Context) -> Result<u64> {
        let (sql, values) = self.build_count();
        let rows = ctx.execute(self.def().connection(), &sql, &values)?;
        let value = rows
            .first()
            .and_then(|row| row.get_index(0))
            .cloned()
            .ok_or_else(|| OrmError::Query("COUNT(*) returned no rows".to_string()))?;
        let count = i64::try_get(value).map_err(|e| OrmError::Hydration(format!("COUNT(*): {e}")))?;
        u64::try_from(count).map_err(|_| OrmError::Hydration(format!("negative COUNT(*) {count}")))
    }
}

#[cfg(test)]
mod tests {
    use crate::context::Context;
    use crate::entity::{EntityDef, Schema};
    use crate::error::OrmError;
    use crate::mock::MockExecutor;
    use crate::row;
    use std::rc::Rc;

    fn ctx(mock: &MockExecutor) -> Context {
        Context::builder(
            Schema::new().register(EntityDef::builder("User", "users").attribute("name").build()),
        )
        .default_connection(mock.clone())
        .build()
    }

    #[test]
    fn test_fetch_dedupes_repeated_rows() {
        let mock = MockExecutor::new().append_query_results(vec![vec![
            row! { "id" => 1, "name" => "Ada" },
            row! { "id" => 1, "name" => "Ada" },
            row! { "id" => 2, "name" => "Grace" },
        ]]);
        let ctx = ctx(&mock);
        let users = ctx.query("User").unwrap().fetch(&ctx).unwrap();
        assert_eq!(users.keys(), vec!["1", "2"]);
    }

    #[test]
    fn test_repeat_fetch_returns_same_instance() {
        let mock = MockExecutor::new().append_query_results(vec![
            vec![row! { "id" => 1, "name" => "Ada" }],
            vec![row! { "id" => 1, "name" => "Ada (renamed)" }],
        ]);
        let ctx = ctx(&mock);
        let first = ctx.query("User").unwrap().fetch(&ctx).unwrap();
        let second = ctx.query("User").unwrap().fetch(&ctx).unwrap();
        assert!(Rc::ptr_eq(first.first().unwrap(), second.first().unwrap()));
        assert_eq!(
            second.first().unwrap().get("name"),
            Some(&sea_query::Value::from("Ada"))
        );
    }

    #[test]
    fn test_first_or_fail_and_null() {
        let mock = MockExecutor::new().append_query_results(vec![vec![], vec![]]);
        let ctx = ctx(&mock);
        let query = ctx.query("User").unwrap().where_eq("name", "Nobody");
        assert!(query.fetch_first_or_null(&ctx).unwrap().is_none());
        let err = query.fetch_first_or_fail(&ctx).unwrap_err();
        assert!(matches!(err, OrmError::EntityNotFound { ref entity, ref key, .. } if entity == "User" && key == "id"));
        assert!(mock.statements()[0].contains("LIMIT"));
    }

    #[test]
    fn test_count_reads_first_column() {
        let mock = MockExecutor::new().append_query_results(vec![vec![row! { "count" => 3i64 }]]);
        let ctx = ctx(&mock);
        assert_eq!(ctx.query("User").unwrap().count(&ctx).unwrap(), 3);
        assert!(mock.statements()[0].starts_with("SELECT COUNT(*)"));
    }
}
