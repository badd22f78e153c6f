//! Per-type entry points.

use crate::context::Context;
use crate::entity::{Collection, Entity, EntityDef};
use crate::error::{OrmError, Result};
use crate::query::Select;
use crate::value::value_key;
use sea_query::{Order, Value};
use std::rc::Rc;
use std::sync::Arc;

/// Lookups for one entity type, bound to a [`Context`]
///
/// ```
/// use tidemark::mock::MockExecutor;
/// use tidemark::{row, Context, EntityDef, Schema};
///
/// let mock = MockExecutor::new().append_query_results(vec![vec![row! { "id" => 1, "name" => "Ada" }]]);
/// let ctx = Context::builder(Schema::new().register(EntityDef::builder("User", "users").build()))
///     .default_connection(mock)
///     .build();
///
/// let ada = ctx.repository("User")?.find_or_fail(1)?;
/// assert_eq!(ada.id(), Some("1"));
/// # Ok::<(), tidemark::OrmError>(())
/// ```
pub struct Repository<'ctx> {
    ctx: &'ctx Context,
    def: Arc<EntityDef>,
}

impl<'ctx> Repository<'ctx> {
    pub(crate) fn new(ctx: &'ctx Context, def: Arc<EntityDef>) -> Self {
        Self { ctx, def }
    }

    pub fn def(&self) -> &Arc<EntityDef> {
        &self.def
    }

    pub fn query(&self) -> Select {
        Select::new(Arc::clone(&self.def))
    }

    /// Query builder pre-configured to eager-load `paths`
    pub fn with<I, S>(&self, paths: I) -> Select
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.query().with(paths)
    }

    /// Look up by primary key; always queries
    pub fn find(&self, id: impl Into<Value>) -> Result<Option<Rc<Entity>>> {
        self.query()
            .where_eq(self.def.primary_key(), id)
            .fetch_first_or_null(self.ctx)
    }

    pub fn find_or_fail(&self, id: impl Into<Value>) -> Result<Rc<Entity>> {
        let id = id.into();
        let described = value_key(&id).unwrap_or_else(|| "NULL".to_string());
        self.find(id)?.ok_or_else(|| OrmError::EntityNotFound {
            entity: self.def.name().to_string(),
            key: self.def.primary_key().to_string(),
            value: Some(described),
        })
    }

    /// Equality criteria AND-ed together, with optional ordering and paging
    pub fn find_by<I, K, V>(
        &self,
        criteria: I,
        order_by: &[(&str, Order)],
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<Collection>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut query = self.query();
        for (column, value) in criteria {
            query = query.where_eq(column.as_ref(), value);
        }
        for (column, order) in order_by {
            query = query.order_by(column, order.clone());
        }
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        if let Some(offset) = offset {
            query = query.offset(offset);
        }
        query.fetch(self.ctx)
    }

    pub fn all(&self) -> Result<Collection> {
        self.query().fetch(self.ctx)
    }

    pub fn count(&self) -> Result<u64> {
        self.query().count(self.ctx)
    }
}
