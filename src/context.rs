//! Unit-of-work context.
//!
//! A [`Context`] owns everything one request or batch job needs: the schema,
//! the named executors, the attribute caster, the identity map and a query
//! counter. It is passed explicitly to every operation that touches the
//! database. Entities are `Rc`-shared and the map uses `RefCell`, so a
//! context is neither `Send` nor `Sync` and cannot leak identities across
//! threads. Call [`Context::clear`] (or drop the context) at the end of the
//! unit of work.

use crate::cast::{AttributeCaster, DefaultCaster};
use crate::config::TidemarkConfig;
use crate::connection::connect_with_config;
use crate::entity::{Collection, Entity, EntityDef, Schema};
use crate::error::{OrmError, Result};
use crate::executor::{MayPostgresExecutor, QueryExecutor};
use crate::identity_map::IdentityMap;
use crate::query::Select;
use crate::relation::eager::{eager_load_relationships, EagerPlan};
use crate::repository::Repository;
use crate::row::Row;
use crate::value::value_key;
use indexmap::IndexMap;
use sea_query::Values;
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::rc::Rc;
use std::sync::Arc;

#[cfg(feature = "tracing")]
use crate::observability::tracing_helpers;

/// Connection name used when an entity type does not name one
pub const DEFAULT_CONNECTION: &str = "default";

pub struct Context {
    schema: Schema,
    connections: IndexMap<String, Box<dyn QueryExecutor>>,
    caster: Box<dyn AttributeCaster>,
    identity_map: RefCell<IdentityMap>,
    queries: Cell<usize>,
    warn_threshold: usize,
    warned: Cell<bool>,
}

/// Builder for [`Context`]
pub struct ContextBuilder {
    schema: Schema,
    connections: IndexMap<String, Box<dyn QueryExecutor>>,
    caster: Box<dyn AttributeCaster>,
    warn_threshold: usize,
}

impl ContextBuilder {
    /// Register the executor used by entity types without a connection name
    pub fn default_connection(self, executor: impl QueryExecutor + 'static) -> Self {
        self.connection(DEFAULT_CONNECTION, executor)
    }

    pub fn connection(mut self, name: impl Into<String>, executor: impl QueryExecutor + 'static) -> Self {
        self.connections.insert(name.into(), Box::new(executor));
        self
    }

    pub fn caster(mut self, caster: impl AttributeCaster + 'static) -> Self {
        self.caster = Box::new(caster);
        self
    }

    /// Apply loaded settings
    pub fn config(mut self, config: &TidemarkConfig) -> Self {
        self.warn_threshold = config.identity_map.warn_threshold;
        self
    }

    pub fn warn_threshold(mut self, threshold: usize) -> Self {
        self.warn_threshold = threshold;
        self
    }

    pub fn build(self) -> Context {
        Context {
            schema: self.schema,
            connections: self.connections,
            caster: self.caster,
            identity_map: RefCell::new(IdentityMap::new()),
            queries: Cell::new(0),
            warn_threshold: self.warn_threshold,
            warned: Cell::new(false),
        }
    }
}

impl Context {
    pub fn builder(schema: Schema) -> ContextBuilder {
        ContextBuilder {
            schema,
            connections: IndexMap::new(),
            caster: Box::new(DefaultCaster),
            warn_threshold: TidemarkConfig::default().identity_map.warn_threshold,
        }
    }

    /// Connect the default executor to `config.database.url`
    pub fn connect(schema: Schema, config: &TidemarkConfig) -> Result<Self> {
        let client = connect_with_config(&config.database)?;
        Ok(Self::builder(schema)
            .config(config)
            .default_connection(MayPostgresExecutor::new(client))
            .build())
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn def(&self, entity: &str) -> Result<Arc<EntityDef>> {
        self.schema.get(entity)
    }

    /// Static entry points for one entity type
    pub fn repository(&self, entity: &str) -> Result<Repository<'_>> {
        Ok(Repository::new(self, self.def(entity)?))
    }

    /// Fresh query builder for one entity type
    pub fn query(&self, entity: &str) -> Result<Select> {
        Ok(Select::new(self.def(entity)?))
    }

    /// Eager-load `paths` onto an already fetched collection
    pub fn load<I, S>(&self, collection: &Collection, paths: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut plan = EagerPlan::default();
        for path in paths {
            plan.with(path.as_ref());
        }

        let mut by_type: IndexMap<String, Collection> = IndexMap::new();
        for entity in collection.unique().iter().filter(|e| e.exists()) {
            by_type
                .entry(entity.entity_type().to_string())
                .or_default()
                .push(Rc::clone(entity));
        }
        for parents in by_type.values() {
            eager_load_relationships(self, parents, &plan)?;
        }
        Ok(())
    }

    pub fn identity_map(&self) -> Ref<'_, IdentityMap> {
        self.identity_map.borrow()
    }

    pub(crate) fn identity_map_mut(&self) -> RefMut<'_, IdentityMap> {
        self.identity_map.borrow_mut()
    }

    /// End the unit of work: forget every entity, edge and alias
    pub fn clear(&self) {
        let count = self.identity_map.borrow().count();
        self.identity_map.borrow_mut().clear();
        self.warned.set(false);
        log::debug!("Cleared identity map ({} entities)", count);
    }

    /// Statements executed since the context was built or last reset
    pub fn query_count(&self) -> usize {
        self.queries.get()
    }

    pub fn reset_query_count(&self) {
        self.queries.set(0);
    }

    fn executor_for(&self, connection: Option<&str>) -> Result<&dyn QueryExecutor> {
        let name = connection.unwrap_or(DEFAULT_CONNECTION);
        self.connections
            .get(name)
            .map(|b| b.as_ref())
            .ok_or_else(|| OrmError::UnknownConnection(name.to_string()))
    }

    pub(crate) fn execute(&self, connection: Option<&str>, sql: &str, values: &Values) -> Result<Vec<Row>> {
        let executor = self.executor_for(connection)?;

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::execute_query_span(sql).entered();

        log::debug!("{} {:?}", sql, values.0);
        self.queries.set(self.queries.get() + 1);
        executor.query_all(sql, values)
    }

    /// Turn one result row into the canonical entity for its identity
    pub(crate) fn hydrate(
        &self,
        def: &Arc<EntityDef>,
        table_alias: &str,
        owning_key: Option<&str>,
        row: Row,
    ) -> Result<Rc<Entity>> {
        let mut attributes = row.into_unqualified(table_alias);
        let identity = attributes
            .get(def.primary_key())
            .and_then(value_key)
            .ok_or_else(|| {
                OrmError::Hydration(format!(
                    "{} row has no usable `{}` value",
                    def.name(),
                    def.primary_key()
                ))
            })?;

        self.identity_map
            .borrow_mut()
            .infer_relationships(def, &identity, &mut attributes, owning_key);
        let attributes = self.caster.cast(attributes, def.casts())?;

        let entity = Rc::new(Entity::new(Arc::clone(def), identity, attributes));
        let entity = self.identity_map.borrow_mut().add(entity);
        self.check_growth();
        Ok(entity)
    }

    fn check_growth(&self) {
        if self.warn_threshold == 0 || self.warned.get() {
            return;
        }
        let count = self.identity_map.borrow().count();
        if count > self.warn_threshold {
            self.warned.set(true);
            log::warn!(
                "Identity map holds {} entities (threshold {}); is Context::clear() called at the end of each unit of work?",
                count,
                self.warn_threshold
            );
        }
    }
}
