//! Identity map and relationship inference.
//!
//! The map guarantees that within one [`Context`](crate::Context) a given
//! `(type, identity)` pair is materialized as exactly one `Rc<Entity>`. Next to
//! the entities it keeps an edge table recording which source identities point
//! at which target identities, and an alias table mapping marker column names
//! back to the entity type that owns them.
//!
//! Edges are never declared by callers. They are inferred from the shape of
//! result rows: a batched relationship query selects the parent key alongside
//! the child columns (either under a synthetic marker alias or under the plain
//! foreign-key name) and [`IdentityMap::infer_relationships`] reads it back.
//!
//! The map only grows. Call [`IdentityMap::clear`] (through
//! [`Context::clear`](crate::Context::clear)) at the end of every unit of work.
//! Dropping the map has the same effect on the relationships it merged.

use crate::entity::{Entity, EntityDef};
use crate::value::value_key;
use indexmap::{IndexMap, IndexSet};
use sea_query::Value;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// Prefix reserved for columns the crate injects into queries
pub const INTERNAL_PREFIX: &str = "__tm";

/// Marker alias carrying a source identity: `__tm_src_ref`.
///
/// Many-to-many queries use the long form
/// `__tm_src_ref__{join_table}__{join_column}`.
pub const SOURCE_MARKER: &str = "__tm_src_ref";

/// Marker alias for the linking-table column `join_column` of `join_table`
pub fn pivot_marker(join_table: &str, join_column: &str) -> String {
    format!("{SOURCE_MARKER}__{join_table}__{join_column}")
}

/// Alias-table key a marker column resolves through.
///
/// The pivot form resolves through its join column; the bare marker resolves
/// through itself.
fn marker_alias_key(column: &str) -> Option<&str> {
    if column == SOURCE_MARKER {
        return Some(column);
    }
    let rest = column.strip_prefix(SOURCE_MARKER)?.strip_prefix("__")?;
    let (_join_table, join_column) = rest.split_once("__")?;
    if join_column.is_empty() {
        None
    } else {
        Some(join_column)
    }
}

type EdgeTable = HashMap<String, HashMap<String, HashMap<String, IndexSet<String>>>>;

/// Scoped deduplicating store of entities plus inferred relationship edges
#[derive(Debug, Default)]
pub struct IdentityMap {
    /// type -> identity -> entity, in insertion order per type
    entities: HashMap<String, IndexMap<String, Rc<Entity>>>,
    /// type -> external identity -> identity
    external: HashMap<String, HashMap<String, String>>,
    /// source type -> source identity -> target type -> target identities
    edges: EdgeTable,
    /// marker key -> source type
    aliases: HashMap<String, String>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `marker` (default: the type's canonical foreign key) identifies `def`.
    ///
    /// The first registration of a marker wins; later ones are ignored.
    pub fn register_alias(&mut self, def: &EntityDef, marker: Option<&str>) {
        let marker = marker.unwrap_or_else(|| def.foreign_key());
        self.aliases
            .entry(marker.to_string())
            .or_insert_with(|| def.name().to_string());
    }

    /// Type registered for `marker`, if any
    pub fn resolve_alias(&self, marker: &str) -> Option<&str> {
        self.aliases.get(marker).map(String::as_str)
    }

    /// Scan a freshly decoded row of `def` for relationship markers and record edges.
    ///
    /// Synthetic marker columns are removed from `attributes`. Plain columns
    /// named like `def`'s canonical foreign key or the query's `owning_key` stay
    /// visible. Markers whose alias cannot be resolved are skipped.
    pub fn infer_relationships(
        &mut self,
        def: &EntityDef,
        identity: &str,
        attributes: &mut IndexMap<String, Value>,
        owning_key: Option<&str>,
    ) {
        let markers: Vec<String> = attributes
            .keys()
            .filter(|k| k.starts_with(SOURCE_MARKER))
            .cloned()
            .collect();

        for marker in markers {
            let Some(value) = attributes.shift_remove(&marker) else {
                continue;
            };
            match marker_alias_key(&marker) {
                Some(alias) => self.record_from_column(alias, &value, def, identity),
                None => log::trace!("Malformed relationship marker column `{}`", marker),
            }
        }

        let mut candidates = vec![def.foreign_key()];
        if let Some(owning_key) = owning_key {
            if owning_key != def.foreign_key() {
                candidates.push(owning_key);
            }
        }
        for column in candidates {
            if let Some(value) = attributes.get(column) {
                let value = value.clone();
                self.record_from_column(column, &value, def, identity);
            }
        }
    }

    fn record_from_column(&mut self, alias: &str, value: &Value, def: &EntityDef, identity: &str) {
        let Some(source_identity) = value_key(value) else {
            return;
        };
        match self.aliases.get(alias).cloned() {
            Some(source_type) => {
                self.register_relationship(&source_type, &source_identity, def.name(), identity)
            }
            None => log::trace!(
                "No alias registered for `{}` while hydrating {}; not a relationship marker",
                alias,
                def.name()
            ),
        }
    }

    /// Record the edge `source -> target`; repeated edges are ignored
    pub fn register_relationship(
        &mut self,
        source_type: &str,
        source_identity: &str,
        target_type: &str,
        target_identity: &str,
    ) {
        self.edges
            .entry(source_type.to_string())
            .or_default()
            .entry(source_identity.to_string())
            .or_default()
            .entry(target_type.to_string())
            .or_default()
            .insert(target_identity.to_string());
    }

    /// Target identities of `target_type` recorded for one source identity
    pub fn related_identities(
        &self,
        source_type: &str,
        source_identity: &str,
        target_type: &str,
    ) -> IndexSet<String> {
        self.edges
            .get(source_type)
            .and_then(|by_id| by_id.get(source_identity))
            .and_then(|by_type| by_type.get(target_type))
            .cloned()
            .unwrap_or_default()
    }

    /// Target identities of `related_type` recorded for `entity`.
    ///
    /// Edges keyed by the external identity take precedence over the primary key.
    pub fn get_related_identities_for(&self, entity: &Entity, related_type: &str) -> IndexSet<String> {
        self.edge_key_for(entity)
            .map(|key| self.related_identities(entity.entity_type(), key, related_type))
            .unwrap_or_default()
    }

    /// Every recorded target identity for `entity`, per target type
    pub fn get_all_related_identities_for(&self, entity: &Entity) -> HashMap<String, IndexSet<String>> {
        self.edge_key_for(entity)
            .and_then(|key| self.edges.get(entity.entity_type())?.get(key).cloned())
            .unwrap_or_default()
    }

    fn edge_key_for<'e>(&self, entity: &'e Entity) -> Option<&'e str> {
        let by_id = self.edges.get(entity.entity_type());
        match entity.external_id() {
            Some(external) if by_id.is_some_and(|m| m.contains_key(external)) => Some(external),
            _ => entity.id(),
        }
    }

    /// Store `entity` unless its identity is already mapped, returning the mapped instance.
    ///
    /// Non-persisted instances are returned unchanged and never stored.
    pub fn add(&mut self, entity: Rc<Entity>) -> Rc<Entity> {
        let Some(identity) = entity.id().map(str::to_string) else {
            return entity;
        };
        let by_type = self
            .entities
            .entry(entity.entity_type().to_string())
            .or_default();
        if let Some(existing) = by_type.get(&identity) {
            return Rc::clone(existing);
        }
        by_type.insert(identity.clone(), Rc::clone(&entity));
        if let Some(external) = entity.external_id() {
            self.external
                .entry(entity.entity_type().to_string())
                .or_default()
                .entry(external.to_string())
                .or_insert(identity);
        }
        entity
    }

    /// Mapped entities of `entity_type` whose internal or external identity is in `identities`.
    ///
    /// Results follow storage order.
    pub fn all<I, S>(&self, entity_type: &str, identities: I) -> Vec<Rc<Entity>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let wanted: HashSet<String> = identities
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .collect();
        if wanted.is_empty() {
            return Vec::new();
        }
        self.entities
            .get(entity_type)
            .map(|by_id| {
                by_id
                    .iter()
                    .filter(|(id, e)| {
                        wanted.contains(id.as_str())
                            || e.external_id().is_some_and(|x| wanted.contains(x))
                    })
                    .map(|(_, e)| Rc::clone(e))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Single lookup by internal or external identity
    pub fn get(&self, entity_type: &str, identity: &str) -> Option<Rc<Entity>> {
        let by_id = self.entities.get(entity_type)?;
        if let Some(entity) = by_id.get(identity) {
            return Some(Rc::clone(entity));
        }
        let internal = self.external.get(entity_type)?.get(identity)?;
        by_id.get(internal).cloned()
    }

    pub fn has(&self, entity_type: &str, identity: &str) -> bool {
        self.get(entity_type, identity).is_some()
    }

    /// Reset entities, edges and aliases.
    ///
    /// Merged relationships on mapped entities are dropped first so that
    /// parent/child reference cycles do not outlive the scope.
    pub fn clear(&mut self) {
        self.release_relations();
        self.entities.clear();
        self.external.clear();
        self.edges.clear();
        self.aliases.clear();
    }

    /// Total mapped entities across all types
    pub fn count(&self) -> usize {
        self.entities.values().map(IndexMap::len).sum()
    }

    fn release_relations(&self) {
        for entity in self.entities.values().flat_map(IndexMap::values) {
            entity.forget_relations();
        }
    }
}

impl Drop for IdentityMap {
    fn drop(&mut self) {
        self.release_relations();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Collection, Related};
    use std::sync::Arc;

    fn def(name: &str, table: &str) -> Arc<EntityDef> {
        Arc::new(EntityDef::builder(name, table).build())
    }

    fn entity(def: &Arc<EntityDef>, id: i32) -> Rc<Entity> {
        let mut attributes = IndexMap::new();
        attributes.insert("id".to_string(), Value::from(id));
        Rc::new(Entity::new(Arc::clone(def), id.to_string(), attributes))
    }

    #[test]
    fn test_pivot_marker_infers_edge() {
        let customer = def("Customer", "customers");
        let order = def("Order", "orders");
        let mut map = IdentityMap::new();
        map.register_alias(&customer, None);

        let mut attributes = IndexMap::new();
        attributes.insert("id".to_string(), Value::from(7));
        attributes.insert(pivot_marker("orders", "customer_id"), Value::from(42));
        map.infer_relationships(&order, "7", &mut attributes, None);

        assert!(!attributes.keys().any(|k| k.starts_with(INTERNAL_PREFIX)));
        let related = map.get_related_identities_for(&entity(&customer, 42), "Order");
        assert!(related.contains("7"));
    }

    #[test]
    fn test_exact_marker_resolves_through_itself() {
        let user = def("User", "users");
        let post = def("Post", "posts");
        let mut map = IdentityMap::new();
        map.register_alias(&user, Some(SOURCE_MARKER));

        let mut attributes = IndexMap::new();
        attributes.insert(SOURCE_MARKER.to_string(), Value::from(3));
        map.infer_relationships(&post, "11", &mut attributes, None);

        assert!(attributes.is_empty());
        assert_eq!(
            map.related_identities("User", "3", "Post").into_iter().collect::<Vec<_>>(),
            vec!["11"]
        );
    }

    #[test]
    fn test_owning_key_column_stays_visible() {
        let user = def("User", "users");
        let address = def("Address", "addresses");
        let mut map = IdentityMap::new();
        map.register_alias(&user, None);

        let mut attributes = IndexMap::new();
        attributes.insert("id".to_string(), Value::from(5));
        attributes.insert("user_id".to_string(), Value::from(1));
        map.infer_relationships(&address, "5", &mut attributes, Some("user_id"));

        assert!(attributes.contains_key("user_id"));
        assert!(map.related_identities("User", "1", "Address").contains("5"));
    }

    #[test]
    fn test_unresolved_alias_and_null_values_are_ignored() {
        let address = def("Address", "addresses");
        let mut map = IdentityMap::new();
        map.register_alias(&def("User", "users"), None);

        let mut attributes = IndexMap::new();
        attributes.insert("user_id".to_string(), Value::Int(None));
        attributes.insert(pivot_marker("x", "ghost_id"), Value::from(1));
        map.infer_relationships(&address, "5", &mut attributes, Some("user_id"));

        assert!(map.edges.is_empty());
        assert_eq!(attributes.len(), 1);
    }

    #[test]
    fn test_alias_first_registrant_wins() {
        let mut map = IdentityMap::new();
        map.register_alias(&def("User", "users"), Some("owner_id"));
        map.register_alias(&def("Team", "teams"), Some("owner_id"));
        assert_eq!(map.resolve_alias("owner_id"), Some("User"));
    }

    #[test]
    fn test_register_relationship_is_idempotent() {
        let mut map = IdentityMap::new();
        map.register_relationship("User", "1", "Address", "5");
        map.register_relationship("User", "1", "Address", "5");
        assert_eq!(map.related_identities("User", "1", "Address").len(), 1);
        assert!(map.related_identities("User", "2", "Address").is_empty());
    }

    #[test]
    fn test_external_identity_edges_take_precedence() {
        let user = Arc::new(EntityDef::builder("User", "users").external_key("uuid").build());
        let mut attributes = IndexMap::new();
        attributes.insert("id".to_string(), Value::from(1));
        attributes.insert("uuid".to_string(), Value::from("u-1"));
        let ada = Entity::new(user, "1".to_string(), attributes);

        let mut map = IdentityMap::new();
        map.register_relationship("User", "1", "Post", "10");
        assert!(map.get_related_identities_for(&ada, "Post").contains("10"));

        map.register_relationship("User", "u-1", "Post", "20");
        let related = map.get_related_identities_for(&ada, "Post");
        assert!(related.contains("20"));
        assert!(!related.contains("10"));
        assert_eq!(map.get_all_related_identities_for(&ada).len(), 1);
    }

    #[test]
    fn test_add_is_first_write_wins() {
        let user = def("User", "users");
        let mut map = IdentityMap::new();
        let original = entity(&user, 1);
        let copy = entity(&user, 1);

        let stored = map.add(Rc::clone(&original));
        assert!(Rc::ptr_eq(&stored, &original));
        let stored = map.add(copy);
        assert!(Rc::ptr_eq(&stored, &original));
        assert!(Rc::ptr_eq(&map.get("User", "1").unwrap(), &original));
        assert_eq!(map.count(), 1);
    }

    #[test]
    fn test_non_persisted_instances_are_not_stored() {
        let mut map = IdentityMap::new();
        map.add(Rc::new(Entity::empty(def("User", "users"))));
        assert_eq!(map.count(), 0);
    }

    #[test]
    fn test_all_follows_storage_order_and_external_keys() {
        let user = Arc::new(EntityDef::builder("User", "users").external_key("uuid").build());
        let mut map = IdentityMap::new();
        for (id, uuid) in [(1, "a"), (2, "b"), (3, "c")] {
            let mut attributes = IndexMap::new();
            attributes.insert("id".to_string(), Value::from(id));
            attributes.insert("uuid".to_string(), Value::from(uuid));
            map.add(Rc::new(Entity::new(Arc::clone(&user), id.to_string(), attributes)));
        }

        let found: Vec<_> = map
            .all("User", ["3", "a"])
            .iter()
            .filter_map(|e| e.id().map(str::to_string))
            .collect();
        assert_eq!(found, vec!["1", "3"]);
        assert!(map.all("User", Vec::<String>::new()).is_empty());
        assert!(map.all("Ghost", ["1"]).is_empty());
        assert!(map.has("User", "b"));
        assert!(!map.has("User", "z"));
    }

    #[test]
    fn test_clear_twice_leaves_empty_map() {
        let user = def("User", "users");
        let mut map = IdentityMap::new();
        let ada = map.add(entity(&user, 1));
        ada.set_relation("friends", Related::Many(Collection::from_iter([Rc::clone(&ada)])));
        map.register_alias(&user, None);

        map.clear();
        assert_eq!(map.count(), 0);
        assert!(!ada.relation_loaded("friends"));
        assert!(map.resolve_alias("user_id").is_none());

        map.clear();
        assert_eq!(map.count(), 0);
    }

    #[test]
    fn test_drop_breaks_reference_cycles() {
        let user = def("User", "users");
        let address = def("Address", "addresses");
        let weak = {
            let mut map = IdentityMap::new();
            let ada = map.add(entity(&user, 1));
            let home = map.add(entity(&address, 10));
            ada.set_relation("addresses", Related::Many(Collection::from_iter([Rc::clone(&home)])));
            home.set_relation("user", Related::One(Some(Rc::clone(&ada))));
            Rc::downgrade(&ada)
        };
        assert!(weak.upgrade().is_none());
    }
}
