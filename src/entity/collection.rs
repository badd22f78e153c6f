//! Ordered result sets and merged relationship values.

use crate::entity::Entity;
use crate::value::value_key;
use indexmap::IndexMap;
use sea_query::Value;
use std::collections::HashSet;
use std::rc::Rc;

/// Ordered batch of entities returned by a query or a relationship merge
#[derive(Debug, Clone, Default)]
pub struct Collection {
    items: Vec<Rc<Entity>>,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entity: Rc<Entity>) {
        self.items.push(entity);
    }

    pub fn first(&self) -> Option<&Rc<Entity>> {
        self.items.first()
    }

    pub fn get(&self, index: usize) -> Option<&Rc<Entity>> {
        self.items.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rc<Entity>> {
        self.items.iter()
    }

    /// Values of one attribute, in collection order; missing attributes are skipped
    pub fn pluck(&self, column: &str) -> Vec<Value> {
        self.items
            .iter()
            .filter_map(|e| e.get(column).cloned())
            .collect()
    }

    /// Identity keys of the persisted members, in collection order
    pub fn keys(&self) -> Vec<String> {
        self.items
            .iter()
            .filter_map(|e| e.id().map(str::to_string))
            .collect()
    }

    /// Drop repeated instances, keeping the first occurrence
    pub fn unique(&self) -> Collection {
        let mut seen = HashSet::new();
        self.items
            .iter()
            .filter(|e| seen.insert(Rc::as_ptr(e)))
            .cloned()
            .collect()
    }

    /// Key members by the string form of `column`.
    ///
    /// Members sharing a key overwrite each other: the last one wins.
    pub fn key_by(&self, column: &str) -> IndexMap<String, Rc<Entity>> {
        let mut keyed = IndexMap::new();
        for entity in &self.items {
            if let Some(key) = entity.get(column).and_then(value_key) {
                keyed.insert(key, Rc::clone(entity));
            }
        }
        keyed
    }

    pub fn contains(&self, entity: &Rc<Entity>) -> bool {
        self.items.iter().any(|e| Rc::ptr_eq(e, entity))
    }

    pub fn into_vec(self) -> Vec<Rc<Entity>> {
        self.items
    }
}

impl FromIterator<Rc<Entity>> for Collection {
    fn from_iter<I: IntoIterator<Item = Rc<Entity>>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Collection {
    type Item = Rc<Entity>;
    type IntoIter = std::vec::IntoIter<Rc<Entity>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a Rc<Entity>;
    type IntoIter = std::slice::Iter<'a, Rc<Entity>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// A relationship value merged onto a parent entity
#[derive(Debug, Clone)]
pub enum Related {
    /// Singular relationships: the related entity, or `None` when nothing matched
    One(Option<Rc<Entity>>),
    /// Plural relationships, possibly empty
    Many(Collection),
    /// Plural relationships keyed by an attribute of the related type
    Keyed(IndexMap<String, Rc<Entity>>),
}

impl Related {
    pub fn is_many(&self) -> bool {
        !matches!(self, Related::One(_))
    }

    pub fn as_one(&self) -> Option<&Rc<Entity>> {
        match self {
            Related::One(one) => one.as_ref(),
            _ => None,
        }
    }

    pub fn as_many(&self) -> Option<&Collection> {
        match self {
            Related::Many(many) => Some(many),
            _ => None,
        }
    }

    pub fn as_keyed(&self) -> Option<&IndexMap<String, Rc<Entity>>> {
        match self {
            Related::Keyed(keyed) => Some(keyed),
            _ => None,
        }
    }

    /// Number of related entities (0 or 1 for singular relationships)
    pub fn len(&self) -> usize {
        match self {
            Related::One(one) => usize::from(one.is_some()),
            Related::Many(many) => many.len(),
            Related::Keyed(keyed) => keyed.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
