//! Decoded result rows.
//!
//! Executors hand back rows as an ordered mapping of column name to raw
//! `sea_query::Value`. Column names may be table-alias-qualified
//! (`users.id`); hydration strips the qualifier of the entity being built.

use indexmap::IndexMap;
use sea_query::Value;

/// One decoded result row, in select-list order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: IndexMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a row from `(column, value)` pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self {
            columns: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.columns.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Value at a positional index (select-list order)
    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.columns.get_index(index).map(|(_, v)| v)
    }

    /// Consume the row, dropping the `qualifier.` prefix from matching column names.
    ///
    /// Columns qualified with a different table alias keep their full name.
    pub fn into_unqualified(self, qualifier: &str) -> IndexMap<String, Value> {
        let prefix = format!("{qualifier}.");
        self.columns
            .into_iter()
            .map(|(name, value)| match name.strip_prefix(&prefix) {
                Some(bare) => (bare.to_string(), value),
                None => (name, value),
            })
            .collect()
    }
}

impl IntoIterator for Row {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_iter()
    }
}
