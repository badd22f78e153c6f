//! Named placeholder binding for raw SQL fragments.
//!
//! Raw constraints are written with `:name` placeholders and a [`Bindings`]
//! map. Each distinct name is rewritten to a numbered driver placeholder
//! (`$1`, `$2`, ...) in order of first appearance; repeated names reuse their
//! number. Positional placeholders are rejected so that every bound value is
//! traceable to a name. String literals, quoted identifiers and `--` comments
//! are copied through untouched.

use crate::error::{OrmError, Result};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use sea_query::Value;

static TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"'(?:[^']|'')*'|"(?:[^"]|"")*"|--[^\n]*|::|:([A-Za-z_][A-Za-z0-9_]*)|\$\d+|\?"#)
        .expect("valid placeholder pattern")
});

/// Values for the `:name` placeholders of a raw fragment
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    values: IndexMap<String, Value>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` (without the leading colon)
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Rewrite `:name` placeholders to numbered ones, returning the SQL and ordered values.
///
/// Fails with [`OrmError::InvalidConstraint`] on `?` or `$n`, on a placeholder
/// without a binding, and on a binding the fragment never references.
pub fn bind_named(sql: &str, bindings: &Bindings) -> Result<(String, Vec<Value>)> {
    let mut out = String::with_capacity(sql.len());
    let mut numbered: IndexMap<&str, usize> = IndexMap::new();
    let mut values = Vec::new();
    let mut last = 0;

    for caps in TOKEN.captures_iter(sql) {
        let Some(token) = caps.get(0) else { continue };
        out.push_str(&sql[last..token.start()]);
        last = token.end();

        let text = token.as_str();
        if let Some(name) = caps.get(1) {
            let name = name.as_str();
            let number = match numbered.get(name) {
                Some(n) => *n,
                None => {
                    let value = bindings.values.get(name).ok_or_else(|| {
                        OrmError::InvalidConstraint(format!("no binding for placeholder `:{name}`"))
                    })?;
                    values.push(value.clone());
                    numbered.insert(name, values.len());
                    values.len()
                }
            };
            out.push('$');
            out.push_str(&number.to_string());
        } else if text == "?" || text.starts_with('$') {
            return Err(OrmError::InvalidConstraint(format!(
                "positional placeholder `{text}` in `{sql}`; use named placeholders (`:name`)"
            )));
        } else {
            out.push_str(text);
        }
    }
    out.push_str(&sql[last..]);

    if let Some(unused) = bindings.values.keys().find(|k| !numbered.contains_key(k.as_str())) {
        return Err(OrmError::InvalidConstraint(format!(
            "binding `{unused}` is not referenced in `{sql}`"
        )));
    }
    Ok((out, values))
}
