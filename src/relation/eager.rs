//! Eager loading of relationship trees.
//!
//! Paths are dot-separated relationship names. `"addresses.country"` loads
//! `addresses` for every parent in one batched query, then `country` for every
//! loaded address in one more. Registering a path registers each of its
//! prefixes, so the plan is an ordered map of full paths; the scheduler walks
//! the top level and hands each descriptor the sub-plan under its name.
//!
//! # Strategy
//!
//! 1. Fetch the parents
//! 2. For each top-level relationship, in registration order, build one
//!    descriptor for the parent type and constrain it to every parent's key
//! 3. Run the batched query; nested paths run as part of its fetch
//! 4. Merge results onto each parent through the edges the identity map
//!    recorded while hydrating the batch

use crate::context::Context;
use crate::entity::Collection;
use crate::error::Result;
use crate::query::Select;
use crate::relation::descriptor;
use indexmap::IndexMap;
use std::fmt;
use std::rc::Rc;

#[cfg(feature = "tracing")]
use crate::observability::tracing_helpers;

/// Callback applied to a relationship's query before it runs
pub type Constraint = Rc<dyn Fn(Select) -> Result<Select>>;

/// Ordered set of relationship paths, each with an optional constraint
#[derive(Clone, Default)]
pub struct EagerPlan {
    entries: IndexMap<String, Option<Constraint>>,
}

impl fmt::Debug for EagerPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.keys()).finish()
    }
}

impl EagerPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `path` and every prefix of it
    pub fn with(&mut self, path: &str) {
        let mut prefix = String::new();
        for segment in path.split('.').map(str::trim).filter(|s| !s.is_empty()) {
            if !prefix.is_empty() {
                prefix.push('.');
            }
            prefix.push_str(segment);
            self.entries.entry(prefix.clone()).or_insert(None);
        }
    }

    /// Register `path`, replacing any constraint already set for it
    pub fn with_constraint(&mut self, path: &str, constraint: Constraint) {
        self.with(path);
        let normalized = normalize(path);
        if let Some(slot) = self.entries.get_mut(&normalized) {
            *slot = Some(constraint);
        }
    }

    /// Fold `other` in; its constraints win over ours
    pub fn merge(&mut self, other: EagerPlan) {
        for (path, constraint) in other.entries {
            match constraint {
                Some(c) => {
                    self.entries.insert(path, Some(c));
                }
                None => {
                    self.entries.entry(path).or_insert(None);
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered paths, in registration order
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Names without a path separator
    pub fn top_level(&self) -> Vec<String> {
        self.entries
            .keys()
            .filter(|path| !path.contains('.'))
            .cloned()
            .collect()
    }

    /// Sub-plan registered under `name.`, with the prefix stripped
    pub fn nested(&self, name: &str) -> EagerPlan {
        let prefix = format!("{name}.");
        let entries = self
            .entries
            .iter()
            .filter_map(|(path, constraint)| {
                path.strip_prefix(&prefix)
                    .map(|rest| (rest.to_string(), constraint.clone()))
            })
            .collect();
        EagerPlan { entries }
    }

    pub fn constraint(&self, path: &str) -> Option<&Constraint> {
        self.entries.get(path).and_then(Option::as_ref)
    }
}

fn normalize(path: &str) -> String {
    path.split('.')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(".")
}

/// Load every top-level relationship of `plan` onto `parents`.
///
/// `parents` must share one entity type. A failed batch query fails the whole
/// step; nothing is merged for that relationship.
pub(crate) fn eager_load_relationships(ctx: &Context, parents: &Collection, plan: &EagerPlan) -> Result<()> {
    let Some(first) = parents.first() else {
        return Ok(());
    };
    let def = first.def().clone();

    for name in plan.top_level() {
        log::debug!(
            "Eager loading {}.{} for {} parent(s)",
            def.name(),
            name,
            parents.len()
        );

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::eager_load_span(def.name(), &name, parents.len()).entered();

        let mut relation = descriptor(ctx, &def, &name)?;
        relation.with(plan.nested(&name))?;
        let has_keys = relation.add_eager_constraints(parents)?;
        if let Some(constraint) = plan.constraint(&name) {
            relation.constrain(constraint)?;
        }

        if has_keys {
            relation.add_results_to_parents(ctx, parents)?;
        } else {
            log::debug!("No parent keys for {}.{}; skipping query", def.name(), name);
            relation.merge_empty(parents);
        }
    }
    Ok(())
}
