//! On-demand loading of one relationship for one entity.
//!
//! Used by [`Entity::load`](crate::Entity::load) and
//! [`Entity::resolve`](crate::Entity::resolve) the first time a relationship
//! is read. The result is merged onto the entity, so later reads are served
//! from its relation map without another query.
//!
//! Loading relationships this way inside a loop over many parents issues one
//! query per parent; prefer [`Select::with`](crate::Select::with) or
//! [`Context::load`](crate::Context::load) there.

use crate::context::Context;
use crate::entity::{Entity, Related};
use crate::error::Result;
use crate::relation::descriptor;
use std::rc::Rc;

#[cfg(feature = "tracing")]
use crate::observability::tracing_helpers;

pub(crate) fn load(ctx: &Context, entity: &Rc<Entity>, name: &str) -> Result<Related> {
    #[cfg(feature = "tracing")]
    let _span = tracing_helpers::lazy_load_span(entity.entity_type(), name).entered();

    log::debug!(
        "Lazy loading {}.{} for {:?}",
        entity.entity_type(),
        name,
        entity.id()
    );
    let mut relation = descriptor(ctx, entity.def(), name)?;
    relation.get_results(ctx, entity)
}
