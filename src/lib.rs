//! # Tidemark
//!
//! Read-only PostgreSQL object mapper for the `may` runtime.
//!
//! Entities are immutable records hydrated from rows. Within one
//! [`Context`] every `(type, primary key)` pair is materialized exactly once,
//! and relationships between entities are inferred from the shape of the
//! rows that batched relationship queries return. Eager loading walks
//! dot-separated relationship paths and issues one query per relationship,
//! whatever the number of parents.
//!
//! ```
//! use tidemark::mock::MockExecutor;
//! use tidemark::{row, Context, EntityDef, Schema};
//!
//! let schema = Schema::new()
//!     .register(EntityDef::builder("User", "users").has_many("addresses", "Address").build())
//!     .register(EntityDef::builder("Address", "addresses").build());
//!
//! let mock = MockExecutor::new().append_query_results(vec![
//!     vec![row! { "id" => 1, "name" => "Ada" }],
//!     vec![row! { "id" => 10, "user_id" => 1, "city" => "London" }],
//! ]);
//! let ctx = Context::builder(schema).default_connection(mock).build();
//!
//! let users = ctx.repository("User")?.with(["addresses"]).fetch(&ctx)?;
//! let addresses = users.first().and_then(|u| u.relation("addresses"));
//! assert_eq!(addresses.map(|a| a.len()), Some(1));
//! assert_eq!(ctx.query_count(), 2);
//! # Ok::<(), tidemark::OrmError>(())
//! ```

pub mod cast;
pub mod config;
pub mod connection;
pub mod context;
pub mod entity;
pub mod error;
pub mod executor;
pub mod identity_map;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod observability;
pub mod query;
pub mod relation;
pub mod repository;
pub mod row;
pub mod value;

pub use cast::{AttributeCaster, Cast, CastSpec, DefaultCaster};
pub use config::TidemarkConfig;
pub use connection::{connect, connect_with_config};
pub use context::{Context, ContextBuilder, DEFAULT_CONNECTION};
pub use entity::{Collection, Entity, EntityDef, EntityDefBuilder, Related, Resolved, Schema};
pub use error::{OrmError, Result};
pub use executor::{MayPostgresExecutor, QueryExecutor};
pub use identity_map::IdentityMap;
pub use query::{Bindings, Op, Select};
pub use relation::{RelationSpec, Relations};
pub use repository::Repository;
pub use row::Row;
pub use value::{TryGetable, ValueExtractionError};

pub use sea_query::Order;
