//! Query building and execution.
//!
//! - [`Select`]: fluent builder bound to an entity type
//! - [`Bindings`]: values for `:name` placeholders in raw fragments
//! - `value_conversion`: `sea_query::Value` to `may_postgres` parameters

pub mod execution;
pub mod placeholders;
pub mod select;
pub mod value_conversion;

pub use placeholders::Bindings;
pub use select::{Op, Select};
