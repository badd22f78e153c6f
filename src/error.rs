//! Error types for tidemark.
//!
//! Every fallible operation in the crate returns [`OrmError`]. The first four
//! variants are the public taxonomy callers are expected to match on; the rest
//! describe failures of the collaborators (executor, caster, configuration).

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, OrmError>;

/// Error type for all tidemark operations
#[derive(Debug, Error)]
pub enum OrmError {
    /// A required single-entity lookup produced no row
    #[error("No {entity} found {}", describe_lookup(.key, .value.as_deref()))]
    EntityNotFound {
        entity: String,
        key: String,
        value: Option<String>,
    },

    /// A relationship declaration did not produce a usable descriptor
    #[error("Invalid relationship `{relation}` on {entity}: {reason}")]
    RelationshipDefinition {
        entity: String,
        relation: String,
        reason: String,
    },

    /// Attempt to mutate a materialized entity
    #[error("Cannot set attribute `{attribute}` on {entity}: entities are immutable")]
    ImmutableEntity { entity: String, attribute: String },

    /// A constraint used positional placeholders or mismatched its bindings
    #[error("Invalid constraint: {0}")]
    InvalidConstraint(String),

    /// No entity definition registered under this name
    #[error("Unknown entity type `{0}`")]
    UnknownEntity(String),

    /// No executor registered under this connection name
    #[error("Unknown connection `{0}`")]
    UnknownConnection(String),

    /// No scope registered under this name
    #[error("Unknown scope `{scope}` on {entity}")]
    UnknownScope { entity: String, scope: String },

    /// A result row could not be turned into an entity
    #[error("Hydration error: {0}")]
    Hydration(String),

    /// An attribute cast failed
    #[error("Cannot cast column `{column}`: {reason}")]
    Cast { column: String, reason: String },

    /// Query execution failed outside the driver
    #[error("Query error: {0}")]
    Query(String),

    /// `PostgreSQL` error from `may_postgres`
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] may_postgres::Error),

    /// Connection could not be established
    #[error("Connection error: {0}")]
    Connection(String),
}

fn describe_lookup(key: &str, value: Option<&str>) -> String {
    match value {
        Some(value) => format!("with {key} = {value}"),
        None => format!("matching query (key {key})"),
    }
}

impl OrmError {
    pub(crate) fn relationship(
        entity: impl Into<String>,
        relation: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        OrmError::RelationshipDefinition {
            entity: entity.into(),
            relation: relation.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error is the "no row" outcome of an `*_or_fail` lookup
    pub fn is_not_found(&self) -> bool {
        matches!(self, OrmError::EntityNotFound { .. })
    }
}
