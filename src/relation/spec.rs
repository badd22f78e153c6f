//! Relationship declarations.
//!
//! An entity type declares each relationship as a factory closure that receives
//! a [`Relations`] helper bound to the declaring type and returns a
//! [`RelationSpec`]. Key names left unset are filled in from naming conventions
//! when the descriptor is built, once the related definition is known.

use crate::entity::def::EntityDef;

/// Declared relationship, before key defaults are resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationSpec {
    BelongsTo(BelongsToSpec),
    HasOne(HasOneSpec),
    HasMany(HasManySpec),
    BelongsToMany(BelongsToManySpec),
}

impl RelationSpec {
    /// Name of the related entity type
    pub fn related(&self) -> &str {
        match self {
            RelationSpec::BelongsTo(s) => &s.related,
            RelationSpec::HasOne(s) => &s.related,
            RelationSpec::HasMany(s) => &s.related,
            RelationSpec::BelongsToMany(s) => &s.related,
        }
    }
}

/// Inverse side: the declaring row holds the foreign key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BelongsToSpec {
    pub related: String,
    /// Column on the declaring type; defaults to the related type's canonical foreign key
    pub foreign_key: Option<String>,
    /// Column on the related type; defaults to its primary key
    pub owner_key: Option<String>,
}

impl BelongsToSpec {
    pub fn foreign_key(mut self, column: impl Into<String>) -> Self {
        self.foreign_key = Some(column.into());
        self
    }

    pub fn owner_key(mut self, column: impl Into<String>) -> Self {
        self.owner_key = Some(column.into());
        self
    }
}

/// One related row holds the foreign key back to the declaring type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HasOneSpec {
    pub related: String,
    /// Column on the related type; defaults to the declaring type's canonical foreign key
    pub foreign_key: Option<String>,
    /// Column on the declaring type; defaults to its primary key
    pub local_key: Option<String>,
    pub null_on_not_found: bool,
}

impl HasOneSpec {
    pub fn foreign_key(mut self, column: impl Into<String>) -> Self {
        self.foreign_key = Some(column.into());
        self
    }

    pub fn local_key(mut self, column: impl Into<String>) -> Self {
        self.local_key = Some(column.into());
        self
    }

    /// Merge an empty, non-persisted instance instead of `None` when nothing matches
    pub fn empty_when_missing(mut self) -> Self {
        self.null_on_not_found = false;
        self
    }
}

/// Many related rows hold the foreign key back to the declaring type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HasManySpec {
    pub related: String,
    pub foreign_key: Option<String>,
    pub local_key: Option<String>,
    /// Key the merged collection by this related column
    pub index_by: Option<String>,
}

impl HasManySpec {
    pub fn foreign_key(mut self, column: impl Into<String>) -> Self {
        self.foreign_key = Some(column.into());
        self
    }

    pub fn local_key(mut self, column: impl Into<String>) -> Self {
        self.local_key = Some(column.into());
        self
    }

    pub fn index_by(mut self, column: impl Into<String>) -> Self {
        self.index_by = Some(column.into());
        self
    }
}

/// Many-to-many through a linking table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BelongsToManySpec {
    pub related: String,
    /// Defaults to both tables' singular names, sorted and joined by `_`
    pub join_table: Option<String>,
    /// Linking column pointing at the declaring type
    pub foreign_pivot_key: Option<String>,
    /// Linking column pointing at the related type
    pub related_pivot_key: Option<String>,
    pub parent_key: Option<String>,
    pub related_key: Option<String>,
}

impl BelongsToManySpec {
    pub fn join_table(mut self, table: impl Into<String>) -> Self {
        self.join_table = Some(table.into());
        self
    }

    pub fn foreign_pivot_key(mut self, column: impl Into<String>) -> Self {
        self.foreign_pivot_key = Some(column.into());
        self
    }

    pub fn related_pivot_key(mut self, column: impl Into<String>) -> Self {
        self.related_pivot_key = Some(column.into());
        self
    }

    pub fn parent_key(mut self, column: impl Into<String>) -> Self {
        self.parent_key = Some(column.into());
        self
    }

    pub fn related_key(mut self, column: impl Into<String>) -> Self {
        self.related_key = Some(column.into());
        self
    }
}

macro_rules! impl_into_spec {
    ($spec:ty, $variant:ident) => {
        impl From<$spec> for RelationSpec {
            fn from(spec: $spec) -> Self {
                RelationSpec::$variant(spec)
            }
        }
    };
}

impl_into_spec!(BelongsToSpec, BelongsTo);
impl_into_spec!(HasOneSpec, HasOne);
impl_into_spec!(HasManySpec, HasMany);
impl_into_spec!(BelongsToManySpec, BelongsToMany);

/// Declaration helper handed to relationship factories
pub struct Relations<'a> {
    def: &'a EntityDef,
}

impl<'a> Relations<'a> {
    pub(crate) fn new(def: &'a EntityDef) -> Self {
        Self { def }
    }

    /// The type declaring the relationship
    pub fn declaring(&self) -> &EntityDef {
        self.def
    }

    pub fn belongs_to(&self, related: impl Into<String>) -> BelongsToSpec {
        BelongsToSpec {
            related: related.into(),
            foreign_key: None,
            owner_key: None,
        }
    }

    pub fn has_one(&self, related: impl Into<String>) -> HasOneSpec {
        HasOneSpec {
            related: related.into(),
            foreign_key: None,
            local_key: None,
            null_on_not_found: true,
        }
    }

    pub fn has_many(&self, related: impl Into<String>) -> HasManySpec {
        HasManySpec {
            related: related.into(),
            foreign_key: None,
            local_key: None,
            index_by: None,
        }
    }

    pub fn belongs_to_many(&self, related: impl Into<String>) -> BelongsToManySpec {
        BelongsToManySpec {
            related: related.into(),
            join_table: None,
            foreign_pivot_key: None,
            related_pivot_key: None,
            parent_key: None,
            related_key: None,
        }
    }
}
