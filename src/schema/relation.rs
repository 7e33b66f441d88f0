//! Lowered relation definitions.
//!
//! The six raw relation shapes collapse into five variants; the two
//! polymorphic shapes (`belongsToParent`, `hasChildren`) share one
//! variant tagged by role, resolved against a closed candidate set
//! enumerated from the schema at load time.

use std::collections::BTreeMap;

use crate::plan::expr::Literal;

/// Which side of a polymorphic pair a relation is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolyRole {
    /// `belongsToParent`: this entity stores the `{id, type}` pair.
    Parent,
    /// `hasChildren`: the child entity stores the pair, pointing here.
    Children,
}

/// A lowered relation.
#[derive(Debug, Clone, PartialEq)]
pub enum Relation {
    /// Local foreign key to the target's id.
    BelongsTo {
        entity: String,
        /// Local foreignId attribute.
        key: String,
        /// Key on the target, "id" unless overridden.
        foreign_key: String,
    },

    /// Exactly one target row holds a foreign key back to this entity.
    HasOne {
        entity: String,
        /// Attribute on the target referencing this entity's id.
        foreign_key: String,
    },

    /// Many target rows hold a foreign key back to this entity.
    HasMany {
        entity: String,
        foreign_key: String,
    },

    /// Many-to-many through a junction entity.
    ManyMany {
        entity: String,
        junction: String,
        /// `[nearKey, farKey]`: junction columns referencing this entity's
        /// id and the target's id respectively.
        mid_keys: [String; 2],
        /// Static discriminator columns, folded into the junction ON
        /// clause so LEFT JOIN cardinality stays correct.
        conditions: BTreeMap<String, Literal>,
        /// Extra junction-row columns exposed through the relation.
        additional_columns: Vec<String>,
    },

    /// Polymorphic `{id, type}` pair relation.
    Polymorphic {
        role: PolyRole,
        /// For `Children`: the one child entity. For `Parent`: empty,
        /// the target is chosen per row by the type column.
        entity: Option<String>,
        /// The foreignId column of the pair (on this entity for `Parent`,
        /// on the child for `Children`).
        id_column: String,
        /// The foreignType column of the pair.
        type_column: String,
        /// Closed set of concrete target types, enumerated at load time.
        /// Populated for `Parent`; empty for `Children`.
        candidates: Vec<String>,
    },
}

impl Relation {
    /// The fixed target entity, where one exists.
    pub fn target(&self) -> Option<&str> {
        match self {
            Relation::BelongsTo { entity, .. }
            | Relation::HasOne { entity, .. }
            | Relation::HasMany { entity, .. }
            | Relation::ManyMany { entity, .. } => Some(entity),
            Relation::Polymorphic { entity, .. } => entity.as_deref(),
        }
    }

    /// Whether joining this relation can multiply base rows.
    pub fn is_many(&self) -> bool {
        matches!(
            self,
            Relation::HasMany { .. }
                | Relation::ManyMany { .. }
                | Relation::Polymorphic {
                    role: PolyRole::Children,
                    ..
                }
        )
    }
}
