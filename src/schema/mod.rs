//! Schema loading and the immutable registry.
//!
//! The raw document (see [`document`]) is lowered and validated once into
//! a [`SchemaRegistry`]; everything downstream reads the registry and
//! never mutates it. Malformed documents fail here, at load time, with a
//! [`SchemaError`] - per-query compilation never re-validates the schema.

pub mod attribute;
pub mod clause;
pub mod document;
pub mod registry;
pub mod relation;

use std::collections::HashMap;

use thiserror::Error;

use crate::plan::parse::ParseError;
use crate::plan::query::Direction;

pub use attribute::{
    AliasSpec, AttributeDef, AttributeRole, AttributeType, DirSpec, JoinRequirement, Operator,
    OrderOverride, SelectOverride, StorageKind, WhereOverride,
};
pub use clause::{ClauseError, TemplateOp, TemplateValue, WhereTemplate};
pub use document::SchemaDocument;
pub use registry::SchemaRegistry;
pub use relation::{PolyRole, Relation};

/// Errors detected while loading a schema document, plus `NotFound` for
/// registry lookups. Load errors are fatal and reported once at startup.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Unknown entity '{entity}'")]
    NotFound { entity: String },

    #[error("Schema document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Entity '{entity}', field '{field}': unknown attribute type '{got}'")]
    UnknownAttributeType {
        entity: String,
        field: String,
        got: String,
    },

    #[error("Entity '{entity}', field '{field}': unknown attribute role '{got}'")]
    UnknownRole {
        entity: String,
        field: String,
        got: String,
    },

    #[error("Entity '{entity}', field '{field}': unknown operator '{got}' in override table")]
    UnknownOperator {
        entity: String,
        field: String,
        got: String,
    },

    #[error("Entity '{entity}', field '{field}': override for '{operator}' has no whereClause")]
    MissingWhereClause {
        entity: String,
        field: String,
        operator: String,
    },

    #[error("Entity '{entity}', field '{field}': malformed join entry: {message}")]
    BadJoin {
        entity: String,
        field: String,
        message: String,
    },

    #[error("Entity '{entity}', field '{field}': bad expression")]
    BadExpression {
        entity: String,
        field: String,
        #[source]
        source: ParseError,
    },

    #[error("Entity '{entity}', field '{field}': bad where clause")]
    BadClause {
        entity: String,
        field: String,
        #[source]
        source: ClauseError,
    },

    #[error("Entity '{entity}', field '{field}': bad order direction '{got}'")]
    BadOrderDirection {
        entity: String,
        field: String,
        got: String,
    },

    #[error("Entity '{entity}', relation '{relation}': unknown relation type '{got}'")]
    UnknownRelationType {
        entity: String,
        relation: String,
        got: String,
    },

    #[error("Entity '{entity}', relation '{relation}': missing target entity")]
    MissingRelationTarget { entity: String, relation: String },

    #[error("Entity '{entity}', relation '{relation}': target entity '{target}' is not defined")]
    UnknownRelationTarget {
        entity: String,
        relation: String,
        target: String,
    },

    #[error(
        "Entity '{entity}', relation '{relation}': key '{key}' does not name an \
         id/foreignId attribute on '{on_entity}'"
    )]
    BadRelationKey {
        entity: String,
        relation: String,
        key: String,
        on_entity: String,
    },

    #[error("Entity '{entity}', relation '{relation}': midKeys must have exactly two elements, got {got}")]
    BadMidKeys {
        entity: String,
        relation: String,
        got: usize,
    },

    #[error("Entity '{entity}', index '{index}': column '{column}' is not defined")]
    UnknownIndexColumn {
        entity: String,
        index: String,
        column: String,
    },

    #[error("Entity '{entity}', index '{index}': unknown index type '{got}'")]
    UnknownIndexKind {
        entity: String,
        index: String,
        got: String,
    },

    #[error("Entity '{entity}', field '{field}': composite group is missing '{missing}'")]
    IncompleteComposite {
        entity: String,
        field: String,
        missing: String,
    },
}

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Index flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Index,
    Unique,
    Fulltext,
}

/// A lowered index definition.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDef {
    pub name: String,
    pub columns: Vec<String>,
    pub kind: IndexKind,
}

/// Default collection ordering for an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionOrder {
    pub order_by: String,
    pub direction: Direction,
}

/// One entity's immutable, validated schema.
#[derive(Debug, Clone)]
pub struct EntitySchema {
    pub name: String,
    attributes: Vec<AttributeDef>,
    by_name: HashMap<String, usize>,
    pub relations: std::collections::BTreeMap<String, Relation>,
    pub indexes: Vec<IndexDef>,
    pub collection: Option<CollectionOrder>,
}

impl EntitySchema {
    pub(crate) fn new(
        name: String,
        attributes: Vec<AttributeDef>,
        relations: std::collections::BTreeMap<String, Relation>,
        indexes: Vec<IndexDef>,
        collection: Option<CollectionOrder>,
    ) -> Self {
        let by_name = attributes
            .iter()
            .enumerate()
            .map(|(i, a)| (a.name.clone(), i))
            .collect();
        Self {
            name,
            attributes,
            by_name,
            relations,
            indexes,
            collection,
        }
    }

    /// Look up an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&AttributeDef> {
        self.by_name.get(name).map(|&i| &self.attributes[i])
    }

    /// Attributes in document order.
    pub fn attributes(&self) -> impl Iterator<Item = &AttributeDef> {
        self.attributes.iter()
    }

    /// Look up a relation by name.
    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.get(name)
    }
}
