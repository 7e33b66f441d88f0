//! Query compilation: registry in, backend-neutral plan out.
//!
//! Compilation is a pure function of (schema snapshot, request). Every
//! step is in-memory and per-request; nothing here mutates shared state,
//! so compilations run request-parallel without locking.
//!
//! ```text
//!   SchemaRegistry ──> RelationPlanner ──┐
//!                 └──> Resolver ─────────┤
//!                        │               ▼
//!                        ├──> PredicateTranslator
//!                        ├──> OrderCompiler
//!                        ▼
//!                  PlanAssembler ──> QueryPlan
//! ```

pub mod alias;
pub mod assemble;
pub mod attribute;
pub mod order;
pub mod predicate;
pub mod relation;

use thiserror::Error;

use crate::schema::Operator;

pub use alias::{AliasContext, JoinSet};
pub use assemble::{PlanAssembler, QueryRequest, WhereItem};
pub use attribute::{OpContext, ResolvedAttribute, ResolvedKind, Resolver};
pub use order::OrderCompiler;
pub use predicate::{Predicate, PredicateTranslator};
pub use relation::{JoinSpec, RelationPlanner};

/// Per-query compilation errors.
///
/// These are returned to the caller as typed failures, never degraded to
/// a NULL or an empty result: "this field does not support that filter"
/// must stay distinguishable from "the filter matched nothing".
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Unknown entity '{entity}'")]
    UnknownEntity { entity: String },

    #[error("Unknown attribute '{attribute}' on entity '{entity}'")]
    UnknownAttribute { entity: String, attribute: String },

    #[error("Unknown relation '{relation}' on entity '{entity}'")]
    UnknownRelation { entity: String, relation: String },

    #[error("Attribute '{entity}.{attribute}' does not support operator '{operator}'")]
    UnsupportedOperator {
        entity: String,
        attribute: String,
        operator: &'static str,
    },

    #[error("Join alias '{alias}' is already bound to a different join")]
    AmbiguousJoinAlias { alias: String },

    #[error("Attribute '{attribute}' on '{entity}' is not selectable")]
    NotSelectable { entity: String, attribute: String },

    #[error("'{target}' is not a registered parent type for '{entity}.{relation}'")]
    InvalidParentType {
        entity: String,
        relation: String,
        target: String,
    },

    #[error(
        "Resolving '{attribute}' on '{entity}' requires a caller-supplied join alias"
    )]
    MissingAlias { entity: String, attribute: String },

    #[error("Unsupported filter value for '{entity}.{attribute}': {got}")]
    BadValue {
        entity: String,
        attribute: String,
        got: String,
    },
}

impl CompileError {
    pub(crate) fn unsupported(entity: &str, attribute: &str, op: Operator) -> Self {
        CompileError::UnsupportedOperator {
            entity: entity.to_string(),
            attribute: attribute.to_string(),
            operator: op.keyword(),
        }
    }
}

/// Result type for compilation.
pub type CompileResult<T> = Result<T, CompileError>;
