//! # Quarry
//!
//! A metadata-driven query compiler for entity schemas.
//!
//! ## Architecture
//!
//! Quarry turns declarative entity definitions plus a logical request
//! into a backend-neutral query plan:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │              Schema Document (JSON entity defs)          │
//! │  (attributes, relations, overrides, indexes, ordering)   │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [schema::registry]
//! ┌─────────────────────────────────────────────────────────┐
//! │          SchemaRegistry (validated, lowered)             │
//! └─────────────────────────────────────────────────────────┘
//!                          │        QueryRequest
//!                          ▼ [compile]  │
//! ┌─────────────────────────────────────▼───────────────────┐
//! │   Resolver → RelationPlanner → PredicateTranslator       │
//! │             → OrderCompiler → PlanAssembler              │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │            QueryPlan (typed, backend-neutral)            │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Tree-shaped entities additionally maintain a closure table through
//! [`hierarchy::ClosureStore`].

pub mod compile;
pub mod hierarchy;
pub mod plan;
pub mod schema;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::compile::{
        CompileError, PlanAssembler, QueryRequest, RelationPlanner, Resolver, WhereItem,
    };
    pub use crate::hierarchy::{ClosureError, ClosureStore};
    pub use crate::plan::expr::{
        // Constructors
        alias_col,
        and,
        col,
        eq,
        in_list,
        is_null,
        like,
        lit_bool,
        lit_float,
        lit_int,
        lit_null,
        lit_str,
        ne,
        or,
        // Types
        Comparison,
        Expr,
        Literal,
        ScalarFn,
    };
    pub use crate::plan::query::{
        Direction, Join, JoinKind, OrderTerm, QueryPlan, SelectTerm, SubPlan,
    };
    pub use crate::schema::{Operator, SchemaDocument, SchemaError, SchemaRegistry};
}

// Also export at crate root for convenience
pub use compile::{CompileError, PlanAssembler, QueryRequest, WhereItem};
pub use plan::query::{Direction, QueryPlan};
pub use schema::{Operator, SchemaRegistry};
