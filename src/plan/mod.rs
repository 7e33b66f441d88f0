//! Backend-neutral plan AST and the expression parser that feeds it.

pub mod expr;
pub mod parse;
pub mod query;

pub use expr::{Comparison, Expr, Literal, ScalarFn};
pub use parse::{parse_expr, ParseError, ParseResult};
pub use query::{Direction, Join, JoinKind, OrderTerm, QueryPlan, SelectTerm, SubPlan};
