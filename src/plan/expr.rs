//! Expression AST - the backend-neutral core of the compiled plan.
//!
//! This module provides a strongly-typed AST for compiled expressions
//! with exhaustive pattern matching enforced by the compiler. The AST is
//! deliberately dialect-free: a separate rendering stage (out of scope
//! for this crate) turns plans into SQL text.

use super::query::SubPlan;

// =============================================================================
// Expression AST
// =============================================================================

/// A compiled expression.
///
/// There is no raw-SQL escape hatch: every expression a plan can carry is
/// representable here, which keeps plans portable and injection-free.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference: optional_alias.column
    Column {
        alias: Option<String>,
        column: String,
    },

    /// Literal values
    Literal(Literal),

    /// Scalar function call: func(args...), arity checked at parse time
    Func { func: ScalarFn, args: Vec<Expr> },

    /// Comparison: left op right
    Comparison {
        left: Box<Expr>,
        op: Comparison,
        right: Box<Expr>,
    },

    /// Conjunction of one or more predicates
    And(Vec<Expr>),

    /// Disjunction of one or more predicates
    Or(Vec<Expr>),

    /// Negation
    Not(Box<Expr>),

    /// IS NULL / IS NOT NULL
    IsNull { expr: Box<Expr>, negated: bool },

    /// LIKE / NOT LIKE
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        negated: bool,
    },

    /// IN / NOT IN against a literal list
    In {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },

    /// IN / NOT IN against a correlated subquery.
    ///
    /// The negated form is the anti-join shape the predicate translator
    /// emits for "no match" semantics on multi-valued attributes.
    InSubquery {
        expr: Box<Expr>,
        subquery: Box<SubPlan>,
        negated: bool,
    },
}

/// Literal values.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Null,
}

/// Comparison operators usable inside an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Gt,
    Lte,
    Gte,
}

// =============================================================================
// Scalar Functions
// =============================================================================

/// The closed set of scalar functions a plan may call.
///
/// Every variant has a fixed arity except `Concat`, which is variadic.
/// Unknown function names are rejected by the expression parser, so a
/// rendering backend only ever has to support this list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarFn {
    Concat,
    IfNull,
    NullIf,
    Mul,
    Div,
    TimestampDiffSecond,
    Trim,
    Lower,
    Upper,
}

/// Arity of a scalar function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Fixed(usize),
    /// Variadic with a minimum argument count.
    Variadic(usize),
}

impl ScalarFn {
    /// The name the schema document uses for this function.
    pub fn name(&self) -> &'static str {
        match self {
            ScalarFn::Concat => "CONCAT",
            ScalarFn::IfNull => "IFNULL",
            ScalarFn::NullIf => "NULLIF",
            ScalarFn::Mul => "MUL",
            ScalarFn::Div => "DIV",
            ScalarFn::TimestampDiffSecond => "TIMESTAMPDIFF_SECOND",
            ScalarFn::Trim => "TRIM",
            ScalarFn::Lower => "LOWER",
            ScalarFn::Upper => "UPPER",
        }
    }

    /// Look up a function by its document name.
    pub fn from_name(name: &str) -> Option<ScalarFn> {
        match name {
            "CONCAT" => Some(ScalarFn::Concat),
            "IFNULL" => Some(ScalarFn::IfNull),
            "NULLIF" => Some(ScalarFn::NullIf),
            "MUL" => Some(ScalarFn::Mul),
            "DIV" => Some(ScalarFn::Div),
            "TIMESTAMPDIFF_SECOND" => Some(ScalarFn::TimestampDiffSecond),
            "TRIM" => Some(ScalarFn::Trim),
            "LOWER" => Some(ScalarFn::Lower),
            "UPPER" => Some(ScalarFn::Upper),
            _ => None,
        }
    }

    pub fn arity(&self) -> Arity {
        match self {
            ScalarFn::Concat => Arity::Variadic(1),
            ScalarFn::IfNull
            | ScalarFn::NullIf
            | ScalarFn::Mul
            | ScalarFn::Div
            | ScalarFn::TimestampDiffSecond => Arity::Fixed(2),
            ScalarFn::Trim | ScalarFn::Lower | ScalarFn::Upper => Arity::Fixed(1),
        }
    }

    /// Whether `count` arguments satisfy this function's arity.
    pub fn accepts(&self, count: usize) -> bool {
        match self.arity() {
            Arity::Fixed(n) => count == n,
            Arity::Variadic(min) => count >= min,
        }
    }
}

// =============================================================================
// Expression Constructors
// =============================================================================

/// Create an unqualified column reference.
pub fn col(name: &str) -> Expr {
    Expr::Column {
        alias: None,
        column: name.into(),
    }
}

/// Create a qualified column reference (alias.column).
pub fn alias_col(alias: &str, column: &str) -> Expr {
    Expr::Column {
        alias: Some(alias.into()),
        column: column.into(),
    }
}

/// Create an integer literal.
pub fn lit_int(n: i64) -> Expr {
    Expr::Literal(Literal::Int(n))
}

/// Create a float literal.
pub fn lit_float(f: f64) -> Expr {
    Expr::Literal(Literal::Float(f))
}

/// Create a string literal.
pub fn lit_str(s: &str) -> Expr {
    Expr::Literal(Literal::String(s.into()))
}

/// Create a boolean literal.
pub fn lit_bool(b: bool) -> Expr {
    Expr::Literal(Literal::Bool(b))
}

/// Create a NULL literal.
pub fn lit_null() -> Expr {
    Expr::Literal(Literal::Null)
}

fn cmp(left: Expr, op: Comparison, right: Expr) -> Expr {
    Expr::Comparison {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

/// left = right
pub fn eq(left: Expr, right: Expr) -> Expr {
    cmp(left, Comparison::Eq, right)
}

/// left <> right
pub fn ne(left: Expr, right: Expr) -> Expr {
    cmp(left, Comparison::Ne, right)
}

/// left > right
pub fn gt(left: Expr, right: Expr) -> Expr {
    cmp(left, Comparison::Gt, right)
}

/// left >= right
pub fn gte(left: Expr, right: Expr) -> Expr {
    cmp(left, Comparison::Gte, right)
}

/// left < right
pub fn lt(left: Expr, right: Expr) -> Expr {
    cmp(left, Comparison::Lt, right)
}

/// left <= right
pub fn lte(left: Expr, right: Expr) -> Expr {
    cmp(left, Comparison::Lte, right)
}

/// Conjunction. Single-element input collapses to the element itself.
pub fn and(mut parts: Vec<Expr>) -> Expr {
    if parts.len() == 1 {
        parts.remove(0)
    } else {
        Expr::And(parts)
    }
}

/// Disjunction. Single-element input collapses to the element itself.
pub fn or(mut parts: Vec<Expr>) -> Expr {
    if parts.len() == 1 {
        parts.remove(0)
    } else {
        Expr::Or(parts)
    }
}

/// NOT expr
pub fn not(expr: Expr) -> Expr {
    Expr::Not(Box::new(expr))
}

/// expr IS NULL
pub fn is_null(expr: Expr) -> Expr {
    Expr::IsNull {
        expr: Box::new(expr),
        negated: false,
    }
}

/// expr IS NOT NULL
pub fn is_not_null(expr: Expr) -> Expr {
    Expr::IsNull {
        expr: Box::new(expr),
        negated: true,
    }
}

/// expr LIKE pattern
pub fn like(expr: Expr, pattern: Expr) -> Expr {
    Expr::Like {
        expr: Box::new(expr),
        pattern: Box::new(pattern),
        negated: false,
    }
}

/// expr NOT LIKE pattern
pub fn not_like(expr: Expr, pattern: Expr) -> Expr {
    Expr::Like {
        expr: Box::new(expr),
        pattern: Box::new(pattern),
        negated: true,
    }
}

/// expr IN (list...)
pub fn in_list(expr: Expr, list: Vec<Expr>) -> Expr {
    Expr::In {
        expr: Box::new(expr),
        list,
        negated: false,
    }
}

/// expr NOT IN (list...)
pub fn not_in_list(expr: Expr, list: Vec<Expr>) -> Expr {
    Expr::In {
        expr: Box::new(expr),
        list,
        negated: true,
    }
}

/// expr IN (subquery)
pub fn in_subquery(expr: Expr, subquery: SubPlan) -> Expr {
    Expr::InSubquery {
        expr: Box::new(expr),
        subquery: Box::new(subquery),
        negated: false,
    }
}

/// expr NOT IN (subquery) - the anti-join shape.
pub fn not_in_subquery(expr: Expr, subquery: SubPlan) -> Expr {
    Expr::InSubquery {
        expr: Box::new(expr),
        subquery: Box::new(subquery),
        negated: true,
    }
}

// =============================================================================
// Scalar Function Constructors
// =============================================================================

/// CONCAT(args...)
pub fn concat(args: Vec<Expr>) -> Expr {
    Expr::Func {
        func: ScalarFn::Concat,
        args,
    }
}

/// IFNULL(expr, fallback)
pub fn ifnull(expr: Expr, fallback: Expr) -> Expr {
    Expr::Func {
        func: ScalarFn::IfNull,
        args: vec![expr, fallback],
    }
}

/// NULLIF(expr, sentinel)
pub fn nullif(expr: Expr, sentinel: Expr) -> Expr {
    Expr::Func {
        func: ScalarFn::NullIf,
        args: vec![expr, sentinel],
    }
}

/// MUL(left, right)
pub fn mul(left: Expr, right: Expr) -> Expr {
    Expr::Func {
        func: ScalarFn::Mul,
        args: vec![left, right],
    }
}

/// DIV(left, right)
pub fn div(left: Expr, right: Expr) -> Expr {
    Expr::Func {
        func: ScalarFn::Div,
        args: vec![left, right],
    }
}

/// TIMESTAMPDIFF_SECOND(start, end)
pub fn timestamp_diff_second(start: Expr, end: Expr) -> Expr {
    Expr::Func {
        func: ScalarFn::TimestampDiffSecond,
        args: vec![start, end],
    }
}

/// TRIM(expr)
pub fn trim(expr: Expr) -> Expr {
    Expr::Func {
        func: ScalarFn::Trim,
        args: vec![expr],
    }
}

/// LOWER(expr)
pub fn lower(expr: Expr) -> Expr {
    Expr::Func {
        func: ScalarFn::Lower,
        args: vec![expr],
    }
}
