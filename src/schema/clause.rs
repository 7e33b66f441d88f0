//! Where-clause templates.
//!
//! Override tables in the document express clauses as a small JSON
//! object language: keys are column references (or expressions) with an
//! operator suffix, values are literals or the `{value}` placeholder.
//!
//! ```json
//! {"teamsPositionMiddle.role*": "{value}"}
//! {"OR": [{"emailAddresses.optOut": false}, {"emailAddresses.optOut": null}]}
//! {"id!=s": {"from": "TeamUser", "select": "userId", "whereClause": {...}}}
//! ```
//!
//! Lowering happens once at load time; the predicate translator
//! instantiates templates with runtime values. Placeholders never survive
//! as strings past this point.

use once_cell::sync::Lazy;
use serde_json::Value;
use thiserror::Error;

use crate::plan::expr::{Expr, Literal};
use crate::plan::parse::{parse_expr, ParseError};

/// Errors from clause lowering. Surfaced as schema errors at load time.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClauseError {
    #[error("Where clause must be an object or an array of objects, got: {got}")]
    NotAnObject { got: String },

    #[error("Subquery clause '{key}' must carry 'from' and 'select'")]
    IncompleteSubquery { key: String },

    #[error("Unsupported literal in where clause: {got}")]
    UnsupportedLiteral { got: String },

    #[error(transparent)]
    Expr(#[from] ParseError),
}

/// Comparison slot in a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    NotLike,
}

/// Value slot in a template.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateValue {
    /// The document's `{value}`: filled from the request at translate time.
    Placeholder,
    Const(Literal),
    ConstList(Vec<Literal>),
}

/// A lowered where-clause template.
#[derive(Debug, Clone, PartialEq)]
pub enum WhereTemplate {
    And(Vec<WhereTemplate>),
    Or(Vec<WhereTemplate>),
    Cmp {
        lhs: Expr,
        op: TemplateOp,
        value: TemplateValue,
    },
    IsNull {
        lhs: Expr,
        negated: bool,
    },
    /// Correlated subquery membership: the `id!=s` / `id=s` pattern.
    InSub {
        lhs: Expr,
        negated: bool,
        from: String,
        select: String,
        clause: Option<Box<WhereTemplate>>,
    },
}

/// Operator suffixes on clause keys, longest first so `!=s` wins over `!=`.
static KEY_SUFFIXES: Lazy<Vec<(&'static str, KeyOp)>> = Lazy::new(|| {
    vec![
        ("!=s", KeyOp::NotInSub),
        ("=s", KeyOp::InSub),
        ("!=", KeyOp::Cmp(TemplateOp::Ne)),
        (">=", KeyOp::Cmp(TemplateOp::Gte)),
        ("<=", KeyOp::Cmp(TemplateOp::Lte)),
        ("!*", KeyOp::Cmp(TemplateOp::NotLike)),
        (">", KeyOp::Cmp(TemplateOp::Gt)),
        ("<", KeyOp::Cmp(TemplateOp::Lt)),
        ("*", KeyOp::Cmp(TemplateOp::Like)),
        ("=", KeyOp::Cmp(TemplateOp::Eq)),
    ]
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyOp {
    Cmp(TemplateOp),
    InSub,
    NotInSub,
}

/// Lower a raw `whereClause` JSON value into a template.
pub fn lower_clause(raw: &Value) -> Result<WhereTemplate, ClauseError> {
    match raw {
        Value::Object(map) => {
            let mut parts = Vec::with_capacity(map.len());
            for (key, value) in map {
                parts.push(lower_entry(key, value)?);
            }
            Ok(collapse_and(parts))
        }
        // An array of clause objects is an implicit AND.
        Value::Array(items) => {
            let mut parts = Vec::with_capacity(items.len());
            for item in items {
                parts.push(lower_clause(item)?);
            }
            Ok(collapse_and(parts))
        }
        other => Err(ClauseError::NotAnObject {
            got: other.to_string(),
        }),
    }
}

fn collapse_and(mut parts: Vec<WhereTemplate>) -> WhereTemplate {
    if parts.len() == 1 {
        parts.remove(0)
    } else {
        WhereTemplate::And(parts)
    }
}

fn lower_entry(key: &str, value: &Value) -> Result<WhereTemplate, ClauseError> {
    match key {
        "AND" => {
            let inner = lower_group(value)?;
            Ok(collapse_and(inner))
        }
        "OR" => {
            let mut inner = lower_group(value)?;
            if inner.len() == 1 {
                Ok(inner.remove(0))
            } else {
                Ok(WhereTemplate::Or(inner))
            }
        }
        _ => {
            let (stem, op) = split_key(key);
            let lhs = lower_lhs(stem)?;
            match op {
                KeyOp::InSub | KeyOp::NotInSub => {
                    let sub = value.as_object().ok_or_else(|| {
                        ClauseError::IncompleteSubquery { key: key.into() }
                    })?;
                    let from = sub
                        .get("from")
                        .and_then(Value::as_str)
                        .ok_or_else(|| ClauseError::IncompleteSubquery { key: key.into() })?;
                    let select = sub
                        .get("select")
                        .and_then(Value::as_str)
                        .ok_or_else(|| ClauseError::IncompleteSubquery { key: key.into() })?;
                    let clause = match sub.get("whereClause") {
                        Some(c) => Some(Box::new(lower_clause(c)?)),
                        None => None,
                    };
                    Ok(WhereTemplate::InSub {
                        lhs,
                        negated: op == KeyOp::NotInSub,
                        from: from.into(),
                        select: select.into(),
                        clause,
                    })
                }
                KeyOp::Cmp(cmp_op) => match value {
                    // NULL comparisons become IS [NOT] NULL.
                    Value::Null => Ok(WhereTemplate::IsNull {
                        lhs,
                        negated: cmp_op == TemplateOp::Ne,
                    }),
                    _ => Ok(WhereTemplate::Cmp {
                        lhs,
                        op: cmp_op,
                        value: lower_value(value)?,
                    }),
                },
            }
        }
    }
}

fn lower_group(value: &Value) -> Result<Vec<WhereTemplate>, ClauseError> {
    match value {
        Value::Array(items) => items.iter().map(lower_clause).collect(),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| lower_entry(k, v))
            .collect(),
        other => Err(ClauseError::NotAnObject {
            got: other.to_string(),
        }),
    }
}

/// Strip the operator suffix from a clause key.
fn split_key(key: &str) -> (&str, KeyOp) {
    for (suffix, op) in KEY_SUFFIXES.iter() {
        if let Some(stem) = key.strip_suffix(suffix) {
            // An expression stem may legitimately end with ')'; a bare '='
            // key with empty stem is nonsense either way, skip it.
            if !stem.is_empty() {
                return (stem, *op);
            }
        }
    }
    (key, KeyOp::Cmp(TemplateOp::Eq))
}

/// A key stem is either a column reference or a full expression.
fn lower_lhs(stem: &str) -> Result<Expr, ClauseError> {
    Ok(parse_expr(stem)?)
}

fn lower_value(value: &Value) -> Result<TemplateValue, ClauseError> {
    match value {
        Value::String(s) if s == "{value}" => Ok(TemplateValue::Placeholder),
        Value::Array(items) => {
            let mut list = Vec::with_capacity(items.len());
            for item in items {
                list.push(lower_literal(item)?);
            }
            Ok(TemplateValue::ConstList(list))
        }
        other => Ok(TemplateValue::Const(lower_literal(other)?)),
    }
}

/// Convert a JSON scalar into a plan literal.
pub fn lower_literal(value: &Value) -> Result<Literal, ClauseError> {
    match value {
        Value::Null => Ok(Literal::Null),
        Value::Bool(b) => Ok(Literal::Bool(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Literal::Int(i))
            } else if let Some(f) = n.as_f64() {
                Ok(Literal::Float(f))
            } else {
                Err(ClauseError::UnsupportedLiteral {
                    got: value.to_string(),
                })
            }
        }
        Value::String(s) => Ok(Literal::String(s.clone())),
        other => Err(ClauseError::UnsupportedLiteral {
            got: other.to_string(),
        }),
    }
}
