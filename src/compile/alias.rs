//! Alias management.
//!
//! Aliases are built through [`AliasContext`], never by splicing request
//! strings, so the alias-collision invariant is checkable in one place.
//! The document's `{alias}` template survives lowering as a placeholder
//! column qualifier; [`substitute_alias`] rewrites it into the
//! caller-supplied alias by walking the expression tree.

use crate::plan::expr::Expr;
use crate::plan::query::Join;
use crate::schema::AliasSpec;

use super::{CompileError, CompileResult};

/// The placeholder qualifier left behind by lowering `{alias}` templates.
pub const ALIAS_PLACEHOLDER: &str = "{alias}";

/// Alias state for one compilation call.
#[derive(Debug, Clone)]
pub struct AliasContext {
    base: String,
    /// Caller-supplied alias for `{alias}`-templated overrides, also used
    /// to disambiguate composite resolutions at the call site.
    supplied: Option<String>,
}

impl AliasContext {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.into(),
            supplied: None,
        }
    }

    pub fn with_supplied(mut self, alias: &str) -> Self {
        self.supplied = Some(alias.into());
        self
    }

    /// Alias of the base entity's rows.
    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn supplied(&self) -> Option<&str> {
        self.supplied.as_deref()
    }

    /// Resolve an override join's alias spec.
    pub fn join_alias(
        &self,
        spec: &AliasSpec,
        relation: &str,
        entity: &str,
        attribute: &str,
    ) -> CompileResult<String> {
        match spec {
            AliasSpec::Relation => Ok(relation.to_string()),
            AliasSpec::Fixed(fixed) => Ok(fixed.clone()),
            AliasSpec::Templated => {
                self.supplied
                    .clone()
                    .ok_or_else(|| CompileError::MissingAlias {
                        entity: entity.to_string(),
                        attribute: attribute.to_string(),
                    })
            }
        }
    }

    /// Junction alias for a many-many join pair.
    pub fn junction_alias(&self, target_alias: &str) -> String {
        format!("{target_alias}Middle")
    }
}

/// Rewrite `{alias}` column qualifiers to a concrete alias.
pub fn substitute_alias(expr: Expr, alias: &str) -> Expr {
    match expr {
        Expr::Column {
            alias: Some(qualifier),
            column,
        } if qualifier == ALIAS_PLACEHOLDER => Expr::Column {
            alias: Some(alias.to_string()),
            column,
        },
        Expr::Column { .. } | Expr::Literal(_) => expr,
        Expr::Func { func, args } => Expr::Func {
            func,
            args: args
                .into_iter()
                .map(|a| substitute_alias(a, alias))
                .collect(),
        },
        Expr::Comparison { left, op, right } => Expr::Comparison {
            left: Box::new(substitute_alias(*left, alias)),
            op,
            right: Box::new(substitute_alias(*right, alias)),
        },
        Expr::And(parts) => Expr::And(
            parts
                .into_iter()
                .map(|p| substitute_alias(p, alias))
                .collect(),
        ),
        Expr::Or(parts) => Expr::Or(
            parts
                .into_iter()
                .map(|p| substitute_alias(p, alias))
                .collect(),
        ),
        Expr::Not(inner) => Expr::Not(Box::new(substitute_alias(*inner, alias))),
        Expr::IsNull { expr, negated } => Expr::IsNull {
            expr: Box::new(substitute_alias(*expr, alias)),
            negated,
        },
        Expr::Like {
            expr,
            pattern,
            negated,
        } => Expr::Like {
            expr: Box::new(substitute_alias(*expr, alias)),
            pattern: Box::new(substitute_alias(*pattern, alias)),
            negated,
        },
        Expr::In {
            expr,
            list,
            negated,
        } => Expr::In {
            expr: Box::new(substitute_alias(*expr, alias)),
            list: list
                .into_iter()
                .map(|e| substitute_alias(e, alias))
                .collect(),
            negated,
        },
        Expr::InSubquery { .. } => expr,
    }
}

/// An ordered join collection deduplicated by signature.
///
/// Two joins with equal signatures collapse into one; two joins sharing
/// an alias but disagreeing on target or ON predicate are a collision.
#[derive(Debug, Clone, Default)]
pub struct JoinSet {
    joins: Vec<Join>,
}

impl JoinSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, join: Join) -> CompileResult<()> {
        for existing in &self.joins {
            if existing.signature() == join.signature() {
                return Ok(());
            }
            if existing.alias == join.alias {
                return Err(CompileError::AmbiguousJoinAlias {
                    alias: join.alias.clone(),
                });
            }
        }
        self.joins.push(join);
        Ok(())
    }

    pub fn extend(&mut self, joins: impl IntoIterator<Item = Join>) -> CompileResult<()> {
        for join in joins {
            self.push(join)?;
        }
        Ok(())
    }

    pub fn into_vec(self) -> Vec<Join> {
        self.joins
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }
}
