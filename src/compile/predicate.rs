//! Predicate translation.
//!
//! Turns one `(attribute, operator, value)` filter item into a boolean
//! expression plus the joins it needs. Three paths exist:
//!
//!   * plain columns get a generic comparison,
//!   * overridden attributes get their clause template instantiated with
//!     the runtime value,
//!   * multi-valued links split on the operator: "any match" operators
//!     join the link and mark the plan DISTINCT, "no match" operators
//!     compile to a correlated NOT IN subquery so unrelated rows survive.

use serde_json::Value;

use crate::plan::expr::{
    alias_col, and, col, eq, in_list, in_subquery, is_not_null, is_null, like, lower, ne,
    not_in_list, not_in_subquery, not_like, or, Comparison, Expr, Literal, ScalarFn,
};
use crate::plan::query::{Join, SubPlan};
use crate::schema::{
    clause, Operator, Relation, SchemaRegistry, TemplateOp, TemplateValue, WhereTemplate,
};

use super::alias::{substitute_alias, AliasContext};
use super::attribute::{OpContext, ResolvedKind, Resolver};
use super::relation::RelationPlanner;
use super::{CompileError, CompileResult};

/// A translated filter item.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub expr: Expr,
    pub joins: Vec<Join>,
    pub distinct: bool,
}

/// Translates filter items against the registry.
pub struct PredicateTranslator<'a> {
    registry: &'a SchemaRegistry,
    resolver: Resolver<'a>,
    planner: RelationPlanner<'a>,
}

impl<'a> PredicateTranslator<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self {
            registry,
            resolver: Resolver::new(registry),
            planner: RelationPlanner::new(registry),
        }
    }

    pub fn translate(
        &self,
        entity: &str,
        attribute: &str,
        op: Operator,
        value: &Value,
        ctx: &AliasContext,
    ) -> CompileResult<Predicate> {
        let resolved = self
            .resolver
            .resolve(entity, attribute, OpContext::Where(op), ctx)?;

        match resolved.kind.clone() {
            ResolvedKind::Overridden(overridden) => {
                let mut expr = self.instantiate(entity, attribute, &overridden.clause, value)?;
                if let Some(alias) = ctx.supplied() {
                    expr = substitute_alias(expr, alias);
                }
                Ok(Predicate {
                    expr,
                    joins: resolved.joins,
                    distinct: resolved.distinct,
                })
            }
            ResolvedKind::LinkMultiple { relation } => {
                self.link_multiple(entity, attribute, &relation, op, value, ctx)
            }
            ResolvedKind::Column => {
                let expr = self.generic(entity, attribute, resolved.expr, op, value)?;
                Ok(Predicate {
                    expr,
                    joins: resolved.joins,
                    distinct: resolved.distinct,
                })
            }
        }
    }

    // =========================================================================
    // Generic comparisons
    // =========================================================================

    fn generic(
        &self,
        entity: &str,
        attribute: &str,
        lhs: Expr,
        op: Operator,
        value: &Value,
    ) -> CompileResult<Expr> {
        let literal = |v: &Value| self.runtime_literal(entity, attribute, v);

        Ok(match op {
            Operator::Eq => match value {
                Value::Null => is_null(lhs),
                Value::Array(items) => in_list(lhs, self.runtime_list(entity, attribute, items)?),
                v => eq(lhs, Expr::Literal(literal(v)?)),
            },
            Operator::Ne => match value {
                Value::Null => is_not_null(lhs),
                Value::Array(items) => {
                    not_in_list(lhs, self.runtime_list(entity, attribute, items)?)
                }
                v => ne(lhs, Expr::Literal(literal(v)?)),
            },
            Operator::Gt => compare(lhs, Comparison::Gt, literal(value)?),
            Operator::Gte => compare(lhs, Comparison::Gte, literal(value)?),
            Operator::Lt => compare(lhs, Comparison::Lt, literal(value)?),
            Operator::Lte => compare(lhs, Comparison::Lte, literal(value)?),
            Operator::Like => like(lhs, self.pattern(entity, attribute, value)?),
            Operator::NotLike => not_like(lhs, self.pattern(entity, attribute, value)?),
            Operator::In => {
                in_list(lhs, self.runtime_list_any(entity, attribute, value)?)
            }
            Operator::NotIn => {
                not_in_list(lhs, self.runtime_list_any(entity, attribute, value)?)
            }
            Operator::IsNull => is_null(lhs),
            Operator::IsNotNull => is_not_null(lhs),
            Operator::IsTrue => eq(lhs, Expr::Literal(Literal::Bool(true))),
            // FALSE is asymmetric: an unset flag also counts as false.
            Operator::IsFalse => or(vec![
                eq(lhs.clone(), Expr::Literal(Literal::Bool(false))),
                is_null(lhs),
            ]),
        })
    }

    // =========================================================================
    // Override templates
    // =========================================================================

    fn instantiate(
        &self,
        entity: &str,
        attribute: &str,
        template: &WhereTemplate,
        value: &Value,
    ) -> CompileResult<Expr> {
        Ok(match template {
            WhereTemplate::And(items) => and(self.instantiate_all(entity, attribute, items, value)?),
            WhereTemplate::Or(items) => or(self.instantiate_all(entity, attribute, items, value)?),
            WhereTemplate::IsNull { lhs, negated } => {
                if *negated {
                    is_not_null(lhs.clone())
                } else {
                    is_null(lhs.clone())
                }
            }
            WhereTemplate::Cmp { lhs, op, value: slot } => {
                self.instantiate_cmp(entity, attribute, lhs, *op, slot, value)?
            }
            WhereTemplate::InSub {
                lhs,
                negated,
                from,
                select,
                clause,
            } => {
                let mut sub = SubPlan::new(from, select);
                if let Some(inner) = clause {
                    sub = sub.with_where(self.instantiate(entity, attribute, inner, value)?);
                }
                if *negated {
                    not_in_subquery(lhs.clone(), sub)
                } else {
                    in_subquery(lhs.clone(), sub)
                }
            }
        })
    }

    fn instantiate_all(
        &self,
        entity: &str,
        attribute: &str,
        items: &[WhereTemplate],
        value: &Value,
    ) -> CompileResult<Vec<Expr>> {
        items
            .iter()
            .map(|item| self.instantiate(entity, attribute, item, value))
            .collect()
    }

    fn instantiate_cmp(
        &self,
        entity: &str,
        attribute: &str,
        lhs: &Expr,
        op: TemplateOp,
        slot: &TemplateValue,
        value: &Value,
    ) -> CompileResult<Expr> {
        let rhs = match slot {
            TemplateValue::Placeholder => match value {
                // An equality template fed a list distributes to IN.
                Value::Array(items) if op == TemplateOp::Eq => {
                    return Ok(in_list(
                        lhs.clone(),
                        self.runtime_list(entity, attribute, items)?,
                    ));
                }
                Value::Array(items) if op == TemplateOp::Ne => {
                    return Ok(not_in_list(
                        lhs.clone(),
                        self.runtime_list(entity, attribute, items)?,
                    ));
                }
                v => Expr::Literal(self.runtime_literal(entity, attribute, v)?),
            },
            TemplateValue::Const(literal) => Expr::Literal(literal.clone()),
            TemplateValue::ConstList(items) => {
                let list = items.iter().cloned().map(Expr::Literal).collect();
                return Ok(match op {
                    TemplateOp::Ne | TemplateOp::NotLike => not_in_list(lhs.clone(), list),
                    _ => in_list(lhs.clone(), list),
                });
            }
        };

        Ok(match op {
            TemplateOp::Eq => eq(lhs.clone(), rhs),
            TemplateOp::Ne => ne(lhs.clone(), rhs),
            TemplateOp::Gt => Expr::Comparison {
                left: Box::new(lhs.clone()),
                op: Comparison::Gt,
                right: Box::new(rhs),
            },
            TemplateOp::Gte => Expr::Comparison {
                left: Box::new(lhs.clone()),
                op: Comparison::Gte,
                right: Box::new(rhs),
            },
            TemplateOp::Lt => Expr::Comparison {
                left: Box::new(lhs.clone()),
                op: Comparison::Lt,
                right: Box::new(rhs),
            },
            TemplateOp::Lte => Expr::Comparison {
                left: Box::new(lhs.clone()),
                op: Comparison::Lte,
                right: Box::new(rhs),
            },
            TemplateOp::Like => like(lhs.clone(), normalize_pattern(lhs, rhs)),
            TemplateOp::NotLike => not_like(lhs.clone(), normalize_pattern(lhs, rhs)),
        })
    }

    // =========================================================================
    // Multi-valued links
    // =========================================================================

    /// Filters on an id-list attribute. "Any match" operators join the
    /// link and deduplicate; "no match" operators must not use a join,
    /// because a row related to both a listed and an unlisted id would
    /// wrongly survive. Those compile to `base.id NOT IN (subquery)`.
    fn link_multiple(
        &self,
        entity: &str,
        attribute: &str,
        relation: &str,
        op: Operator,
        value: &Value,
        ctx: &AliasContext,
    ) -> CompileResult<Predicate> {
        let schema = self.registry.get(entity).map_err(|_| {
            CompileError::UnknownEntity {
                entity: entity.to_string(),
            }
        })?;
        let rel = schema
            .relation(relation)
            .ok_or_else(|| CompileError::UnknownRelation {
                entity: entity.to_string(),
                relation: relation.to_string(),
            })?
            .clone();
        let base_id = alias_col(ctx.base(), "id");

        match op {
            Operator::Eq | Operator::In | Operator::IsNotNull => {
                let spec = self.planner.plan(entity, relation, ctx)?;
                let (cmp_alias, cmp_column, joins) = match &rel {
                    Relation::ManyMany { mid_keys, .. } => {
                        // The junction alone carries the far ids; the
                        // target join is not needed for an id filter.
                        let alias = spec
                            .junction_alias
                            .clone()
                            .unwrap_or_else(|| spec.target_alias.clone());
                        (alias, mid_keys[1].clone(), vec![spec.joins[0].clone()])
                    }
                    _ => (spec.target_alias.clone(), "id".to_string(), spec.joins),
                };
                let lhs = alias_col(&cmp_alias, &cmp_column);
                let expr = match op {
                    Operator::IsNotNull => is_not_null(lhs),
                    _ => match value {
                        Value::Array(items) => {
                            in_list(lhs, self.runtime_list(entity, attribute, items)?)
                        }
                        v => eq(
                            lhs,
                            Expr::Literal(self.runtime_literal(entity, attribute, v)?),
                        ),
                    },
                };
                Ok(Predicate {
                    expr,
                    joins,
                    distinct: true,
                })
            }
            Operator::Ne | Operator::NotIn | Operator::IsNull => {
                let sub = self.link_subplan(entity, attribute, &rel, op, value)?;
                Ok(Predicate {
                    expr: not_in_subquery(base_id, sub),
                    joins: Vec::new(),
                    distinct: false,
                })
            }
            _ => Err(CompileError::unsupported(entity, attribute, op)),
        }
    }

    /// The correlated subquery selecting base ids that DO have a matching
    /// link. Junction discriminator conditions stay in the subquery so a
    /// `cc` filter never sees `to` rows.
    fn link_subplan(
        &self,
        entity: &str,
        attribute: &str,
        rel: &Relation,
        op: Operator,
        value: &Value,
    ) -> CompileResult<SubPlan> {
        let (from, select, far_column, conditions) = match rel {
            Relation::ManyMany {
                junction,
                mid_keys,
                conditions,
                ..
            } => (
                junction.clone(),
                mid_keys[0].clone(),
                mid_keys[1].clone(),
                conditions.clone(),
            ),
            Relation::HasMany { entity: target, foreign_key } => (
                target.clone(),
                foreign_key.clone(),
                "id".to_string(),
                Default::default(),
            ),
            _ => return Err(CompileError::unsupported(entity, attribute, op)),
        };

        let mut clauses: Vec<Expr> = conditions
            .iter()
            .map(|(column, literal)| eq(col(column), Expr::Literal(literal.clone())))
            .collect();
        if op != Operator::IsNull {
            let lhs = col(&far_column);
            clauses.push(match value {
                Value::Array(items) => {
                    in_list(lhs, self.runtime_list(entity, attribute, items)?)
                }
                v => eq(
                    lhs,
                    Expr::Literal(self.runtime_literal(entity, attribute, v)?),
                ),
            });
        }

        let mut sub = SubPlan::new(&from, &select);
        if !clauses.is_empty() {
            sub = sub.with_where(and(clauses));
        }
        Ok(sub)
    }

    // =========================================================================
    // Runtime values
    // =========================================================================

    fn runtime_literal(
        &self,
        entity: &str,
        attribute: &str,
        value: &Value,
    ) -> CompileResult<Literal> {
        clause::lower_literal(value).map_err(|_| CompileError::BadValue {
            entity: entity.to_string(),
            attribute: attribute.to_string(),
            got: value.to_string(),
        })
    }

    fn runtime_list(
        &self,
        entity: &str,
        attribute: &str,
        items: &[Value],
    ) -> CompileResult<Vec<Expr>> {
        items
            .iter()
            .map(|item| {
                self.runtime_literal(entity, attribute, item)
                    .map(Expr::Literal)
            })
            .collect()
    }

    /// IN accepts a scalar as a one-element list.
    fn runtime_list_any(
        &self,
        entity: &str,
        attribute: &str,
        value: &Value,
    ) -> CompileResult<Vec<Expr>> {
        match value {
            Value::Array(items) => self.runtime_list(entity, attribute, items),
            v => Ok(vec![Expr::Literal(self.runtime_literal(
                entity, attribute, v,
            )?)]),
        }
    }

    fn pattern(&self, entity: &str, attribute: &str, value: &Value) -> CompileResult<Expr> {
        match value {
            Value::String(s) => Ok(Expr::Literal(Literal::String(s.clone()))),
            v => Err(CompileError::BadValue {
                entity: entity.to_string(),
                attribute: attribute.to_string(),
                got: v.to_string(),
            }),
        }
    }
}

fn compare(lhs: Expr, op: Comparison, rhs: Literal) -> Expr {
    Expr::Comparison {
        left: Box::new(lhs),
        op,
        right: Box::new(Expr::Literal(rhs)),
    }
}

/// When the template compares `LOWER(column)`, fold the runtime pattern
/// through LOWER as well so matching stays case-insensitive.
fn normalize_pattern(lhs: &Expr, pattern: Expr) -> Expr {
    let lowered_lhs = matches!(
        lhs,
        Expr::Func {
            func: ScalarFn::Lower,
            ..
        }
    );
    if lowered_lhs {
        match &pattern {
            Expr::Literal(Literal::String(s)) => {
                Expr::Literal(Literal::String(s.to_lowercase()))
            }
            _ => lower(pattern),
        }
    } else {
        pattern
    }
}
