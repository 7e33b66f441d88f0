//! Attribute resolution.
//!
//! `resolve` maps an attribute name plus the requested operation onto a
//! physical column, a computed expression with its required joins, or a
//! per-operator override. Virtual attributes that carry an override table
//! are default-deny: an operator without an explicit entry fails with
//! `UnsupportedOperator` instead of falling back to a generic comparison.

use crate::plan::expr::{alias_col, eq, mul, Expr};
use crate::plan::query::Join;
use crate::schema::{
    AttributeDef, AttributeRole, AttributeType, DirSpec, JoinRequirement, Operator,
    SchemaRegistry, StorageKind, WhereOverride,
};

use super::alias::{substitute_alias, AliasContext, JoinSet};
use super::relation::RelationPlanner;
use super::{CompileError, CompileResult};

/// Entity holding per-currency conversion rates.
const CURRENCY_ENTITY: &str = "Currency";

/// The operation an attribute is being resolved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpContext {
    Select,
    Where(Operator),
    Order,
}

/// What a resolution produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedKind {
    /// A direct column reference or computed expression; generic
    /// predicate/order handling applies.
    Column,
    /// A per-operator override; the predicate translator instantiates its
    /// clause template.
    Overridden(WhereOverride),
    /// A multi-valued link; the predicate translator picks join+DISTINCT
    /// or an anti-join depending on the operator.
    LinkMultiple { relation: String },
}

/// A resolved attribute, ready for predicate/order/select compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAttribute {
    pub entity: String,
    pub attribute: String,
    pub expr: Expr,
    pub joins: Vec<Join>,
    pub distinct: bool,
    pub kind: ResolvedKind,
    /// Override-supplied order terms, when an order override exists.
    pub order_terms: Option<Vec<(Expr, DirSpec)>>,
}

/// Resolves attribute names against the registry.
pub struct Resolver<'a> {
    registry: &'a SchemaRegistry,
    planner: RelationPlanner<'a>,
}

impl<'a> Resolver<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self {
            registry,
            planner: RelationPlanner::new(registry),
        }
    }

    pub fn resolve(
        &self,
        entity: &str,
        attribute: &str,
        op: OpContext,
        ctx: &AliasContext,
    ) -> CompileResult<ResolvedAttribute> {
        let schema = self.registry.get(entity).map_err(|_| {
            CompileError::UnknownEntity {
                entity: entity.to_string(),
            }
        })?;
        let attr = schema
            .attribute(attribute)
            .ok_or_else(|| CompileError::UnknownAttribute {
                entity: entity.to_string(),
                attribute: attribute.to_string(),
            })?;

        // Multi-valued links resolve to a marker; their comparison shape
        // depends on the operator and is owned by the predicate translator.
        if attr.role == Some(AttributeRole::IdList) {
            let relation = attr
                .relation
                .clone()
                .unwrap_or_else(|| attribute.strip_suffix("Ids").unwrap_or(attribute).to_string());
            return match op {
                OpContext::Where(_) => Ok(ResolvedAttribute {
                    entity: entity.to_string(),
                    attribute: attribute.to_string(),
                    expr: alias_col(ctx.base(), "id"),
                    joins: Vec::new(),
                    distinct: false,
                    kind: ResolvedKind::LinkMultiple { relation },
                    order_terms: None,
                }),
                OpContext::Select | OpContext::Order => Err(CompileError::NotSelectable {
                    entity: entity.to_string(),
                    attribute: attribute.to_string(),
                }),
            };
        }

        match op {
            OpContext::Where(operator) => self.resolve_where(entity, attr, operator, ctx),
            OpContext::Select => self.resolve_value(entity, attr, ctx),
            OpContext::Order => {
                if let Some(order) = &attr.order {
                    let (joins, _) =
                        self.instantiate(entity, &attr.name, &order.joins, ctx)?;
                    return Ok(ResolvedAttribute {
                        entity: entity.to_string(),
                        attribute: attr.name.clone(),
                        expr: alias_col(ctx.base(), &attr.name),
                        joins,
                        distinct: false,
                        kind: ResolvedKind::Column,
                        order_terms: Some(order.terms.clone()),
                    });
                }
                // Computed attributes order by their full expression.
                self.resolve_value(entity, attr, ctx)
            }
        }
    }

    fn resolve_where(
        &self,
        entity: &str,
        attr: &AttributeDef,
        operator: Operator,
        ctx: &AliasContext,
    ) -> CompileResult<ResolvedAttribute> {
        if attr.has_where_overrides() {
            // Default-deny: the override table enumerates the supported
            // operators exhaustively.
            let overridden = attr
                .where_override(operator)
                .ok_or_else(|| CompileError::unsupported(entity, &attr.name, operator))?;
            let (joins, _) = self.instantiate(entity, &attr.name, &overridden.joins, ctx)?;
            return Ok(ResolvedAttribute {
                entity: entity.to_string(),
                attribute: attr.name.clone(),
                expr: alias_col(ctx.base(), &attr.name),
                joins,
                distinct: overridden.distinct,
                kind: ResolvedKind::Overridden(overridden.clone()),
                order_terms: None,
            });
        }
        self.resolve_value(entity, attr, ctx)
    }

    /// Resolve the value expression of an attribute: a physical column, a
    /// computed select expression, a currency conversion, or a foreign
    /// projection.
    fn resolve_value(
        &self,
        entity: &str,
        attr: &AttributeDef,
        ctx: &AliasContext,
    ) -> CompileResult<ResolvedAttribute> {
        if attr.role == Some(AttributeRole::ValueConverted) {
            return self.resolve_converted(entity, attr, ctx);
        }

        if let Some(select) = &attr.select {
            let (joins, _) = self.instantiate(entity, &attr.name, &select.joins, ctx)?;
            let expr = match &select.expr {
                Some(expr) => match ctx.supplied() {
                    Some(alias) => substitute_alias(expr.clone(), alias),
                    None => expr.clone(),
                },
                None => alias_col(ctx.base(), &attr.name),
            };
            return Ok(ResolvedAttribute {
                entity: entity.to_string(),
                attribute: attr.name.clone(),
                expr,
                joins,
                distinct: select.distinct,
                kind: ResolvedKind::Column,
                order_terms: None,
            });
        }

        if attr.attr_type == AttributeType::Foreign {
            return self.resolve_foreign(entity, attr, ctx);
        }

        match attr.storage {
            StorageKind::Physical => Ok(ResolvedAttribute {
                entity: entity.to_string(),
                attribute: attr.name.clone(),
                expr: alias_col(ctx.base(), &attr.name),
                joins: Vec::new(),
                distinct: false,
                kind: ResolvedKind::Column,
                order_terms: None,
            }),
            StorageKind::Virtual | StorageKind::NotStorable => {
                Err(CompileError::NotSelectable {
                    entity: entity.to_string(),
                    attribute: attr.name.clone(),
                })
            }
        }
    }

    /// `amountConverted` compiles to `amount * rate(amountCurrency)`. The
    /// rate join is signature-stable, so selecting both the raw and the
    /// converted attribute in one query adds it exactly once.
    fn resolve_converted(
        &self,
        entity: &str,
        attr: &AttributeDef,
        ctx: &AliasContext,
    ) -> CompileResult<ResolvedAttribute> {
        let base = attr
            .name
            .strip_suffix("Converted")
            .unwrap_or(&attr.name)
            .to_string();
        let code_column = format!("{base}Currency");
        let rate_alias = format!("{base}CurrencyRate");

        let join = Join {
            kind: crate::plan::query::JoinKind::Left,
            target: CURRENCY_ENTITY.to_string(),
            alias: rate_alias.clone(),
            source_alias: ctx.base().to_string(),
            on: eq(
                alias_col(&rate_alias, "id"),
                alias_col(ctx.base(), &code_column),
            ),
        };

        Ok(ResolvedAttribute {
            entity: entity.to_string(),
            attribute: attr.name.clone(),
            expr: mul(
                alias_col(ctx.base(), &base),
                alias_col(&rate_alias, "rate"),
            ),
            joins: vec![join],
            distinct: false,
            kind: ResolvedKind::Column,
            order_terms: None,
        })
    }

    /// A foreign projection (`accountName` on a contact) selects a target
    /// attribute through the owning link's join.
    fn resolve_foreign(
        &self,
        entity: &str,
        attr: &AttributeDef,
        ctx: &AliasContext,
    ) -> CompileResult<ResolvedAttribute> {
        let relation = attr
            .relation
            .as_deref()
            .ok_or_else(|| CompileError::NotSelectable {
                entity: entity.to_string(),
                attribute: attr.name.clone(),
            })?;
        let foreign = attr.foreign.as_deref().unwrap_or("name");

        let alias_override = ctx.supplied();
        let spec =
            self.planner
                .plan_with(entity, relation, ctx, alias_override, crate::plan::query::JoinKind::Left, &[])?;

        // selectForeign lets the target entity customize how it renders
        // when projected through someone else's join.
        let expr = match self
            .registry
            .get(&target_entity(self.registry, entity, relation)?)
            .ok()
            .and_then(|target| target.attribute(foreign))
            .and_then(|target_attr| target_attr.select_foreign.as_ref())
            .and_then(|select| select.expr.as_ref())
        {
            Some(template) => substitute_alias(template.clone(), &spec.target_alias),
            None => alias_col(&spec.target_alias, foreign),
        };

        Ok(ResolvedAttribute {
            entity: entity.to_string(),
            attribute: attr.name.clone(),
            expr,
            joins: spec.joins,
            distinct: false,
            kind: ResolvedKind::Column,
            order_terms: None,
        })
    }

    /// Instantiate override join requirements through the relation
    /// planner, deduplicating by signature and rejecting alias
    /// collisions.
    fn instantiate(
        &self,
        entity: &str,
        attribute: &str,
        requirements: &[JoinRequirement],
        ctx: &AliasContext,
    ) -> CompileResult<(Vec<Join>, bool)> {
        let mut set = JoinSet::new();
        let mut many = false;
        for req in requirements {
            let alias = ctx.join_alias(&req.alias, &req.relation, entity, attribute)?;
            let conditions: Vec<_> = req
                .conditions
                .iter()
                .map(|(c, l)| (c.clone(), l.clone()))
                .collect();
            let spec = self.planner.plan_with(
                entity,
                &req.relation,
                ctx,
                Some(&alias),
                req.kind,
                &conditions,
            )?;
            many |= spec.many;
            set.extend(spec.joins)?;
        }
        Ok((set.into_vec(), many))
    }
}

fn target_entity(
    registry: &SchemaRegistry,
    entity: &str,
    relation: &str,
) -> CompileResult<String> {
    let schema = registry.get(entity).map_err(|_| CompileError::UnknownEntity {
        entity: entity.to_string(),
    })?;
    let rel = schema
        .relation(relation)
        .ok_or_else(|| CompileError::UnknownRelation {
            entity: entity.to_string(),
            relation: relation.to_string(),
        })?;
    Ok(rel.target().unwrap_or_default().to_string())
}
