//! Plan assembly.
//!
//! Combines the select, where, and order compilers into one backend
//! neutral `QueryPlan`. Joins contributed by different attributes are
//! deduplicated by signature; any contribution that touched a
//! row-multiplying join marks the whole plan DISTINCT.

use inflector::Inflector;
use serde_json::Value;

use crate::plan::expr::{alias_col, and};
use crate::plan::query::{Direction, QueryPlan, SelectTerm};
use crate::schema::{Operator, SchemaRegistry, StorageKind};

use super::alias::{AliasContext, JoinSet};
use super::attribute::{OpContext, Resolver};
use super::order::OrderCompiler;
use super::predicate::PredicateTranslator;
use super::{CompileError, CompileResult};

/// One filter item of a request.
#[derive(Debug, Clone, PartialEq)]
pub struct WhereItem {
    pub attribute: String,
    pub op: Operator,
    pub value: Value,
}

impl WhereItem {
    pub fn new(attribute: &str, op: Operator, value: Value) -> Self {
        Self {
            attribute: attribute.to_string(),
            op,
            value,
        }
    }
}

/// A logical query against one entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRequest {
    pub entity: String,
    /// Attribute names to project; empty means all physical attributes.
    pub select: Vec<String>,
    pub filter: Vec<WhereItem>,
    pub order_by: Vec<(String, Direction)>,
}

impl QueryRequest {
    pub fn new(entity: &str) -> Self {
        Self {
            entity: entity.to_string(),
            ..Self::default()
        }
    }

    pub fn select(mut self, attributes: &[&str]) -> Self {
        self.select = attributes.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn filter(mut self, item: WhereItem) -> Self {
        self.filter.push(item);
        self
    }

    pub fn order_by(mut self, attribute: &str, direction: Direction) -> Self {
        self.order_by.push((attribute.to_string(), direction));
        self
    }
}

/// Assembles query plans against the registry.
pub struct PlanAssembler<'a> {
    registry: &'a SchemaRegistry,
    resolver: Resolver<'a>,
    translator: PredicateTranslator<'a>,
    orderer: OrderCompiler<'a>,
}

impl<'a> PlanAssembler<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self {
            registry,
            resolver: Resolver::new(registry),
            translator: PredicateTranslator::new(registry),
            orderer: OrderCompiler::new(registry),
        }
    }

    pub fn assemble(&self, request: &QueryRequest) -> CompileResult<QueryPlan> {
        let entity = &request.entity;
        let schema = self.registry.get(entity).map_err(|_| {
            CompileError::UnknownEntity {
                entity: entity.clone(),
            }
        })?;

        let base = entity.to_camel_case();
        let ctx = AliasContext::new(&base);
        let mut plan = QueryPlan::new(entity, &base);
        let mut joins = JoinSet::new();

        // Projection.
        if request.select.is_empty() {
            for attr in schema.attributes() {
                if attr.storage == StorageKind::Physical {
                    plan.select
                        .push(SelectTerm::new(alias_col(&base, &attr.name), &attr.name));
                }
            }
        } else {
            for name in &request.select {
                let resolved = self
                    .resolver
                    .resolve(entity, name, OpContext::Select, &ctx)?;
                joins.extend(resolved.joins)?;
                plan.distinct |= resolved.distinct;
                plan.select.push(SelectTerm::new(resolved.expr, name));
            }
        }

        // Filter: items AND together.
        let mut clauses = Vec::with_capacity(request.filter.len());
        for item in &request.filter {
            let predicate =
                self.translator
                    .translate(entity, &item.attribute, item.op, &item.value, &ctx)?;
            joins.extend(predicate.joins)?;
            plan.distinct |= predicate.distinct;
            clauses.push(predicate.expr);
        }
        if !clauses.is_empty() {
            plan.where_clause = Some(and(clauses));
        }

        // Ordering, falling back to the entity's collection default.
        if request.order_by.is_empty() {
            if let Some(collection) = &schema.collection {
                let (terms, order_joins) = self.orderer.order_by(
                    entity,
                    &collection.order_by,
                    collection.direction,
                    &ctx,
                )?;
                joins.extend(order_joins)?;
                plan.order.extend(terms);
            }
        } else {
            for (attribute, direction) in &request.order_by {
                let (terms, order_joins) =
                    self.orderer.order_by(entity, attribute, *direction, &ctx)?;
                joins.extend(order_joins)?;
                plan.order.extend(terms);
            }
        }

        plan.joins = joins.into_vec();
        Ok(plan)
    }
}
