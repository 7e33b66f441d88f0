//! Order compilation.
//!
//! An order item resolves to one or more ORDER BY terms. Attributes with
//! an order override expand to the override's term list, where each
//! term's direction is either fixed by the document or follows the
//! request. Everything else orders by the attribute's value expression.

use crate::plan::query::{Direction, Join, OrderTerm};
use crate::schema::{DirSpec, SchemaRegistry};

use super::alias::AliasContext;
use super::attribute::{OpContext, Resolver};
use super::CompileResult;

pub struct OrderCompiler<'a> {
    resolver: Resolver<'a>,
}

impl<'a> OrderCompiler<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self {
            resolver: Resolver::new(registry),
        }
    }

    pub fn order_by(
        &self,
        entity: &str,
        attribute: &str,
        direction: Direction,
        ctx: &AliasContext,
    ) -> CompileResult<(Vec<OrderTerm>, Vec<Join>)> {
        let resolved = self
            .resolver
            .resolve(entity, attribute, OpContext::Order, ctx)?;

        let terms = match &resolved.order_terms {
            Some(terms) => terms
                .iter()
                .map(|(expr, dir)| OrderTerm {
                    expr: expr.clone(),
                    direction: match dir {
                        DirSpec::Requested => direction,
                        DirSpec::Fixed(fixed) => *fixed,
                    },
                })
                .collect(),
            None => vec![OrderTerm {
                expr: resolved.expr,
                direction,
            }],
        };

        Ok((terms, resolved.joins))
    }
}
