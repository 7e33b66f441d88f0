//! Relation planning: turn a relation name into join specifications.
//!
//! Five shapes are covered: belongsTo/hasOne (single LEFT JOIN), hasMany
//! (reverse LEFT JOIN), manyMany (junction + target pair, discriminator
//! conditions folded into the junction ON clause), and the polymorphic
//! parent/children pair. For a polymorphic parent the target table is not
//! fixed at plan time: the planner emits one conditional join per
//! candidate type, or a single join when the caller knows the type.

use inflector::Inflector;

use crate::plan::expr::{alias_col, and, eq, lit_str, Expr, Literal};
use crate::plan::query::{Join, JoinKind};
use crate::schema::{PolyRole, Relation, SchemaRegistry};

use super::alias::AliasContext;
use super::{CompileError, CompileResult};

/// The joins a relation contributes to a plan.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinSpec {
    /// Joins in dependency order (junction before target).
    pub joins: Vec<Join>,
    /// Alias the relation's target rows are addressed by.
    pub target_alias: String,
    /// Alias of the junction rows, for manyMany relations.
    pub junction_alias: Option<String>,
    /// Whether joining this relation can multiply base rows; filtering
    /// through such a join forces DISTINCT on the plan.
    pub many: bool,
    /// Junction-row extra columns exposed through the relation:
    /// `(junction column, exposed attribute name)`.
    pub junction_columns: Vec<(String, String)>,
}

/// Plans joins for one entity's relations.
pub struct RelationPlanner<'a> {
    registry: &'a SchemaRegistry,
}

impl<'a> RelationPlanner<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self { registry }
    }

    /// Plan a relation join with default alias and LEFT semantics.
    pub fn plan(
        &self,
        entity: &str,
        relation: &str,
        ctx: &AliasContext,
    ) -> CompileResult<JoinSpec> {
        self.plan_with(entity, relation, ctx, None, JoinKind::Left, &[])
    }

    /// Plan a relation join with an explicit alias, join kind, and extra
    /// ON conditions (override-supplied discriminators such as
    /// `{"primary": true}`; applied to the junction for manyMany).
    pub fn plan_with(
        &self,
        entity: &str,
        relation: &str,
        ctx: &AliasContext,
        alias_override: Option<&str>,
        kind: JoinKind,
        extra_conditions: &[(String, Literal)],
    ) -> CompileResult<JoinSpec> {
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
            })?;

        let target_alias = alias_override.unwrap_or(relation).to_string();
        // A reflexive relation aliased onto the base rows would shadow
        // them; each direction must carry its own alias.
        if target_alias == ctx.base() {
            return Err(CompileError::AmbiguousJoinAlias {
                alias: target_alias,
            });
        }

        match rel {
            Relation::BelongsTo {
                entity: target,
                key,
                foreign_key,
            } => {
                let mut on = vec![eq(
                    alias_col(&target_alias, foreign_key),
                    alias_col(ctx.base(), key),
                )];
                push_conditions(&mut on, &target_alias, extra_conditions);
                Ok(JoinSpec {
                    joins: vec![Join {
                        kind,
                        target: target.clone(),
                        alias: target_alias.clone(),
                        source_alias: ctx.base().to_string(),
                        on: and(on),
                    }],
                    target_alias,
                    junction_alias: None,
                    many: false,
                    junction_columns: Vec::new(),
                })
            }

            Relation::HasOne {
                entity: target,
                foreign_key,
            }
            | Relation::HasMany {
                entity: target,
                foreign_key,
            } => {
                let mut on = vec![eq(
                    alias_col(&target_alias, foreign_key),
                    alias_col(ctx.base(), "id"),
                )];
                push_conditions(&mut on, &target_alias, extra_conditions);
                Ok(JoinSpec {
                    joins: vec![Join {
                        kind,
                        target: target.clone(),
                        alias: target_alias.clone(),
                        source_alias: ctx.base().to_string(),
                        on: and(on),
                    }],
                    target_alias,
                    junction_alias: None,
                    many: rel.is_many(),
                    junction_columns: Vec::new(),
                })
            }

            Relation::ManyMany {
                entity: target,
                junction,
                mid_keys,
                conditions,
                additional_columns,
            } => {
                let junction_alias = ctx.junction_alias(&target_alias);
                let [near_key, far_key] = mid_keys;

                // Discriminators belong in the junction ON clause, not in
                // WHERE: a LEFT JOIN must keep base rows with no match.
                let mut junction_on = vec![eq(
                    alias_col(&junction_alias, near_key),
                    alias_col(ctx.base(), "id"),
                )];
                for (column, literal) in conditions {
                    junction_on.push(eq(
                        alias_col(&junction_alias, column),
                        Expr::Literal(literal.clone()),
                    ));
                }
                push_conditions(&mut junction_on, &junction_alias, extra_conditions);

                let target_on = eq(
                    alias_col(&target_alias, "id"),
                    alias_col(&junction_alias, far_key),
                );

                let junction_columns = additional_columns
                    .iter()
                    .map(|column| {
                        (
                            column.clone(),
                            format!("{target_alias}_{column}").to_camel_case(),
                        )
                    })
                    .collect();

                Ok(JoinSpec {
                    joins: vec![
                        Join {
                            kind,
                            target: junction.clone(),
                            alias: junction_alias.clone(),
                            source_alias: ctx.base().to_string(),
                            on: and(junction_on),
                        },
                        Join {
                            kind,
                            target: target.clone(),
                            alias: target_alias.clone(),
                            source_alias: junction_alias.clone(),
                            on: target_on,
                        },
                    ],
                    target_alias,
                    junction_alias: Some(junction_alias),
                    many: true,
                    junction_columns,
                })
            }

            Relation::Polymorphic {
                role: PolyRole::Parent,
                id_column,
                type_column,
                candidates,
                ..
            } => {
                // One conditional join per concrete candidate type; the
                // type column picks the live one per row.
                let joins = candidates
                    .iter()
                    .map(|candidate| {
                        let alias =
                            format!("{target_alias}_{candidate}").to_camel_case();
                        let on = and(vec![
                            eq(
                                alias_col(&alias, "id"),
                                alias_col(ctx.base(), id_column),
                            ),
                            eq(alias_col(ctx.base(), type_column), lit_str(candidate)),
                        ]);
                        Join {
                            kind: JoinKind::Left,
                            target: candidate.clone(),
                            alias,
                            source_alias: ctx.base().to_string(),
                            on,
                        }
                    })
                    .collect();
                Ok(JoinSpec {
                    joins,
                    target_alias,
                    junction_alias: None,
                    many: false,
                    junction_columns: Vec::new(),
                })
            }

            Relation::Polymorphic {
                role: PolyRole::Children,
                entity: child,
                id_column,
                type_column,
                ..
            } => {
                let child = child.as_deref().unwrap_or_default().to_string();
                let mut on = vec![
                    eq(
                        alias_col(&target_alias, id_column),
                        alias_col(ctx.base(), "id"),
                    ),
                    eq(alias_col(&target_alias, type_column), lit_str(entity)),
                ];
                push_conditions(&mut on, &target_alias, extra_conditions);
                Ok(JoinSpec {
                    joins: vec![Join {
                        kind,
                        target: child,
                        alias: target_alias.clone(),
                        source_alias: ctx.base().to_string(),
                        on: and(on),
                    }],
                    target_alias,
                    junction_alias: None,
                    many: true,
                    junction_columns: Vec::new(),
                })
            }
        }
    }

    /// Plan a polymorphic parent join for one known target type. The row
    /// type discriminator still lands in the ON clause, so the join
    /// resolves exclusively against that entity.
    pub fn plan_for_type(
        &self,
        entity: &str,
        relation: &str,
        target_type: &str,
        ctx: &AliasContext,
    ) -> CompileResult<JoinSpec> {
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
            })?;

        let Relation::Polymorphic {
            role: PolyRole::Parent,
            id_column,
            type_column,
            candidates,
            ..
        } = rel
        else {
            return Err(CompileError::UnknownRelation {
                entity: entity.to_string(),
                relation: relation.to_string(),
            });
        };

        if !candidates.iter().any(|c| c == target_type) {
            return Err(CompileError::InvalidParentType {
                entity: entity.to_string(),
                relation: relation.to_string(),
                target: target_type.to_string(),
            });
        }

        let target_alias = relation.to_string();
        Ok(JoinSpec {
            joins: vec![Join {
                kind: JoinKind::Left,
                target: target_type.to_string(),
                alias: target_alias.clone(),
                source_alias: ctx.base().to_string(),
                on: and(vec![
                    eq(
                        alias_col(&target_alias, "id"),
                        alias_col(ctx.base(), id_column),
                    ),
                    eq(alias_col(ctx.base(), type_column), lit_str(target_type)),
                ]),
            }],
            target_alias,
            junction_alias: None,
            many: false,
            junction_columns: Vec::new(),
        })
    }
}

fn push_conditions(on: &mut Vec<Expr>, alias: &str, conditions: &[(String, Literal)]) {
    for (column, literal) in conditions {
        on.push(eq(alias_col(alias, column), Expr::Literal(literal.clone())));
    }
}
