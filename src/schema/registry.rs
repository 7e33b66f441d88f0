//! Schema registry: lowering and validation of the raw document.
//!
//! `SchemaRegistry::load` is the single entry point. It is deliberately
//! strict: unknown types, operators, relation targets, index columns and
//! incomplete composite groups all fail the load. After a successful
//! load the registry is immutable and safe for unlimited concurrent
//! readers.

use std::collections::BTreeMap;

use inflector::Inflector;

use crate::plan::parse::parse_expr;
use crate::plan::query::{Direction, JoinKind};

use super::attribute::{
    AliasSpec, AttributeDef, AttributeRole, AttributeType, DirSpec, JoinRequirement, Operator,
    OrderOverride, SelectOverride, StorageKind, WhereOverride,
};
use super::clause::{lower_clause, lower_literal};
use super::document::{
    EntityDef, FieldDef, IndexRaw, JoinRaw, OrderRaw, RelationRaw, SchemaDocument, SelectRaw,
};
use super::relation::{PolyRole, Relation};
use super::{
    CollectionOrder, EntitySchema, IndexDef, IndexKind, SchemaError, SchemaResult,
};

/// The immutable, queryable form of a schema document.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    entities: BTreeMap<String, EntitySchema>,
}

impl SchemaRegistry {
    /// Load and validate a document.
    pub fn load(document: SchemaDocument) -> SchemaResult<Self> {
        let mut entities = BTreeMap::new();

        // First pass: lower every entity (and its companion tables).
        for (name, def) in &document.entities {
            entities.insert(name.clone(), lower_entity(name, def)?);
            for (table_name, table_def) in &def.additional_tables {
                entities.insert(table_name.clone(), lower_entity(table_name, table_def)?);
            }
        }

        // Second pass: resolve polymorphic parent candidates now that the
        // full entity set is known.
        let candidates_by_child = collect_parent_candidates(&entities);
        for schema in entities.values_mut() {
            let child = schema.name.clone();
            for relation in schema.relations.values_mut() {
                if let Relation::Polymorphic {
                    role: PolyRole::Parent,
                    candidates,
                    ..
                } = relation
                {
                    *candidates = candidates_by_child
                        .get(&child)
                        .cloned()
                        .unwrap_or_default();
                }
            }
        }

        let registry = Self { entities };
        registry.validate()?;
        Ok(registry)
    }

    /// Load from JSON text.
    pub fn load_json(json: &str) -> SchemaResult<Self> {
        Self::load(SchemaDocument::from_json(json)?)
    }

    /// Look up an entity schema.
    pub fn get(&self, name: &str) -> SchemaResult<&EntitySchema> {
        self.entities.get(name).ok_or_else(|| SchemaError::NotFound {
            entity: name.to_string(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    /// Entity names in document order.
    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    // =========================================================================
    // Validation
    // =========================================================================

    fn validate(&self) -> SchemaResult<()> {
        for schema in self.entities.values() {
            self.validate_relations(schema)?;
            self.validate_indexes(schema)?;
            self.validate_composites(schema)?;
        }
        Ok(())
    }

    fn validate_relations(&self, schema: &EntitySchema) -> SchemaResult<()> {
        for (rel_name, relation) in &schema.relations {
            match relation {
                Relation::BelongsTo {
                    entity,
                    key,
                    foreign_key,
                } => {
                    let target = self.require_target(schema, rel_name, entity)?;
                    require_key(schema, schema, rel_name, key)?;
                    require_key(schema, target, rel_name, foreign_key)?;
                }
                Relation::HasOne {
                    entity,
                    foreign_key,
                }
                | Relation::HasMany {
                    entity,
                    foreign_key,
                } => {
                    let target = self.require_target(schema, rel_name, entity)?;
                    require_key(schema, target, rel_name, foreign_key)?;
                }
                Relation::ManyMany {
                    entity,
                    junction,
                    mid_keys,
                    ..
                } => {
                    self.require_target(schema, rel_name, entity)?;
                    // A junction defined as a companion table gets its
                    // mid-keys checked; implicit junctions are trusted.
                    if let Some(junction_schema) = self.entities.get(junction) {
                        for key in mid_keys {
                            require_key(schema, junction_schema, rel_name, key)?;
                        }
                    }
                }
                Relation::Polymorphic {
                    role,
                    entity,
                    id_column,
                    type_column,
                    ..
                } => match role {
                    PolyRole::Parent => {
                        require_key(schema, schema, rel_name, id_column)?;
                        require_attribute(schema, schema, rel_name, type_column)?;
                    }
                    PolyRole::Children => {
                        let target_name = entity.as_deref().ok_or_else(|| {
                            SchemaError::MissingRelationTarget {
                                entity: schema.name.clone(),
                                relation: rel_name.clone(),
                            }
                        })?;
                        let target = self.require_target(schema, rel_name, target_name)?;
                        require_key(schema, target, rel_name, id_column)?;
                        require_attribute(schema, target, rel_name, type_column)?;
                    }
                },
            }
        }
        Ok(())
    }

    fn require_target<'a>(
        &'a self,
        schema: &EntitySchema,
        rel_name: &str,
        target: &str,
    ) -> SchemaResult<&'a EntitySchema> {
        self.entities
            .get(target)
            .ok_or_else(|| SchemaError::UnknownRelationTarget {
                entity: schema.name.clone(),
                relation: rel_name.to_string(),
                target: target.to_string(),
            })
    }

    fn validate_indexes(&self, schema: &EntitySchema) -> SchemaResult<()> {
        for index in &schema.indexes {
            for column in &index.columns {
                if schema.attribute(column).is_none() {
                    return Err(SchemaError::UnknownIndexColumn {
                        entity: schema.name.clone(),
                        index: index.name.clone(),
                        column: column.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Composite groups must be complete: an idList needs its nameMap
    /// companion and owning relation; a valueConverted needs the value
    /// and currency-code attributes it derives from.
    fn validate_composites(&self, schema: &EntitySchema) -> SchemaResult<()> {
        for attr in schema.attributes() {
            match attr.role {
                Some(AttributeRole::IdList) => {
                    let base = attr.name.strip_suffix("Ids").unwrap_or(&attr.name);
                    let names = format!("{base}Names");
                    if schema.attribute(&names).is_none() {
                        return Err(SchemaError::IncompleteComposite {
                            entity: schema.name.clone(),
                            field: attr.name.clone(),
                            missing: names,
                        });
                    }
                    let relation = attr.relation.as_deref().unwrap_or(base);
                    if schema.relation(relation).is_none() {
                        return Err(SchemaError::IncompleteComposite {
                            entity: schema.name.clone(),
                            field: attr.name.clone(),
                            missing: format!("relation '{relation}'"),
                        });
                    }
                }
                Some(AttributeRole::ValueConverted) => {
                    let base = attr.name.strip_suffix("Converted").unwrap_or(&attr.name);
                    for companion in [base.to_string(), format!("{base}Currency")] {
                        if schema.attribute(&companion).is_none() {
                            return Err(SchemaError::IncompleteComposite {
                                entity: schema.name.clone(),
                                field: attr.name.clone(),
                                missing: companion,
                            });
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn require_key(
    owner: &EntitySchema,
    on: &EntitySchema,
    rel_name: &str,
    key: &str,
) -> SchemaResult<()> {
    match on.attribute(key) {
        Some(attr) if attr.attr_type.is_key_like() => Ok(()),
        _ => Err(SchemaError::BadRelationKey {
            entity: owner.name.clone(),
            relation: rel_name.to_string(),
            key: key.to_string(),
            on_entity: on.name.clone(),
        }),
    }
}

fn require_attribute(
    owner: &EntitySchema,
    on: &EntitySchema,
    rel_name: &str,
    key: &str,
) -> SchemaResult<()> {
    if on.attribute(key).is_some() {
        Ok(())
    } else {
        Err(SchemaError::BadRelationKey {
            entity: owner.name.clone(),
            relation: rel_name.to_string(),
            key: key.to_string(),
            on_entity: on.name.clone(),
        })
    }
}

/// Parent candidates per child entity: every entity declaring a
/// `hasChildren` relation at a child contributes itself as a candidate
/// parent type for that child's `belongsToParent` relations. A child no
/// entity points at falls back to the full entity set (closed world
/// either way).
fn collect_parent_candidates(
    entities: &BTreeMap<String, EntitySchema>,
) -> BTreeMap<String, Vec<String>> {
    let mut by_child: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for schema in entities.values() {
        for relation in schema.relations.values() {
            if let Relation::Polymorphic {
                role: PolyRole::Children,
                entity: Some(child),
                ..
            } = relation
            {
                by_child
                    .entry(child.clone())
                    .or_default()
                    .push(schema.name.clone());
            }
        }
    }
    for candidates in by_child.values_mut() {
        candidates.sort();
        candidates.dedup();
    }
    let all: Vec<String> = entities.keys().cloned().collect();
    for schema in entities.values() {
        let has_parent = schema
            .relations
            .values()
            .any(|r| matches!(r, Relation::Polymorphic { role: PolyRole::Parent, .. }));
        if has_parent {
            by_child.entry(schema.name.clone()).or_insert_with(|| all.clone());
        }
    }
    by_child
}

// =============================================================================
// Entity lowering
// =============================================================================

fn lower_entity(name: &str, def: &EntityDef) -> SchemaResult<EntitySchema> {
    let mut attributes = Vec::with_capacity(def.fields.len());
    for (field_name, field) in &def.fields {
        attributes.push(lower_field(name, field_name, field)?);
    }

    let mut relations = BTreeMap::new();
    for (rel_name, raw) in &def.relations {
        relations.insert(rel_name.clone(), lower_relation(name, rel_name, raw)?);
    }

    let mut indexes = Vec::with_capacity(def.indexes.len());
    for (index_name, raw) in &def.indexes {
        indexes.push(lower_index(name, index_name, raw)?);
    }

    let collection = def.collection.as_ref().and_then(|c| {
        c.order_by.as_ref().map(|order_by| CollectionOrder {
            order_by: order_by.clone(),
            direction: c
                .order
                .as_deref()
                .and_then(Direction::from_keyword)
                .unwrap_or_default(),
        })
    });

    Ok(EntitySchema::new(
        name.to_string(),
        attributes,
        relations,
        indexes,
        collection,
    ))
}

fn lower_field(entity: &str, name: &str, field: &FieldDef) -> SchemaResult<AttributeDef> {
    let type_name = field.field_type.as_deref().unwrap_or("varchar");
    let attr_type = AttributeType::from_name(type_name).ok_or_else(|| {
        SchemaError::UnknownAttributeType {
            entity: entity.to_string(),
            field: name.to_string(),
            got: type_name.to_string(),
        }
    })?;

    let role = match &field.attribute_role {
        Some(role_name) => Some(AttributeRole::from_name(role_name).ok_or_else(|| {
            SchemaError::UnknownRole {
                entity: entity.to_string(),
                field: name.to_string(),
                got: role_name.clone(),
            }
        })?),
        None => None,
    };

    let has_overrides = field.select.is_some()
        || field.select_foreign.is_some()
        || !field.where_overrides.is_empty()
        || field.order.is_some();

    // A notStorable attribute with override machinery is computed; one
    // without is a schema-only synthetic (id lists, name maps). Foreign
    // projections are computed by nature.
    let storage = if field.not_storable {
        if has_overrides || role == Some(AttributeRole::ValueConverted) {
            StorageKind::Virtual
        } else {
            StorageKind::NotStorable
        }
    } else if attr_type == AttributeType::Foreign {
        StorageKind::Virtual
    } else {
        StorageKind::Physical
    };

    let select = field
        .select
        .as_ref()
        .map(|raw| lower_select(entity, name, raw))
        .transpose()?;
    let select_foreign = field
        .select_foreign
        .as_ref()
        .map(|raw| lower_select(entity, name, raw))
        .transpose()?;

    let mut where_overrides = BTreeMap::new();
    for (op_key, raw) in &field.where_overrides {
        let op = Operator::from_keyword(op_key).ok_or_else(|| SchemaError::UnknownOperator {
            entity: entity.to_string(),
            field: name.to_string(),
            got: op_key.clone(),
        })?;
        let clause_raw =
            raw.where_clause
                .as_ref()
                .ok_or_else(|| SchemaError::MissingWhereClause {
                    entity: entity.to_string(),
                    field: name.to_string(),
                    operator: op_key.clone(),
                })?;
        let clause = lower_clause(clause_raw).map_err(|source| SchemaError::BadClause {
            entity: entity.to_string(),
            field: name.to_string(),
            source,
        })?;
        let mut joins = lower_joins(entity, name, &raw.left_joins, JoinKind::Left)?;
        joins.extend(lower_joins(entity, name, &raw.joins, JoinKind::Inner)?);
        where_overrides.insert(
            op,
            WhereOverride {
                clause,
                joins,
                distinct: raw.distinct,
            },
        );
    }

    let order = field
        .order
        .as_ref()
        .map(|raw| lower_order(entity, name, raw))
        .transpose()?;

    Ok(AttributeDef {
        name: name.to_string(),
        attr_type,
        storage,
        not_null: field.not_null,
        len: field.len,
        default: field.default.clone(),
        autoincrement: field.autoincrement,
        role,
        relation: field.relation.clone(),
        foreign: field.foreign.clone(),
        select,
        select_foreign,
        where_overrides,
        order,
    })
}

fn lower_select(entity: &str, field: &str, raw: &SelectRaw) -> SchemaResult<SelectOverride> {
    let map_parse = |source| SchemaError::BadExpression {
        entity: entity.to_string(),
        field: field.to_string(),
        source,
    };
    match raw {
        SelectRaw::Expr(text) => Ok(SelectOverride {
            expr: Some(parse_expr(text).map_err(map_parse)?),
            joins: Vec::new(),
            distinct: false,
        }),
        SelectRaw::Full(full) => {
            let expr = full
                .select
                .as_deref()
                .map(parse_expr)
                .transpose()
                .map_err(map_parse)?;
            let mut joins = lower_joins(entity, field, &full.left_joins, JoinKind::Left)?;
            joins.extend(lower_joins(entity, field, &full.joins, JoinKind::Inner)?);
            Ok(SelectOverride {
                expr,
                joins,
                distinct: full.distinct,
            })
        }
    }
}

fn lower_order(entity: &str, field: &str, raw: &OrderRaw) -> SchemaResult<OrderOverride> {
    let mut terms = Vec::with_capacity(raw.order.len());
    for (expr_text, dir_text) in &raw.order {
        let expr = parse_expr(expr_text).map_err(|source| SchemaError::BadExpression {
            entity: entity.to_string(),
            field: field.to_string(),
            source,
        })?;
        let dir = if dir_text == "{direction}" {
            DirSpec::Requested
        } else {
            DirSpec::Fixed(Direction::from_keyword(dir_text).ok_or_else(|| {
                SchemaError::BadOrderDirection {
                    entity: entity.to_string(),
                    field: field.to_string(),
                    got: dir_text.clone(),
                }
            })?)
        };
        terms.push((expr, dir));
    }
    let joins = lower_joins(entity, field, &raw.left_joins, JoinKind::Left)?;
    Ok(OrderOverride { terms, joins })
}

fn lower_joins(
    entity: &str,
    field: &str,
    raw: &[JoinRaw],
    kind: JoinKind,
) -> SchemaResult<Vec<JoinRequirement>> {
    raw.iter()
        .map(|j| lower_join(entity, field, j, kind))
        .collect()
}

fn lower_join(
    entity: &str,
    field: &str,
    raw: &JoinRaw,
    kind: JoinKind,
) -> SchemaResult<JoinRequirement> {
    let bad = |message: &str| SchemaError::BadJoin {
        entity: entity.to_string(),
        field: field.to_string(),
        message: message.to_string(),
    };
    match raw {
        JoinRaw::Name(relation) => Ok(JoinRequirement {
            relation: relation.clone(),
            alias: AliasSpec::Relation,
            kind,
            conditions: BTreeMap::new(),
        }),
        JoinRaw::Entry(parts) => {
            let relation = parts
                .first()
                .and_then(|v| v.as_str())
                .ok_or_else(|| bad("first element must be a relation name"))?;
            let alias = match parts.get(1).and_then(|v| v.as_str()) {
                None => AliasSpec::Relation,
                Some("{alias}") => AliasSpec::Templated,
                Some(fixed) => AliasSpec::Fixed(fixed.to_string()),
            };
            let mut conditions = BTreeMap::new();
            if let Some(raw_conditions) = parts.get(2) {
                let map = raw_conditions
                    .as_object()
                    .ok_or_else(|| bad("third element must be a conditions object"))?;
                for (column, value) in map {
                    let literal = lower_literal(value).map_err(|source| {
                        SchemaError::BadClause {
                            entity: entity.to_string(),
                            field: field.to_string(),
                            source,
                        }
                    })?;
                    conditions.insert(column.clone(), literal);
                }
            }
            if parts.len() > 3 {
                return Err(bad("too many elements"));
            }
            Ok(JoinRequirement {
                relation: relation.to_string(),
                alias,
                kind,
                conditions,
            })
        }
    }
}

// =============================================================================
// Relation lowering
// =============================================================================

fn lower_relation(entity: &str, name: &str, raw: &RelationRaw) -> SchemaResult<Relation> {
    let rel_type = raw.relation_type.as_deref().unwrap_or("");
    let missing_target = || SchemaError::MissingRelationTarget {
        entity: entity.to_string(),
        relation: name.to_string(),
    };

    match rel_type {
        "belongsTo" => {
            let target = raw.entity.clone().ok_or_else(missing_target)?;
            Ok(Relation::BelongsTo {
                entity: target,
                key: raw.key.clone().unwrap_or_else(|| format!("{name}Id")),
                foreign_key: raw.foreign_key.clone().unwrap_or_else(|| "id".to_string()),
            })
        }
        "hasOne" | "hasMany" => {
            let target = raw.entity.clone().ok_or_else(missing_target)?;
            let foreign_key = raw.foreign_key.clone().unwrap_or_else(|| {
                let inverse = raw.foreign.as_deref().unwrap_or(name);
                format!("{inverse}Id")
            });
            if rel_type == "hasOne" {
                Ok(Relation::HasOne {
                    entity: target,
                    foreign_key,
                })
            } else {
                Ok(Relation::HasMany {
                    entity: target,
                    foreign_key,
                })
            }
        }
        "manyMany" => {
            let target = raw.entity.clone().ok_or_else(missing_target)?;
            let junction = raw
                .relation_name
                .clone()
                .unwrap_or_else(|| derive_junction_name(entity, &target));
            let mid_keys = match raw.mid_keys.as_slice() {
                [near, far] => [near.clone(), far.clone()],
                [] => [
                    format!("{}Id", entity.to_camel_case()),
                    format!("{}Id", target.to_camel_case()),
                ],
                other => {
                    return Err(SchemaError::BadMidKeys {
                        entity: entity.to_string(),
                        relation: name.to_string(),
                        got: other.len(),
                    })
                }
            };
            let mut conditions = BTreeMap::new();
            for (column, value) in &raw.conditions {
                let literal = lower_literal(value).map_err(|source| SchemaError::BadClause {
                    entity: entity.to_string(),
                    field: name.to_string(),
                    source,
                })?;
                conditions.insert(column.clone(), literal);
            }
            Ok(Relation::ManyMany {
                entity: target,
                junction,
                mid_keys,
                conditions,
                additional_columns: raw.additional_columns.keys().cloned().collect(),
            })
        }
        "belongsToParent" => {
            let id_column = raw.key.clone().unwrap_or_else(|| format!("{name}Id"));
            let type_column = raw
                .foreign_type
                .clone()
                .unwrap_or_else(|| format!("{name}Type"));
            Ok(Relation::Polymorphic {
                role: PolyRole::Parent,
                entity: None,
                id_column,
                type_column,
                // Filled in the registry's second pass.
                candidates: Vec::new(),
            })
        }
        "hasChildren" => {
            let target = raw.entity.clone().ok_or_else(missing_target)?;
            let inverse = raw.foreign.as_deref().unwrap_or("parent");
            let id_column = raw
                .foreign_key
                .clone()
                .unwrap_or_else(|| format!("{inverse}Id"));
            let type_column = raw
                .foreign_type
                .clone()
                .unwrap_or_else(|| format!("{inverse}Type"));
            Ok(Relation::Polymorphic {
                role: PolyRole::Children,
                entity: Some(target),
                id_column,
                type_column,
                candidates: Vec::new(),
            })
        }
        other => Err(SchemaError::UnknownRelationType {
            entity: entity.to_string(),
            relation: name.to_string(),
            got: other.to_string(),
        }),
    }
}

/// Default junction entity name: the two entity names in alphabetical
/// order, class-cased into one.
fn derive_junction_name(a: &str, b: &str) -> String {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    format!("{first}{second}").to_class_case()
}

fn lower_index(entity: &str, name: &str, raw: &IndexRaw) -> SchemaResult<IndexDef> {
    let kind = match raw.index_type.as_deref() {
        None | Some("index") => IndexKind::Index,
        Some("unique") => IndexKind::Unique,
        Some("fulltext") => IndexKind::Fulltext,
        Some(other) => {
            return Err(SchemaError::UnknownIndexKind {
                entity: entity.to_string(),
                index: name.to_string(),
                got: other.to_string(),
            })
        }
    };
    Ok(IndexDef {
        name: raw.key.clone().unwrap_or_else(|| name.to_string()),
        columns: raw.columns.clone(),
        kind,
    })
}
