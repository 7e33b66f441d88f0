//! Raw schema-document structures.
//!
//! The input contract is a JSON mapping from entity name to
//! `{fields, relations, indexes, collection, additionalTables}` using the
//! authoring tool's key vocabulary (`type`, `dbType`, `notStorable`,
//! `attributeRole`, `leftJoins`, `whereClause`, ...). These structs
//! deserialize that document verbatim; validation and lowering into the
//! immutable registry types happen in [`crate::schema::registry`].

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

/// The whole schema document: entity name -> definition.
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct SchemaDocument {
    pub entities: BTreeMap<String, EntityDef>,
}

impl SchemaDocument {
    /// Parse a document from JSON text.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Parse a document from an in-memory JSON value.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

/// One entity's raw definition.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityDef {
    #[serde(default)]
    pub fields: BTreeMap<String, FieldDef>,
    #[serde(default)]
    pub relations: BTreeMap<String, RelationRaw>,
    #[serde(default)]
    pub indexes: BTreeMap<String, IndexRaw>,
    #[serde(default)]
    pub collection: Option<CollectionRaw>,
    /// Companion tables (closure tables for tree entities, and similar).
    #[serde(default)]
    pub additional_tables: BTreeMap<String, EntityDef>,
}

/// One field's raw definition.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    #[serde(rename = "type", default)]
    pub field_type: Option<String>,
    #[serde(default)]
    pub db_type: Option<String>,
    #[serde(default)]
    pub len: Option<u32>,
    #[serde(default)]
    pub not_null: bool,
    #[serde(default)]
    pub default: Option<Value>,
    /// `true`, or a shared index key name.
    #[serde(default)]
    pub index: Option<Value>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub autoincrement: bool,
    #[serde(default)]
    pub not_storable: bool,
    #[serde(default)]
    pub attribute_role: Option<String>,
    /// Owning relation, for foreign/link attributes.
    #[serde(default)]
    pub relation: Option<String>,
    /// Foreign attribute projected through `relation`.
    #[serde(default)]
    pub foreign: Option<String>,
    #[serde(default)]
    pub select: Option<SelectRaw>,
    #[serde(default)]
    pub select_foreign: Option<SelectRaw>,
    /// Per-operator override table, keyed by operator spelling
    /// (`"="`, `"<>"`, `"LIKE"`, `"= TRUE"`, ...).
    #[serde(rename = "where", default)]
    pub where_overrides: BTreeMap<String, WhereRaw>,
    #[serde(default)]
    pub order: Option<OrderRaw>,
}

/// Raw select/selectForeign override: either a bare expression string or
/// a full spec with joins.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SelectRaw {
    Expr(String),
    Full(SelectFullRaw),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectFullRaw {
    #[serde(default)]
    pub select: Option<String>,
    #[serde(default)]
    pub left_joins: Vec<JoinRaw>,
    #[serde(default)]
    pub joins: Vec<JoinRaw>,
    #[serde(default)]
    pub additional_select: Vec<String>,
    #[serde(default)]
    pub distinct: bool,
}

/// Raw per-operator where override.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhereRaw {
    #[serde(default)]
    pub left_joins: Vec<JoinRaw>,
    #[serde(default)]
    pub joins: Vec<JoinRaw>,
    #[serde(default)]
    pub where_clause: Option<Value>,
    #[serde(default)]
    pub distinct: bool,
}

/// Raw order override: term list plus any joins they depend on.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRaw {
    #[serde(default)]
    pub order: Vec<(String, String)>,
    #[serde(default)]
    pub left_joins: Vec<JoinRaw>,
    #[serde(default)]
    pub additional_select: Vec<String>,
}

/// Raw join entry: either a bare relation name or
/// `[relation, alias, {conditions...}]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum JoinRaw {
    Name(String),
    Entry(Vec<Value>),
}

/// One relation's raw definition.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationRaw {
    #[serde(rename = "type", default)]
    pub relation_type: Option<String>,
    #[serde(default)]
    pub entity: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub foreign_key: Option<String>,
    #[serde(default)]
    pub foreign_type: Option<String>,
    /// Inverse relation name on the target entity.
    #[serde(default)]
    pub foreign: Option<String>,
    /// Junction entity name for manyMany.
    #[serde(default)]
    pub relation_name: Option<String>,
    #[serde(default)]
    pub mid_keys: Vec<String>,
    /// Static discriminator columns on the junction row.
    #[serde(default)]
    pub conditions: BTreeMap<String, Value>,
    /// Extra junction-row attributes exposed as relation columns.
    #[serde(default)]
    pub additional_columns: BTreeMap<String, FieldDef>,
}

/// One index's raw definition.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexRaw {
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(rename = "type", default)]
    pub index_type: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
}

/// Default collection ordering for an entity.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionRaw {
    #[serde(default)]
    pub order_by: Option<String>,
    #[serde(default)]
    pub order: Option<String>,
}
