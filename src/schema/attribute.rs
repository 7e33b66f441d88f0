//! Lowered attribute definitions.
//!
//! A raw [`FieldDef`](crate::schema::document::FieldDef) becomes an
//! [`AttributeDef`] at load time: its type/role strings become enums, its
//! select expressions are parsed, and its per-operator override table is
//! lowered into typed specs with a default-deny lookup.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::plan::expr::{Expr, Literal};
use crate::plan::query::{Direction, JoinKind};

use super::clause::WhereTemplate;

// =============================================================================
// Operators
// =============================================================================

/// A filter operator, as enumerated by the override tables.
///
/// Boolean-flavored `= TRUE` / `= FALSE` are distinct operators rather
/// than an `=` with a boolean value: their NULL semantics differ per
/// field and each override documents its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Like,
    NotLike,
    In,
    NotIn,
    IsNull,
    IsNotNull,
    IsTrue,
    IsFalse,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Operator {
    /// Parse the document spelling of an operator.
    pub fn from_keyword(s: &str) -> Option<Operator> {
        match s {
            "=" => Some(Operator::Eq),
            "<>" | "!=" => Some(Operator::Ne),
            "LIKE" => Some(Operator::Like),
            "NOT LIKE" => Some(Operator::NotLike),
            "IN" => Some(Operator::In),
            "NOT IN" => Some(Operator::NotIn),
            "IS NULL" => Some(Operator::IsNull),
            "IS NOT NULL" => Some(Operator::IsNotNull),
            "= TRUE" => Some(Operator::IsTrue),
            "= FALSE" => Some(Operator::IsFalse),
            ">" => Some(Operator::Gt),
            ">=" => Some(Operator::Gte),
            "<" => Some(Operator::Lt),
            "<=" => Some(Operator::Lte),
            _ => None,
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::IsNull => "IS NULL",
            Operator::IsNotNull => "IS NOT NULL",
            Operator::IsTrue => "= TRUE",
            Operator::IsFalse => "= FALSE",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
        }
    }

    /// "Any match" vs "no match" semantics on multi-valued attributes.
    /// No-match operators compile to a correlated anti-join; a plain join
    /// would over-match against multi-row relations.
    pub fn is_no_match(&self) -> bool {
        matches!(
            self,
            Operator::Ne | Operator::NotIn | Operator::NotLike | Operator::IsNull
        )
    }
}

// =============================================================================
// Attribute classification
// =============================================================================

/// Where an attribute's value lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    /// A real column on the entity's table.
    Physical,
    /// Computed; has a select expression and/or per-operator overrides.
    Virtual,
    /// Exists in the schema for callers but is never stored or selected
    /// directly (link id-lists, name maps).
    NotStorable,
}

/// Semantic type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeType {
    Id,
    Varchar,
    Int,
    Bool,
    Float,
    Datetime,
    Date,
    Text,
    JsonArray,
    JsonObject,
    Foreign,
    ForeignId,
    ForeignType,
    Password,
    CurrencyPair,
    Link,
    LinkParent,
    LinkMultiple,
    LinkOne,
}

impl AttributeType {
    pub fn from_name(name: &str) -> Option<AttributeType> {
        match name {
            "id" => Some(AttributeType::Id),
            "varchar" => Some(AttributeType::Varchar),
            "int" => Some(AttributeType::Int),
            "bool" => Some(AttributeType::Bool),
            "float" => Some(AttributeType::Float),
            "datetime" => Some(AttributeType::Datetime),
            "date" => Some(AttributeType::Date),
            "text" => Some(AttributeType::Text),
            "jsonArray" => Some(AttributeType::JsonArray),
            "jsonObject" => Some(AttributeType::JsonObject),
            "foreign" => Some(AttributeType::Foreign),
            "foreignId" => Some(AttributeType::ForeignId),
            "foreignType" => Some(AttributeType::ForeignType),
            "password" => Some(AttributeType::Password),
            "currencyPair" => Some(AttributeType::CurrencyPair),
            "link" => Some(AttributeType::Link),
            "linkParent" => Some(AttributeType::LinkParent),
            "linkMultiple" => Some(AttributeType::LinkMultiple),
            "linkOne" => Some(AttributeType::LinkOne),
            _ => None,
        }
    }

    /// Types allowed on the local side of a relation key pair.
    pub fn is_key_like(&self) -> bool {
        matches!(self, AttributeType::Id | AttributeType::ForeignId)
    }
}

/// Role tag grouping several attributes into one logical composite field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeRole {
    Id,
    Name,
    Type,
    IdList,
    NameMap,
    ColumnsMap,
    Value,
    Currency,
    ValueConverted,
}

impl AttributeRole {
    pub fn from_name(name: &str) -> Option<AttributeRole> {
        match name {
            "id" => Some(AttributeRole::Id),
            "name" => Some(AttributeRole::Name),
            "type" => Some(AttributeRole::Type),
            "idList" => Some(AttributeRole::IdList),
            "nameMap" => Some(AttributeRole::NameMap),
            "columnsMap" => Some(AttributeRole::ColumnsMap),
            "value" => Some(AttributeRole::Value),
            "currency" => Some(AttributeRole::Currency),
            "valueConverted" => Some(AttributeRole::ValueConverted),
            _ => None,
        }
    }
}

// =============================================================================
// Override specs
// =============================================================================

/// How a required join names its alias.
///
/// The document's `{alias}` template is lowered into `Templated` at load
/// time; the compiler substitutes a caller-supplied alias, never a string
/// splice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AliasSpec {
    /// Alias defaults to the relation name.
    Relation,
    Fixed(String),
    /// Caller supplies the alias through the `AliasContext`.
    Templated,
}

/// A join an override requires before its expression/clause is valid.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinRequirement {
    /// Relation name on the owning entity.
    pub relation: String,
    pub alias: AliasSpec,
    pub kind: JoinKind,
    /// Extra equality conditions folded into the target ON clause.
    pub conditions: BTreeMap<String, Literal>,
}

/// Lowered select / selectForeign override.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectOverride {
    pub expr: Option<Expr>,
    pub joins: Vec<JoinRequirement>,
    pub distinct: bool,
}

/// Lowered per-operator where override.
#[derive(Debug, Clone, PartialEq)]
pub struct WhereOverride {
    pub clause: WhereTemplate,
    pub joins: Vec<JoinRequirement>,
    pub distinct: bool,
}

/// Direction slot in an order override term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirSpec {
    /// The document's `{direction}` template: follow the request.
    Requested,
    Fixed(Direction),
}

/// Lowered order override.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderOverride {
    pub terms: Vec<(Expr, DirSpec)>,
    pub joins: Vec<JoinRequirement>,
}

// =============================================================================
// Attribute definition
// =============================================================================

/// A fully lowered attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDef {
    pub name: String,
    pub attr_type: AttributeType,
    pub storage: StorageKind,
    pub not_null: bool,
    pub len: Option<u32>,
    pub default: Option<Value>,
    pub autoincrement: bool,
    pub role: Option<AttributeRole>,
    /// Owning relation for foreign/link attributes.
    pub relation: Option<String>,
    /// Foreign attribute projected through `relation`.
    pub foreign: Option<String>,
    pub select: Option<SelectOverride>,
    pub select_foreign: Option<SelectOverride>,
    /// Per-operator overrides. Lookup is default-deny: an operator absent
    /// from this table is unsupported for a virtual attribute.
    pub where_overrides: BTreeMap<Operator, WhereOverride>,
    pub order: Option<OrderOverride>,
}

impl AttributeDef {
    /// A plain physical column with no overrides.
    pub fn physical(name: &str, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            storage: StorageKind::Physical,
            not_null: false,
            len: None,
            default: None,
            autoincrement: false,
            role: None,
            relation: None,
            foreign: None,
            select: None,
            select_foreign: None,
            where_overrides: BTreeMap::new(),
            order: None,
        }
    }

    pub fn is_storable(&self) -> bool {
        self.storage == StorageKind::Physical
    }

    /// Whether this attribute carries any per-operator override table.
    pub fn has_where_overrides(&self) -> bool {
        !self.where_overrides.is_empty()
    }

    /// Default-deny override lookup.
    pub fn where_override(&self, op: Operator) -> Option<&WhereOverride> {
        self.where_overrides.get(&op)
    }
}
