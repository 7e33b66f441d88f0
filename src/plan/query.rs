//! Query plan structures - the assembled, backend-neutral output.
//!
//! A [`QueryPlan`] is built per compilation call and never shared across
//! requests. It carries no SQL text; a separate rendering stage consumes it.

use super::expr::Expr;

// =============================================================================
// Joins
// =============================================================================

/// Kind of join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

/// A single JOIN in the plan.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    /// Entity/table being joined.
    pub target: String,
    /// Alias the joined rows are addressed by.
    pub alias: String,
    /// Alias of the side the ON predicate correlates against.
    pub source_alias: String,
    /// Full ON predicate, including any junction discriminator conditions.
    pub on: Expr,
}

impl Join {
    /// Identity used for deduplication: two joins with the same signature
    /// are the same join and must appear in a plan at most once.
    pub fn signature(&self) -> (&str, &str, &Expr) {
        (self.target.as_str(), self.alias.as_str(), &self.on)
    }
}

// =============================================================================
// SELECT / ORDER terms
// =============================================================================

/// A SELECT list item: expression exposed under an attribute name.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectTerm {
    pub expr: Expr,
    pub alias: String,
}

impl SelectTerm {
    pub fn new(expr: Expr, alias: &str) -> Self {
        Self {
            expr,
            alias: alias.into(),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    /// Parse the document's "ASC"/"DESC" spelling (case-insensitive).
    pub fn from_keyword(s: &str) -> Option<Direction> {
        match s.to_ascii_uppercase().as_str() {
            "ASC" => Some(Direction::Asc),
            "DESC" => Some(Direction::Desc),
            _ => None,
        }
    }
}

/// An ORDER BY term.
///
/// Computed attributes order by their full expression, never by a
/// select-list alias or position.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderTerm {
    pub expr: Expr,
    pub direction: Direction,
}

impl OrderTerm {
    pub fn new(expr: Expr, direction: Direction) -> Self {
        Self { expr, direction }
    }
}

// =============================================================================
// Subquery plan
// =============================================================================

/// A correlated single-column subquery, used by anti-join predicates.
#[derive(Debug, Clone, PartialEq)]
pub struct SubPlan {
    /// Entity/table the subquery selects from.
    pub from: String,
    /// The single selected column.
    pub select: String,
    pub where_clause: Option<Expr>,
}

impl SubPlan {
    pub fn new(from: &str, select: &str) -> Self {
        Self {
            from: from.into(),
            select: select.into(),
            where_clause: None,
        }
    }

    pub fn with_where(mut self, clause: Expr) -> Self {
        self.where_clause = Some(clause);
        self
    }
}

// =============================================================================
// Query plan
// =============================================================================

/// The assembled plan for one logical query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub from: String,
    pub from_alias: String,
    pub select: Vec<SelectTerm>,
    pub joins: Vec<Join>,
    pub where_clause: Option<Expr>,
    pub order: Vec<OrderTerm>,
    pub distinct: bool,
}

impl QueryPlan {
    pub fn new(from: &str, from_alias: &str) -> Self {
        Self {
            from: from.into(),
            from_alias: from_alias.into(),
            select: Vec::new(),
            joins: Vec::new(),
            where_clause: None,
            order: Vec::new(),
            distinct: false,
        }
    }

    /// Look up a join by alias.
    pub fn join(&self, alias: &str) -> Option<&Join> {
        self.joins.iter().find(|j| j.alias == alias)
    }
}
