//! Common types used in query building.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::QueryResult;
use crate::sql::{ColumnResolver, Dialect};

/// A result row: field name to value, in column order.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Sort order for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortOrder {
    /// Ascending order (A-Z, 0-9, oldest first).
    #[default]
    Asc,
    /// Descending order (Z-A, 9-0, newest first).
    Desc,
}

impl SortOrder {
    /// Get the SQL keyword for this sort order.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    /// Parse a direction keyword, case-insensitively.
    ///
    /// Anything other than `desc` is ascending.
    pub fn parse(direction: &str) -> Self {
        if direction.eq_ignore_ascii_case("desc") {
            Self::Desc
        } else {
            Self::Asc
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_sql())
    }
}

/// Null handling in sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NullsOrder {
    /// Nulls appear first in the results.
    First,
    /// Nulls appear last in the results.
    Last,
}

impl NullsOrder {
    /// Get the SQL clause for this null order.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::First => "NULLS FIRST",
            Self::Last => "NULLS LAST",
        }
    }
}

/// Order by specification for a single field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderByField {
    /// The field to order by.
    pub field: String,
    /// The sort order.
    pub order: SortOrder,
    /// Null handling (optional).
    pub nulls: Option<NullsOrder>,
}

impl OrderByField {
    /// Create a new order by field.
    pub fn new(field: impl Into<String>, order: SortOrder) -> Self {
        Self {
            field: field.into(),
            order,
            nulls: None,
        }
    }

    /// Set null handling.
    pub fn nulls(mut self, nulls: NullsOrder) -> Self {
        self.nulls = Some(nulls);
        self
    }

    /// Create an ascending order.
    pub fn asc(field: impl Into<String>) -> Self {
        Self::new(field, SortOrder::Asc)
    }

    /// Create a descending order.
    pub fn desc(field: impl Into<String>) -> Self {
        Self::new(field, SortOrder::Desc)
    }

    /// Render as `<column> ASC|DESC [NULLS FIRST|LAST]`.
    pub fn to_sql(&self, columns: &dyn ColumnResolver, dialect: Dialect) -> QueryResult<String> {
        let mut sql = columns.column(&self.field)?;
        sql.push(' ');
        sql.push_str(self.order.as_sql());
        if let Some(nulls) = self.nulls {
            if dialect.supports_nulls_order() {
                sql.push(' ');
                sql.push_str(nulls.as_sql());
            }
        }
        Ok(sql)
    }
}

/// Render a full ORDER BY clause (with a leading space), or nothing.
pub fn order_by_sql(
    order: &[OrderByField],
    columns: &dyn ColumnResolver,
    dialect: Dialect,
) -> QueryResult<String> {
    if order.is_empty() {
        return Ok(String::new());
    }
    let parts = order
        .iter()
        .map(|o| o.to_sql(columns, dialect))
        .collect::<QueryResult<Vec<_>>>()?;
    Ok(format!(" ORDER BY {}", parts.join(", ")))
}

/// Row de-duplication mode.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Distinct {
    /// Return every row.
    #[default]
    None,
    /// Drop rows that are identical across all selected columns.
    All,
    /// Keep the first row for each combination of these fields.
    On(Vec<String>),
}

impl Distinct {
    /// Whether any de-duplication is requested.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}
