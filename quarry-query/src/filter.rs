//! Filter types for building WHERE clauses.
//!
//! A [`Filter`] is a backend-independent condition tree over unresolved field
//! names. Rendering happens through [`Filter::write_sql`], which maps fields to
//! columns with a [`ColumnResolver`] so the same tree can target a base table,
//! an aliased join, or a related model.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::QueryResult;
use crate::sql::{ColumnResolver, SqlBuilder};

/// A filter value that can be used in comparisons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Float value.
    Float(f64),
    /// String value.
    String(String),
    /// JSON value.
    Json(serde_json::Value),
    /// List of values.
    List(Vec<FilterValue>),
}

impl FilterValue {
    /// Check if this is a null value.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Convert a document value. Objects are kept as JSON, arrays become lists.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Self::String(s.clone()),
            Value::Array(items) => Self::List(items.iter().map(Self::from_json).collect()),
            Value::Object(_) => Self::Json(value.clone()),
        }
    }

    /// Convert back into a document value.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::String(s) => Value::String(s.clone()),
            Self::Json(v) => v.clone(),
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
        }
    }
}

impl From<&Value> for FilterValue {
    fn from(v: &Value) -> Self {
        Self::from_json(v)
    }
}

impl From<bool> for FilterValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for FilterValue {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for FilterValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl<T: Into<FilterValue>> From<Vec<T>> for FilterValue {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<FilterValue>> From<Option<T>> for FilterValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Self::Null,
        }
    }
}

/// A condition tree. Field names are resolved to columns only when rendered.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Filter {
    /// No filter (always true).
    #[default]
    None,

    /// Equals comparison.
    Equals(String, FilterValue),
    /// Not equals comparison.
    NotEquals(String, FilterValue),

    /// Less than comparison.
    Lt(String, FilterValue),
    /// Less than or equal comparison.
    Lte(String, FilterValue),
    /// Greater than comparison.
    Gt(String, FilterValue),
    /// Greater than or equal comparison.
    Gte(String, FilterValue),

    /// In a list of values.
    In(String, Vec<FilterValue>),
    /// Not in a list of values.
    NotIn(String, Vec<FilterValue>),

    /// Contains (LIKE %value%).
    Contains(String, FilterValue),
    /// Starts with (LIKE value%).
    StartsWith(String, FilterValue),
    /// Ends with (LIKE %value).
    EndsWith(String, FilterValue),

    /// Inclusive range check.
    Between(String, FilterValue, FilterValue),

    /// Is null check.
    IsNull(String),
    /// Is not null check.
    IsNotNull(String),

    /// Logical AND of multiple filters.
    And(Vec<Filter>),
    /// Logical OR of multiple filters.
    Or(Vec<Filter>),
    /// Logical NOT of a filter.
    Not(Box<Filter>),
}

impl Filter {
    /// Create an empty filter (matches everything).
    pub fn none() -> Self {
        Self::None
    }

    /// Check if this filter is empty.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Create an AND filter. Empty children are dropped.
    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Self {
        let mut filters: Vec<_> = filters.into_iter().filter(|f| !f.is_none()).collect();
        match filters.len() {
            0 => Self::None,
            1 => filters.remove(0),
            _ => Self::And(filters),
        }
    }

    /// Create an OR filter. Empty children are dropped.
    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Self {
        let mut filters: Vec<_> = filters.into_iter().filter(|f| !f.is_none()).collect();
        match filters.len() {
            0 => Self::None,
            1 => filters.remove(0),
            _ => Self::Or(filters),
        }
    }

    /// Create a NOT filter.
    ///
    /// Double negation cancels and null checks flip, so
    /// `not(not(x))` is `x` and `not(x IS NOT NULL)` is `x IS NULL`.
    pub fn not(filter: Filter) -> Self {
        match filter {
            Self::None => Self::None,
            Self::Not(inner) => *inner,
            Self::IsNull(field) => Self::IsNotNull(field),
            Self::IsNotNull(field) => Self::IsNull(field),
            other => Self::Not(Box::new(other)),
        }
    }

    /// Combine with another filter using AND.
    pub fn and_then(self, other: Filter) -> Self {
        if self.is_none() {
            return other;
        }
        if other.is_none() {
            return self;
        }
        match self {
            Self::And(mut filters) => {
                filters.push(other);
                Self::And(filters)
            }
            _ => Self::And(vec![self, other]),
        }
    }

    /// Every field name referenced by this tree, in order of appearance.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::None => {}
            Self::Equals(f, _)
            | Self::NotEquals(f, _)
            | Self::Lt(f, _)
            | Self::Lte(f, _)
            | Self::Gt(f, _)
            | Self::Gte(f, _)
            | Self::In(f, _)
            | Self::NotIn(f, _)
            | Self::Contains(f, _)
            | Self::StartsWith(f, _)
            | Self::EndsWith(f, _)
            | Self::Between(f, _, _)
            | Self::IsNull(f)
            | Self::IsNotNull(f) => out.push(f),
            Self::And(filters) | Self::Or(filters) => {
                for filter in filters {
                    filter.collect_fields(out);
                }
            }
            Self::Not(inner) => inner.collect_fields(out),
        }
    }

    /// Render this filter into `sql`, binding every value as a parameter.
    ///
    /// Fields are resolved through `columns`; an unknown field fails before
    /// anything is executed.
    pub fn write_sql(&self, sql: &mut SqlBuilder, columns: &dyn ColumnResolver) -> QueryResult<()> {
        match self {
            Self::None => {
                sql.push("1 = 1");
            }

            Self::Equals(field, val) => {
                let col = columns.column(field)?;
                if val.is_null() {
                    sql.push(format!("{} IS NULL", col));
                } else {
                    sql.push(format!("{} = ", col)).push_param(val.clone());
                }
            }
            Self::NotEquals(field, val) => {
                let col = columns.column(field)?;
                if val.is_null() {
                    sql.push(format!("{} IS NOT NULL", col));
                } else {
                    sql.push(format!("{} <> ", col)).push_param(val.clone());
                }
            }

            Self::Lt(field, val) => compare(sql, columns, field, "<", val)?,
            Self::Lte(field, val) => compare(sql, columns, field, "<=", val)?,
            Self::Gt(field, val) => compare(sql, columns, field, ">", val)?,
            Self::Gte(field, val) => compare(sql, columns, field, ">=", val)?,

            Self::In(field, values) => {
                let col = columns.column(field)?;
                if values.is_empty() {
                    sql.push("1 = 0");
                } else {
                    let placeholders: Vec<_> = values.iter().map(|v| sql.bind(v.clone())).collect();
                    sql.push(format!("{} IN ({})", col, placeholders.join(", ")));
                }
            }
            Self::NotIn(field, values) => {
                let col = columns.column(field)?;
                if values.is_empty() {
                    sql.push("1 = 1");
                } else {
                    let placeholders: Vec<_> = values.iter().map(|v| sql.bind(v.clone())).collect();
                    sql.push(format!("{} NOT IN ({})", col, placeholders.join(", ")));
                }
            }

            Self::Contains(field, val) => like(sql, columns, field, val, "%", "%")?,
            Self::StartsWith(field, val) => like(sql, columns, field, val, "", "%")?,
            Self::EndsWith(field, val) => like(sql, columns, field, val, "%", "")?,

            Self::Between(field, low, high) => {
                let col = columns.column(field)?;
                let low = sql.bind(low.clone());
                let high = sql.bind(high.clone());
                sql.push(format!("{} BETWEEN {} AND {}", col, low, high));
            }

            Self::IsNull(field) => {
                let col = columns.column(field)?;
                sql.push(format!("{} IS NULL", col));
            }
            Self::IsNotNull(field) => {
                let col = columns.column(field)?;
                sql.push(format!("{} IS NOT NULL", col));
            }

            Self::And(filters) => join(sql, columns, filters, " AND ", "1 = 1")?,
            Self::Or(filters) => join(sql, columns, filters, " OR ", "1 = 0")?,
            Self::Not(inner) => {
                sql.push("NOT (");
                inner.write_sql(sql, columns)?;
                sql.push(")");
            }
        }
        Ok(())
    }
}

fn compare(
    sql: &mut SqlBuilder,
    columns: &dyn ColumnResolver,
    field: &str,
    op: &str,
    val: &FilterValue,
) -> QueryResult<()> {
    let col = columns.column(field)?;
    sql.push(format!("{} {} ", col, op)).push_param(val.clone());
    Ok(())
}

fn like(
    sql: &mut SqlBuilder,
    columns: &dyn ColumnResolver,
    field: &str,
    val: &FilterValue,
    prefix: &str,
    suffix: &str,
) -> QueryResult<()> {
    let col = columns.column(field)?;
    let pattern = match val {
        FilterValue::String(s) => FilterValue::String(format!("{}{}{}", prefix, s, suffix)),
        other => other.clone(),
    };
    sql.push(format!("{} LIKE ", col)).push_param(pattern);
    Ok(())
}

fn join(
    sql: &mut SqlBuilder,
    columns: &dyn ColumnResolver,
    filters: &[Filter],
    sep: &str,
    empty: &str,
) -> QueryResult<()> {
    if filters.is_empty() {
        sql.push(empty);
        return Ok(());
    }
    sql.push("(");
    for (i, filter) in filters.iter().enumerate() {
        if i > 0 {
            sql.push(sep);
        }
        filter.write_sql(sql, columns)?;
    }
    sql.push(")");
    Ok(())
}
