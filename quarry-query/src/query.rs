//! Statement values handed to a backend.
//!
//! These are plain data: the dispatcher builds them from a decoded document
//! and an [`Executor`](crate::traits::Executor) renders and runs them. All
//! names are model field names; the backend resolves columns through its
//! schema.

use crate::filter::Filter;
use crate::pagination::Pagination;
use crate::relations::{IncludeMap, IncludeOption};
use crate::types::{Distinct, OrderByField, Record};

/// A row-returning SELECT over one model.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectQuery {
    /// Model to read.
    pub model: String,
    /// Projected fields; empty means every scalar field.
    pub fields: Vec<String>,
    /// Row filter.
    pub filter: Filter,
    /// Ordering, primary key first.
    pub order_by: Vec<OrderByField>,
    /// Offset window.
    pub pagination: Pagination,
    /// De-duplication mode.
    pub distinct: Distinct,
    /// Relations to load, keyed by dotted path.
    pub includes: IncludeMap,
}

impl SelectQuery {
    /// Select every field of `model`.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    /// Restrict the projection.
    pub fn select(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// AND `filter` into the existing filter.
    pub fn where_condition(mut self, filter: Filter) -> Self {
        self.filter = std::mem::take(&mut self.filter).and_then(filter);
        self
    }

    /// Append an ordering.
    pub fn order_by(mut self, order: OrderByField) -> Self {
        self.order_by.push(order);
        self
    }

    /// Limit the number of rows.
    pub fn limit(mut self, take: i64) -> Self {
        self.pagination.take = Some(take);
        self
    }

    /// Skip rows.
    pub fn offset(mut self, skip: i64) -> Self {
        self.pagination.skip = Some(skip);
        self
    }

    /// Load a relation path with default options.
    pub fn include(self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.include_with_options(IncludeOption::new(path))
    }

    /// Load a relation path with explicit options.
    pub fn include_with_options(mut self, option: IncludeOption) -> Self {
        self.includes.insert(option.path.clone(), option);
        self
    }

    /// Drop duplicate rows.
    pub fn distinct(mut self) -> Self {
        self.distinct = Distinct::All;
        self
    }

    /// Keep the first row per combination of `fields`.
    pub fn distinct_on(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        self.distinct = if fields.is_empty() {
            Distinct::All
        } else {
            Distinct::On(fields)
        };
        self
    }
}

/// An INSERT of one row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InsertQuery {
    /// Target model.
    pub model: String,
    /// Field values to insert.
    pub data: Record,
    /// Return the inserted row (all scalar fields) when the backend can.
    pub returning: bool,
}

impl InsertQuery {
    /// Insert `data` into `model`.
    pub fn new(model: impl Into<String>, data: Record) -> Self {
        Self {
            model: model.into(),
            data,
            returning: false,
        }
    }

    /// Ask for the inserted row.
    pub fn returning(mut self) -> Self {
        self.returning = true;
        self
    }
}

/// An UPDATE of every row matching a filter.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdateQuery {
    /// Target model.
    pub model: String,
    /// Field values to set.
    pub data: Record,
    /// Rows to update.
    pub filter: Filter,
    /// Return the updated rows when the backend can.
    pub returning: bool,
}

impl UpdateQuery {
    /// Update `model` with `data`.
    pub fn new(model: impl Into<String>, data: Record) -> Self {
        Self {
            model: model.into(),
            data,
            filter: Filter::None,
            returning: false,
        }
    }

    /// AND `filter` into the existing filter.
    pub fn where_condition(mut self, filter: Filter) -> Self {
        self.filter = std::mem::take(&mut self.filter).and_then(filter);
        self
    }

    /// Ask for the updated rows.
    pub fn returning(mut self) -> Self {
        self.returning = true;
        self
    }
}

/// A DELETE of every row matching a filter.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeleteQuery {
    /// Target model.
    pub model: String,
    /// Rows to delete.
    pub filter: Filter,
    /// Return the deleted rows when the backend can.
    pub returning: bool,
}

impl DeleteQuery {
    /// Delete from `model`.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            filter: Filter::None,
            returning: false,
        }
    }

    /// AND `filter` into the existing filter.
    pub fn where_condition(mut self, filter: Filter) -> Self {
        self.filter = std::mem::take(&mut self.filter).and_then(filter);
        self
    }

    /// Ask for the deleted rows.
    pub fn returning(mut self) -> Self {
        self.returning = true;
        self
    }
}

/// Outcome of a write statement.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExecResult {
    /// Number of rows written.
    pub rows_affected: u64,
    /// Row id generated by an insert, when the backend reports one.
    pub last_insert_id: Option<i64>,
    /// Rows produced by `RETURNING`; empty when not requested or unsupported.
    pub rows: Vec<Record>,
}

impl ExecResult {
    /// A result with only an affected-row count.
    pub fn affected(rows_affected: u64) -> Self {
        Self {
            rows_affected,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterValue;

    #[test]
    fn test_select_builder() {
        let query = SelectQuery::new("Post")
            .select(["id", "title"])
            .where_condition(Filter::Equals("published".to_string(), FilterValue::Bool(true)))
            .where_condition(Filter::Gt("views".to_string(), FilterValue::Int(10)))
            .order_by(OrderByField::desc("createdAt"))
            .limit(10)
            .offset(20)
            .include("author");

        assert_eq!(query.fields, vec!["id", "title"]);
        assert!(matches!(query.filter, Filter::And(ref parts) if parts.len() == 2));
        assert_eq!(query.pagination, Pagination::new().skip(20).take(10));
        assert!(query.includes.contains_key("author"));
    }

    #[test]
    fn test_distinct_on_empty_falls_back_to_all() {
        let query = SelectQuery::new("User").distinct_on(Vec::<String>::new());
        assert_eq!(query.distinct, Distinct::All);

        let query = SelectQuery::new("User").distinct_on(["email"]);
        assert_eq!(query.distinct, Distinct::On(vec!["email".to_string()]));
    }
}
