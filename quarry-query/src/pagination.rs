//! Offset pagination (skip/take).
//!
//! Values are kept signed exactly as supplied by the document. Rejecting
//! negative values is the job of whatever renders them ([`Pagination::validate`]).
//!
//! ```rust
//! use quarry_query::Pagination;
//! use quarry_query::sql::Dialect;
//!
//! let pagination = Pagination::new().skip(10).take(20);
//! assert_eq!(pagination.to_sql(Dialect::SQLite), " LIMIT 20 OFFSET 10");
//!
//! let page_3 = Pagination::page(3, 25);
//! assert_eq!(page_3.skip, Some(50));
//! ```

use crate::error::{QueryError, QueryResult};
use crate::sql::Dialect;

/// Pagination configuration for queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pagination {
    /// Number of records to skip.
    pub skip: Option<i64>,
    /// Maximum number of records to take.
    pub take: Option<i64>,
}

impl Pagination {
    /// Create a new pagination with no limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of records to skip.
    pub fn skip(mut self, skip: i64) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Set the maximum number of records to take.
    pub fn take(mut self, take: i64) -> Self {
        self.take = Some(take);
        self
    }

    /// Pagination for a 1-indexed page.
    pub fn page(page: i64, page_size: i64) -> Self {
        Self::new().skip((page.max(1) - 1) * page_size).take(page_size)
    }

    /// Check if pagination is specified.
    pub fn is_empty(&self) -> bool {
        self.skip.is_none() && self.take.is_none()
    }

    /// Reject negative values.
    pub fn validate(&self) -> QueryResult<()> {
        if let Some(skip) = self.skip.filter(|s| *s < 0) {
            return Err(QueryError::invalid_input("skip", format!("must not be negative, got {}", skip)));
        }
        if let Some(take) = self.take.filter(|t| *t < 0) {
            return Err(QueryError::invalid_input("take", format!("must not be negative, got {}", take)));
        }
        Ok(())
    }

    /// Render LIMIT/OFFSET for `dialect`.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        dialect.limit_offset(self.take, self.skip)
    }

    /// Apply the window to rows already in memory.
    pub fn apply<T>(&self, rows: Vec<T>) -> Vec<T> {
        let skip = self.skip.unwrap_or(0).max(0) as usize;
        let iter = rows.into_iter().skip(skip);
        match self.take {
            Some(take) => iter.take(take.max(0) as usize).collect(),
            None => iter.collect(),
        }
    }
}
