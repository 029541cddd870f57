//! Backend contract.
//!
//! The dispatcher never talks to a database directly. It hands statement
//! values ([`SelectQuery`], [`InsertQuery`], ...) to an [`Executor`], which
//! renders them for its dialect, runs them and returns rows as [`Record`]s.
//! Raw SQL (used by the groupBy engine) goes through [`Executor::query_raw`].
//!
//! A transaction is just another executor: [`Executor::begin`] returns a
//! [`TransactionHandle`] that accepts the same statements and adds
//! `commit`/`rollback`. Calling `begin` on a transaction handle opens a
//! dependent child scope (a savepoint on SQL backends).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::QueryResult;
use crate::filter::FilterValue;
use crate::query::{DeleteQuery, ExecResult, InsertQuery, SelectQuery, UpdateQuery};
use crate::schema::SchemaResolver;
use crate::sql::Dialect;
use crate::transaction::TransactionConfig;
use crate::types::Record;

/// A boxed future for object-safe async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a backend can do natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// SQL dialect used for raw statements.
    pub dialect: Dialect,
    /// Writes can return the affected rows in the same statement.
    pub supports_returning: bool,
    /// `DISTINCT ON` is understood natively.
    pub supports_distinct_on: bool,
    /// Numbers may come back as strings and need coercion.
    pub needs_type_conversion: bool,
}

impl Capabilities {
    /// Capabilities for `dialect` with every optional feature off.
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            ..Default::default()
        }
    }

    /// Set `RETURNING` support.
    pub fn returning(mut self, supported: bool) -> Self {
        self.supports_returning = supported;
        self
    }

    /// Set `DISTINCT ON` support.
    pub fn distinct_on(mut self, supported: bool) -> Self {
        self.supports_distinct_on = supported;
        self
    }

    /// Set whether results need numeric coercion.
    pub fn type_conversion(mut self, needed: bool) -> Self {
        self.needs_type_conversion = needed;
        self
    }
}

/// Runs statements against one connection or transaction.
pub trait Executor: Send + Sync {
    /// Native features of this backend.
    fn capabilities(&self) -> Capabilities;

    /// Model and field lookup.
    fn schema(&self) -> &dyn SchemaResolver;

    /// Rows matching `query`, with includes loaded.
    fn find_many<'a>(&'a self, query: &'a SelectQuery) -> BoxFuture<'a, QueryResult<Vec<Record>>>;

    /// The first row matching `query`.
    fn find_first<'a>(&'a self, query: &'a SelectQuery) -> BoxFuture<'a, QueryResult<Option<Record>>> {
        Box::pin(async move {
            let query = query.clone().limit(1);
            Ok(self.find_many(&query).await?.into_iter().next())
        })
    }

    /// Number of rows matching `query` (its window applied).
    fn count<'a>(&'a self, query: &'a SelectQuery) -> BoxFuture<'a, QueryResult<u64>>;

    /// Insert one row.
    fn insert<'a>(&'a self, query: &'a InsertQuery) -> BoxFuture<'a, QueryResult<ExecResult>>;

    /// Update matching rows.
    fn update<'a>(&'a self, query: &'a UpdateQuery) -> BoxFuture<'a, QueryResult<ExecResult>>;

    /// Delete matching rows.
    fn delete<'a>(&'a self, query: &'a DeleteQuery) -> BoxFuture<'a, QueryResult<ExecResult>>;

    /// Run a raw row-returning statement. Columns are keyed by their label.
    fn query_raw<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [FilterValue],
    ) -> BoxFuture<'a, QueryResult<Vec<Record>>>;

    /// Run a raw statement and return the affected row count.
    fn execute_raw<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [FilterValue],
    ) -> BoxFuture<'a, QueryResult<u64>>;

    /// Open a transaction, or a child scope when called on a transaction.
    fn begin<'a>(
        &'a self,
        config: &'a TransactionConfig,
    ) -> BoxFuture<'a, QueryResult<Arc<dyn TransactionHandle>>>;
}

/// An open transaction (or savepoint).
///
/// Implementations roll back when dropped while still open.
pub trait TransactionHandle: Executor {
    /// Make the changes of this scope durable (or release the savepoint).
    fn commit(&self) -> BoxFuture<'_, QueryResult<()>>;

    /// Discard the changes of this scope.
    fn rollback(&self) -> BoxFuture<'_, QueryResult<()>>;
}
