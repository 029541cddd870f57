//! Transaction configuration and transaction scopes.
//!
//! A [`TransactionScope`] wraps one backend [`TransactionHandle`] for the
//! duration of a transaction callback. Every statement issued through the
//! scope checks that it is still open, and the scope moves from
//! [`ScopeState::Open`] to a terminal state exactly once:
//!
//! ```text
//! Open ──commit──▶ Committed
//!   └───rollback──▶ RolledBack
//! ```
//!
//! Using a scope after it has terminated fails with
//! [`ErrorCode::TransactionClosed`](crate::ErrorCode::TransactionClosed).
//! Callbacks normally never see a scope directly; they receive a
//! [`Client`](crate::Client) bound to one (see [`Client::transaction`](crate::Client::transaction)).
//!
//! # Isolation Levels
//!
//! ```rust
//! use quarry_query::IsolationLevel;
//!
//! assert_eq!(IsolationLevel::Serializable.as_sql(), "SERIALIZABLE");
//! assert_eq!(IsolationLevel::default(), IsolationLevel::ReadCommitted);
//! ```
//!
//! # Transaction Configuration
//!
//! ```rust
//! use std::time::Duration;
//! use quarry_query::{IsolationLevel, TransactionConfig};
//! use quarry_query::sql::Dialect;
//!
//! let config = TransactionConfig::new()
//!     .isolation(IsolationLevel::Serializable)
//!     .timeout(Duration::from_secs(5));
//!
//! assert_eq!(
//!     config.to_begin_sql(Dialect::PostgreSQL),
//!     "BEGIN ISOLATION LEVEL SERIALIZABLE READ WRITE"
//! );
//! assert_eq!(config.to_begin_sql(Dialect::SQLite), "BEGIN IMMEDIATE");
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{QueryError, QueryResult};
use crate::filter::FilterValue;
use crate::query::{DeleteQuery, ExecResult, InsertQuery, SelectQuery, UpdateQuery};
use crate::schema::SchemaResolver;
use crate::sql::Dialect;
use crate::traits::{BoxFuture, Capabilities, Executor, TransactionHandle};
use crate::types::Record;

/// Transaction isolation levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IsolationLevel {
    /// Read uncommitted - allows dirty reads.
    ReadUncommitted,
    /// Read committed - prevents dirty reads.
    #[default]
    ReadCommitted,
    /// Repeatable read - prevents non-repeatable reads.
    RepeatableRead,
    /// Serializable - highest isolation level.
    Serializable,
}

impl IsolationLevel {
    /// Get the SQL clause for this isolation level.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

/// Access mode for transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AccessMode {
    /// Read-write access (default).
    #[default]
    ReadWrite,
    /// Read-only access.
    ReadOnly,
}

impl AccessMode {
    /// Get the SQL clause for this access mode.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::ReadWrite => "READ WRITE",
            Self::ReadOnly => "READ ONLY",
        }
    }
}

/// Configuration for a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionConfig {
    /// Isolation level.
    pub isolation: IsolationLevel,
    /// Access mode.
    pub access_mode: AccessMode,
    /// Upper bound for the whole callback; exceeding it rolls back.
    pub timeout: Option<Duration>,
    /// Whether to defer constraint checking.
    pub deferrable: bool,
}

impl TransactionConfig {
    /// Create a new transaction config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the isolation level.
    pub fn isolation(mut self, level: IsolationLevel) -> Self {
        self.isolation = level;
        self
    }

    /// Set the access mode.
    pub fn access_mode(mut self, mode: AccessMode) -> Self {
        self.access_mode = mode;
        self
    }

    /// Set the timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Make the transaction read-only.
    pub fn read_only(self) -> Self {
        self.access_mode(AccessMode::ReadOnly)
    }

    /// Make the transaction deferrable.
    pub fn deferrable(mut self) -> Self {
        self.deferrable = true;
        self
    }

    /// The statement that opens a transaction with this configuration.
    ///
    /// SQLite has no isolation levels; a writable transaction takes the
    /// write lock up front (`IMMEDIATE`) so it cannot fail to upgrade later.
    pub fn to_begin_sql(&self, dialect: Dialect) -> String {
        match dialect {
            Dialect::SQLite => match self.access_mode {
                AccessMode::ReadWrite => "BEGIN IMMEDIATE".to_string(),
                AccessMode::ReadOnly => "BEGIN DEFERRED".to_string(),
            },
            Dialect::MySQL => format!("START TRANSACTION {}", self.access_mode.as_sql()),
            Dialect::PostgreSQL => {
                let mut parts = vec!["BEGIN", "ISOLATION LEVEL", self.isolation.as_sql()];
                parts.push(self.access_mode.as_sql());
                // Only valid for SERIALIZABLE READ ONLY
                if self.deferrable
                    && self.isolation == IsolationLevel::Serializable
                    && self.access_mode == AccessMode::ReadOnly
                {
                    parts.push("DEFERRABLE");
                }
                parts.join(" ")
            }
        }
    }
}

/// Lifecycle state of a [`TransactionScope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeState {
    /// Statements may be issued.
    Open,
    /// Committed; terminal.
    Committed,
    /// Rolled back; terminal.
    RolledBack,
}

impl ScopeState {
    /// Whether no further statements are allowed.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Open)
    }
}

impl fmt::Display for ScopeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Committed => write!(f, "committed"),
            Self::RolledBack => write!(f, "rolled back"),
        }
    }
}

/// A transaction handle guarded by a one-way state machine.
pub struct TransactionScope {
    handle: Arc<dyn TransactionHandle>,
    state: Mutex<ScopeState>,
    depth: usize,
}

impl TransactionScope {
    /// Wrap an open handle. `depth` is 1 for a top-level transaction.
    pub fn new(handle: Arc<dyn TransactionHandle>, depth: usize) -> Self {
        Self {
            handle,
            state: Mutex::new(ScopeState::Open),
            depth,
        }
    }

    /// Current state.
    pub fn state(&self) -> ScopeState {
        *self.state.lock()
    }

    /// Nesting depth.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Fail unless the scope is open.
    pub fn ensure_open(&self) -> QueryResult<()> {
        match self.state() {
            ScopeState::Open => Ok(()),
            state => Err(QueryError::transaction_closed(state)),
        }
    }

    fn transition(&self, to: ScopeState) -> QueryResult<()> {
        let mut state = self.state.lock();
        if state.is_terminal() {
            return Err(QueryError::transaction_closed(*state));
        }
        *state = to;
        Ok(())
    }

    /// Commit. If the backend refuses, the scope is rolled back instead and
    /// the commit error is returned.
    pub async fn commit(&self) -> QueryResult<()> {
        self.transition(ScopeState::Committed)?;
        debug!(depth = self.depth, "Transaction COMMIT");
        if let Err(e) = self.handle.commit().await {
            *self.state.lock() = ScopeState::RolledBack;
            if let Err(rollback_err) = self.handle.rollback().await {
                tracing::warn!(depth = self.depth, error = %rollback_err, "Rollback after failed commit failed");
            }
            return Err(e);
        }
        Ok(())
    }

    /// Roll back.
    pub async fn rollback(&self) -> QueryResult<()> {
        self.transition(ScopeState::RolledBack)?;
        debug!(depth = self.depth, "Transaction ROLLBACK");
        self.handle.rollback().await
    }
}

impl fmt::Debug for TransactionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionScope")
            .field("state", &self.state())
            .field("depth", &self.depth)
            .finish()
    }
}

impl Executor for TransactionScope {
    fn capabilities(&self) -> Capabilities {
        self.handle.capabilities()
    }

    fn schema(&self) -> &dyn SchemaResolver {
        self.handle.schema()
    }

    fn find_many<'a>(&'a self, query: &'a SelectQuery) -> BoxFuture<'a, QueryResult<Vec<Record>>> {
        Box::pin(async move {
            self.ensure_open()?;
            self.handle.find_many(query).await
        })
    }

    fn find_first<'a>(&'a self, query: &'a SelectQuery) -> BoxFuture<'a, QueryResult<Option<Record>>> {
        Box::pin(async move {
            self.ensure_open()?;
            self.handle.find_first(query).await
        })
    }

    fn count<'a>(&'a self, query: &'a SelectQuery) -> BoxFuture<'a, QueryResult<u64>> {
        Box::pin(async move {
            self.ensure_open()?;
            self.handle.count(query).await
        })
    }

    fn insert<'a>(&'a self, query: &'a InsertQuery) -> BoxFuture<'a, QueryResult<ExecResult>> {
        Box::pin(async move {
            self.ensure_open()?;
            self.handle.insert(query).await
        })
    }

    fn update<'a>(&'a self, query: &'a UpdateQuery) -> BoxFuture<'a, QueryResult<ExecResult>> {
        Box::pin(async move {
            self.ensure_open()?;
            self.handle.update(query).await
        })
    }

    fn delete<'a>(&'a self, query: &'a DeleteQuery) -> BoxFuture<'a, QueryResult<ExecResult>> {
        Box::pin(async move {
            self.ensure_open()?;
            self.handle.delete(query).await
        })
    }

    fn query_raw<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [FilterValue],
    ) -> BoxFuture<'a, QueryResult<Vec<Record>>> {
        Box::pin(async move {
            self.ensure_open()?;
            self.handle.query_raw(sql, params).await
        })
    }

    fn execute_raw<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [FilterValue],
    ) -> BoxFuture<'a, QueryResult<u64>> {
        Box::pin(async move {
            self.ensure_open()?;
            self.handle.execute_raw(sql, params).await
        })
    }

    fn begin<'a>(
        &'a self,
        config: &'a TransactionConfig,
    ) -> BoxFuture<'a, QueryResult<Arc<dyn TransactionHandle>>> {
        Box::pin(async move {
            self.ensure_open()?;
            self.handle.begin(config).await
        })
    }
}
