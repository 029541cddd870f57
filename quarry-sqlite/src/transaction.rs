//! SQLite transactions and savepoints.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, warn};

use quarry_query::error::{QueryError, QueryResult};
use quarry_query::filter::FilterValue;
use quarry_query::query::{DeleteQuery, ExecResult, InsertQuery, SelectQuery, UpdateQuery};
use quarry_query::schema::SchemaResolver;
use quarry_query::traits::{BoxFuture, Capabilities, Executor, TransactionHandle};
use quarry_query::transaction::{ScopeState, TransactionConfig};
use quarry_query::types::Record;

use crate::engine::Session;

enum Kind {
    Root,
    Savepoint(String),
}

/// An open SQLite transaction, or a savepoint inside one.
///
/// A root transaction holds the database gate until it finishes, so
/// statements issued on the [`SqliteDatabase`](crate::SqliteDatabase)
/// itself wait for it. Dropping an open transaction rolls it back in the
/// background.
pub struct SqliteTransaction {
    session: Session,
    kind: Kind,
    state: Mutex<ScopeState>,
    guard: Mutex<Option<OwnedMutexGuard<()>>>,
    savepoints: Arc<AtomicU64>,
}

impl SqliteTransaction {
    pub(crate) fn root(session: Session, guard: OwnedMutexGuard<()>, savepoints: Arc<AtomicU64>) -> Self {
        debug!("SQLite transaction started");
        Self {
            session,
            kind: Kind::Root,
            state: Mutex::new(ScopeState::Open),
            guard: Mutex::new(Some(guard)),
            savepoints,
        }
    }

    fn savepoint(session: Session, name: String, savepoints: Arc<AtomicU64>) -> Self {
        Self {
            session,
            kind: Kind::Savepoint(name),
            state: Mutex::new(ScopeState::Open),
            guard: Mutex::new(None),
            savepoints,
        }
    }

    /// Savepoint name, or `None` for the outermost transaction.
    pub fn savepoint_name(&self) -> Option<&str> {
        match &self.kind {
            Kind::Root => None,
            Kind::Savepoint(name) => Some(name),
        }
    }

    /// Current state.
    pub fn state(&self) -> ScopeState {
        *self.state.lock()
    }

    fn ensure_open(&self) -> QueryResult<()> {
        match self.state() {
            ScopeState::Open => Ok(()),
            state => Err(QueryError::transaction_closed(state)),
        }
    }

    fn rollback_sql(&self) -> String {
        match &self.kind {
            Kind::Root => "ROLLBACK".to_string(),
            Kind::Savepoint(name) => format!("ROLLBACK TO SAVEPOINT {0}; RELEASE SAVEPOINT {0}", name),
        }
    }

    fn close(&self, state: ScopeState) -> QueryResult<()> {
        let mut current = self.state.lock();
        if current.is_terminal() {
            return Err(QueryError::transaction_closed(*current));
        }
        *current = state;
        Ok(())
    }

    fn release(&self) {
        self.guard.lock().take();
    }
}

impl Executor for SqliteTransaction {
    fn capabilities(&self) -> Capabilities {
        self.session.capabilities()
    }

    fn schema(&self) -> &dyn SchemaResolver {
        self.session.schema()
    }

    fn find_many<'a>(&'a self, query: &'a SelectQuery) -> BoxFuture<'a, QueryResult<Vec<Record>>> {
        Box::pin(async move {
            self.ensure_open()?;
            self.session.find_many(query).await
        })
    }

    fn count<'a>(&'a self, query: &'a SelectQuery) -> BoxFuture<'a, QueryResult<u64>> {
        Box::pin(async move {
            self.ensure_open()?;
            self.session.count(query).await
        })
    }

    fn insert<'a>(&'a self, query: &'a InsertQuery) -> BoxFuture<'a, QueryResult<ExecResult>> {
        Box::pin(async move {
            self.ensure_open()?;
            self.session.insert(query).await
        })
    }

    fn update<'a>(&'a self, query: &'a UpdateQuery) -> BoxFuture<'a, QueryResult<ExecResult>> {
        Box::pin(async move {
            self.ensure_open()?;
            self.session.update(query).await
        })
    }

    fn delete<'a>(&'a self, query: &'a DeleteQuery) -> BoxFuture<'a, QueryResult<ExecResult>> {
        Box::pin(async move {
            self.ensure_open()?;
            self.session.delete(query).await
        })
    }

    fn query_raw<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [FilterValue],
    ) -> BoxFuture<'a, QueryResult<Vec<Record>>> {
        Box::pin(async move {
            self.ensure_open()?;
            self.session.query_raw(sql, params).await
        })
    }

    fn execute_raw<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [FilterValue],
    ) -> BoxFuture<'a, QueryResult<u64>> {
        Box::pin(async move {
            self.ensure_open()?;
            self.session.execute_raw(sql, params).await
        })
    }

    /// Open a savepoint. SQLite savepoints have no isolation or access
    /// mode, so `config` is not consulted.
    fn begin<'a>(
        &'a self,
        _config: &'a TransactionConfig,
    ) -> BoxFuture<'a, QueryResult<Arc<dyn TransactionHandle>>> {
        Box::pin(async move {
            self.ensure_open()?;
            let name = format!("quarry_sp_{}", self.savepoints.fetch_add(1, Ordering::Relaxed) + 1);
            self.session.batch(&format!("SAVEPOINT {}", name)).await?;
            debug!(savepoint = %name, "SQLite savepoint created");
            let child = SqliteTransaction::savepoint(self.session.clone(), name, self.savepoints.clone());
            Ok(Arc::new(child) as Arc<dyn TransactionHandle>)
        })
    }
}

impl TransactionHandle for SqliteTransaction {
    fn commit(&self) -> BoxFuture<'_, QueryResult<()>> {
        Box::pin(async move {
            self.ensure_open()?;
            let sql = match &self.kind {
                Kind::Root => "COMMIT".to_string(),
                Kind::Savepoint(name) => format!("RELEASE SAVEPOINT {}", name),
            };
            // A failed COMMIT leaves the transaction open for a rollback.
            self.session.batch(&sql).await?;
            self.close(ScopeState::Committed)?;
            self.release();
            Ok(())
        })
    }

    fn rollback(&self) -> BoxFuture<'_, QueryResult<()>> {
        Box::pin(async move {
            self.close(ScopeState::RolledBack)?;
            let result = self.session.batch(&self.rollback_sql()).await;
            self.release();
            result
        })
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        if *self.state.get_mut() != ScopeState::Open {
            return;
        }
        let sql = self.rollback_sql();
        let session = self.session.clone();
        let guard = self.guard.get_mut().take();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = session.batch(&sql).await {
                        warn!(error = %e, "Rollback of dropped transaction failed");
                    }
                    drop(guard);
                });
            }
            Err(_) => warn!("Transaction dropped outside a Tokio runtime; it was not rolled back"),
        }
    }
}
