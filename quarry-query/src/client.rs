//! The entry point: execute query documents and run transactions.
//!
//! ```rust,ignore
//! use quarry_query::Client;
//! use serde_json::json;
//!
//! let client = Client::new(executor);
//!
//! let user = client
//!     .execute("User", "create", json!({"data": {"email": "ada@example.com"}}))
//!     .await?;
//!
//! let posts = client
//!     .model("Post")
//!     .find_many(json!({
//!         "where": {"published": true},
//!         "orderBy": {"createdAt": "desc"},
//!         "take": 10,
//!         "include": {"author": true}
//!     }))
//!     .await?;
//!
//! // Every operation inside the callback runs on one transaction.
//! client
//!     .transaction(|tx| async move {
//!         tx.model("Account").update(json!({"where": {"id": 1}, "data": {"balance": 50}})).await?;
//!         tx.model("Account").update(json!({"where": {"id": 2}, "data": {"balance": 150}})).await?;
//!         Ok(())
//!     })
//!     .await?;
//! ```

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::convert::TypeConverter;
use crate::error::{QueryError, QueryResult};
use crate::operations::{Dispatcher, Operation};
use crate::traits::Executor;
use crate::transaction::{TransactionConfig, TransactionScope};

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Executes operations against a backend, or against one transaction.
///
/// Cloning is cheap; clones share the executor.
#[derive(Clone)]
pub struct Client {
    executor: Arc<dyn Executor>,
    scope: Option<Arc<TransactionScope>>,
    converter: TypeConverter,
    config: Arc<ClientConfig>,
}

impl Client {
    /// A client with the default configuration.
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self::with_config(executor, ClientConfig::default())
    }

    /// A client with explicit configuration.
    pub fn with_config(executor: Arc<dyn Executor>, config: ClientConfig) -> Self {
        let needs_conversion = config
            .type_conversion
            .unwrap_or_else(|| executor.capabilities().needs_type_conversion);
        Self {
            executor,
            scope: None,
            converter: TypeConverter::new(needs_conversion),
            config: Arc::new(config),
        }
    }

    /// The configuration in use.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The executor operations run on.
    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    /// Whether this client is bound to a transaction.
    pub fn is_transaction(&self) -> bool {
        self.scope.is_some()
    }

    /// Transaction nesting depth; 0 outside a transaction.
    pub fn depth(&self) -> usize {
        self.scope.as_ref().map_or(0, |scope| scope.depth())
    }

    /// Run `operation` on `model` with a JSON options document.
    pub async fn execute(&self, model: &str, operation: &str, options: Value) -> QueryResult<Value> {
        let operation: Operation = operation.parse()?;
        self.execute_operation(model, operation, &options).await
    }

    /// Run an already-parsed operation.
    pub async fn execute_operation(&self, model: &str, operation: Operation, options: &Value) -> QueryResult<Value> {
        let dispatcher = Dispatcher::new(self.executor.as_ref(), self.converter);
        let run = dispatcher.execute(model, operation, options);
        match self.config.operation_timeout {
            Some(limit) => tokio::time::timeout(limit, run).await.map_err(|_| {
                QueryError::timeout(millis(limit))
                    .with_operation(operation.as_str())
                    .with_model(model)
            })?,
            None => run.await,
        }
    }

    /// Operations on one model.
    pub fn model(&self, name: impl Into<String>) -> ModelClient<'_> {
        ModelClient {
            client: self,
            model: name.into(),
        }
    }

    /// Run `callback` in a transaction with the configured defaults.
    ///
    /// The callback receives a client bound to the transaction. The
    /// transaction commits when the callback returns `Ok`, and rolls back
    /// when it returns `Err`, panics or exceeds the transaction timeout.
    /// Called on a transaction client, this opens a savepoint: its rollback
    /// leaves the outer transaction intact, and its commit only becomes
    /// durable if the outer transaction commits.
    pub async fn transaction<F, Fut, T>(&self, callback: F) -> QueryResult<T>
    where
        F: FnOnce(Client) -> Fut,
        Fut: Future<Output = QueryResult<T>>,
    {
        let config = self.config.transaction.clone();
        self.transaction_with_config(config, callback).await
    }

    /// Run `callback` in a transaction with explicit configuration.
    pub async fn transaction_with_config<F, Fut, T>(&self, config: TransactionConfig, callback: F) -> QueryResult<T>
    where
        F: FnOnce(Client) -> Fut,
        Fut: Future<Output = QueryResult<T>>,
    {
        let handle = self.executor.begin(&config).await?;
        let depth = self.depth() + 1;
        let scope = Arc::new(TransactionScope::new(handle, depth));
        debug!(depth, isolation = config.isolation.as_sql(), "Transaction BEGIN");

        let tx = Client {
            executor: scope.clone(),
            scope: Some(scope.clone()),
            converter: self.converter,
            config: self.config.clone(),
        };

        let guarded = AssertUnwindSafe(callback(tx)).catch_unwind();
        let outcome = match config.timeout {
            Some(limit) => match tokio::time::timeout(limit, guarded).await {
                Ok(outcome) => outcome,
                Err(_) => Ok(Err(QueryError::timeout(millis(limit)).with_operation("transaction"))),
            },
            None => guarded.await,
        };

        match outcome {
            Ok(Ok(value)) => {
                scope.commit().await?;
                Ok(value)
            }
            Ok(Err(err)) => {
                if let Err(rollback_err) = scope.rollback().await {
                    warn!(depth, error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
            Err(panic) => {
                if let Err(rollback_err) = scope.rollback().await {
                    warn!(depth, error = %rollback_err, "Rollback after panic failed");
                }
                std::panic::resume_unwind(panic)
            }
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("depth", &self.depth())
            .field("converter", &self.converter)
            .field("config", &self.config)
            .finish()
    }
}

/// Operations on one model, one method per operation.
#[derive(Debug, Clone)]
pub struct ModelClient<'c> {
    client: &'c Client,
    model: String,
}

impl ModelClient<'_> {
    async fn run(&self, operation: Operation, options: Value) -> QueryResult<Value> {
        self.client.execute_operation(&self.model, operation, &options).await
    }

    /// The model name.
    pub fn name(&self) -> &str {
        &self.model
    }

    /// Insert one record (`data`, optional `select`/`include`).
    pub async fn create(&self, options: Value) -> QueryResult<Value> {
        self.run(Operation::Create, options).await
    }

    /// Insert records one by one (`data` array, optional `skipDuplicates`); returns `{count}`.
    pub async fn create_many(&self, options: Value) -> QueryResult<Value> {
        self.run(Operation::CreateMany, options).await
    }

    /// Like [`create_many`](Self::create_many) but returns the created records.
    pub async fn create_many_and_return(&self, options: Value) -> QueryResult<Value> {
        self.run(Operation::CreateManyAndReturn, options).await
    }

    /// Read one record by `where`; not found is an error.
    pub async fn find_unique(&self, options: Value) -> QueryResult<Value> {
        self.run(Operation::FindUnique, options).await
    }

    /// Read the first matching record; not found is an error.
    pub async fn find_first(&self, options: Value) -> QueryResult<Value> {
        self.run(Operation::FindFirst, options).await
    }

    /// Read matching records.
    pub async fn find_many(&self, options: Value) -> QueryResult<Value> {
        self.run(Operation::FindMany, options).await
    }

    /// Count matching records.
    pub async fn count(&self, options: Value) -> QueryResult<u64> {
        let value = self.run(Operation::Count, options).await?;
        value
            .as_u64()
            .ok_or_else(|| QueryError::serialization(format!("count returned {}", value)))
    }

    /// Aggregate over matching records.
    pub async fn aggregate(&self, options: Value) -> QueryResult<Value> {
        self.run(Operation::Aggregate, options).await
    }

    /// Aggregate per group of `by` fields.
    pub async fn group_by(&self, options: Value) -> QueryResult<Value> {
        self.run(Operation::GroupBy, options).await
    }

    /// Update one record (`where`, `data`) and return it.
    pub async fn update(&self, options: Value) -> QueryResult<Value> {
        self.run(Operation::Update, options).await
    }

    /// Update matching records; returns `{count}`.
    pub async fn update_many(&self, options: Value) -> QueryResult<Value> {
        self.run(Operation::UpdateMany, options).await
    }

    /// Update matching records and return them.
    pub async fn update_many_and_return(&self, options: Value) -> QueryResult<Value> {
        self.run(Operation::UpdateManyAndReturn, options).await
    }

    /// Update the record matching `where` with `update`, or insert `create`.
    ///
    /// This is a read followed by a write. Outside a transaction two
    /// concurrent upserts of the same key can both insert; run it inside
    /// [`Client::transaction`] (or rely on a unique constraint) when that
    /// matters.
    pub async fn upsert(&self, options: Value) -> QueryResult<Value> {
        self.run(Operation::Upsert, options).await
    }

    /// Delete one record and return it as it was.
    pub async fn delete(&self, options: Value) -> QueryResult<Value> {
        self.run(Operation::Delete, options).await
    }

    /// Delete matching records; returns `{count}`.
    pub async fn delete_many(&self, options: Value) -> QueryResult<Value> {
        self.run(Operation::DeleteMany, options).await
    }
}
