//! # quarry-query
//!
//! Document-driven query layer for the Quarry data client.
//!
//! A request is a model name, an operation name and a JSON options document.
//! This crate provides:
//! - Decoding of `where`, `orderBy`, `select`, `include`, pagination and `distinct` documents
//! - Dispatch of the fifteen model operations (`findMany`, `create`, `groupBy`, ...)
//! - groupBy/aggregate SQL generation with `HAVING`
//! - Transactions with savepoint nesting and a one-way scope lifecycle
//! - Numeric coercion for backends that return numbers as text
//! - Typed errors with stable codes
//!
//! Backends implement [`Executor`]; `quarry-sqlite` is the bundled one.
//!
//! ## Filters
//!
//! Conditions are normally decoded from documents, but can be built directly:
//!
//! ```rust
//! use quarry_query::{Filter, FilterValue};
//! use quarry_query::document::build_condition;
//! use serde_json::json;
//!
//! let decoded = build_condition(&json!({"age": {"gt": 18}, "active": true})).unwrap();
//!
//! let built = Filter::and([
//!     Filter::Gt("age".into(), FilterValue::Int(18)),
//!     Filter::Equals("active".into(), FilterValue::Bool(true)),
//! ]);
//! assert_eq!(decoded, built);
//! ```
//!
//! ## Filter Values
//!
//! ```rust
//! use quarry_query::FilterValue;
//!
//! let val: FilterValue = 42.into();
//! assert!(matches!(val, FilterValue::Int(42)));
//!
//! let val: FilterValue = "hello".into();
//! assert!(matches!(val, FilterValue::String(_)));
//! ```
//!
//! ## Operations
//!
//! ```rust
//! use quarry_query::Operation;
//!
//! let op: Operation = "findMany".parse().unwrap();
//! assert_eq!(op, Operation::FindMany);
//! assert!("findEverything".parse::<Operation>().is_err());
//! ```
//!
//! ## Error Handling
//!
//! ```rust
//! use quarry_query::{QueryError, ErrorCode};
//!
//! let err = QueryError::not_found("User");
//! assert_eq!(err.code, ErrorCode::RecordNotFound);
//! assert!(err.is_not_found());
//! ```

pub mod client;
pub mod config;
pub mod convert;
pub mod document;
pub mod error;
pub mod filter;
pub mod logging;
pub mod operations;
pub mod pagination;
pub mod query;
pub mod relations;
pub mod schema;
pub mod sql;
pub mod traits;
pub mod transaction;
pub mod types;

pub use client::{Client, ModelClient};
pub use config::{ClientConfig, EnvSource, MapEnvSource, StdEnvSource};
pub use convert::TypeConverter;
pub use error::{ErrorCode, ErrorContext, QueryError, QueryResult};
pub use filter::{Filter, FilterValue};
pub use operations::{
    AggregateField, AggregateKind, AggregateTarget, AggregationSpec, Dispatcher, GroupBy, GroupOrder,
    HavingCondition, HavingOp, Operation,
};
pub use pagination::Pagination;
pub use query::{DeleteQuery, ExecResult, InsertQuery, SelectQuery, UpdateQuery};
pub use relations::{IncludeMap, IncludeOption, RelationSpec, RelationType};
pub use schema::{FieldSpec, ModelColumns, ModelSchema, SchemaRegistry, SchemaResolver};
pub use sql::{ColumnResolver, Dialect, SqlBuilder};
pub use traits::{BoxFuture, Capabilities, Executor, TransactionHandle};
pub use transaction::{AccessMode, IsolationLevel, ScopeState, TransactionConfig, TransactionScope};
pub use types::{Distinct, NullsOrder, OrderByField, Record, SortOrder};

// Re-export logging utilities
pub use logging::{LogFormat, LogLevel, LogSettings, init as init_logging, is_debug_enabled};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::client::{Client, ModelClient};
    pub use crate::config::ClientConfig;
    pub use crate::error::{ErrorCode, QueryError, QueryResult};
    pub use crate::filter::{Filter, FilterValue};
    pub use crate::operations::Operation;
    pub use crate::schema::{FieldSpec, ModelSchema, SchemaRegistry};
    pub use crate::relations::RelationSpec;
    pub use crate::transaction::{IsolationLevel, TransactionConfig};
}
