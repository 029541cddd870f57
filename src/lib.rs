//! # Quarry
//!
//! A data client that takes Prisma-style query documents and runs them as SQL.
//!
//! Quarry provides:
//! - A fifteen-operation model API (`findMany`, `create`, `upsert`, `groupBy`, ...)
//!   driven by JSON option documents
//! - Nested conditions, ordering, pagination, `distinct` and relation includes
//! - Callback transactions with savepoint nesting
//! - Typed errors with stable codes
//! - A pluggable executor contract, with SQLite bundled
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use quarry::prelude::*;
//! use quarry::sqlite::SqliteDatabase;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), QueryError> {
//!     let schema = SchemaRegistry::new().with_model(
//!         ModelSchema::new("User", "users")
//!             .field(FieldSpec::new("id").id())
//!             .field(FieldSpec::new("email")),
//!     );
//!     let db = SqliteDatabase::connect("sqlite://./app.db", Arc::new(schema)).await?;
//!     let client = db.into_client();
//!
//!     let users = client
//!         .model("User")
//!         .find_many(json!({"where": {"email": {"contains": "@example.com"}}}))
//!         .await?;
//!
//!     client
//!         .transaction(|tx| async move {
//!             tx.model("User").create(json!({"data": {"email": "a@example.com"}})).await
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub use quarry_query::*;

/// SQLite backend.
#[cfg(feature = "sqlite")]
#[cfg_attr(docsrs, doc(cfg(feature = "sqlite")))]
pub mod sqlite {
    pub use quarry_sqlite::*;
}
