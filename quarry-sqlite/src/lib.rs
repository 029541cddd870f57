//! SQLite backend for Quarry.
//!
//! This crate implements the `quarry-query` executor contract on SQLite, using
//! `tokio-rusqlite` for asynchronous database operations.
//!
//! # Features
//!
//! - Async/await support via `tokio-rusqlite`
//! - Field-to-column mapping and relation loading
//! - Transactions with nested savepoints
//! - Constraint violations classified into typed errors
//! - In-memory and file-based databases
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use quarry_query::SchemaRegistry;
//! use quarry_sqlite::SqliteDatabase;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let schema = Arc::new(SchemaRegistry::new());
//!     let db = SqliteDatabase::connect("sqlite://./app.db", schema).await?;
//!     let client = db.into_client();
//!
//!     let users = client.execute("User", "findMany", json!({"take": 10})).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod transaction;
pub mod types;

pub use config::{DatabasePath, JournalMode, SqliteConfig, SynchronousMode};
pub use engine::SqliteDatabase;
pub use error::{SqliteError, SqliteResult};
pub use transaction::SqliteTransaction;
