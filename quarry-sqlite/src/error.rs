//! Error types for SQLite operations.

use std::fmt;

use quarry_query::error::QueryError;
use rusqlite::ffi;

/// Result type for SQLite operations.
pub type SqliteResult<T> = Result<T, SqliteError>;

/// Error type for SQLite operations.
#[derive(Debug)]
pub enum SqliteError {
    /// SQLite driver error.
    Sqlite(tokio_rusqlite::Error),
    /// Configuration error.
    Config(String),
    /// Connection error.
    Connection(String),
    /// Type conversion error.
    TypeConversion(String),
}

impl SqliteError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a type conversion error.
    pub fn type_conversion(msg: impl Into<String>) -> Self {
        Self::TypeConversion(msg.into())
    }

    /// The underlying SQLite failure, if this error came from the driver.
    fn failure(&self) -> Option<(&ffi::Error, Option<&str>)> {
        match self {
            Self::Sqlite(tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(code, msg))) => {
                Some((code, msg.as_deref()))
            }
            _ => None,
        }
    }

    /// Classify into a [`QueryError`], attributing constraint violations to `model`.
    pub fn into_query_error(self, model: Option<&str>) -> QueryError {
        let detail = self.to_string();
        let classified = self.failure().and_then(|(code, msg)| {
            let detail = msg.unwrap_or(&detail).to_string();
            let model = model.unwrap_or("record");
            match code.extended_code {
                ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                    Some(QueryError::unique_violation(model, detail))
                }
                ffi::SQLITE_CONSTRAINT_FOREIGNKEY => Some(QueryError::foreign_key_violation(model, detail)),
                ffi::SQLITE_CONSTRAINT_NOTNULL => Some(QueryError::not_null_violation(model, detail)),
                ffi::SQLITE_CONSTRAINT_CHECK => Some(QueryError::check_violation(model, detail)),
                _ => None,
            }
        });
        if let Some(err) = classified {
            return err.with_source(self);
        }

        match self {
            Self::Config(msg) => QueryError::configuration(msg),
            Self::Connection(msg) => QueryError::connection(msg),
            Self::TypeConversion(msg) => QueryError::serialization(msg),
            Self::Sqlite(tokio_rusqlite::Error::ConnectionClosed) => {
                QueryError::connection("SQLite connection is closed")
            }
            err @ Self::Sqlite(_) => QueryError::database(detail).with_source(err),
        }
    }
}

impl fmt::Display for SqliteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite(e) => write!(f, "SQLite error: {}", e),
            Self::Config(msg) => write!(f, "Configuration error: {}", msg),
            Self::Connection(msg) => write!(f, "Connection error: {}", msg),
            Self::TypeConversion(msg) => write!(f, "Type conversion error: {}", msg),
        }
    }
}

impl std::error::Error for SqliteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Sqlite(e) => Some(e),
            _ => None,
        }
    }
}

impl From<tokio_rusqlite::Error> for SqliteError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        Self::Sqlite(err)
    }
}

impl From<rusqlite::Error> for SqliteError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Sqlite(tokio_rusqlite::Error::Rusqlite(err))
    }
}

impl From<SqliteError> for QueryError {
    fn from(err: SqliteError) -> Self {
        err.into_query_error(None)
    }
}
