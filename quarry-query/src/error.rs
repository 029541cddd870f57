//! Error types for query translation and execution.
//!
//! Every failure surfaced by the dispatcher is a [`QueryError`] carrying an
//! [`ErrorCode`]. Codes are grouped by category so callers can branch on the
//! kind of failure without string matching:
//!
//! - 1xxx: Request errors (malformed documents, unknown operations or fields)
//! - 2xxx: Constraint violations (unique, foreign key, ...)
//! - 3xxx: Lookup errors (record not found)
//! - 4xxx: Transaction errors
//! - 5xxx: Execution errors (backend failures, timeouts)
//! - 9xxx: Internal errors
//!
//! ```rust
//! use quarry_query::{ErrorCode, QueryError};
//!
//! let err = QueryError::not_found("User");
//! assert_eq!(err.code, ErrorCode::RecordNotFound);
//! assert!(err.is_not_found());
//!
//! let err = QueryError::missing_option("findUnique", "where");
//! assert!(err.is_request_error());
//! ```

use std::fmt;
use thiserror::Error;

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Request errors (1xxx)
    /// The options document has an unexpected shape (Q1001).
    InvalidRequest = 1001,
    /// A required option is missing (Q1002).
    RequiredFieldMissing = 1002,
    /// Invalid where clause or operator (Q1003).
    InvalidFilter = 1003,
    /// Invalid select or include (Q1004).
    InvalidSelect = 1004,
    /// Invalid pagination, ordering or aggregation parameter (Q1005).
    InvalidParameter = 1005,
    /// Unknown operation name (Q1006).
    UnknownOperation = 1006,
    /// Unknown model (Q1007).
    UnknownModel = 1007,
    /// Unknown field on a model (Q1008).
    UnknownField = 1008,

    // Constraint errors (2xxx)
    /// Unique constraint violation (Q2001).
    UniqueConstraint = 2001,
    /// Foreign key constraint violation (Q2002).
    ForeignKeyConstraint = 2002,
    /// Check constraint violation (Q2003).
    CheckConstraint = 2003,
    /// Not null constraint violation (Q2004).
    NotNullConstraint = 2004,

    // Lookup errors (3xxx)
    /// Record not found (Q3001).
    RecordNotFound = 3001,

    // Transaction errors (4xxx)
    /// Transaction failed (Q4001).
    TransactionFailed = 4001,
    /// Transaction already committed or rolled back (Q4004).
    TransactionClosed = 4004,

    // Execution errors (5xxx)
    /// Operation timeout (Q5001).
    QueryTimeout = 5001,
    /// Could not open or reach the database (Q5002).
    ConnectionFailed = 5002,
    /// General database error (Q5005).
    DatabaseError = 5005,
    /// Value could not be converted (Q5006).
    SerializationError = 5006,

    // Internal errors (9xxx)
    /// Invalid configuration (Q9002).
    InvalidConfiguration = 9002,
    /// Internal error (Q9001).
    Internal = 9001,
}

impl ErrorCode {
    /// Get the error code string (e.g., "Q3001").
    pub fn code(&self) -> String {
        format!("Q{}", *self as u16)
    }

    /// Get a short description of the error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "Invalid request",
            Self::RequiredFieldMissing => "Required option missing",
            Self::InvalidFilter => "Invalid filter condition",
            Self::InvalidSelect => "Invalid select or include",
            Self::InvalidParameter => "Invalid parameter",
            Self::UnknownOperation => "Unknown operation",
            Self::UnknownModel => "Unknown model",
            Self::UnknownField => "Unknown field",
            Self::UniqueConstraint => "Unique constraint violation",
            Self::ForeignKeyConstraint => "Foreign key constraint violation",
            Self::CheckConstraint => "Check constraint violation",
            Self::NotNullConstraint => "Not null constraint violation",
            Self::RecordNotFound => "Record not found",
            Self::TransactionFailed => "Transaction failed",
            Self::TransactionClosed => "Transaction already closed",
            Self::QueryTimeout => "Operation timeout",
            Self::ConnectionFailed => "Database connection failed",
            Self::DatabaseError => "Database error",
            Self::SerializationError => "Serialization error",
            Self::InvalidConfiguration => "Invalid configuration",
            Self::Internal => "Internal error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Additional context for an error.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// The operation that was being performed.
    pub operation: Option<String>,
    /// The model involved.
    pub model: Option<String>,
    /// The field involved.
    pub field: Option<String>,
    /// The SQL statement (if available).
    pub sql: Option<String>,
    /// Suggestions for fixing the error.
    pub suggestions: Vec<String>,
}

/// Errors that can occur during query operations.
#[derive(Error, Debug)]
pub struct QueryError {
    /// The error code.
    pub code: ErrorCode,
    /// The error message.
    pub message: String,
    /// Additional context.
    pub context: ErrorContext,
    /// The source error (if any).
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.code(), self.message)
    }
}

impl QueryError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: ErrorContext::default(),
            source: None,
        }
    }

    /// Record the operation that failed.
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.context.operation = Some(operation.into());
        self
    }

    /// Add a suggestion for fixing the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.context.suggestions.push(suggestion.into());
        self
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.context.model = Some(model.into());
        self
    }

    /// Set the field.
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.context.field = Some(field.into());
        self
    }

    /// Set the SQL statement.
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.context.sql = Some(sql.into());
        self
    }

    /// Set the source error.
    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // ============== Request Errors ==============

    /// The options document (or part of it) has the wrong shape.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    /// A required option is absent.
    pub fn missing_option(operation: impl Into<String>, option: impl Into<String>) -> Self {
        let operation = operation.into();
        let option = option.into();
        Self::new(
            ErrorCode::RequiredFieldMissing,
            format!("{} requires a `{}` option", operation, option),
        )
        .with_operation(operation)
        .with_field(option)
    }

    /// An invalid where condition.
    pub fn invalid_filter(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidFilter, message)
    }

    /// An unrecognized comparison operator in a where condition.
    pub fn unknown_operator(field: impl Into<String>, operator: impl Into<String>) -> Self {
        let field = field.into();
        let operator = operator.into();
        Self::new(
            ErrorCode::InvalidFilter,
            format!("Unknown operator `{}` on field `{}`", operator, field),
        )
        .with_field(field)
        .with_suggestion(
            "Supported operators: equals, not, in, notIn, lt, lte, gt, gte, contains, startsWith, endsWith, between",
        )
    }

    /// An invalid select or include.
    pub fn invalid_select(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidSelect, message)
    }

    /// An invalid input value.
    pub fn invalid_input(field: impl Into<String>, message: impl Into<String>) -> Self {
        let field = field.into();
        let message = message.into();
        Self::new(
            ErrorCode::InvalidParameter,
            format!("Invalid input for {}: {}", field, message),
        )
        .with_field(field)
    }

    /// An operation name the dispatcher does not know.
    pub fn unknown_operation(operation: impl Into<String>) -> Self {
        let operation = operation.into();
        Self::new(
            ErrorCode::UnknownOperation,
            format!("Unknown operation `{}`", operation),
        )
        .with_operation(operation)
    }

    /// A model missing from the schema.
    pub fn unknown_model(model: impl Into<String>) -> Self {
        let model = model.into();
        Self::new(ErrorCode::UnknownModel, format!("Unknown model `{}`", model)).with_model(model)
    }

    /// A field missing from a model's schema.
    pub fn unknown_field(model: impl Into<String>, field: impl Into<String>) -> Self {
        let model = model.into();
        let field = field.into();
        Self::new(
            ErrorCode::UnknownField,
            format!("Unknown field `{}` on model `{}`", field, model),
        )
        .with_model(model)
        .with_field(field)
    }

    // ============== Lookup Errors ==============

    /// Create a not found error.
    pub fn not_found(model: impl Into<String>) -> Self {
        let model = model.into();
        Self::new(
            ErrorCode::RecordNotFound,
            format!("No {} record found matching the query", model),
        )
        .with_model(model)
        .with_suggestion("Use findMany to get an empty list instead of an error")
    }

    // ============== Constraint Errors ==============

    /// Create a unique constraint violation error.
    pub fn unique_violation(model: impl Into<String>, detail: impl Into<String>) -> Self {
        let model = model.into();
        let detail = detail.into();
        Self::new(
            ErrorCode::UniqueConstraint,
            format!("Unique constraint violated on {}: {}", model, detail),
        )
        .with_model(model)
        .with_suggestion("Use upsert to update the existing record instead")
    }

    /// Create a foreign key violation error.
    pub fn foreign_key_violation(model: impl Into<String>, detail: impl Into<String>) -> Self {
        let model = model.into();
        let detail = detail.into();
        Self::new(
            ErrorCode::ForeignKeyConstraint,
            format!("Foreign key constraint violated on {}: {}", model, detail),
        )
        .with_model(model)
        .with_suggestion("Ensure the related record exists")
    }

    /// Create a not null violation error.
    pub fn not_null_violation(model: impl Into<String>, detail: impl Into<String>) -> Self {
        let model = model.into();
        let detail = detail.into();
        Self::new(
            ErrorCode::NotNullConstraint,
            format!("Not null constraint violated on {}: {}", model, detail),
        )
        .with_model(model)
    }

    /// Create a check constraint violation error.
    pub fn check_violation(model: impl Into<String>, detail: impl Into<String>) -> Self {
        let model = model.into();
        let detail = detail.into();
        Self::new(
            ErrorCode::CheckConstraint,
            format!("Check constraint violated on {}: {}", model, detail),
        )
        .with_model(model)
    }

    // ============== Transaction Errors ==============

    /// Create a transaction error.
    pub fn transaction(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(
            ErrorCode::TransactionFailed,
            format!("Transaction error: {}", message),
        )
    }

    /// A scope was used after it committed or rolled back.
    pub fn transaction_closed(state: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::TransactionClosed,
            format!("Transaction scope is already {}", state),
        )
        .with_suggestion("Do not keep the transaction client past the end of its callback")
    }

    // ============== Execution Errors ==============

    /// Create a timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::new(
            ErrorCode::QueryTimeout,
            format!("Operation timed out after {}ms", duration_ms),
        )
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(
            ErrorCode::ConnectionFailed,
            format!("Connection error: {}", message),
        )
    }

    /// Create a general database error. The message is propagated unchanged.
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    /// Create a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SerializationError, message.into())
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConfiguration, message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(ErrorCode::Internal, format!("Internal error: {}", message))
    }

    // ============== Error Checks ==============

    /// Check if this is a not found error.
    pub fn is_not_found(&self) -> bool {
        self.code == ErrorCode::RecordNotFound
    }

    /// Check if the request itself was malformed.
    pub fn is_request_error(&self) -> bool {
        (1000..2000).contains(&(self.code as u16))
    }

    /// Check if this is a constraint violation.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::UniqueConstraint
                | ErrorCode::ForeignKeyConstraint
                | ErrorCode::CheckConstraint
                | ErrorCode::NotNullConstraint
        )
    }

    /// Check if this is a unique constraint violation.
    pub fn is_unique_violation(&self) -> bool {
        self.code == ErrorCode::UniqueConstraint
    }

    /// Check if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        self.code == ErrorCode::QueryTimeout
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::QueryTimeout | ErrorCode::ConnectionFailed
        )
    }

    /// Display the full error with all context and suggestions.
    pub fn display_full(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("Error [{}]: {}\n", self.code.code(), self.message));

        if let Some(ref op) = self.context.operation {
            output.push_str(&format!("  → While: {}\n", op));
        }
        if let Some(ref model) = self.context.model {
            output.push_str(&format!("  → Model: {}\n", model));
        }
        if let Some(ref field) = self.context.field {
            output.push_str(&format!("  → Field: {}\n", field));
        }

        if let Some(ref sql) = self.context.sql {
            let sql_display = if sql.len() > 200 {
                let cut = (0..=200).rev().find(|i| sql.is_char_boundary(*i)).unwrap_or(0);
                format!("{}...", &sql[..cut])
            } else {
                sql.clone()
            };
            output.push_str(&format!("  → SQL: {}\n", sql_display));
        }

        if !self.context.suggestions.is_empty() {
            output.push_str("\nSuggestions:\n");
            for (i, suggestion) in self.context.suggestions.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, suggestion));
            }
        }

        output
    }
}

/// Helper for creating errors with context.
#[macro_export]
macro_rules! query_error {
    ($code:expr, $msg:expr) => {
        $crate::error::QueryError::new($code, $msg)
    };
    ($code:expr, $msg:expr, $($key:ident = $value:expr),+ $(,)?) => {{
        let mut err = $crate::error::QueryError::new($code, $msg);
        $(
            err = err.$key($value);
        )+
        err
    }};
}
