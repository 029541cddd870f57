//! SQL generation utilities shared by the statement builders.

use crate::error::QueryResult;
use crate::filter::FilterValue;

/// SQL dialect of a backend.
///
/// Controls identifier quoting, parameter placeholders and pagination syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    /// PostgreSQL uses $1, $2, etc.
    #[default]
    PostgreSQL,
    /// MySQL uses ?, ?, etc.
    MySQL,
    /// SQLite uses ?, ?, etc.
    SQLite,
}

impl Dialect {
    /// Get the parameter placeholder for the 1-based parameter index.
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Self::PostgreSQL => format!("${}", index),
            Self::MySQL | Self::SQLite => "?".to_string(),
        }
    }

    /// Quote an identifier, doubling any embedded quote characters.
    pub fn quote_identifier(&self, name: &str) -> String {
        match self {
            Self::MySQL => format!("`{}`", name.replace('`', "``")),
            Self::PostgreSQL | Self::SQLite => format!("\"{}\"", name.replace('"', "\"\"")),
        }
    }

    /// Render a LIMIT/OFFSET tail (with a leading space), or an empty string.
    pub fn limit_offset(&self, take: Option<i64>, skip: Option<i64>) -> String {
        match (take, skip) {
            (Some(take), Some(skip)) if skip > 0 => format!(" LIMIT {} OFFSET {}", take, skip),
            (Some(take), _) => format!(" LIMIT {}", take),
            (None, Some(skip)) if skip > 0 => match self {
                Self::PostgreSQL => format!(" OFFSET {}", skip),
                Self::MySQL => format!(" LIMIT 18446744073709551615 OFFSET {}", skip),
                Self::SQLite => format!(" LIMIT -1 OFFSET {}", skip),
            },
            _ => String::new(),
        }
    }

    /// Whether `NULLS FIRST` / `NULLS LAST` is understood.
    pub fn supports_nulls_order(&self) -> bool {
        !matches!(self, Self::MySQL)
    }
}

/// Maps a field name of the current model to a quoted (and possibly
/// table-qualified) column expression.
pub trait ColumnResolver {
    /// Resolve `field` to a column expression, failing for unknown fields.
    fn column(&self, field: &str) -> QueryResult<String>;
}

/// A SQL builder that tracks bound parameters.
#[derive(Debug, Clone)]
pub struct SqlBuilder {
    dialect: Dialect,
    sql: String,
    params: Vec<FilterValue>,
}

impl SqlBuilder {
    /// Create a new SQL builder.
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    /// The dialect this builder renders for.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Push a literal SQL string.
    pub fn push(&mut self, sql: impl AsRef<str>) -> &mut Self {
        self.sql.push_str(sql.as_ref());
        self
    }

    /// Bind a parameter and push its placeholder.
    pub fn push_param(&mut self, value: impl Into<FilterValue>) -> &mut Self {
        let placeholder = self.bind(value);
        self.sql.push_str(&placeholder);
        self
    }

    /// Bind a parameter and return its placeholder without pushing it.
    pub fn bind(&mut self, value: impl Into<FilterValue>) -> String {
        self.params.push(value.into());
        self.dialect.placeholder(self.params.len())
    }

    /// Push a quoted identifier.
    pub fn push_identifier(&mut self, name: &str) -> &mut Self {
        let quoted = self.dialect.quote_identifier(name);
        self.sql.push_str(&quoted);
        self
    }

    /// Build the final SQL string and parameters.
    pub fn build(self) -> (String, Vec<FilterValue>) {
        (self.sql, self.params)
    }

    /// Get the current SQL string.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Get the current parameters.
    pub fn params(&self) -> &[FilterValue] {
        &self.params
    }
}
