//! Client configuration.
//!
//! A [`ClientConfig`] can be built in code, read from the environment or
//! parsed from TOML:
//!
//! ```toml
//! operation_timeout_ms = 5000
//! type_conversion = true
//!
//! [transaction]
//! isolation = "serializable"
//! read_only = false
//! timeout_ms = 30000
//! ```
//!
//! Environment variables:
//! - `QUARRY_OPERATION_TIMEOUT_MS`: per-operation timeout in milliseconds
//! - `QUARRY_TYPE_CONVERSION`: force numeric coercion on (`true`) or off (`false`)
//! - `QUARRY_TRANSACTION_TIMEOUT_MS`: default transaction callback timeout
//!
//! ```rust
//! use std::time::Duration;
//! use quarry_query::config::ClientConfig;
//!
//! let config = ClientConfig::from_toml_str("operation_timeout_ms = 250").unwrap();
//! assert_eq!(config.operation_timeout, Some(Duration::from_millis(250)));
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{QueryError, QueryResult};
use crate::transaction::{AccessMode, IsolationLevel, TransactionConfig};

/// Source for environment variables.
pub trait EnvSource: Send + Sync {
    /// Get an environment variable value.
    fn get(&self, name: &str) -> Option<String>;
}

/// The process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdEnvSource;

impl EnvSource for StdEnvSource {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Environment source backed by a map, for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MapEnvSource {
    vars: HashMap<String, String>,
}

impl MapEnvSource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable.
    pub fn set(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }
}

impl EnvSource for MapEnvSource {
    fn get(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}

/// Settings applied by a [`Client`](crate::Client) to every operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientConfig {
    /// Deadline for a single operation, including all of its round trips.
    pub operation_timeout: Option<Duration>,
    /// Override the backend's numeric coercion flag.
    pub type_conversion: Option<bool>,
    /// Defaults for [`Client::transaction`](crate::Client::transaction).
    pub transaction: TransactionConfig,
}

impl ClientConfig {
    /// Default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-operation timeout.
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    /// Force numeric coercion on or off.
    pub fn type_conversion(mut self, enabled: bool) -> Self {
        self.type_conversion = Some(enabled);
        self
    }

    /// Set the default transaction configuration.
    pub fn transaction(mut self, config: TransactionConfig) -> Self {
        self.transaction = config;
        self
    }

    /// Read configuration from the process environment.
    pub fn from_env() -> QueryResult<Self> {
        Self::from_env_source(&StdEnvSource)
    }

    /// Read configuration from an arbitrary environment source.
    pub fn from_env_source(env: &dyn EnvSource) -> QueryResult<Self> {
        let mut config = Self::default();
        if let Some(ms) = env.get("QUARRY_OPERATION_TIMEOUT_MS") {
            config.operation_timeout = Some(Duration::from_millis(parse_millis(
                "QUARRY_OPERATION_TIMEOUT_MS",
                &ms,
            )?));
        }
        if let Some(flag) = env.get("QUARRY_TYPE_CONVERSION") {
            config.type_conversion = Some(parse_bool("QUARRY_TYPE_CONVERSION", &flag)?);
        }
        if let Some(ms) = env.get("QUARRY_TRANSACTION_TIMEOUT_MS") {
            config.transaction.timeout = Some(Duration::from_millis(parse_millis(
                "QUARRY_TRANSACTION_TIMEOUT_MS",
                &ms,
            )?));
        }
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> QueryResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            QueryError::configuration(format!("cannot read {}: {}", path.display(), e)).with_source(e)
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> QueryResult<Self> {
        let file: ConfigFile = toml::from_str(content)
            .map_err(|e| QueryError::configuration(format!("invalid configuration: {}", e)))?;
        file.into_config()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    operation_timeout_ms: Option<u64>,
    type_conversion: Option<bool>,
    #[serde(default)]
    transaction: TransactionFile,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TransactionFile {
    isolation: Option<String>,
    #[serde(default)]
    read_only: bool,
    timeout_ms: Option<u64>,
    #[serde(default)]
    deferrable: bool,
}

impl ConfigFile {
    fn into_config(self) -> QueryResult<ClientConfig> {
        let mut transaction = TransactionConfig::new();
        if let Some(level) = self.transaction.isolation.as_deref() {
            transaction.isolation = parse_isolation(level)?;
        }
        if self.transaction.read_only {
            transaction.access_mode = AccessMode::ReadOnly;
        }
        transaction.timeout = self.transaction.timeout_ms.map(Duration::from_millis);
        transaction.deferrable = self.transaction.deferrable;

        Ok(ClientConfig {
            operation_timeout: self.operation_timeout_ms.map(Duration::from_millis),
            type_conversion: self.type_conversion,
            transaction,
        })
    }
}

fn parse_isolation(level: &str) -> QueryResult<IsolationLevel> {
    match level.to_ascii_lowercase().replace(['-', '_', ' '], "").as_str() {
        "readuncommitted" => Ok(IsolationLevel::ReadUncommitted),
        "readcommitted" => Ok(IsolationLevel::ReadCommitted),
        "repeatableread" => Ok(IsolationLevel::RepeatableRead),
        "serializable" => Ok(IsolationLevel::Serializable),
        _ => Err(QueryError::configuration(format!("unknown isolation level `{}`", level))
            .with_suggestion("Use one of: read_uncommitted, read_committed, repeatable_read, serializable")),
    }
}

fn parse_millis(name: &str, value: &str) -> QueryResult<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| QueryError::configuration(format!("{} must be a number of milliseconds, got `{}`", name, value)))
}

pub(crate) fn parse_bool(name: &str, value: &str) -> QueryResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(QueryError::configuration(format!("{} must be a boolean, got `{}`", name, value))),
    }
}
