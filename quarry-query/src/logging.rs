//! Logging setup.
//!
//! Quarry emits `tracing` events under the `quarry`, `quarry_query` and
//! `quarry_sqlite` targets. Statement events (rendered SQL and parameter
//! counts) go through [`quarry_debug!`](crate::quarry_debug) and are dropped
//! unless debug logging is on, even when the host subscriber accepts `debug`.
//!
//! Settings come from the same [`EnvSource`] as [`ClientConfig`](crate::ClientConfig):
//!
//! | Variable | Values | Default |
//! |----------|--------|---------|
//! | `QUARRY_DEBUG` | boolean | off |
//! | `QUARRY_LOG_LEVEL` | `error`, `warn`, `info`, `debug`, `trace` | `debug` with `QUARRY_DEBUG`, else `warn` |
//! | `QUARRY_LOG_FORMAT` | `json`, `pretty`, `compact` | `json` |
//!
//! Installing a subscriber needs the `tracing-subscriber` feature. Without it
//! [`init`] only records the debug flag.
//!
//! ```rust
//! use quarry_query::config::MapEnvSource;
//! use quarry_query::logging::{LogLevel, LogSettings};
//!
//! let env = MapEnvSource::new().set("QUARRY_DEBUG", "1");
//! let settings = LogSettings::from_env_source(&env).unwrap();
//! assert_eq!(settings.effective_level(), LogLevel::Debug);
//! assert_eq!(
//!     settings.directives(),
//!     "quarry=debug,quarry_query=debug,quarry_sqlite=debug"
//! );
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Once;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::config::{EnvSource, StdEnvSource, parse_bool};
use crate::error::{QueryError, QueryResult};

/// Tracing targets that Quarry logs under.
pub const TARGETS: [&str; 3] = ["quarry", "quarry_query", "quarry_sqlite"];

static INIT: Once = Once::new();

const UNRESOLVED: u8 = 0;
const DEBUG_OFF: u8 = 1;
const DEBUG_ON: u8 = 2;

static DEBUG: AtomicU8 = AtomicU8::new(UNRESOLVED);

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Errors only.
    Error,
    /// Warnings and errors.
    Warn,
    /// Lifecycle events such as opening a database.
    Info,
    /// Dispatch, transactions and statements.
    Debug,
    /// Everything.
    Trace,
}

impl LogLevel {
    /// Directive name used in filters.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(QueryError::configuration(format!(
                "QUARRY_LOG_LEVEL must be one of error, warn, info, debug, trace; got `{}`",
                s
            ))),
        }
    }
}

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Multi-line human readable output.
    Pretty,
    /// Single-line human readable output.
    Compact,
}

impl FromStr for LogFormat {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            _ => Err(QueryError::configuration(format!(
                "QUARRY_LOG_FORMAT must be json, pretty or compact; got `{}`",
                s
            ))),
        }
    }
}

/// Resolved logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogSettings {
    /// Emit statement-level debug events.
    pub debug: bool,
    /// Explicit level; `None` derives it from `debug`.
    pub level: Option<LogLevel>,
    /// Subscriber output format.
    pub format: LogFormat,
}

impl LogSettings {
    /// Settings with statement logging on.
    pub fn debug() -> Self {
        Self {
            debug: true,
            ..Self::default()
        }
    }

    /// Set an explicit level.
    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = Some(level);
        self
    }

    /// Set the output format.
    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Read settings from the process environment.
    pub fn from_env() -> QueryResult<Self> {
        Self::from_env_source(&StdEnvSource)
    }

    /// Read settings from an environment source.
    pub fn from_env_source(env: &dyn EnvSource) -> QueryResult<Self> {
        let mut settings = Self::default();
        if let Some(flag) = env.get("QUARRY_DEBUG") {
            settings.debug = parse_bool("QUARRY_DEBUG", &flag)?;
        }
        if let Some(level) = env.get("QUARRY_LOG_LEVEL") {
            settings.level = Some(level.parse()?);
        }
        if let Some(format) = env.get("QUARRY_LOG_FORMAT") {
            settings.format = format.parse()?;
        }
        Ok(settings)
    }

    /// Whether a subscriber should be installed at all.
    pub fn is_enabled(&self) -> bool {
        self.debug || self.level.is_some()
    }

    /// The level applied to Quarry's targets.
    pub fn effective_level(&self) -> LogLevel {
        match self.level {
            Some(level) => level,
            None if self.debug => LogLevel::Debug,
            None => LogLevel::Warn,
        }
    }

    /// `EnvFilter` directives covering every Quarry target.
    pub fn directives(&self) -> String {
        let level = self.effective_level();
        TARGETS
            .iter()
            .map(|target| format!("{}={}", target, level))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Whether statement-level debug logging is on.
///
/// Resolved from `QUARRY_DEBUG` on first use unless [`init_with`] ran earlier.
#[inline]
pub fn is_debug_enabled() -> bool {
    match DEBUG.load(Ordering::Relaxed) {
        DEBUG_ON => true,
        DEBUG_OFF => false,
        _ => {
            let on = StdEnvSource
                .get("QUARRY_DEBUG")
                .and_then(|flag| parse_bool("QUARRY_DEBUG", &flag).ok())
                .unwrap_or(false);
            DEBUG.store(if on { DEBUG_ON } else { DEBUG_OFF }, Ordering::Relaxed);
            on
        }
    }
}

/// Configure logging from the process environment.
///
/// Installs nothing unless `QUARRY_DEBUG` or `QUARRY_LOG_LEVEL` is set.
/// Only the first installation takes effect.
///
/// ```rust,no_run
/// quarry_query::logging::init().expect("invalid logging environment");
/// ```
pub fn init() -> QueryResult<()> {
    init_with(&LogSettings::from_env()?);
    Ok(())
}

/// Configure logging from explicit settings.
pub fn init_with(settings: &LogSettings) {
    DEBUG.store(if settings.debug { DEBUG_ON } else { DEBUG_OFF }, Ordering::Relaxed);
    if settings.is_enabled() {
        INIT.call_once(|| install(settings));
    }
}

#[cfg(feature = "tracing-subscriber")]
fn install(settings: &LogSettings) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_new(settings.directives()).unwrap_or_else(|_| EnvFilter::new("warn"));
    // A host subscriber that is already installed wins.
    let installed = match settings.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty())
            .try_init(),
    };
    if installed.is_ok() {
        tracing::info!(
            level = %settings.effective_level(),
            format = ?settings.format,
            "Quarry logging initialized"
        );
    }
}

#[cfg(not(feature = "tracing-subscriber"))]
fn install(_settings: &LogSettings) {}

/// Debug event that is only emitted when statement logging is on.
#[macro_export]
macro_rules! quarry_debug {
    ($($arg:tt)*) => {
        if $crate::logging::is_debug_enabled() {
            tracing::debug!($($arg)*);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapEnvSource;
    use crate::error::ErrorCode;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_are_quiet() {
        let settings = LogSettings::from_env_source(&MapEnvSource::new()).unwrap();
        assert_eq!(settings, LogSettings::default());
        assert!(!settings.is_enabled());
        assert_eq!(settings.effective_level(), LogLevel::Warn);
    }

    #[test]
    fn test_explicit_level_wins_over_debug() {
        let env = MapEnvSource::new()
            .set("QUARRY_DEBUG", "yes")
            .set("QUARRY_LOG_LEVEL", "TRACE")
            .set("QUARRY_LOG_FORMAT", "compact");
        let settings = LogSettings::from_env_source(&env).unwrap();

        assert_eq!(settings, LogSettings::debug().level(LogLevel::Trace).format(LogFormat::Compact));
        assert_eq!(settings.directives(), "quarry=trace,quarry_query=trace,quarry_sqlite=trace");
    }

    #[test]
    fn test_level_alone_enables_subscriber() {
        let env = MapEnvSource::new().set("QUARRY_LOG_LEVEL", "info");
        let settings = LogSettings::from_env_source(&env).unwrap();
        assert!(settings.is_enabled());
        assert!(!settings.debug);
        assert_eq!(settings.effective_level(), LogLevel::Info);
    }

    #[test]
    fn test_invalid_values_are_configuration_errors() {
        for (name, value) in [
            ("QUARRY_DEBUG", "sometimes"),
            ("QUARRY_LOG_LEVEL", "verbose"),
            ("QUARRY_LOG_FORMAT", "xml"),
        ] {
            let env = MapEnvSource::new().set(name, value);
            let err = LogSettings::from_env_source(&env).unwrap_err();
            assert_eq!(err.code, ErrorCode::InvalidConfiguration, "{}", name);
        }
    }

    #[test]
    fn test_init_with_sets_statement_flag() {
        init_with(&LogSettings::default());
        assert!(!is_debug_enabled());
    }
}
