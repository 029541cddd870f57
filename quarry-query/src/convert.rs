//! Post-processing of result rows for backends that return numbers as text.

use serde_json::{Number, Value};

use crate::types::Record;

/// Keys whose values are aggregate results.
pub const AGGREGATE_KEYS: [&str; 5] = ["_count", "_sum", "_avg", "_min", "_max"];

/// Numeric coercion strategy, chosen once per backend.
///
/// With conversion enabled every string that parses cleanly as a number is
/// replaced by that number. Aggregate values are always coerced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TypeConverter {
    needs_conversion: bool,
}

impl TypeConverter {
    /// Create a converter.
    pub fn new(needs_conversion: bool) -> Self {
        Self { needs_conversion }
    }

    /// Whether plain rows are coerced.
    pub fn needs_conversion(&self) -> bool {
        self.needs_conversion
    }

    /// Coerce a result row, recursing into nested objects and arrays.
    pub fn coerce_result(&self, record: Record) -> Record {
        if !self.needs_conversion {
            return record;
        }
        record
            .into_iter()
            .map(|(key, value)| (key, coerce_deep(value)))
            .collect()
    }

    /// Coerce an arbitrary result value.
    pub fn coerce_value(&self, value: Value) -> Value {
        if self.needs_conversion {
            coerce_deep(value)
        } else {
            value
        }
    }

    /// Coerce an aggregate row. Values under aggregate keys are always coerced;
    /// other values follow the conversion flag.
    pub fn coerce_aggregate_result(&self, record: Record) -> Record {
        record
            .into_iter()
            .map(|(key, value)| {
                let value = if AGGREGATE_KEYS.contains(&key.as_str()) {
                    coerce_deep(value)
                } else {
                    self.coerce_value(value)
                };
                (key, value)
            })
            .collect()
    }
}

fn coerce_deep(value: Value) -> Value {
    match value {
        Value::String(s) => parse_number(&s).unwrap_or(Value::String(s)),
        Value::Array(items) => Value::Array(items.into_iter().map(coerce_deep).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (key, coerce_deep(value)))
                .collect(),
        ),
        other => other,
    }
}

/// Parse `s` as an integer if it round-trips, otherwise as a finite float.
///
/// ```rust
/// use quarry_query::convert::parse_number;
/// use serde_json::json;
///
/// assert_eq!(parse_number("0"), Some(json!(0)));
/// assert_eq!(parse_number("12.50"), Some(json!(12.5)));
/// assert_eq!(parse_number("3.0"), Some(json!(3)));
/// assert_eq!(parse_number("abc"), None);
/// ```
pub fn parse_number(s: &str) -> Option<Value> {
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::from(i));
    }
    let f = s.parse::<f64>().ok().filter(|f| f.is_finite())?;
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        return Some(Value::from(f as i64));
    }
    Number::from_f64(f).map(Value::Number)
}
