//! Decoding of query documents.
//!
//! A document arrives as a [`serde_json::Value`] and is decoded once into
//! typed arguments: [`Filter`](crate::Filter) trees, orderings, pagination,
//! projections and includes. Any value with an unexpected shape is a request
//! error rather than being ignored.

mod condition;
mod options;

pub use condition::build_condition;
pub use options::{
    apply_distinct, apply_find_options, apply_includes, apply_order_by, apply_pagination,
    apply_projection, apply_where, parse_distinct, parse_order_by, parse_pagination,
};

use serde_json::Value;

/// Short name of a JSON value's type, for error messages.
pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
