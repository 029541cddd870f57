//! Value conversion between query values, SQLite values and JSON.

use rusqlite::types::{Value, ValueRef};
use serde_json::Value as JsonValue;

use quarry_query::filter::FilterValue;
use quarry_query::schema::ModelSchema;
use quarry_query::types::Record;

/// Convert a FilterValue to a SQLite Value.
///
/// Booleans are stored as 0/1; JSON documents and lists as JSON text.
pub fn filter_value_to_sqlite(value: &FilterValue) -> Value {
    match value {
        FilterValue::Null => Value::Null,
        FilterValue::Bool(b) => Value::Integer(i64::from(*b)),
        FilterValue::Int(i) => Value::Integer(*i),
        FilterValue::Float(f) => Value::Real(*f),
        FilterValue::String(s) => Value::Text(s.clone()),
        FilterValue::Json(_) | FilterValue::List(_) => Value::Text(value.to_json().to_string()),
    }
}

/// Convert a SQLite ValueRef to a JSON Value.
pub fn from_sqlite_value(value: ValueRef<'_>) -> JsonValue {
    match value {
        ValueRef::Null => JsonValue::Null,
        ValueRef::Integer(i) => JsonValue::Number(i.into()),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        ValueRef::Text(bytes) => JsonValue::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => match std::str::from_utf8(bytes) {
            Ok(s) => JsonValue::String(s.to_string()),
            Err(_) => JsonValue::Array(bytes.iter().map(|b| JsonValue::from(*b)).collect()),
        },
    }
}

/// Read a row into a record keyed by column label.
pub fn row_to_record(row: &rusqlite::Row<'_>, columns: &[String]) -> rusqlite::Result<Record> {
    let mut record = Record::new();
    for (index, column) in columns.iter().enumerate() {
        record.insert(column.clone(), from_sqlite_value(row.get_ref(index)?));
    }
    Ok(record)
}

/// Decode the text of JSON fields back into documents.
///
/// Text that does not parse is left as a string.
pub fn decode_json_fields(schema: &ModelSchema, rows: &mut [Record]) {
    let fields: Vec<&str> = schema
        .fields
        .iter()
        .filter(|f| f.is_json)
        .map(|f| f.name.as_str())
        .collect();
    if fields.is_empty() {
        return;
    }
    for row in rows.iter_mut() {
        for field in &fields {
            let decoded = match row.get(*field) {
                Some(JsonValue::String(text)) => serde_json::from_str::<JsonValue>(text).ok(),
                _ => None,
            };
            if let (Some(doc), Some(slot)) = (decoded, row.get_mut(*field)) {
                *slot = doc;
            }
        }
    }
}
