//! Turns a `where` document into a [`Filter`].

use serde_json::{Map, Value};

use super::kind_of;
use crate::error::{QueryError, QueryResult};
use crate::filter::{Filter, FilterValue};

/// Build a condition tree from a `where` document.
///
/// Sibling keys are combined with AND. `AND`, `OR` and `NOT` accept either a
/// single document or an array of documents; `NOT` over an array negates each
/// document separately. Returns [`Filter::None`] when the
/// document (or every child) is empty.
///
/// ```rust
/// use quarry_query::document::build_condition;
/// use quarry_query::{Filter, FilterValue};
/// use serde_json::json;
///
/// let filter = build_condition(&json!({"name": {"not": null}})).unwrap();
/// assert_eq!(filter, Filter::IsNotNull("name".to_string()));
///
/// let filter = build_condition(&json!({"age": {"gte": 18, "lt": 65}})).unwrap();
/// assert_eq!(
///     filter,
///     Filter::And(vec![
///         Filter::Gte("age".to_string(), FilterValue::Int(18)),
///         Filter::Lt("age".to_string(), FilterValue::Int(65)),
///     ])
/// );
/// ```
pub fn build_condition(doc: &Value) -> QueryResult<Filter> {
    let map = doc.as_object().ok_or_else(|| {
        QueryError::invalid_filter(format!("where must be an object, got {}", kind_of(doc)))
    })?;

    let mut parts = Vec::with_capacity(map.len());
    for (key, value) in map {
        let part = match key.as_str() {
            "AND" => Filter::and(children(key, value)?),
            "OR" => Filter::or(children(key, value)?),
            // An array under NOT matches rows that satisfy none of the documents.
            "NOT" => Filter::and(children(key, value)?.into_iter().map(Filter::not)),
            field => field_condition(field, value)?,
        };
        parts.push(part);
    }
    Ok(Filter::and(parts))
}

fn children(key: &str, value: &Value) -> QueryResult<Vec<Filter>> {
    match value {
        Value::Array(items) => items.iter().map(build_condition).collect(),
        Value::Object(_) => Ok(vec![build_condition(value)?]),
        other => Err(QueryError::invalid_filter(format!(
            "{} expects an object or an array of objects, got {}",
            key,
            kind_of(other)
        ))),
    }
}

fn field_condition(field: &str, value: &Value) -> QueryResult<Filter> {
    match value {
        Value::Null => Ok(Filter::IsNull(field.to_string())),
        Value::Object(ops) => operators(field, ops),
        Value::Array(_) => Err(QueryError::invalid_filter(format!(
            "field `{}` cannot be compared to an array, use `in`",
            field
        ))
        .with_field(field)),
        scalar => Ok(Filter::Equals(field.to_string(), FilterValue::from_json(scalar))),
    }
}

fn operators(field: &str, ops: &Map<String, Value>) -> QueryResult<Filter> {
    let name = || field.to_string();
    let mut parts = Vec::with_capacity(ops.len());

    for (op, val) in ops {
        let part = match op.as_str() {
            "equals" => match val {
                Value::Null => Filter::IsNull(name()),
                v => Filter::Equals(name(), scalar(field, op, v)?),
            },
            "not" => match val {
                Value::Null => Filter::IsNotNull(name()),
                Value::Object(inner) => Filter::not(operators(field, inner)?),
                v => Filter::NotEquals(name(), scalar(field, op, v)?),
            },
            "in" => Filter::In(name(), list(field, op, val)?),
            "notIn" => Filter::NotIn(name(), list(field, op, val)?),
            "lt" => Filter::Lt(name(), scalar(field, op, val)?),
            "lte" => Filter::Lte(name(), scalar(field, op, val)?),
            "gt" => Filter::Gt(name(), scalar(field, op, val)?),
            "gte" => Filter::Gte(name(), scalar(field, op, val)?),
            "contains" => Filter::Contains(name(), text(field, op, val)?),
            "startsWith" => Filter::StartsWith(name(), text(field, op, val)?),
            "endsWith" => Filter::EndsWith(name(), text(field, op, val)?),
            "between" => {
                let mut bounds = list(field, op, val)?;
                if bounds.len() != 2 {
                    return Err(QueryError::invalid_filter(format!(
                        "between on `{}` expects exactly two values, got {}",
                        field,
                        bounds.len()
                    ))
                    .with_field(field));
                }
                let high = bounds.remove(1);
                let low = bounds.remove(0);
                Filter::Between(name(), low, high)
            }
            "isNull" => match val {
                Value::Bool(true) => Filter::IsNull(name()),
                Value::Bool(false) => Filter::IsNotNull(name()),
                other => return Err(bad_operand(field, op, "a boolean", other)),
            },
            unknown => return Err(QueryError::unknown_operator(field, unknown)),
        };
        parts.push(part);
    }

    Ok(Filter::and(parts))
}

fn scalar(field: &str, op: &str, val: &Value) -> QueryResult<FilterValue> {
    match val {
        Value::Array(_) | Value::Object(_) => Err(bad_operand(field, op, "a scalar", val)),
        v => Ok(FilterValue::from_json(v)),
    }
}

fn list(field: &str, op: &str, val: &Value) -> QueryResult<Vec<FilterValue>> {
    match val {
        Value::Array(items) => Ok(items.iter().map(FilterValue::from_json).collect()),
        other => Err(bad_operand(field, op, "an array", other)),
    }
}

fn text(field: &str, op: &str, val: &Value) -> QueryResult<FilterValue> {
    match val {
        Value::String(s) => Ok(FilterValue::String(s.clone())),
        Value::Number(n) => Ok(FilterValue::String(n.to_string())),
        Value::Bool(b) => Ok(FilterValue::String(b.to_string())),
        other => Err(bad_operand(field, op, "a string", other)),
    }
}

fn bad_operand(field: &str, op: &str, expected: &str, got: &Value) -> QueryError {
    QueryError::invalid_filter(format!(
        "`{}` on field `{}` expects {}, got {}",
        op,
        field,
        expected,
        kind_of(got)
    ))
    .with_field(field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn f(name: &str) -> String {
        name.to_string()
    }

    #[test]
    fn test_empty_document_is_no_filter() {
        assert_eq!(build_condition(&json!({})).unwrap(), Filter::None);
        assert_eq!(build_condition(&json!({"AND": []})).unwrap(), Filter::None);
        assert_eq!(build_condition(&json!({"OR": [{}, {}]})).unwrap(), Filter::None);
    }

    #[test]
    fn test_scalar_and_null_equality() {
        assert_eq!(
            build_condition(&json!({"email": "a@b.c"})).unwrap(),
            Filter::Equals(f("email"), "a@b.c".into())
        );
        assert_eq!(
            build_condition(&json!({"deletedAt": null})).unwrap(),
            Filter::IsNull(f("deletedAt"))
        );
        assert_eq!(
            build_condition(&json!({"deletedAt": {"equals": null}})).unwrap(),
            Filter::IsNull(f("deletedAt"))
        );
    }

    #[test]
    fn test_siblings_are_anded_in_order() {
        let filter = build_condition(&json!({"role": "admin", "active": true})).unwrap();
        assert_eq!(
            filter,
            Filter::And(vec![
                Filter::Equals(f("role"), "admin".into()),
                Filter::Equals(f("active"), true.into()),
            ])
        );
    }

    #[test]
    fn test_or_and_not() {
        let filter = build_condition(&json!({
            "OR": [{"name": {"startsWith": "A"}}, {"age": {"in": [1, 2]}}],
            "NOT": {"role": "guest"}
        }))
        .unwrap();

        assert_eq!(
            filter,
            Filter::And(vec![
                Filter::Or(vec![
                    Filter::StartsWith(f("name"), "A".into()),
                    Filter::In(f("age"), vec![1.into(), 2.into()]),
                ]),
                Filter::Not(Box::new(Filter::Equals(f("role"), "guest".into()))),
            ])
        );
    }

    #[test]
    fn test_not_with_operator_object() {
        let filter = build_condition(&json!({"age": {"not": {"gt": 10}}})).unwrap();
        assert_eq!(filter, Filter::Not(Box::new(Filter::Gt(f("age"), 10.into()))));

        let filter = build_condition(&json!({"title": {"not": "draft"}})).unwrap();
        assert_eq!(filter, Filter::NotEquals(f("title"), "draft".into()));
    }

    #[test]
    fn test_not_array_matches_none_of() {
        let filter = build_condition(&json!({"NOT": [{"role": "a"}, {"active": true}]})).unwrap();
        assert_eq!(
            filter,
            Filter::And(vec![
                Filter::Not(Box::new(Filter::Equals(f("role"), "a".into()))),
                Filter::Not(Box::new(Filter::Equals(f("active"), true.into()))),
            ])
        );

        // A single document with several keys is negated as a whole.
        let filter = build_condition(&json!({"NOT": {"role": "a", "active": true}})).unwrap();
        assert_eq!(
            filter,
            Filter::Not(Box::new(Filter::And(vec![
                Filter::Equals(f("role"), "a".into()),
                Filter::Equals(f("active"), true.into()),
            ])))
        );
    }

    #[test]
    fn test_double_negation_over_null() {
        let filter = build_condition(&json!({"NOT": {"name": {"not": null}}})).unwrap();
        assert_eq!(filter, Filter::IsNull(f("name")));
    }

    #[test]
    fn test_between_and_is_null() {
        let filter = build_condition(&json!({"age": {"between": [18, 30]}})).unwrap();
        assert_eq!(filter, Filter::Between(f("age"), 18.into(), 30.into()));

        let filter = build_condition(&json!({"bio": {"isNull": false}})).unwrap();
        assert_eq!(filter, Filter::IsNotNull(f("bio")));

        let err = build_condition(&json!({"age": {"between": [1]}})).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidFilter);
    }

    #[test]
    fn test_contains_stringifies_numbers() {
        let filter = build_condition(&json!({"code": {"contains": 42}})).unwrap();
        assert_eq!(filter, Filter::Contains(f("code"), "42".into()));
    }

    #[test]
    fn test_unknown_operator_is_rejected() {
        let err = build_condition(&json!({"age": {"near": 5}})).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidFilter);
        assert!(err.message.contains("near"));
    }

    #[test]
    fn test_malformed_operands() {
        assert!(build_condition(&json!({"id": {"in": 3}})).is_err());
        assert!(build_condition(&json!({"id": [1, 2]})).is_err());
        assert!(build_condition(&json!({"OR": 1})).is_err());
        assert!(build_condition(&json!("id = 1")).is_err());
    }
}
