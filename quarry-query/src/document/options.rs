//! Ordering, pagination, projection, include and distinct options.
//!
//! Each `apply_*` function takes a [`SelectQuery`] and one option value and
//! returns the query with that option applied. [`apply_find_options`] runs
//! them in the fixed order where, orderBy, pagination, select, include,
//! distinct.

use serde_json::{Map, Value};

use super::{build_condition, kind_of};
use crate::error::{QueryError, QueryResult};
use crate::pagination::Pagination;
use crate::query::SelectQuery;
use crate::relations::{merge_includes, parse_selection, resolve_include, resolve_includes};
use crate::types::{Distinct, NullsOrder, OrderByField, SortOrder};

/// Parse `orderBy`: a `{field: direction}` map or an array of such maps.
///
/// Directions are case-insensitive and default to ascending. A direction may
/// also be `{sort, nulls}`.
pub fn parse_order_by(doc: &Value) -> QueryResult<Vec<OrderByField>> {
    let mut out = Vec::new();
    match doc {
        Value::Object(map) => order_entries(map, &mut out)?,
        Value::Array(items) => {
            for item in items {
                let map = item.as_object().ok_or_else(|| {
                    QueryError::invalid_input("orderBy", format!("array entries must be objects, got {}", kind_of(item)))
                })?;
                order_entries(map, &mut out)?;
            }
        }
        other => {
            return Err(QueryError::invalid_input(
                "orderBy",
                format!("expected an object or an array, got {}", kind_of(other)),
            ));
        }
    }
    Ok(out)
}

fn order_entries(map: &Map<String, Value>, out: &mut Vec<OrderByField>) -> QueryResult<()> {
    for (field, direction) in map {
        let entry = match direction {
            Value::String(dir) => OrderByField::new(field.clone(), SortOrder::parse(dir)),
            Value::Null => OrderByField::asc(field.clone()),
            Value::Object(spec) => {
                let order = spec
                    .get("sort")
                    .and_then(Value::as_str)
                    .map(SortOrder::parse)
                    .unwrap_or_default();
                let mut entry = OrderByField::new(field.clone(), order);
                match spec.get("nulls").and_then(Value::as_str) {
                    Some(n) if n.eq_ignore_ascii_case("first") => entry = entry.nulls(NullsOrder::First),
                    Some(n) if n.eq_ignore_ascii_case("last") => entry = entry.nulls(NullsOrder::Last),
                    _ => {}
                }
                entry
            }
            other => {
                return Err(QueryError::invalid_input(
                    "orderBy",
                    format!("direction of `{}` must be a string, got {}", field, kind_of(other)),
                )
                .with_field(field));
            }
        };
        out.push(entry);
    }
    Ok(())
}

/// Parse `distinct`: `true`, `false`, a field name or an array of field names.
pub fn parse_distinct(doc: &Value) -> QueryResult<Distinct> {
    match doc {
        Value::Bool(true) => Ok(Distinct::All),
        Value::Bool(false) | Value::Null => Ok(Distinct::None),
        Value::String(field) => Ok(Distinct::On(vec![field.clone()])),
        Value::Array(items) => {
            let fields = items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        QueryError::invalid_input("distinct", format!("entries must be strings, got {}", kind_of(item)))
                    })
                })
                .collect::<QueryResult<Vec<_>>>()?;
            Ok(if fields.is_empty() {
                Distinct::All
            } else {
                Distinct::On(fields)
            })
        }
        other => Err(QueryError::invalid_input(
            "distinct",
            format!("expected a boolean or an array, got {}", kind_of(other)),
        )),
    }
}

/// Read `skip` and `take` from an options map. Negative values pass through.
pub fn parse_pagination(options: &Map<String, Value>) -> QueryResult<Pagination> {
    Ok(Pagination {
        skip: options.get("skip").map(|v| integer("skip", v)).transpose()?.flatten(),
        take: options.get("take").map(|v| integer("take", v)).transpose()?.flatten(),
    })
}

fn integer(name: &str, value: &Value) -> QueryResult<Option<i64>> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(Some(i));
            }
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(Some(f as i64)),
                _ => Err(QueryError::invalid_input(name, format!("must be a whole number, got {}", n))),
            }
        }
        other => Err(QueryError::invalid_input(
            name,
            format!("must be a number, got {}", kind_of(other)),
        )),
    }
}

/// Apply a `where` document.
pub fn apply_where(query: SelectQuery, doc: &Value) -> QueryResult<SelectQuery> {
    Ok(query.where_condition(build_condition(doc)?))
}

/// Apply an `orderBy` document.
pub fn apply_order_by(mut query: SelectQuery, doc: &Value) -> QueryResult<SelectQuery> {
    query.order_by.extend(parse_order_by(doc)?);
    Ok(query)
}

/// Apply `skip`/`take` from an options map.
pub fn apply_pagination(mut query: SelectQuery, options: &Map<String, Value>) -> QueryResult<SelectQuery> {
    let pagination = parse_pagination(options)?;
    if pagination.skip.is_some() {
        query.pagination.skip = pagination.skip;
    }
    if pagination.take.is_some() {
        query.pagination.take = pagination.take;
    }
    Ok(query)
}

/// Apply a `select` document. Object-valued entries become includes.
pub fn apply_projection(mut query: SelectQuery, doc: &Value) -> QueryResult<SelectQuery> {
    let selection = parse_selection(doc)?;
    query.fields = selection.fields;
    for (relation, options) in selection.relations {
        merge_includes(&mut query.includes, resolve_include(&relation, &options)?);
    }
    Ok(query)
}

/// Apply an `include` document.
pub fn apply_includes(mut query: SelectQuery, doc: &Value) -> QueryResult<SelectQuery> {
    merge_includes(&mut query.includes, resolve_includes(doc)?);
    Ok(query)
}

/// Apply a `distinct` document.
pub fn apply_distinct(mut query: SelectQuery, doc: &Value) -> QueryResult<SelectQuery> {
    query.distinct = parse_distinct(doc)?;
    Ok(query)
}

/// Apply every read option present in `options`, in the fixed order
/// where, orderBy, pagination, select, include, distinct.
pub fn apply_find_options(query: SelectQuery, options: &Map<String, Value>) -> QueryResult<SelectQuery> {
    let mut query = query;
    if let Some(doc) = options.get("where") {
        query = apply_where(query, doc)?;
    }
    if let Some(doc) = options.get("orderBy") {
        query = apply_order_by(query, doc)?;
    }
    query = apply_pagination(query, options)?;
    if let Some(doc) = options.get("select") {
        query = apply_projection(query, doc)?;
    }
    if let Some(doc) = options.get("include") {
        query = apply_includes(query, doc)?;
    }
    if let Some(doc) = options.get("distinct") {
        query = apply_distinct(query, doc)?;
    }
    Ok(query)
}
