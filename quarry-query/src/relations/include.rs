//! Include resolution: `include` documents to flat, path-keyed load options.

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::document::{build_condition, kind_of, parse_order_by, parse_pagination};
use crate::error::{QueryError, QueryResult};
use crate::filter::Filter;
use crate::pagination::Pagination;
use crate::types::OrderByField;

/// Resolved includes keyed by dotted relation path, in document order.
pub type IncludeMap = IndexMap<String, IncludeOption>;

/// How to eagerly load one relation path.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IncludeOption {
    /// Dotted relation path, e.g. `posts.comments`.
    pub path: String,
    /// Fields to project; empty means all fields.
    pub select: Vec<String>,
    /// Filter on the related records.
    pub filter: Filter,
    /// Ordering of the related records.
    pub order_by: Vec<OrderByField>,
    /// Window applied per parent record.
    pub pagination: Pagination,
}

impl IncludeOption {
    /// A minimal include with no options.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Set the projected fields.
    pub fn select(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.select = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Set the filter.
    pub fn r#where(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    /// Add an ordering.
    pub fn order_by(mut self, order: OrderByField) -> Self {
        self.order_by.push(order);
        self
    }

    /// Limit the records loaded per parent.
    pub fn take(mut self, take: i64) -> Self {
        self.pagination.take = Some(take);
        self
    }

    /// Skip records per parent.
    pub fn skip(mut self, skip: i64) -> Self {
        self.pagination.skip = Some(skip);
        self
    }

    /// Path segments of this include.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path.split('.')
    }
}

/// Resolve a top-level `include` document (`{relation: true | options}`).
pub fn resolve_includes(doc: &Value) -> QueryResult<IncludeMap> {
    let map = doc.as_object().ok_or_else(|| {
        QueryError::invalid_select(format!("include must be an object, got {}", kind_of(doc)))
    })?;
    let mut out = IncludeMap::new();
    for (relation, options) in map {
        merge_includes(&mut out, resolve_include(relation, options)?);
    }
    Ok(out)
}

/// Merge `incoming` into `target`, keeping only leaf paths.
///
/// A later entry for the same path replaces the earlier one. A path that ends
/// up as the prefix of another path is dropped, along with its options.
pub fn merge_includes(target: &mut IncludeMap, incoming: IncludeMap) {
    target.extend(incoming);
    let parents: Vec<String> = target
        .keys()
        .filter(|path| {
            let prefix = format!("{}.", path);
            target.keys().any(|other| other.starts_with(&prefix))
        })
        .cloned()
        .collect();
    for parent in parents {
        target.shift_remove(&parent);
    }
}

/// Resolve the options for one relation.
///
/// When the options contain nested relations (through `include`, or through
/// object-valued `select` entries) only the nested paths are emitted and the
/// entry for `relation` itself is dropped. A plain `true` always yields a
/// minimal entry; `false` yields nothing.
///
/// ```rust
/// use quarry_query::relations::resolve_include;
/// use serde_json::json;
///
/// let map = resolve_include("posts", &json!({"include": {"comments": true}})).unwrap();
/// assert_eq!(map.keys().collect::<Vec<_>>(), vec!["posts.comments"]);
/// ```
pub fn resolve_include(relation: &str, doc: &Value) -> QueryResult<IncludeMap> {
    let mut out = IncludeMap::new();
    resolve_into(relation, doc, &mut out)?;
    Ok(out)
}

fn resolve_into(path: &str, doc: &Value, out: &mut IncludeMap) -> QueryResult<()> {
    match doc {
        Value::Bool(true) => {
            out.insert(path.to_string(), IncludeOption::new(path));
            Ok(())
        }
        Value::Bool(false) | Value::Null => Ok(()),
        Value::Object(options) => resolve_options(path, options, out),
        other => Err(QueryError::invalid_select(format!(
            "include `{}` expects true or an options object, got {}",
            path,
            kind_of(other)
        ))
        .with_field(path)),
    }
}

fn resolve_options(path: &str, options: &Map<String, Value>, out: &mut IncludeMap) -> QueryResult<()> {
    let mut option = IncludeOption::new(path);
    let mut nested = IncludeMap::new();

    if let Some(select) = options.get("select") {
        let selection = parse_selection(select)?;
        option.select = selection.fields;
        for (relation, doc) in selection.relations {
            resolve_into(&format!("{}.{}", path, relation), &doc, &mut nested)?;
        }
    }
    if let Some(filter) = options.get("where") {
        option.filter = build_condition(filter)?;
    }
    if let Some(order) = options.get("orderBy") {
        option.order_by = parse_order_by(order)?;
    }
    option.pagination = parse_pagination(options)?;

    if let Some(include) = options.get("include") {
        let include = include.as_object().ok_or_else(|| {
            QueryError::invalid_select(format!(
                "nested include of `{}` must be an object, got {}",
                path,
                kind_of(include)
            ))
        })?;
        for (relation, doc) in include {
            let mut resolved = IncludeMap::new();
            resolve_into(&format!("{}.{}", path, relation), doc, &mut resolved)?;
            merge_includes(&mut nested, resolved);
        }
    }

    if nested.is_empty() {
        out.insert(path.to_string(), option);
    } else {
        merge_includes(out, nested);
    }
    Ok(())
}

/// A parsed `select` document: scalar fields plus relation sub-documents.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Selection {
    /// Selected field names, in document order.
    pub fields: Vec<String>,
    /// Object-valued entries, treated as relation includes.
    pub relations: Vec<(String, Value)>,
}

/// Parse `select` as `{field: bool | {options}}` or `[field, ...]`.
pub fn parse_selection(doc: &Value) -> QueryResult<Selection> {
    let mut selection = Selection::default();
    match doc {
        Value::Object(map) => {
            for (field, value) in map {
                match value {
                    Value::Bool(true) => selection.fields.push(field.clone()),
                    Value::Bool(false) | Value::Null => {}
                    Value::Object(_) => selection.relations.push((field.clone(), value.clone())),
                    other => {
                        return Err(QueryError::invalid_select(format!(
                            "select entry `{}` expects a boolean or an object, got {}",
                            field,
                            kind_of(other)
                        ))
                        .with_field(field));
                    }
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                let field = item.as_str().ok_or_else(|| {
                    QueryError::invalid_select(format!(
                        "select list entries must be strings, got {}",
                        kind_of(item)
                    ))
                })?;
                selection.fields.push(field.to_string());
            }
        }
        other => {
            return Err(QueryError::invalid_select(format!(
                "select must be an object or an array, got {}",
                kind_of(other)
            )));
        }
    }
    Ok(selection)
}
