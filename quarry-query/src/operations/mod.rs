//! Operation dispatch.
//!
//! A request is a `(model, operation, options)` triple. The [`Dispatcher`]
//! decodes the options once, turns them into statement values and runs them
//! against whatever [`Executor`] it was given: a plain connection or a
//! transaction scope, the code path is the same.
//!
//! | Operation | Required options |
//! |---|---|
//! | `create` | `data` |
//! | `createMany`, `createManyAndReturn` | `data` (array) |
//! | `findUnique` | `where` |
//! | `findFirst`, `findMany`, `count` | none |
//! | `aggregate` | one of `_count`, `_sum`, `_avg`, `_min`, `_max` |
//! | `groupBy` | `by` |
//! | `update` | `where`, `data` |
//! | `updateMany`, `updateManyAndReturn` | `data` |
//! | `upsert` | `where`, `create`, `update` |
//! | `delete` | `where` |
//! | `deleteMany` | none |

mod aggregate;
mod read;
mod write;

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::convert::TypeConverter;
use crate::document::{apply_find_options, kind_of};
use crate::error::{QueryError, QueryResult};
use crate::filter::{Filter, FilterValue};
use crate::query::SelectQuery;
use crate::relations::IncludeOption;
use crate::schema::ModelSchema;
use crate::traits::Executor;
use crate::types::Record;

pub use aggregate::{
    AggregateField, AggregateKind, AggregateTarget, AggregationSpec, GroupBy, GroupOrder, HavingCondition,
    HavingOp, parse_having,
};

type Options = Map<String, Value>;

/// The operations a model supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Insert one record.
    Create,
    /// Insert several records, returning a count.
    CreateMany,
    /// Insert several records, returning them.
    CreateManyAndReturn,
    /// Read one record by a unique condition.
    FindUnique,
    /// Read the first matching record.
    FindFirst,
    /// Read matching records.
    FindMany,
    /// Count matching records.
    Count,
    /// Aggregate over matching records.
    Aggregate,
    /// Aggregate per group.
    GroupBy,
    /// Update one record.
    Update,
    /// Update matching records, returning a count.
    UpdateMany,
    /// Update matching records, returning them.
    UpdateManyAndReturn,
    /// Update a record or create it.
    Upsert,
    /// Delete one record.
    Delete,
    /// Delete matching records, returning a count.
    DeleteMany,
}

impl Operation {
    /// Every operation.
    pub const ALL: [Self; 15] = [
        Self::Create,
        Self::CreateMany,
        Self::CreateManyAndReturn,
        Self::FindUnique,
        Self::FindFirst,
        Self::FindMany,
        Self::Count,
        Self::Aggregate,
        Self::GroupBy,
        Self::Update,
        Self::UpdateMany,
        Self::UpdateManyAndReturn,
        Self::Upsert,
        Self::Delete,
        Self::DeleteMany,
    ];

    /// Wire name, e.g. `findMany`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::CreateMany => "createMany",
            Self::CreateManyAndReturn => "createManyAndReturn",
            Self::FindUnique => "findUnique",
            Self::FindFirst => "findFirst",
            Self::FindMany => "findMany",
            Self::Count => "count",
            Self::Aggregate => "aggregate",
            Self::GroupBy => "groupBy",
            Self::Update => "update",
            Self::UpdateMany => "updateMany",
            Self::UpdateManyAndReturn => "updateManyAndReturn",
            Self::Upsert => "upsert",
            Self::Delete => "delete",
            Self::DeleteMany => "deleteMany",
        }
    }

    /// Whether the operation writes.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Self::Create
                | Self::CreateMany
                | Self::CreateManyAndReturn
                | Self::Update
                | Self::UpdateMany
                | Self::UpdateManyAndReturn
                | Self::Upsert
                | Self::Delete
                | Self::DeleteMany
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| QueryError::unknown_operation(s))
    }
}

/// Routes operations to an executor.
pub struct Dispatcher<'a> {
    executor: &'a dyn Executor,
    converter: TypeConverter,
}

impl<'a> Dispatcher<'a> {
    /// Dispatch against `executor`, post-processing results with `converter`.
    pub fn new(executor: &'a dyn Executor, converter: TypeConverter) -> Self {
        Self { executor, converter }
    }

    /// Run one operation. `options` must be an object; `null` means no options.
    #[instrument(name = "quarry.execute", skip(self, options), fields(operation = %operation))]
    pub async fn execute(&self, model: &str, operation: Operation, options: &Value) -> QueryResult<Value> {
        let empty = Options::new();
        let options = match options {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => {
                return Err(QueryError::invalid_request(format!(
                    "options must be an object, got {}",
                    kind_of(other)
                ))
                .with_operation(operation.as_str()));
            }
        };
        let schema = self.executor.schema().model(model)?;
        debug!(model, operation = %operation, "dispatching");

        let result = match operation {
            Operation::Create => self.create(&schema, options).await,
            Operation::CreateMany => self.create_many(&schema, options, false).await,
            Operation::CreateManyAndReturn => self.create_many(&schema, options, true).await,
            Operation::FindUnique => self.find_one(&schema, options, true).await,
            Operation::FindFirst => self.find_one(&schema, options, false).await,
            Operation::FindMany => self.find_many(&schema, options).await,
            Operation::Count => self.count(&schema, options).await,
            Operation::Aggregate => self.aggregate(&schema, options).await,
            Operation::GroupBy => self.group_by(&schema, options).await,
            Operation::Update => self.update(&schema, options).await,
            Operation::UpdateMany => self.update_many(&schema, options).await,
            Operation::UpdateManyAndReturn => self.update_many_and_return(&schema, options).await,
            Operation::Upsert => self.upsert(&schema, options).await,
            Operation::Delete => self.delete(&schema, options).await,
            Operation::DeleteMany => self.delete_many(&schema, options).await,
        };

        result.map_err(|e| {
            let e = if e.context.operation.is_none() {
                e.with_operation(operation.as_str())
            } else {
                e
            };
            if e.context.model.is_none() { e.with_model(model) } else { e }
        })
    }

    /// A select over `schema` with the read options in `options` applied.
    fn read_query(&self, schema: &ModelSchema, options: &Options) -> QueryResult<SelectQuery> {
        let query = apply_find_options(SelectQuery::new(&schema.name), options)?;
        Ok(promote_relation_fields(schema, query))
    }

    /// Apply `select`/`include` of `options` to a row written by a mutation.
    /// Relations are loaded by re-reading the row through its primary key.
    async fn shape_written(&self, schema: &ModelSchema, row: Record, options: &Options) -> QueryResult<Record> {
        if !options.contains_key("select") && !options.contains_key("include") {
            return Ok(row);
        }
        let shaping = shaping_options(options);
        let query = self.read_query(schema, &shaping)?;
        if query.includes.is_empty() {
            return Ok(project(row, &query));
        }

        let identity = identity_filter(schema, &row).ok_or_else(|| {
            QueryError::invalid_select(format!(
                "cannot load relations of a {} record without a primary key",
                schema.name
            ))
        })?;
        self.executor
            .find_first(&query.where_condition(identity))
            .await?
            .ok_or_else(|| QueryError::not_found(&schema.name))
    }

    fn finish(&self, row: Record) -> Value {
        Value::Object(self.converter.coerce_result(row))
    }

    fn finish_many(&self, rows: Vec<Record>) -> Value {
        Value::Array(rows.into_iter().map(|row| self.finish(row)).collect())
    }
}

/// A required option; `null` counts as missing.
fn required<'o>(options: &'o Options, operation: Operation, key: &str) -> QueryResult<&'o Value> {
    match options.get(key) {
        None | Some(Value::Null) => Err(QueryError::missing_option(operation.as_str(), key)),
        Some(value) => Ok(value),
    }
}

/// A required object-valued option.
fn required_object<'o>(options: &'o Options, operation: Operation, key: &str) -> QueryResult<&'o Options> {
    let value = required(options, operation, key)?;
    value.as_object().ok_or_else(|| {
        QueryError::invalid_request(format!(
            "{}.{} must be an object, got {}",
            operation,
            key,
            kind_of(value)
        ))
        .with_field(key)
    })
}

/// Drop relation fields from write data; relations are not columns.
fn strip_relations(schema: &ModelSchema, data: &Options) -> Record {
    data.iter()
        .filter(|(key, _)| !schema.is_relation(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Move relation names listed as plain `select` fields to includes.
fn promote_relation_fields(schema: &ModelSchema, mut query: SelectQuery) -> SelectQuery {
    let (relations, fields): (Vec<String>, Vec<String>) =
        query.fields.into_iter().partition(|field| schema.is_relation(field));
    query.fields = fields;
    for relation in relations {
        let nested = format!("{}.", relation);
        let covered = query
            .includes
            .keys()
            .any(|path| path == &relation || path.starts_with(&nested));
        if !covered {
            query = query.include_with_options(IncludeOption::new(relation));
        }
    }
    query
}

/// `select` and `include` of an options map, nothing else.
fn shaping_options(options: &Options) -> Options {
    options
        .iter()
        .filter(|(key, _)| matches!(key.as_str(), "select" | "include"))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Keep the projected fields of `row` plus any loaded relations.
fn project(row: Record, query: &SelectQuery) -> Record {
    if query.fields.is_empty() {
        return row;
    }
    row.into_iter()
        .filter(|(key, _)| {
            query.fields.iter().any(|f| f == key)
                || query
                    .includes
                    .keys()
                    .any(|path| path.split('.').next() == Some(key.as_str()))
        })
        .collect()
}

/// Equality on the primary key values of `row`, if the model has a primary
/// key and the row carries all of it.
fn identity_filter(schema: &ModelSchema, row: &Record) -> Option<Filter> {
    let pk = schema.primary_key();
    if pk.is_empty() {
        return None;
    }
    let mut parts = Vec::with_capacity(pk.len());
    for field in pk {
        match row.get(&field.name) {
            None | Some(Value::Null) => return None,
            Some(value) => parts.push(Filter::Equals(field.name.clone(), FilterValue::from_json(value))),
        }
    }
    Some(Filter::and(parts))
}

/// Identity of `row` after `data` was written to it.
fn identity_after(schema: &ModelSchema, row: &Record, data: &Record) -> Option<Filter> {
    let mut merged = row.clone();
    for field in schema.primary_key() {
        if let Some(value) = data.get(&field.name) {
            merged.insert(field.name.clone(), value.clone());
        }
    }
    identity_filter(schema, &merged)
}

/// A filter matching any of `rows` by primary key.
fn identities_filter(schema: &ModelSchema, rows: &[Record]) -> Option<Filter> {
    let pk = schema.primary_key();
    if pk.is_empty() {
        return None;
    }
    if let [single] = pk.as_slice() {
        let values = rows
            .iter()
            .map(|row| row.get(&single.name).map(FilterValue::from_json))
            .collect::<Option<Vec<_>>>()?;
        return Some(Filter::In(single.name.clone(), values));
    }
    let parts = rows
        .iter()
        .map(|row| identity_filter(schema, row))
        .collect::<Option<Vec<_>>>()?;
    if parts.is_empty() {
        // An empty OR renders as `1 = 0`.
        return Some(Filter::Or(Vec::new()));
    }
    Some(Filter::or(parts))
}

#[cfg(test)]
mod tests;
