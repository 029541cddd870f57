//! create, update, upsert and delete.
//!
//! Single-record mutations read the target row first, mutate it through its
//! primary key and then read it back (or take the row from `RETURNING` when
//! the backend supports it). A row that vanishes between the read and the
//! mutation is reported as not found.

use serde_json::{Value, json};
use tracing::debug;

use super::{
    Dispatcher, Operation, Options, identities_filter, identity_after, identity_filter, project, required,
    required_object, shaping_options, strip_relations,
};
use crate::document::{build_condition, kind_of};
use crate::error::{QueryError, QueryResult};
use crate::filter::Filter;
use crate::query::{DeleteQuery, InsertQuery, SelectQuery, UpdateQuery};
use crate::schema::ModelSchema;
use crate::types::Record;

fn optional_where(options: &Options) -> QueryResult<Filter> {
    match options.get("where") {
        Some(doc) => build_condition(doc),
        None => Ok(Filter::None),
    }
}

impl Dispatcher<'_> {
    /// Insert `data` and return the stored row.
    async fn insert_one(&self, schema: &ModelSchema, data: Record) -> QueryResult<Record> {
        let mut query = InsertQuery::new(&schema.name, data);
        if self.executor.capabilities().supports_returning {
            query = query.returning();
        }
        let result = self.executor.insert(&query).await?;
        if let Some(row) = result.rows.into_iter().next() {
            return Ok(row);
        }

        let mut row = query.data;
        if let ([pk], Some(id)) = (schema.primary_key().as_slice(), result.last_insert_id) {
            if row.get(&pk.name).is_none_or(Value::is_null) {
                row.insert(pk.name.clone(), Value::from(id));
            }
        }
        // Read back defaults and generated columns.
        if let Some(identity) = identity_filter(schema, &row) {
            let query = SelectQuery::new(&schema.name).where_condition(identity);
            if let Some(stored) = self.executor.find_first(&query).await? {
                return Ok(stored);
            }
        }
        Ok(row)
    }

    /// Apply `data` to a row found by a previous read.
    async fn update_existing(
        &self,
        schema: &ModelSchema,
        existing: Record,
        filter: Filter,
        data: Record,
    ) -> QueryResult<Record> {
        if data.is_empty() {
            return Ok(existing);
        }
        let target = identity_filter(schema, &existing).unwrap_or(filter);

        let mut query = UpdateQuery::new(&schema.name, data).where_condition(target.clone());
        if self.executor.capabilities().supports_returning {
            query = query.returning();
        }
        let result = self.executor.update(&query).await?;
        if result.rows_affected == 0 {
            debug!(model = %schema.name, "row disappeared before update");
            return Err(QueryError::not_found(&schema.name));
        }
        if let Some(row) = result.rows.into_iter().next() {
            return Ok(row);
        }

        let after = identity_after(schema, &existing, &query.data).unwrap_or(target);
        self.executor
            .find_first(&SelectQuery::new(&schema.name).where_condition(after))
            .await?
            .ok_or_else(|| QueryError::not_found(&schema.name))
    }

    pub(super) async fn create(&self, schema: &ModelSchema, options: &Options) -> QueryResult<Value> {
        let data = strip_relations(schema, required_object(options, Operation::Create, "data")?);
        let row = self.insert_one(schema, data).await?;
        let row = self.shape_written(schema, row, options).await?;
        Ok(self.finish(row))
    }

    /// createMany and createManyAndReturn: one insert per element.
    pub(super) async fn create_many(&self, schema: &ModelSchema, options: &Options, returning: bool) -> QueryResult<Value> {
        let operation = if returning {
            Operation::CreateManyAndReturn
        } else {
            Operation::CreateMany
        };
        let items = match required(options, operation, "data")? {
            Value::Array(items) => items,
            other => {
                return Err(QueryError::invalid_request(format!(
                    "{}.data must be an array, got {}",
                    operation,
                    kind_of(other)
                ))
                .with_field("data"));
            }
        };
        let skip_duplicates = match options.get("skipDuplicates") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(flag)) => *flag,
            Some(other) => {
                return Err(QueryError::invalid_input(
                    "skipDuplicates",
                    format!("must be a boolean, got {}", kind_of(other)),
                ));
            }
        };
        let rows = items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                item.as_object().map(|data| strip_relations(schema, data)).ok_or_else(|| {
                    QueryError::invalid_request(format!(
                        "{}.data[{}] must be an object, got {}",
                        operation,
                        index,
                        kind_of(item)
                    ))
                })
            })
            .collect::<QueryResult<Vec<_>>>()?;

        let mut count = 0u64;
        let mut created = Vec::new();
        for (index, data) in rows.into_iter().enumerate() {
            let outcome = if returning {
                self.insert_one(schema, data).await.map(Some)
            } else {
                self.executor
                    .insert(&InsertQuery::new(&schema.name, data))
                    .await
                    .map(|_| None)
            };
            match outcome {
                Ok(row) => {
                    count += 1;
                    created.extend(row);
                }
                Err(e) if skip_duplicates && e.is_unique_violation() => {
                    debug!(model = %schema.name, index, "skipping duplicate");
                }
                Err(e) => return Err(e),
            }
        }

        if !returning {
            return Ok(json!({ "count": count }));
        }
        let mut shaped = Vec::with_capacity(created.len());
        for row in created {
            shaped.push(self.shape_written(schema, row, options).await?);
        }
        Ok(self.finish_many(shaped))
    }

    pub(super) async fn update(&self, schema: &ModelSchema, options: &Options) -> QueryResult<Value> {
        let filter = build_condition(required(options, Operation::Update, "where")?)?;
        let data = strip_relations(schema, required_object(options, Operation::Update, "data")?);

        let existing = self
            .executor
            .find_first(&SelectQuery::new(&schema.name).where_condition(filter.clone()))
            .await?
            .ok_or_else(|| QueryError::not_found(&schema.name))?;
        let row = self.update_existing(schema, existing, filter, data).await?;
        let row = self.shape_written(schema, row, options).await?;
        Ok(self.finish(row))
    }

    pub(super) async fn update_many(&self, schema: &ModelSchema, options: &Options) -> QueryResult<Value> {
        let data = strip_relations(schema, required_object(options, Operation::UpdateMany, "data")?);
        let filter = optional_where(options)?;

        let count = if data.is_empty() {
            self.executor
                .count(&SelectQuery::new(&schema.name).where_condition(filter))
                .await?
        } else {
            let query = UpdateQuery::new(&schema.name, data).where_condition(filter);
            self.executor.update(&query).await?.rows_affected
        };
        Ok(json!({ "count": count }))
    }

    pub(super) async fn update_many_and_return(&self, schema: &ModelSchema, options: &Options) -> QueryResult<Value> {
        let data = strip_relations(schema, required_object(options, Operation::UpdateManyAndReturn, "data")?);
        let filter = optional_where(options)?;

        if self.executor.capabilities().supports_returning && !data.is_empty() {
            let query = UpdateQuery::new(&schema.name, data)
                .where_condition(filter)
                .returning();
            let rows = self.executor.update(&query).await?.rows;
            let mut shaped = Vec::with_capacity(rows.len());
            for row in rows {
                shaped.push(self.shape_written(schema, row, options).await?);
            }
            return Ok(self.finish_many(shaped));
        }

        if schema.primary_key().is_empty() {
            return Err(QueryError::invalid_request(format!(
                "updateManyAndReturn on {} needs a primary key or a backend with RETURNING",
                schema.name
            )));
        }
        let before = self
            .executor
            .find_many(&SelectQuery::new(&schema.name).where_condition(filter))
            .await?;
        if before.is_empty() {
            return Ok(Value::Array(Vec::new()));
        }
        let missing_key = || QueryError::internal(format!("{} rows came back without primary key values", schema.name));

        if !data.is_empty() {
            let targets = identities_filter(schema, &before).ok_or_else(missing_key)?;
            let query = UpdateQuery::new(&schema.name, data.clone()).where_condition(targets);
            self.executor.update(&query).await?;
        }

        let after: Vec<Record> = before
            .iter()
            .map(|row| {
                let mut row = row.clone();
                for pk in schema.primary_key() {
                    if let Some(value) = data.get(&pk.name) {
                        row.insert(pk.name.clone(), value.clone());
                    }
                }
                row
            })
            .collect();
        let query = self
            .read_query(schema, &shaping_options(options))?
            .where_condition(identities_filter(schema, &after).ok_or_else(missing_key)?);
        let rows = self.executor.find_many(&query).await?;
        Ok(self.finish_many(rows))
    }

    /// Find-then-write. Not atomic outside a transaction: two concurrent
    /// upserts of the same key can both take the create branch.
    pub(super) async fn upsert(&self, schema: &ModelSchema, options: &Options) -> QueryResult<Value> {
        let filter = build_condition(required(options, Operation::Upsert, "where")?)?;
        let create = strip_relations(schema, required_object(options, Operation::Upsert, "create")?);
        let update = strip_relations(schema, required_object(options, Operation::Upsert, "update")?);

        let existing = self
            .executor
            .find_first(&SelectQuery::new(&schema.name).where_condition(filter.clone()))
            .await?;
        let row = match existing {
            Some(existing) => {
                debug!(model = %schema.name, "upsert: updating existing row");
                self.update_existing(schema, existing, filter, update).await?
            }
            None => {
                debug!(model = %schema.name, "upsert: creating row");
                self.insert_one(schema, create).await?
            }
        };
        let row = self.shape_written(schema, row, options).await?;
        Ok(self.finish(row))
    }

    pub(super) async fn delete(&self, schema: &ModelSchema, options: &Options) -> QueryResult<Value> {
        let filter = build_condition(required(options, Operation::Delete, "where")?)?;
        let shaping = self.read_query(schema, &shaping_options(options))?;

        // Read every scalar so the primary key is available.
        let mut lookup = shaping.clone().where_condition(filter.clone());
        lookup.fields.clear();
        let existing = self
            .executor
            .find_first(&lookup)
            .await?
            .ok_or_else(|| QueryError::not_found(&schema.name))?;

        let target = identity_filter(schema, &existing).unwrap_or(filter);
        let result = self
            .executor
            .delete(&DeleteQuery::new(&schema.name).where_condition(target))
            .await?;
        if result.rows_affected == 0 {
            debug!(model = %schema.name, "row disappeared before delete");
            return Err(QueryError::not_found(&schema.name));
        }
        Ok(self.finish(project(existing, &shaping)))
    }

    pub(super) async fn delete_many(&self, schema: &ModelSchema, options: &Options) -> QueryResult<Value> {
        let query = DeleteQuery::new(&schema.name).where_condition(optional_where(options)?);
        let result = self.executor.delete(&query).await?;
        Ok(json!({ "count": result.rows_affected }))
    }
}
