//! findUnique, findFirst, findMany and count.

use serde_json::Value;

use super::{Dispatcher, Operation, Options, required};
use crate::document::{apply_pagination, apply_where};
use crate::error::{QueryError, QueryResult};
use crate::query::SelectQuery;
use crate::schema::ModelSchema;

impl Dispatcher<'_> {
    pub(super) async fn find_one(&self, schema: &ModelSchema, options: &Options, unique: bool) -> QueryResult<Value> {
        if unique {
            required(options, Operation::FindUnique, "where")?;
        }
        let query = self.read_query(schema, options)?;
        let row = self
            .executor
            .find_first(&query)
            .await?
            .ok_or_else(|| QueryError::not_found(&schema.name))?;
        Ok(self.finish(row))
    }

    pub(super) async fn find_many(&self, schema: &ModelSchema, options: &Options) -> QueryResult<Value> {
        let query = self.read_query(schema, options)?;
        let rows = self.executor.find_many(&query).await?;
        Ok(self.finish_many(rows))
    }

    pub(super) async fn count(&self, schema: &ModelSchema, options: &Options) -> QueryResult<Value> {
        let mut query = SelectQuery::new(&schema.name);
        if let Some(doc) = options.get("where") {
            query = apply_where(query, doc)?;
        }
        query = apply_pagination(query, options)?;
        Ok(Value::from(self.executor.count(&query).await?))
    }
}
