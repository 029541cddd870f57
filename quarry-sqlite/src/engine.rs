//! SQLite query engine.
//!
//! [`Session`] renders statement values into SQLite SQL and runs them on the
//! shared connection. [`SqliteDatabase`] is the top-level [`Executor`]: it
//! serializes statements through a gate so a transaction, once begun, owns
//! the connection until it commits or rolls back.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use indexmap::IndexMap;
use rusqlite::types::Value;
use serde_json::Value as JsonValue;
use tokio::sync::Mutex;
use tokio_rusqlite::Connection;
use tracing::{debug, info, instrument};

use quarry_query::error::{QueryError, QueryResult};
use quarry_query::filter::{Filter, FilterValue};
use quarry_query::query::{DeleteQuery, ExecResult, InsertQuery, SelectQuery, UpdateQuery};
use quarry_query::relations::{IncludeMap, IncludeOption, RelationSpec};
use quarry_query::schema::{ModelSchema, SchemaResolver};
use quarry_query::sql::{ColumnResolver, Dialect, SqlBuilder};
use quarry_query::traits::{BoxFuture, Capabilities, Executor, TransactionHandle};
use quarry_query::transaction::TransactionConfig;
use quarry_query::types::{Distinct, Record, order_by_sql};
use quarry_query::{Client, quarry_debug};

use crate::config::SqliteConfig;
use crate::error::{SqliteError, SqliteResult};
use crate::transaction::SqliteTransaction;
use crate::types::{decode_json_fields, filter_value_to_sqlite, row_to_record};

const DIALECT: Dialect = Dialect::SQLite;

/// Statement runner over one SQLite connection.
#[derive(Clone)]
pub(crate) struct Session {
    conn: Connection,
    schema: Arc<dyn SchemaResolver>,
    use_returning: bool,
}

impl Session {
    pub(crate) fn capabilities(&self) -> Capabilities {
        Capabilities::new(DIALECT).returning(self.use_returning)
    }

    pub(crate) fn schema(&self) -> &dyn SchemaResolver {
        self.schema.as_ref()
    }

    /// Run statements that take no parameters and return no rows.
    pub(crate) async fn batch(&self, sql: &str) -> QueryResult<()> {
        debug!(sql = %sql, "Executing batch");
        let owned = sql.to_string();
        self.conn
            .call(move |conn| {
                conn.execute_batch(&owned)?;
                Ok(())
            })
            .await
            .map_err(|e| SqliteError::from(e).into_query_error(None).with_sql(sql))
    }

    async fn query_rows(
        &self,
        sql: &str,
        params: &[FilterValue],
        model: Option<&str>,
    ) -> QueryResult<Vec<Record>> {
        quarry_debug!(sql = %sql, params = params.len(), "SQLite query");
        let owned = sql.to_string();
        let params: Vec<Value> = params.iter().map(filter_value_to_sqlite).collect();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare_cached(&owned)?;
                let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
                let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), |row| {
                    row_to_record(row, &columns)
                })?;
                let records: Result<Vec<_>, _> = rows.collect();
                Ok(records?)
            })
            .await
            .map_err(|e| SqliteError::from(e).into_query_error(model).with_sql(sql))
    }

    /// Run a statement, returning the change count and the last insert rowid.
    async fn execute(
        &self,
        sql: &str,
        params: &[FilterValue],
        model: Option<&str>,
    ) -> QueryResult<(u64, i64)> {
        quarry_debug!(sql = %sql, params = params.len(), "SQLite execute");
        let owned = sql.to_string();
        let params: Vec<Value> = params.iter().map(filter_value_to_sqlite).collect();
        self.conn
            .call(move |conn| {
                let changes = conn
                    .prepare_cached(&owned)?
                    .execute(rusqlite::params_from_iter(params.iter()))?;
                Ok((changes as u64, conn.last_insert_rowid()))
            })
            .await
            .map_err(|e| SqliteError::from(e).into_query_error(model).with_sql(sql))
    }

    pub(crate) fn find_many<'a>(&'a self, query: &'a SelectQuery) -> BoxFuture<'a, QueryResult<Vec<Record>>> {
        Box::pin(async move {
            let schema = self.schema.model(&query.model)?;
            query.pagination.validate()?;
            let relations = split_includes(&query.includes);

            let mut fields = if query.fields.is_empty() {
                schema.field_names()
            } else {
                query.fields.clone()
            };
            let mut hidden = Vec::new();
            let mut required: Vec<&str> = Vec::new();
            for name in relations.keys() {
                required.extend(schema.relation_for(name)?.join_pairs().map(|(local, _)| local));
            }
            if let Distinct::On(keys) = &query.distinct {
                required.extend(keys.iter().map(String::as_str));
            }
            for field in required {
                if !fields.iter().any(|f| f == field) {
                    fields.push(field.to_string());
                    hidden.push(field.to_string());
                }
            }

            let (sql, params) = render_select(&schema, query, &fields)?;
            let mut rows = self.query_rows(&sql, &params, Some(&schema.name)).await?;
            decode_json_fields(&schema, &mut rows);

            if let Distinct::On(keys) = &query.distinct {
                rows = query.pagination.apply(first_per_key(rows, keys));
            }

            for (name, (option, nested)) in relations {
                let relation = schema.relation_for(&name)?;
                self.load_relation(&schema, relation, &option, nested, &mut rows).await?;
            }

            strip(&mut rows, &hidden);
            Ok(rows)
        })
    }

    /// Load one relation for every parent row with a single query, then
    /// distribute the children to their parents.
    async fn load_relation(
        &self,
        parent: &ModelSchema,
        relation: &RelationSpec,
        option: &IncludeOption,
        mut nested: IncludeMap,
        rows: &mut [Record],
    ) -> QueryResult<()> {
        let pairs: Vec<(&str, &str)> = relation.join_pairs().collect();
        if pairs.is_empty() {
            return Err(QueryError::invalid_select(format!(
                "relation `{}` of `{}` has no joining fields",
                relation.name, parent.name
            ))
            .with_model(&parent.name));
        }
        let related = self.schema.model(&relation.related_model)?;
        option.pagination.validate()?;

        let mut parent_keys: IndexMap<String, Vec<JsonValue>> = IndexMap::new();
        for row in rows.iter() {
            if let Some(values) = join_values(row, pairs.iter().map(|(local, _)| *local)) {
                parent_keys.entry(key_of(&values)).or_insert(values);
            }
        }

        let mut children: HashMap<String, Vec<Record>> = HashMap::new();
        if !parent_keys.is_empty() {
            let key_filter = if let [(_, remote)] = pairs.as_slice() {
                Filter::In(
                    remote.to_string(),
                    parent_keys.values().map(|v| FilterValue::from_json(&v[0])).collect(),
                )
            } else {
                Filter::or(parent_keys.values().map(|values| {
                    Filter::and(
                        pairs
                            .iter()
                            .zip(values)
                            .map(|((_, remote), v)| Filter::Equals(remote.to_string(), FilterValue::from_json(v))),
                    )
                }))
            };

            // Relation names in a nested select load as includes.
            let mut select = Vec::new();
            for field in &option.select {
                if related.is_relation(field) {
                    nested.entry(field.clone()).or_insert_with(|| IncludeOption::new(field.clone()));
                } else {
                    select.push(field.clone());
                }
            }

            let mut hidden = Vec::new();
            if !select.is_empty() {
                for (_, remote) in &pairs {
                    if !select.iter().any(|f| f == remote) {
                        select.push(remote.to_string());
                        hidden.push(remote.to_string());
                    }
                }
            }

            let mut child = SelectQuery::new(&related.name)
                .select(select)
                .where_condition(option.filter.clone().and_then(key_filter));
            child.order_by = option.order_by.clone();
            child.includes = nested;

            for record in self.find_many(&child).await? {
                if let Some(values) = join_values(&record, pairs.iter().map(|(_, remote)| *remote)) {
                    children.entry(key_of(&values)).or_default().push(record);
                }
            }
            for group in children.values_mut() {
                strip(group, &hidden);
            }
        }

        for row in rows.iter_mut() {
            let group = join_values(row, pairs.iter().map(|(local, _)| *local))
                .and_then(|values| children.get(&key_of(&values)))
                .cloned()
                .unwrap_or_default();
            let value = if relation.relation_type.is_many() {
                JsonValue::Array(option.pagination.apply(group).into_iter().map(JsonValue::Object).collect())
            } else {
                group.into_iter().next().map(JsonValue::Object).unwrap_or(JsonValue::Null)
            };
            row.insert(relation.name.clone(), value);
        }
        Ok(())
    }

    pub(crate) async fn count(&self, query: &SelectQuery) -> QueryResult<u64> {
        let schema = self.schema.model(&query.model)?;
        query.pagination.validate()?;
        let columns = schema.columns(DIALECT);

        let mut sql = SqlBuilder::new(DIALECT);
        sql.push("SELECT COUNT(*) AS \"count\" FROM (SELECT ");
        match &query.distinct {
            Distinct::None => {
                sql.push("1");
            }
            Distinct::All => {
                let fields = if query.fields.is_empty() {
                    schema.field_names()
                } else {
                    query.fields.clone()
                };
                sql.push("DISTINCT ").push(column_list(&columns, &fields)?);
            }
            Distinct::On(keys) => {
                sql.push("DISTINCT ").push(column_list(&columns, keys)?);
            }
        }
        sql.push(" FROM ").push_identifier(&schema.table);
        write_where(&mut sql, &query.filter, &columns)?;
        sql.push(query.pagination.to_sql(DIALECT)).push(")");

        let (sql, params) = sql.build();
        let rows = self.query_rows(&sql, &params, Some(&schema.name)).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get("count"))
            .and_then(JsonValue::as_u64)
            .unwrap_or(0))
    }

    pub(crate) async fn insert(&self, query: &InsertQuery) -> QueryResult<ExecResult> {
        let schema = self.schema.model(&query.model)?;
        let columns = schema.columns(DIALECT);

        let mut sql = SqlBuilder::new(DIALECT);
        sql.push("INSERT INTO ").push_identifier(&schema.table);
        if query.data.is_empty() {
            sql.push(" DEFAULT VALUES");
        } else {
            let names: Vec<String> = query.data.keys().cloned().collect();
            sql.push(" (").push(column_list(&columns, &names)?).push(") VALUES (");
            for (i, value) in query.data.values().enumerate() {
                if i > 0 {
                    sql.push(", ");
                }
                sql.push_param(FilterValue::from_json(value));
            }
            sql.push(")");
        }
        self.write(&schema, sql, query.returning).await
    }

    pub(crate) async fn update(&self, query: &UpdateQuery) -> QueryResult<ExecResult> {
        let schema = self.schema.model(&query.model)?;
        if query.data.is_empty() {
            let matching = SelectQuery::new(&query.model).where_condition(query.filter.clone());
            if query.returning {
                let rows = self.find_many(&matching).await?;
                return Ok(ExecResult {
                    rows_affected: rows.len() as u64,
                    last_insert_id: None,
                    rows,
                });
            }
            return Ok(ExecResult::affected(self.count(&matching).await?));
        }

        let columns = schema.columns(DIALECT);
        let mut sql = SqlBuilder::new(DIALECT);
        sql.push("UPDATE ").push_identifier(&schema.table).push(" SET ");
        for (i, (field, value)) in query.data.iter().enumerate() {
            if i > 0 {
                sql.push(", ");
            }
            sql.push(format!("{} = ", columns.column(field)?))
                .push_param(FilterValue::from_json(value));
        }
        write_where(&mut sql, &query.filter, &columns)?;
        self.write(&schema, sql, query.returning).await
    }

    pub(crate) async fn delete(&self, query: &DeleteQuery) -> QueryResult<ExecResult> {
        let schema = self.schema.model(&query.model)?;
        let columns = schema.columns(DIALECT);

        let mut sql = SqlBuilder::new(DIALECT);
        sql.push("DELETE FROM ").push_identifier(&schema.table);
        write_where(&mut sql, &query.filter, &columns)?;
        self.write(&schema, sql, query.returning).await
    }

    /// Finish a write statement, appending `RETURNING` when requested and enabled.
    async fn write(&self, schema: &ModelSchema, mut sql: SqlBuilder, returning: bool) -> QueryResult<ExecResult> {
        if returning && self.use_returning {
            sql.push(" RETURNING ").push(projection(schema, &schema.field_names())?);
            let (sql, params) = sql.build();
            let mut rows = self.query_rows(&sql, &params, Some(&schema.name)).await?;
            decode_json_fields(schema, &mut rows);
            return Ok(ExecResult {
                rows_affected: rows.len() as u64,
                last_insert_id: None,
                rows,
            });
        }

        let (sql, params) = sql.build();
        let (changes, rowid) = self.execute(&sql, &params, Some(&schema.name)).await?;
        Ok(ExecResult {
            rows_affected: changes,
            last_insert_id: Some(rowid),
            rows: Vec::new(),
        })
    }

    pub(crate) async fn query_raw(&self, sql: &str, params: &[FilterValue]) -> QueryResult<Vec<Record>> {
        self.query_rows(sql, params, None).await
    }

    pub(crate) async fn execute_raw(&self, sql: &str, params: &[FilterValue]) -> QueryResult<u64> {
        Ok(self.execute(sql, params, None).await?.0)
    }
}

/// Split flattened include paths into first-level relations, each with its
/// own options and the includes nested beneath it. A path whose prefix is not
/// itself listed still loads the prefix.
fn split_includes(includes: &IncludeMap) -> IndexMap<String, (IncludeOption, IncludeMap)> {
    let mut tree: IndexMap<String, (IncludeOption, IncludeMap)> = IndexMap::new();
    for (path, option) in includes {
        match path.split_once('.') {
            None => {
                let entry = tree
                    .entry(path.clone())
                    .or_insert_with(|| (IncludeOption::new(path.clone()), IncludeMap::new()));
                entry.0 = option.clone();
            }
            Some((head, rest)) => {
                let entry = tree
                    .entry(head.to_string())
                    .or_insert_with(|| (IncludeOption::new(head), IncludeMap::new()));
                let mut nested = option.clone();
                nested.path = rest.to_string();
                entry.1.insert(rest.to_string(), nested);
            }
        }
    }
    tree
}

fn render_select(schema: &ModelSchema, query: &SelectQuery, fields: &[String]) -> QueryResult<(String, Vec<FilterValue>)> {
    let columns = schema.columns(DIALECT);
    let mut sql = SqlBuilder::new(DIALECT);
    sql.push("SELECT ");
    if matches!(query.distinct, Distinct::All) {
        sql.push("DISTINCT ");
    }
    sql.push(projection(schema, fields)?)
        .push(" FROM ")
        .push_identifier(&schema.table);
    write_where(&mut sql, &query.filter, &columns)?;
    sql.push(order_by_sql(&query.order_by, &columns, DIALECT)?);
    // DISTINCT ON is applied after fetching, so the window must be too.
    if !matches!(query.distinct, Distinct::On(_)) {
        sql.push(query.pagination.to_sql(DIALECT));
    }
    Ok(sql.build())
}

/// `"column" AS "field", ...` so rows come back keyed by field name.
fn projection(schema: &ModelSchema, fields: &[String]) -> QueryResult<String> {
    let columns = schema.columns(DIALECT);
    let parts = fields
        .iter()
        .map(|field| Ok(format!("{} AS {}", columns.column(field)?, DIALECT.quote_identifier(field))))
        .collect::<QueryResult<Vec<_>>>()?;
    Ok(parts.join(", "))
}

fn column_list(columns: &dyn ColumnResolver, fields: &[String]) -> QueryResult<String> {
    let parts = fields
        .iter()
        .map(|field| columns.column(field))
        .collect::<QueryResult<Vec<_>>>()?;
    Ok(parts.join(", "))
}

fn write_where(sql: &mut SqlBuilder, filter: &Filter, columns: &dyn ColumnResolver) -> QueryResult<()> {
    if !filter.is_none() {
        sql.push(" WHERE ");
        filter.write_sql(sql, columns)?;
    }
    Ok(())
}

/// Values of `fields` in `row`, or `None` when any is missing or null.
fn join_values<'f>(row: &Record, fields: impl Iterator<Item = &'f str>) -> Option<Vec<JsonValue>> {
    fields
        .map(|field| row.get(field).filter(|v| !v.is_null()).cloned())
        .collect()
}

fn key_of(values: &[JsonValue]) -> String {
    JsonValue::Array(values.to_vec()).to_string()
}

/// Keep the first row for each distinct combination of `keys`.
fn first_per_key(rows: Vec<Record>, keys: &[String]) -> Vec<Record> {
    let mut seen = std::collections::HashSet::new();
    rows.into_iter()
        .filter(|row| {
            let values: Vec<JsonValue> = keys
                .iter()
                .map(|k| row.get(k).cloned().unwrap_or(JsonValue::Null))
                .collect();
            seen.insert(key_of(&values))
        })
        .collect()
}

fn strip(rows: &mut [Record], hidden: &[String]) {
    if hidden.is_empty() {
        return;
    }
    for row in rows {
        for field in hidden {
            row.shift_remove(field);
        }
    }
}

/// A SQLite database.
///
/// One connection is shared by every statement. Statements issued directly on
/// the database wait while a transaction is open, so a transaction callback
/// must use the client it is handed rather than the outer one.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use quarry_query::{SchemaRegistry, ModelSchema, FieldSpec};
/// use quarry_sqlite::{SqliteConfig, SqliteDatabase};
///
/// let schema = SchemaRegistry::new()
///     .with_model(ModelSchema::new("User", "users").field(FieldSpec::new("id").id()));
/// let db = SqliteDatabase::open(SqliteConfig::memory(), Arc::new(schema)).await?;
/// db.execute_batch("CREATE TABLE users (id INTEGER PRIMARY KEY)").await?;
/// let client = db.into_client();
/// ```
#[derive(Clone)]
pub struct SqliteDatabase {
    session: Session,
    gate: Arc<Mutex<()>>,
    savepoints: Arc<AtomicU64>,
    config: Arc<SqliteConfig>,
}

impl SqliteDatabase {
    /// Open the database described by `config`.
    #[instrument(skip(schema), fields(path = %config.path_str()))]
    pub async fn open(config: SqliteConfig, schema: Arc<dyn SchemaResolver>) -> SqliteResult<Self> {
        let conn = if config.path.is_memory() {
            Connection::open_in_memory().await?
        } else {
            Connection::open(config.path_str()).await?
        };

        let init = config.init_sql();
        conn.call(move |c| {
            c.execute_batch(&init)?;
            Ok(())
        })
        .await
        .map_err(|e| SqliteError::connection(format!("failed to initialize {}: {}", config.path_str(), e)))?;

        info!(path = %config.path_str(), "SQLite database opened");

        Ok(Self {
            session: Session {
                conn,
                schema,
                use_returning: config.use_returning,
            },
            gate: Arc::new(Mutex::new(())),
            savepoints: Arc::new(AtomicU64::new(0)),
            config: Arc::new(config),
        })
    }

    /// Open a fresh in-memory database.
    pub async fn memory(schema: Arc<dyn SchemaResolver>) -> SqliteResult<Self> {
        Self::open(SqliteConfig::memory(), schema).await
    }

    /// Open the database at a `sqlite:` URL.
    pub async fn connect(url: &str, schema: Arc<dyn SchemaResolver>) -> SqliteResult<Self> {
        Self::open(SqliteConfig::from_url(url)?, schema).await
    }

    /// The configuration this database was opened with.
    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    /// Run a batch of statements, such as DDL.
    pub async fn execute_batch(&self, sql: &str) -> QueryResult<()> {
        let _gate = self.gate.lock().await;
        self.session.batch(sql).await
    }

    /// Wrap this database in a [`Client`].
    pub fn into_client(self) -> Client {
        Client::new(Arc::new(self))
    }
}

impl std::fmt::Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDatabase")
            .field("config", &self.config)
            .finish()
    }
}

impl Executor for SqliteDatabase {
    fn capabilities(&self) -> Capabilities {
        self.session.capabilities()
    }

    fn schema(&self) -> &dyn SchemaResolver {
        self.session.schema()
    }

    fn find_many<'a>(&'a self, query: &'a SelectQuery) -> BoxFuture<'a, QueryResult<Vec<Record>>> {
        Box::pin(async move {
            let _gate = self.gate.lock().await;
            self.session.find_many(query).await
        })
    }

    fn count<'a>(&'a self, query: &'a SelectQuery) -> BoxFuture<'a, QueryResult<u64>> {
        Box::pin(async move {
            let _gate = self.gate.lock().await;
            self.session.count(query).await
        })
    }

    fn insert<'a>(&'a self, query: &'a InsertQuery) -> BoxFuture<'a, QueryResult<ExecResult>> {
        Box::pin(async move {
            let _gate = self.gate.lock().await;
            self.session.insert(query).await
        })
    }

    fn update<'a>(&'a self, query: &'a UpdateQuery) -> BoxFuture<'a, QueryResult<ExecResult>> {
        Box::pin(async move {
            let _gate = self.gate.lock().await;
            self.session.update(query).await
        })
    }

    fn delete<'a>(&'a self, query: &'a DeleteQuery) -> BoxFuture<'a, QueryResult<ExecResult>> {
        Box::pin(async move {
            let _gate = self.gate.lock().await;
            self.session.delete(query).await
        })
    }

    fn query_raw<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [FilterValue],
    ) -> BoxFuture<'a, QueryResult<Vec<Record>>> {
        Box::pin(async move {
            let _gate = self.gate.lock().await;
            self.session.query_raw(sql, params).await
        })
    }

    fn execute_raw<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [FilterValue],
    ) -> BoxFuture<'a, QueryResult<u64>> {
        Box::pin(async move {
            let _gate = self.gate.lock().await;
            self.session.execute_raw(sql, params).await
        })
    }

    fn begin<'a>(
        &'a self,
        config: &'a TransactionConfig,
    ) -> BoxFuture<'a, QueryResult<Arc<dyn TransactionHandle>>> {
        Box::pin(async move {
            let guard = self.gate.clone().lock_owned().await;
            self.session.batch(&config.to_begin_sql(DIALECT)).await?;
            let tx = SqliteTransaction::root(self.session.clone(), guard, self.savepoints.clone());
            Ok(Arc::new(tx) as Arc<dyn TransactionHandle>)
        })
    }
}
