use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

use super::*;
use crate::error::ErrorCode;
use crate::query::{DeleteQuery, ExecResult, InsertQuery, UpdateQuery};
use crate::relations::RelationSpec;
use crate::schema::{FieldSpec, SchemaRegistry, SchemaResolver};
use crate::sql::Dialect;
use crate::traits::{BoxFuture, Capabilities, TransactionHandle};
use crate::transaction::TransactionConfig;

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Find(SelectQuery),
    Count(SelectQuery),
    Insert(InsertQuery),
    Update(UpdateQuery),
    Delete(DeleteQuery),
    Raw(String),
}

/// Replays scripted results and records every statement it receives.
struct MockExecutor {
    schema: SchemaRegistry,
    caps: Capabilities,
    finds: Mutex<VecDeque<Vec<Record>>>,
    writes: Mutex<VecDeque<QueryResult<ExecResult>>>,
    raws: Mutex<VecDeque<Vec<Record>>>,
    calls: Mutex<Vec<Call>>,
}

impl MockExecutor {
    fn new() -> Self {
        let schema = SchemaRegistry::new()
            .with_model(
                ModelSchema::new("User", "users")
                    .field(FieldSpec::new("id").id())
                    .field(FieldSpec::new("email"))
                    .field(FieldSpec::new("name"))
                    .relation(
                        RelationSpec::one_to_many("posts", "Post")
                            .fields(["id"])
                            .references(["authorId"]),
                    ),
            )
            .with_model(
                ModelSchema::new("Sale", "sales")
                    .field(FieldSpec::new("id").id())
                    .field(FieldSpec::new("category"))
                    .field(FieldSpec::new("amount")),
            );
        Self {
            schema,
            caps: Capabilities::new(Dialect::SQLite),
            finds: Mutex::default(),
            writes: Mutex::default(),
            raws: Mutex::default(),
            calls: Mutex::default(),
        }
    }

    fn returning(mut self) -> Self {
        self.caps = self.caps.returning(true);
        self
    }

    fn find(self, rows: Value) -> Self {
        self.finds.lock().push_back(records(rows));
        self
    }

    fn write(self, result: QueryResult<ExecResult>) -> Self {
        self.writes.lock().push_back(result);
        self
    }

    fn raw(self, rows: Value) -> Self {
        self.raws.lock().push_back(records(rows));
        self
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }
}

fn records(rows: Value) -> Vec<Record> {
    match rows {
        Value::Array(items) => items
            .into_iter()
            .map(|item| item.as_object().cloned().unwrap())
            .collect(),
        other => panic!("expected an array of rows, got {}", other),
    }
}

fn row(value: Value) -> Record {
    value.as_object().cloned().unwrap()
}

impl Executor for MockExecutor {
    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn schema(&self) -> &dyn SchemaResolver {
        &self.schema
    }

    fn find_many<'a>(&'a self, query: &'a SelectQuery) -> BoxFuture<'a, QueryResult<Vec<Record>>> {
        Box::pin(async move {
            self.record(Call::Find(query.clone()));
            Ok(self.finds.lock().pop_front().unwrap_or_default())
        })
    }

    fn count<'a>(&'a self, query: &'a SelectQuery) -> BoxFuture<'a, QueryResult<u64>> {
        Box::pin(async move {
            self.record(Call::Count(query.clone()));
            Ok(self.finds.lock().pop_front().map_or(0, |rows| rows.len() as u64))
        })
    }

    fn insert<'a>(&'a self, query: &'a InsertQuery) -> BoxFuture<'a, QueryResult<ExecResult>> {
        Box::pin(async move {
            self.record(Call::Insert(query.clone()));
            self.writes.lock().pop_front().unwrap_or_else(|| Ok(ExecResult::affected(1)))
        })
    }

    fn update<'a>(&'a self, query: &'a UpdateQuery) -> BoxFuture<'a, QueryResult<ExecResult>> {
        Box::pin(async move {
            self.record(Call::Update(query.clone()));
            self.writes.lock().pop_front().unwrap_or_else(|| Ok(ExecResult::affected(1)))
        })
    }

    fn delete<'a>(&'a self, query: &'a DeleteQuery) -> BoxFuture<'a, QueryResult<ExecResult>> {
        Box::pin(async move {
            self.record(Call::Delete(query.clone()));
            self.writes.lock().pop_front().unwrap_or_else(|| Ok(ExecResult::affected(1)))
        })
    }

    fn query_raw<'a>(&'a self, sql: &'a str, _params: &'a [FilterValue]) -> BoxFuture<'a, QueryResult<Vec<Record>>> {
        Box::pin(async move {
            self.record(Call::Raw(sql.to_string()));
            Ok(self.raws.lock().pop_front().unwrap_or_default())
        })
    }

    fn execute_raw<'a>(&'a self, sql: &'a str, _params: &'a [FilterValue]) -> BoxFuture<'a, QueryResult<u64>> {
        Box::pin(async move {
            self.record(Call::Raw(sql.to_string()));
            Ok(0)
        })
    }

    fn begin<'a>(&'a self, _config: &'a TransactionConfig) -> BoxFuture<'a, QueryResult<Arc<dyn TransactionHandle>>> {
        Box::pin(async { Err(QueryError::transaction("mock executor has no transactions")) })
    }
}

async fn run(executor: &MockExecutor, model: &str, operation: &str, options: Value) -> QueryResult<Value> {
    Dispatcher::new(executor, TypeConverter::default())
        .execute(model, operation.parse()?, &options)
        .await
}

fn id_is(id: i64) -> Filter {
    Filter::Equals("id".to_string(), FilterValue::Int(id))
}

#[test]
fn test_operation_names() {
    for operation in Operation::ALL {
        assert_eq!(operation.as_str().parse::<Operation>().unwrap(), operation);
    }
    assert!(Operation::DeleteMany.is_write());
    assert!(!Operation::GroupBy.is_write());

    let err = "findEverything".parse::<Operation>().unwrap_err();
    assert_eq!(err.code, ErrorCode::UnknownOperation);
}

#[tokio::test]
async fn test_update_reads_before_and_after_write() {
    let executor = MockExecutor::new()
        .find(json!([{"id": 1, "email": "ada@example.com", "name": "Ada"}]))
        .find(json!([{"id": 1, "email": "ada@example.com", "name": "Lovelace"}]));

    let result = run(
        &executor,
        "User",
        "update",
        json!({"where": {"email": "ada@example.com"}, "data": {"name": "Lovelace"}}),
    )
    .await
    .unwrap();
    assert_eq!(result, json!({"id": 1, "email": "ada@example.com", "name": "Lovelace"}));

    let calls = executor.calls();
    assert_eq!(calls.len(), 3);
    match &calls[1] {
        Call::Update(update) => {
            assert_eq!(update.filter, id_is(1));
            assert!(!update.returning);
        }
        other => panic!("expected an update, got {:?}", other),
    }
    match &calls[2] {
        Call::Find(select) => assert_eq!(select.filter, id_is(1)),
        other => panic!("expected a re-read, got {:?}", other),
    }
}

#[tokio::test]
async fn test_update_uses_returning_when_supported() {
    let executor = MockExecutor::new()
        .returning()
        .find(json!([{"id": 1, "email": "ada@example.com", "name": "Ada"}]))
        .write(Ok(ExecResult {
            rows_affected: 1,
            rows: records(json!([{"id": 1, "email": "ada@example.com", "name": "Countess"}])),
            ..Default::default()
        }));

    let result = run(&executor, "User", "update", json!({"where": {"id": 1}, "data": {"name": "Countess"}}))
        .await
        .unwrap();
    assert_eq!(result["name"], json!("Countess"));

    let calls = executor.calls();
    assert_eq!(calls.len(), 2);
    assert!(matches!(&calls[1], Call::Update(update) if update.returning));
}

#[tokio::test]
async fn test_update_of_missing_row_is_not_found() {
    let executor = MockExecutor::new();
    let err = run(&executor, "User", "update", json!({"where": {"id": 9}, "data": {"name": "x"}}))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::RecordNotFound);
    assert_eq!(err.context.operation.as_deref(), Some("update"));
    assert_eq!(executor.calls().len(), 1);
}

#[tokio::test]
async fn test_row_deleted_between_read_and_update_is_not_found() {
    let executor = MockExecutor::new()
        .find(json!([{"id": 1, "email": "a@b.c", "name": "A"}]))
        .write(Ok(ExecResult::affected(0)));

    let err = run(&executor, "User", "update", json!({"where": {"id": 1}, "data": {"name": "B"}}))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_missing_and_malformed_options() {
    let executor = MockExecutor::new();

    let err = run(&executor, "User", "update", json!({"where": {"id": 1}})).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::RequiredFieldMissing);
    assert_eq!(err.context.field.as_deref(), Some("data"));

    let err = run(&executor, "User", "findUnique", json!({})).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::RequiredFieldMissing);

    let err = run(&executor, "User", "createMany", json!({"data": {"email": "x"}}))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidRequest);

    let err = run(&executor, "User", "findMany", json!([1, 2])).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidRequest);

    let err = run(&executor, "Ghost", "findMany", Value::Null).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::UnknownModel);

    assert!(executor.calls().is_empty());
}

#[tokio::test]
async fn test_create_strips_relations_and_reads_back_generated_id() {
    let executor = MockExecutor::new()
        .write(Ok(ExecResult {
            rows_affected: 1,
            last_insert_id: Some(7),
            ..Default::default()
        }))
        .find(json!([{"id": 7, "email": "grace@example.com", "name": null}]));

    let result = run(
        &executor,
        "User",
        "create",
        json!({"data": {"email": "grace@example.com", "posts": [{"title": "ignored"}]}}),
    )
    .await
    .unwrap();
    assert_eq!(result, json!({"id": 7, "email": "grace@example.com", "name": null}));

    let calls = executor.calls();
    match &calls[0] {
        Call::Insert(insert) => {
            assert_eq!(insert.data, row(json!({"email": "grace@example.com"})));
        }
        other => panic!("expected an insert, got {:?}", other),
    }
    assert!(matches!(&calls[1], Call::Find(select) if select.filter == id_is(7)));
}

#[tokio::test]
async fn test_create_many_skips_duplicates() {
    let duplicate = || Err(QueryError::unique_violation("User", "email"));
    let data = json!([{"email": "a"}, {"email": "a"}, {"email": "b"}]);

    let executor = MockExecutor::new()
        .write(Ok(ExecResult::affected(1)))
        .write(duplicate())
        .write(Ok(ExecResult::affected(1)));
    let result = run(&executor, "User", "createMany", json!({"data": data, "skipDuplicates": true}))
        .await
        .unwrap();
    assert_eq!(result, json!({"count": 2}));

    let executor = MockExecutor::new()
        .write(Ok(ExecResult::affected(1)))
        .write(duplicate());
    let err = run(&executor, "User", "createMany", json!({"data": data})).await.unwrap_err();
    assert!(err.is_unique_violation());
    assert_eq!(executor.calls().len(), 2);
}

#[tokio::test]
async fn test_update_many_counts_matches_for_empty_data() {
    let executor = MockExecutor::new().find(json!([{"id": 1}, {"id": 2}]));
    let result = run(&executor, "User", "updateMany", json!({"data": {}, "where": {"name": "x"}}))
        .await
        .unwrap();
    assert_eq!(result, json!({"count": 2}));
    assert!(matches!(&executor.calls()[0], Call::Count(_)));

    let executor = MockExecutor::new().write(Ok(ExecResult::affected(3)));
    let result = run(&executor, "User", "updateMany", json!({"data": {"name": "y"}}))
        .await
        .unwrap();
    assert_eq!(result, json!({"count": 3}));
}

#[tokio::test]
async fn test_upsert_takes_both_branches() {
    let executor = MockExecutor::new()
        .find(json!([{"id": 3, "email": "x@y.z", "name": "old"}]))
        .find(json!([{"id": 3, "email": "x@y.z", "name": "new"}]));
    let result = run(
        &executor,
        "User",
        "upsert",
        json!({"where": {"email": "x@y.z"}, "create": {"email": "x@y.z", "name": "new"}, "update": {"name": "new"}}),
    )
    .await
    .unwrap();
    assert_eq!(result["name"], json!("new"));
    assert!(matches!(&executor.calls()[1], Call::Update(_)));

    let executor = MockExecutor::new()
        .find(json!([]))
        .write(Ok(ExecResult {
            rows_affected: 1,
            last_insert_id: Some(4),
            ..Default::default()
        }))
        .find(json!([{"id": 4, "email": "x@y.z", "name": "new"}]));
    let result = run(
        &executor,
        "User",
        "upsert",
        json!({"where": {"email": "x@y.z"}, "create": {"email": "x@y.z", "name": "new"}, "update": {"name": "new"}}),
    )
    .await
    .unwrap();
    assert_eq!(result["id"], json!(4));
    assert!(matches!(&executor.calls()[1], Call::Insert(_)));
}

#[tokio::test]
async fn test_delete_returns_the_row_as_it_was() {
    let executor = MockExecutor::new().find(json!([{"id": 5, "email": "gone@example.com", "name": "Gone"}]));
    let result = run(
        &executor,
        "User",
        "delete",
        json!({"where": {"email": "gone@example.com"}, "select": {"email": true}}),
    )
    .await
    .unwrap();
    assert_eq!(result, json!({"email": "gone@example.com"}));

    let calls = executor.calls();
    assert!(matches!(&calls[0], Call::Find(select) if select.fields.is_empty()));
    assert!(matches!(&calls[1], Call::Delete(delete) if delete.filter == id_is(5)));
}

#[tokio::test]
async fn test_find_first_without_rows_is_not_found() {
    let executor = MockExecutor::new();
    let err = run(&executor, "User", "findFirst", json!({"where": {"name": "nobody"}}))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::RecordNotFound);
    assert_eq!(err.context.model.as_deref(), Some("User"));

    let result = run(&executor, "User", "findMany", json!({"where": {"name": "nobody"}}))
        .await
        .unwrap();
    assert_eq!(result, json!([]));
}

#[tokio::test]
async fn test_select_of_relation_becomes_include() {
    let executor = MockExecutor::new().find(json!([]));
    run(&executor, "User", "findMany", json!({"select": {"email": true, "posts": true}}))
        .await
        .unwrap();

    match &executor.calls()[0] {
        Call::Find(select) => {
            assert_eq!(select.fields, vec!["email".to_string()]);
            assert!(select.includes.contains_key("posts"));
        }
        other => panic!("expected a find, got {:?}", other),
    }
}

#[tokio::test]
async fn test_group_by_runs_raw_sql_and_reshapes() {
    let executor = MockExecutor::new().raw(json!([
        {"category": "books", "_count": "2", "amount_sum": "30"},
        {"category": "games", "_count": 1, "amount_sum": 12.5}
    ]));
    let result = run(
        &executor,
        "Sale",
        "groupBy",
        json!({"by": ["category"], "_count": true, "_sum": {"amount": true}, "orderBy": {"category": "asc"}}),
    )
    .await
    .unwrap();
    assert_eq!(
        result,
        json!([
            {"category": "books", "_count": 2, "_sum": {"amount": 30}},
            {"category": "games", "_count": 1, "_sum": {"amount": 12.5}}
        ])
    );

    match &executor.calls()[0] {
        Call::Raw(sql) => {
            assert!(sql.contains("GROUP BY \"category\""), "{}", sql);
            assert!(sql.contains("SUM(\"amount\")"), "{}", sql);
        }
        other => panic!("expected raw SQL, got {:?}", other),
    }
}

#[tokio::test]
async fn test_group_by_requires_by() {
    let executor = MockExecutor::new();
    let err = run(&executor, "Sale", "groupBy", json!({"_count": true})).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::RequiredFieldMissing);
    assert_eq!(err.context.operation.as_deref(), Some("groupBy"));
}

#[tokio::test]
async fn test_type_conversion_applies_to_rows() {
    let executor = MockExecutor::new().find(json!([{"id": "5", "email": "n@x.y", "name": "12.50"}]));
    let result = Dispatcher::new(&executor, TypeConverter::new(true))
        .execute("User", Operation::FindMany, &json!({}))
        .await
        .unwrap();
    assert_eq!(result, json!([{"id": 5, "email": "n@x.y", "name": 12.5}]));
}
