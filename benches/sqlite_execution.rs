//! SQLite Execution Benchmarks
//!
//! Runs whole operations (document decoding, SQL rendering, execution and
//! result shaping) against an in-memory SQLite database.
//!
//! ```bash
//! cargo bench --bench sqlite_execution
//! cargo bench --bench sqlite_execution -- include
//! ```

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use quarry::sqlite::SqliteDatabase;
use quarry::{Client, FieldSpec, ModelSchema, RelationSpec, SchemaRegistry};
use serde_json::json;
use tokio::runtime::Runtime;

fn schema() -> SchemaRegistry {
    SchemaRegistry::new()
        .with_model(
            ModelSchema::new("User", "users")
                .field(FieldSpec::new("id").id())
                .field(FieldSpec::new("email"))
                .field(FieldSpec::new("active"))
                .relation(RelationSpec::one_to_many("posts", "Post").fields(["id"]).references(["authorId"])),
        )
        .with_model(
            ModelSchema::new("Post", "posts")
                .field(FieldSpec::new("id").id())
                .field(FieldSpec::new("title"))
                .field(FieldSpec::new("authorId").column("author_id")),
        )
}

fn setup(rt: &Runtime, users: usize) -> Client {
    rt.block_on(async {
        let db = SqliteDatabase::memory(Arc::new(schema())).await.unwrap();
        let mut sql = String::from(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT NOT NULL UNIQUE, active INTEGER NOT NULL);
             CREATE TABLE posts (id INTEGER PRIMARY KEY, title TEXT NOT NULL, author_id INTEGER NOT NULL);
             CREATE INDEX posts_author ON posts (author_id);",
        );
        for i in 1..=users {
            sql.push_str(&format!(
                "INSERT INTO users (id, email, active) VALUES ({}, 'user{}@example.com', {});",
                i,
                i,
                i % 2
            ));
            for p in 0..3 {
                sql.push_str(&format!("INSERT INTO posts (title, author_id) VALUES ('post {}', {});", p, i));
            }
        }
        db.execute_batch(&sql).await.unwrap();
        db.into_client()
    })
}

fn bench_reads(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let client = setup(&rt, 500);
    let mut group = c.benchmark_group("quarry/sqlite_reads");

    group.bench_function("find_unique", |b| {
        b.to_async(&rt).iter(|| {
            let client = &client;
            async move { black_box(client.model("User").find_unique(json!({"where": {"id": 250}})).await.unwrap()) }
        })
    });

    for take in [10i64, 100] {
        group.bench_with_input(BenchmarkId::new("find_many", take), &take, |b, &take| {
            b.to_async(&rt).iter(|| {
                let client = &client;
                async move {
                    black_box(
                        client
                            .model("User")
                            .find_many(json!({"where": {"active": true}, "orderBy": {"id": "desc"}, "take": take}))
                            .await
                            .unwrap(),
                    )
                }
            })
        });
        group.bench_with_input(BenchmarkId::new("include", take), &take, |b, &take| {
            b.to_async(&rt).iter(|| {
                let client = &client;
                async move {
                    black_box(
                        client
                            .model("User")
                            .find_many(json!({"take": take, "include": {"posts": true}}))
                            .await
                            .unwrap(),
                    )
                }
            })
        });
    }

    group.bench_function("group_by", |b| {
        b.to_async(&rt).iter(|| {
            let client = &client;
            async move {
                black_box(
                    client
                        .model("Post")
                        .group_by(json!({"by": ["authorId"], "_count": true, "take": 20}))
                        .await
                        .unwrap(),
                )
            }
        })
    });

    group.finish();
}

fn bench_writes(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let client = setup(&rt, 10);
    let mut group = c.benchmark_group("quarry/sqlite_writes");

    group.bench_function("update_many", |b| {
        b.to_async(&rt).iter(|| {
            let client = &client;
            async move {
                black_box(
                    client
                        .model("User")
                        .update_many(json!({"where": {"active": false}, "data": {"active": false}}))
                        .await
                        .unwrap(),
                )
            }
        })
    });

    group.bench_function("transaction_upsert", |b| {
        b.to_async(&rt).iter(|| {
            let client = &client;
            async move {
                let result = client
                    .transaction(|tx| async move {
                        tx.model("Post")
                            .upsert(json!({
                                "where": {"id": 1},
                                "create": {"id": 1, "title": "pinned", "authorId": 1},
                                "update": {"title": "pinned"}
                            }))
                            .await
                    })
                    .await;
                black_box(result.unwrap())
            }
        })
    });

    group.finish();
}

criterion_group!(benches, bench_reads, bench_writes);

criterion_main!(benches);
