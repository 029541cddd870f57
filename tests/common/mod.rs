//! Shared fixtures: a small blog-and-shop schema on in-memory SQLite.

#![allow(dead_code)]

use std::sync::Arc;

use quarry::sqlite::SqliteDatabase;
use quarry::{Client, ClientConfig, FieldSpec, ModelSchema, RelationSpec, SchemaRegistry};

const DDL: &str = r#"
CREATE TABLE users (
    id INTEGER PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    name TEXT,
    role TEXT NOT NULL DEFAULT 'user'
);
CREATE TABLE posts (
    id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    published INTEGER NOT NULL DEFAULT 0,
    views INTEGER NOT NULL DEFAULT 0,
    author_id INTEGER REFERENCES users(id)
);
CREATE TABLE comments (
    id INTEGER PRIMARY KEY,
    body TEXT NOT NULL,
    post_id INTEGER NOT NULL REFERENCES posts(id)
);
CREATE TABLE settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
CREATE TABLE sales (
    id INTEGER PRIMARY KEY,
    category TEXT NOT NULL,
    amount INTEGER NOT NULL
);
CREATE TABLE events (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    payload TEXT
);
"#;

pub fn schema() -> SchemaRegistry {
    SchemaRegistry::new()
        .with_model(
            ModelSchema::new("User", "users")
                .field(FieldSpec::new("id").id())
                .field(FieldSpec::new("email"))
                .field(FieldSpec::new("name"))
                .field(FieldSpec::new("role"))
                .relation(RelationSpec::one_to_many("posts", "Post").fields(["id"]).references(["authorId"])),
        )
        .with_model(
            ModelSchema::new("Post", "posts")
                .field(FieldSpec::new("id").id())
                .field(FieldSpec::new("title"))
                .field(FieldSpec::new("published"))
                .field(FieldSpec::new("views"))
                .field(FieldSpec::new("authorId").column("author_id"))
                .relation(RelationSpec::many_to_one("author", "User").fields(["authorId"]).references(["id"]))
                .relation(RelationSpec::one_to_many("comments", "Comment").fields(["id"]).references(["postId"])),
        )
        .with_model(
            ModelSchema::new("Comment", "comments")
                .field(FieldSpec::new("id").id())
                .field(FieldSpec::new("body"))
                .field(FieldSpec::new("postId").column("post_id")),
        )
        .with_model(
            ModelSchema::new("Setting", "settings")
                .field(FieldSpec::new("key").id())
                .field(FieldSpec::new("value")),
        )
        .with_model(
            ModelSchema::new("Sale", "sales")
                .field(FieldSpec::new("id").id())
                .field(FieldSpec::new("category"))
                .field(FieldSpec::new("amount")),
        )
        .with_model(
            ModelSchema::new("Event", "events")
                .field(FieldSpec::new("id").id())
                .field(FieldSpec::new("name"))
                .field(FieldSpec::new("payload").json()),
        )
}

pub async fn database() -> SqliteDatabase {
    let db = SqliteDatabase::memory(Arc::new(schema())).await.unwrap();
    db.execute_batch(DDL).await.unwrap();
    db
}

pub async fn client() -> Client {
    database().await.into_client()
}

pub async fn client_with_config(config: ClientConfig) -> Client {
    Client::with_config(Arc::new(database().await), config)
}

/// Two authors, three posts, three comments.
pub async fn seeded_client() -> Client {
    let db = database().await;
    db.execute_batch(
        r#"
        INSERT INTO users (id, email, name) VALUES (1, 'ann@example.com', 'Ann'), (2, 'bob@example.com', 'Bob');
        INSERT INTO posts (id, title, published, views, author_id) VALUES
            (1, 'Hello', 1, 10, 1),
            (2, 'Draft', 0, 3, 1),
            (3, 'Bobs', 1, 7, 2);
        INSERT INTO comments (id, body, post_id) VALUES (1, 'nice', 1), (2, '+1', 1), (3, 'ok', 3);
        "#,
    )
    .await
    .unwrap();
    db.into_client()
}
