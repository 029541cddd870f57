//! Integration tests running every model operation against SQLite.

mod common;

use pretty_assertions::assert_eq;
use quarry::ErrorCode;
use serde_json::json;

use common::{client, seeded_client};

#[tokio::test]
async fn test_create_then_find_unique() {
    let client = client().await;
    let users = client.model("User");

    let created = users
        .create(json!({"data": {"email": "ann@example.com", "name": "Ann"}}))
        .await
        .unwrap();
    assert_eq!(
        created,
        json!({"id": 1, "email": "ann@example.com", "name": "Ann", "role": "user"})
    );

    let found = users.find_unique(json!({"where": {"email": "ann@example.com"}})).await.unwrap();
    assert_eq!(found, created);
}

#[tokio::test]
async fn test_bracketed_text_is_returned_as_written() {
    let client = seeded_client().await;
    let posts = client.model("Post");

    let created = posts
        .create(json!({"data": {"title": "[1, 2]", "authorId": 1}, "select": {"id": true, "title": true}}))
        .await
        .unwrap();
    assert_eq!(created["title"], json!("[1, 2]"));

    let found = posts
        .find_unique(json!({"where": {"id": created["id"]}, "select": {"title": true}}))
        .await
        .unwrap();
    assert_eq!(found, json!({"title": "[1, 2]"}));

    let titled = posts
        .find_many(json!({"where": {"title": {"startsWith": "{"}}}))
        .await
        .unwrap();
    assert_eq!(titled, json!([]));
}

#[tokio::test]
async fn test_json_fields_are_decoded() {
    let client = client().await;
    let events = client.model("Event");

    let created = events
        .create(json!({"data": {"name": "{signup}", "payload": {"plan": "pro", "seats": [1, 2]}}}))
        .await
        .unwrap();
    assert_eq!(
        created,
        json!({"id": 1, "name": "{signup}", "payload": {"plan": "pro", "seats": [1, 2]}})
    );

    let found = events.find_many(json!({"select": {"payload": true}})).await.unwrap();
    assert_eq!(found, json!([{"payload": {"plan": "pro", "seats": [1, 2]}}]));
}

#[tokio::test]
async fn test_create_with_select_and_include() {
    let client = seeded_client().await;
    let created = client
        .model("Post")
        .create(json!({
            "data": {"title": "Again", "authorId": 2},
            "select": {"title": true, "author": {"select": {"name": true}}}
        }))
        .await
        .unwrap();
    assert_eq!(created, json!({"title": "Again", "author": {"name": "Bob"}}));
}

#[tokio::test]
async fn test_find_unique_missing_is_not_found() {
    let client = seeded_client().await;
    let err = client
        .model("User")
        .find_unique(json!({"where": {"id": 99}}))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.context.model.as_deref(), Some("User"));
    assert_eq!(err.context.operation.as_deref(), Some("findUnique"));
}

#[tokio::test]
async fn test_find_many_with_conditions_ordering_and_window() {
    let client = seeded_client().await;
    let posts = client
        .model("Post")
        .find_many(json!({
            "where": {
                "OR": [{"published": true}, {"views": {"gte": 5}}],
                "NOT": {"title": {"startsWith": "Dr"}}
            },
            "orderBy": {"views": "desc"},
            "select": {"title": true}
        }))
        .await
        .unwrap();
    assert_eq!(posts, json!([{"title": "Hello"}, {"title": "Bobs"}]));

    let page = client
        .model("Post")
        .find_many(json!({"orderBy": {"id": "asc"}, "skip": 1, "take": 1, "select": {"id": true}}))
        .await
        .unwrap();
    assert_eq!(page, json!([{"id": 2}]));

    let none = client
        .model("Post")
        .find_many(json!({"where": {"id": {"in": []}}}))
        .await
        .unwrap();
    assert_eq!(none, json!([]));
}

#[tokio::test]
async fn test_not_array_excludes_every_match() {
    let client = seeded_client().await;
    let posts = client
        .model("Post")
        .find_many(json!({
            "where": {"NOT": [{"title": "Hello"}, {"authorId": 2}]},
            "select": {"title": true}
        }))
        .await
        .unwrap();
    assert_eq!(posts, json!([{"title": "Draft"}]));
}

#[tokio::test]
async fn test_find_first_and_count() {
    let client = seeded_client().await;
    let posts = client.model("Post");

    let first = posts
        .find_first(json!({"where": {"authorId": 1}, "orderBy": {"views": "asc"}, "select": {"title": true}}))
        .await
        .unwrap();
    assert_eq!(first, json!({"title": "Draft"}));

    assert_eq!(posts.count(json!({})).await.unwrap(), 3);
    assert_eq!(posts.count(json!({"where": {"published": true}})).await.unwrap(), 2);
    assert_eq!(posts.count(json!({"take": 1})).await.unwrap(), 1);
}

#[tokio::test]
async fn test_distinct() {
    let client = seeded_client().await;
    let authors = client
        .model("Post")
        .find_many(json!({"distinct": ["authorId"], "orderBy": {"id": "asc"}, "select": {"id": true}}))
        .await
        .unwrap();
    assert_eq!(authors, json!([{"id": 1}, {"id": 3}]));
}

#[tokio::test]
async fn test_nested_includes() {
    let client = seeded_client().await;
    let users = client
        .model("User")
        .find_many(json!({
            "where": {"id": 1},
            "select": {"name": true},
            "include": {"posts": {"include": {"comments": true}}}
        }))
        .await
        .unwrap();

    let posts = users[0]["posts"].as_array().unwrap();
    assert_eq!(users[0]["name"], json!("Ann"));
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0]["title"], json!("Hello"));
    assert_eq!(
        posts[0]["comments"],
        json!([{"id": 1, "body": "nice", "postId": 1}, {"id": 2, "body": "+1", "postId": 1}])
    );
    assert_eq!(posts[1]["comments"], json!([]));
}

#[tokio::test]
async fn test_include_window_applies_per_parent() {
    let client = seeded_client().await;
    let users = client
        .model("User")
        .find_many(json!({
            "orderBy": {"id": "asc"},
            "select": {"name": true},
            "include": {"posts": {"orderBy": {"views": "desc"}, "take": 1, "select": {"title": true}}}
        }))
        .await
        .unwrap();
    assert_eq!(
        users,
        json!([
            {"name": "Ann", "posts": [{"title": "Hello"}]},
            {"name": "Bob", "posts": [{"title": "Bobs"}]}
        ])
    );
}

#[tokio::test]
async fn test_update_many_counts_matches() {
    let client = seeded_client().await;
    let users = client.model("User");

    let result = users
        .update_many(json!({"where": {"role": "user"}, "data": {"role": "admin"}}))
        .await
        .unwrap();
    assert_eq!(result, json!({"count": 2}));

    let result = users
        .update_many(json!({"where": {"role": "user"}, "data": {"role": "admin"}}))
        .await
        .unwrap();
    assert_eq!(result, json!({"count": 0}));
}

#[tokio::test]
async fn test_update_many_and_return() {
    let client = seeded_client().await;
    let updated = client
        .model("Post")
        .update_many_and_return(json!({
            "where": {"authorId": 1},
            "data": {"published": true},
            "select": {"id": true, "published": true}
        }))
        .await
        .unwrap();
    assert_eq!(updated, json!([{"id": 1, "published": 1}, {"id": 2, "published": 1}]));
}

#[tokio::test]
async fn test_update_and_delete_single_records() {
    let client = seeded_client().await;
    let posts = client.model("Post");

    let updated = posts
        .update(json!({"where": {"id": 2}, "data": {"title": "Published"}, "select": {"title": true}}))
        .await
        .unwrap();
    assert_eq!(updated, json!({"title": "Published"}));

    let err = posts
        .update(json!({"where": {"id": 42}, "data": {"title": "x"}}))
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let deleted = posts.delete(json!({"where": {"id": 2}})).await.unwrap();
    assert_eq!(deleted["title"], json!("Published"));
    assert_eq!(posts.count(json!({})).await.unwrap(), 2);

    let err = posts.delete(json!({"where": {"id": 2}})).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_delete_many() {
    let client = seeded_client().await;
    let comments = client.model("Comment");
    let result = comments.delete_many(json!({"where": {"postId": 1}})).await.unwrap();
    assert_eq!(result, json!({"count": 2}));
    assert_eq!(comments.count(json!({})).await.unwrap(), 1);
}

#[tokio::test]
async fn test_upsert_creates_then_updates() {
    let client = client().await;
    let settings = client.model("Setting");
    let options = json!({
        "where": {"key": "theme"},
        "create": {"key": "theme", "value": "light"},
        "update": {"value": "dark"}
    });

    let first = settings.upsert(options.clone()).await.unwrap();
    assert_eq!(first, json!({"key": "theme", "value": "light"}));

    let second = settings.upsert(options).await.unwrap();
    assert_eq!(second, json!({"key": "theme", "value": "dark"}));
    assert_eq!(settings.count(json!({})).await.unwrap(), 1);
}

#[tokio::test]
async fn test_create_many_skip_duplicates() {
    let client = seeded_client().await;
    let users = client.model("User");
    let batch = json!([
        {"email": "ann@example.com"},
        {"email": "cy@example.com"},
        {"email": "di@example.com"}
    ]);

    let err = users.create_many(json!({"data": batch.clone()})).await.unwrap_err();
    assert!(err.is_unique_violation());
    assert_eq!(err.code, ErrorCode::UniqueConstraint);

    let result = users
        .create_many(json!({"data": batch, "skipDuplicates": true}))
        .await
        .unwrap();
    assert_eq!(result, json!({"count": 2}));
    assert_eq!(users.count(json!({})).await.unwrap(), 4);
}

#[tokio::test]
async fn test_create_many_and_return() {
    let client = client().await;
    let created = client
        .model("Sale")
        .create_many_and_return(json!({
            "data": [{"category": "books", "amount": 10}, {"category": "games", "amount": 5}],
            "select": {"category": true}
        }))
        .await
        .unwrap();
    assert_eq!(created, json!([{"category": "books"}, {"category": "games"}]));
}

#[tokio::test]
async fn test_foreign_key_violation() {
    let client = seeded_client().await;
    let err = client
        .model("Comment")
        .create(json!({"data": {"body": "orphan", "postId": 99}}))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ForeignKeyConstraint);
    assert_eq!(err.context.model.as_deref(), Some("Comment"));
}

#[tokio::test]
async fn test_group_by_sums_match_aggregate() {
    let client = client().await;
    let sales = client.model("Sale");
    sales
        .create_many(json!({"data": [
            {"category": "books", "amount": 10},
            {"category": "books", "amount": 20},
            {"category": "games", "amount": 5}
        ]}))
        .await
        .unwrap();

    let groups = sales
        .group_by(json!({
            "by": ["category"],
            "_count": true,
            "_sum": {"amount": true},
            "orderBy": {"category": "asc"}
        }))
        .await
        .unwrap();
    assert_eq!(
        groups,
        json!([
            {"category": "books", "_count": 2, "_sum": {"amount": 30}},
            {"category": "games", "_count": 1, "_sum": {"amount": 5}}
        ])
    );

    let total = sales.aggregate(json!({"_sum": {"amount": true}})).await.unwrap();
    let group_total: i64 = groups
        .as_array()
        .unwrap()
        .iter()
        .map(|g| g["_sum"]["amount"].as_i64().unwrap())
        .sum();
    assert_eq!(total["_sum"]["amount"].as_i64(), Some(group_total));

    let big = sales
        .group_by(json!({
            "by": ["category"],
            "_sum": {"amount": true},
            "having": {"_sum": {"amount": {"gt": 10}}}
        }))
        .await
        .unwrap();
    assert_eq!(big, json!([{"category": "books", "_sum": {"amount": 30}}]));
}

#[tokio::test]
async fn test_request_errors() {
    let client = seeded_client().await;

    let err = client.execute("User", "findEverything", json!({})).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::UnknownOperation);

    let err = client.execute("Ghost", "findMany", json!({})).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::UnknownModel);

    let err = client.model("User").update(json!({"data": {"name": "x"}})).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::RequiredFieldMissing);

    let err = client
        .model("User")
        .find_many(json!({"where": {"name": {"near": "Ann"}}}))
        .await
        .unwrap_err();
    assert!(err.is_request_error());
}
