use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use bucket_buddies::config::Config;
use bucket_buddies::db;
use bucket_buddies::repository::MemoryStore;
use bucket_buddies::routes;
use bucket_buddies::state::AppState;

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    user: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn register(app: &Router, id: &str) {
    let (status, _) = send(
        app,
        "PUT",
        "/api/profile",
        Some(id),
        Some(json!({ "email": format!("{}@example.com", id), "name": id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

async fn add_item(app: &Router, user: &str, title: &str, category: &str) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/api/bucket-items",
        Some(user),
        Some(json!({ "title": title, "category": category, "timeframe": "anytime" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["item"]["id"].as_str().unwrap().to_string()
}

fn memory_app() -> (AppState, Router) {
    let state = AppState::with_store(Arc::new(MemoryStore::new()), Config::default());
    let app = routes::app(state.clone());
    (state, app)
}

fn sqlite_app() -> (TempDir, Router) {
    let tmp = TempDir::new().unwrap();
    let pool = db::create_pool(&tmp.path().join("test.db")).expect("Failed to create database");
    db::run_migrations(&pool).expect("Failed to run migrations");
    let app = routes::app(AppState::from_pool(pool, Config::default()));
    (tmp, app)
}

#[tokio::test]
async fn requests_without_identity_are_unauthorized() {
    let (_state, app) = memory_app();

    let (status, body) = send(&app, "GET", "/api/bucket-items", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");

    // Identity without a profile is not enough either
    let (status, _) = send(&app, "GET", "/api/matches", Some("stranger"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn profile_can_be_registered_and_updated() {
    let (_state, app) = memory_app();
    register(&app, "alice").await;

    let (status, body) = send(
        &app,
        "PATCH",
        "/api/profile",
        Some("alice"),
        Some(json!({ "name": "Alice", "city": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["name"], "Alice");
    assert!(body["user"]["city"].is_null());

    let (status, body) = send(&app, "GET", "/api/profile", Some("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], "alice@example.com");
}

#[tokio::test]
async fn registering_requires_an_email() {
    let (_state, app) = memory_app();
    let (status, _) = send(
        &app,
        "PUT",
        "/api/profile",
        Some("alice"),
        Some(json!({ "email": "  " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn items_are_owner_scoped() {
    let (_state, app) = memory_app();
    register(&app, "alice").await;
    register(&app, "bob").await;

    let item_id = add_item(&app, "alice", "Visit Japan", "travel").await;

    let (status, body) = send(&app, "GET", "/api/bucket-items", Some("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["items"][0]["userId"], "alice");

    let (status, body) = send(&app, "GET", "/api/bucket-items", Some("bob"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["items"].as_array().unwrap().is_empty());

    let uri = format!("/api/bucket-items/{}", item_id);
    let (status, _) = send(&app, "DELETE", &uri, Some("bob"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        "PUT",
        &uri,
        Some("alice"),
        Some(json!({ "title": "Visit Kyoto", "category": "travel", "timeframe": "this year" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["item"]["title"], "Visit Kyoto");

    let (status, body) = send(&app, "DELETE", &uri, Some("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Item deleted");

    let (status, _) = send(&app, "DELETE", &uri, Some("alice"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn creating_an_item_validates_fields() {
    let (_state, app) = memory_app();
    register(&app, "alice").await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/bucket-items",
        Some("alice"),
        Some(json!({ "title": "Visit Japan", "category": "travel" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Title, category, and timeframe are required");
}

#[tokio::test]
async fn listing_matches_persists_records_and_keeps_status_updates_scoped() {
    let (_tmp, app) = sqlite_app();
    for user in ["alice", "bob", "carol"] {
        register(&app, user).await;
    }
    add_item(&app, "alice", "Visit Japan", "travel").await;
    add_item(&app, "alice", "Learn guitar", "learning").await;
    add_item(&app, "bob", "visit japan", "travel").await;
    add_item(&app, "bob", "Learn piano", "learning").await;
    add_item(&app, "carol", "Bake bread", "social").await;

    let (status, body) = send(&app, "GET", "/api/matches", Some("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    let matches = body["matches"].as_array().unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0]["user"]["id"], "bob");
    assert_eq!(matches[0]["sharedItemsCount"], 2);
    assert_eq!(matches[0]["sharedItems"].as_array().unwrap().len(), 2);
    assert_eq!(matches[0]["status"], "pending");
    let match_id = matches[0]["matchId"].as_str().unwrap().to_string();

    // The same record is visible from the other side
    let (_, body) = send(&app, "GET", "/api/matches", Some("bob"), None).await;
    assert_eq!(body["matches"][0]["matchId"], match_id.as_str());
    assert_eq!(body["matches"][0]["user"]["id"], "alice");

    let uri = format!("/api/matches/{}", match_id);
    let (status, _) = send(
        &app,
        "PATCH",
        &uri,
        Some("carol"),
        Some(json!({ "status": "accepted" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        "PATCH",
        &uri,
        Some("bob"),
        Some(json!({ "status": "maybe" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        "PATCH",
        &uri,
        Some("bob"),
        Some(json!({ "status": "rejected" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["match"]["status"], "rejected");

    // Listing recomputes matches, which reopens the decision
    let (_, body) = send(&app, "GET", "/api/matches", Some("alice"), None).await;
    assert_eq!(body["matches"][0]["status"], "pending");

    let (status, _) = send(
        &app,
        "PATCH",
        "/api/matches/missing",
        Some("bob"),
        Some(json!({ "status": "accepted" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn stale_records_are_listed_without_shared_items() {
    let (_tmp, app) = sqlite_app();
    register(&app, "alice").await;
    register(&app, "bob").await;
    let item_id = add_item(&app, "alice", "Visit Japan", "travel").await;
    add_item(&app, "bob", "Visit Japan", "travel").await;

    let (_, body) = send(&app, "GET", "/api/matches", Some("alice"), None).await;
    assert_eq!(body["matches"].as_array().unwrap().len(), 1);

    let uri = format!("/api/bucket-items/{}", item_id);
    send(&app, "DELETE", &uri, Some("alice"), None).await;

    let (_, body) = send(&app, "GET", "/api/matches", Some("alice"), None).await;
    let matches = body["matches"].as_array().unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0]["sharedItemsCount"], 1);
    assert!(matches[0]["sharedItems"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn messages_are_stored_and_pushed() {
    let (state, app) = memory_app();
    register(&app, "alice").await;
    register(&app, "bob").await;
    let mut pushed = state.hub.subscribe();

    let (status, body) = send(
        &app,
        "POST",
        "/api/messages",
        Some("alice"),
        Some(json!({ "receiverId": "bob", "content": "Want to go to Japan?" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"]["senderId"], "alice");
    assert_eq!(body["message"]["sender"]["name"], "alice");

    let delivered = pushed.recv().await.unwrap();
    assert_eq!(delivered.content, "Want to go to Japan?");

    send(
        &app,
        "POST",
        "/api/messages",
        Some("bob"),
        Some(json!({ "receiverId": "alice", "content": "Yes!" })),
    )
    .await;

    let (status, body) = send(&app, "GET", "/api/messages?userId=alice", Some("bob"), None).await;
    assert_eq!(status, StatusCode::OK);
    let contents: Vec<&str> = body["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["content"].as_str().unwrap())
        .collect();
    assert_eq!(contents, vec!["Want to go to Japan?", "Yes!"]);
}

#[tokio::test]
async fn messages_require_a_known_receiver_and_content() {
    let (_state, app) = memory_app();
    register(&app, "alice").await;

    let (status, _) = send(
        &app,
        "POST",
        "/api/messages",
        Some("alice"),
        Some(json!({ "receiverId": "nobody", "content": "hi" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        "/api/messages",
        Some("alice"),
        Some(json!({ "receiverId": "alice", "content": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "GET", "/api/messages", Some("alice"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn message_match_id_must_name_a_shared_match() {
    let (_tmp, app) = sqlite_app();
    for user in ["alice", "bob", "carol"] {
        register(&app, user).await;
    }
    add_item(&app, "alice", "Visit Japan", "travel").await;
    add_item(&app, "bob", "Visit Japan", "travel").await;

    let (_, body) = send(&app, "GET", "/api/matches", Some("alice"), None).await;
    let match_id = body["matches"][0]["matchId"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        "POST",
        "/api/messages",
        Some("alice"),
        Some(json!({ "receiverId": "bob", "content": "hi", "matchId": "missing" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Unknown match: missing");

    let (status, _) = send(
        &app,
        "POST",
        "/api/messages",
        Some("carol"),
        Some(json!({ "receiverId": "alice", "content": "hi", "matchId": match_id })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        "POST",
        "/api/messages",
        Some("bob"),
        Some(json!({ "receiverId": "alice", "content": "hi", "matchId": match_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"]["matchId"], match_id.as_str());
}
