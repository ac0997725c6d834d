//! Test utilities and common setup.

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use roster::api;
use roster::db::Database;
use roster::user::{UserRepository, UserService};
use serde_json::Value;
use tower::ServiceExt;

/// Create a test application over a fresh in-memory database.
pub async fn test_app() -> Router {
    let db = Database::in_memory().await.unwrap();

    let user_repo = UserRepository::new(db.pool().clone());
    let user_service = UserService::new(Arc::new(user_repo));

    let state = api::AppState::new(user_service);
    api::create_router(state)
}

/// Send a request and return the status with the decoded JSON body
/// (`Value::Null` when the body is empty).
pub async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().uri(uri).method(method);
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_string(&json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    send_request(app, request).await
}

pub async fn send_request(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();

    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };

    (status, json)
}

/// Create a user through the API and return its id.
pub async fn create_user(app: &Router, name: &str, email: &str, age: i32) -> String {
    let (status, _) = send(
        app,
        Method::POST,
        "/api/user/CreateUser",
        Some(serde_json::json!({ "name": name, "email": email, "age": age })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT, "creating {email}");

    user_id_by_email(app, email).await
}

pub async fn user_id_by_email(app: &Router, email: &str) -> String {
    let (_, users) = send(app, Method::GET, "/api/user/GetAllUsers", None).await;
    users
        .as_array()
        .unwrap()
        .iter()
        .find(|u| u["email"] == email)
        .map(|u| u["id"].as_str().unwrap().to_string())
        .unwrap()
}

/// Populate the five users used by the listing tests.
pub async fn seed_users(app: &Router) -> Vec<String> {
    let mut ids = Vec::new();
    for (name, email, age) in [
        ("Alice", "alice@x.com", 30),
        ("bob", "bob@y.org", 45),
        ("Carol", "carol@x.com", 22),
        ("dave", "dave@x.com", 67),
        ("Eve", "eve@z.net", 30),
    ] {
        ids.push(create_user(app, name, email, age).await);
    }
    ids
}
