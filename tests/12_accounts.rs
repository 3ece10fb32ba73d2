mod common;

use std::sync::Arc;

use anyhow::Result;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use serde_json::{json, Value};

use common::{build_app, call, send, spawn_app, test_config, token, violation_fields, CountingStore};
use uigisc_api_rust::store::MemoryDocumentStore;

fn registration(email: &str, password: &str) -> Value {
    json!({ "email": email, "password": password, "name": "Ann" })
}

#[tokio::test]
async fn registered_token_is_accepted_by_protected_routes() -> Result<()> {
    let app = spawn_app();

    let res = send(
        &app.router,
        Method::POST,
        "/api/auth/register",
        None,
        Some(registration("ann@example.com", "correct-horse")),
    )
    .await?;
    assert_eq!(res.status, StatusCode::CREATED, "body: {}", res.body);
    assert_eq!(res.body["data"]["token_type"], "bearer");
    let access = res.body["data"]["access_token"].as_str().unwrap_or_default().to_string();
    let subject = res.body["data"]["user"]["subject"].clone();

    let res = send(&app.router, Method::GET, "/api/auth/whoami", Some(&access), None).await?;
    assert_eq!(res.status, StatusCode::OK, "body: {}", res.body);
    assert_eq!(res.body["data"]["subject"], subject);
    assert_eq!(res.body["data"]["email"], "ann@example.com");
    assert_eq!(res.body["data"]["roles"], json!(["user"]));
    Ok(())
}

#[tokio::test]
async fn login_checks_the_stored_password() -> Result<()> {
    let app = spawn_app();
    send(
        &app.router,
        Method::POST,
        "/api/auth/register",
        None,
        Some(registration("ann@example.com", "correct-horse")),
    )
    .await?;

    let ok = send(
        &app.router,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "email": "ANN@example.com", "password": "correct-horse" })),
    )
    .await?;
    assert_eq!(ok.status, StatusCode::OK, "body: {}", ok.body);
    assert!(ok.body["data"]["access_token"].is_string());

    let wrong = send(
        &app.router,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "email": "ann@example.com", "password": "battery-staple" })),
    )
    .await?;
    let unknown = send(
        &app.router,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "email": "who@example.com", "password": "correct-horse" })),
    )
    .await?;
    for res in [wrong, unknown] {
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);
        assert_eq!(res.body["message"], "Invalid email or password");
        assert_eq!(
            res.headers.get(header::WWW_AUTHENTICATE).and_then(|v| v.to_str().ok()),
            Some("Bearer")
        );
    }
    Ok(())
}

#[tokio::test]
async fn registration_problems_are_violations() -> Result<()> {
    let app = spawn_app();

    let res = send(
        &app.router,
        Method::POST,
        "/api/auth/register",
        None,
        Some(registration("not-an-email", "short")),
    )
    .await?;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    let fields = violation_fields(&res.body);
    assert!(fields.contains(&"email".to_string()), "{:?}", fields);
    assert!(fields.contains(&"password".to_string()), "{:?}", fields);

    send(
        &app.router,
        Method::POST,
        "/api/auth/register",
        None,
        Some(registration("ann@example.com", "correct-horse")),
    )
    .await?;
    let res = send(
        &app.router,
        Method::POST,
        "/api/auth/register",
        None,
        Some(registration("Ann@Example.com", "another-secret")),
    )
    .await?;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(violation_fields(&res.body), vec!["email"]);
    assert_eq!(res.body["field_errors"][0]["reason"], "is already registered");

    let res = send(
        &app.router,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "email": "ann@example.com" })),
    )
    .await?;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(violation_fields(&res.body), vec!["$body"]);

    let garbled = Request::builder()
        .method(Method::POST)
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))?;
    let res = call(&app.router, garbled).await?;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(violation_fields(&res.body), vec!["$body"]);
    Ok(())
}

#[tokio::test]
async fn configured_admin_emails_register_as_admin() -> Result<()> {
    let app = spawn_app();

    let res = send(
        &app.router,
        Method::POST,
        "/api/auth/register",
        None,
        Some(registration("boss@example.com", "correct-horse")),
    )
    .await?;
    assert_eq!(res.status, StatusCode::CREATED, "body: {}", res.body);
    assert_eq!(res.body["data"]["user"]["roles"], json!(["admin"]));
    Ok(())
}

#[tokio::test]
async fn credentials_are_not_reachable_through_the_data_api() -> Result<()> {
    let app = spawn_app();
    send(
        &app.router,
        Method::POST,
        "/api/auth/register",
        None,
        Some(registration("ann@example.com", "correct-horse")),
    )
    .await?;

    let admin = token("root", &["admin"]);
    let res = send(&app.router, Method::GET, "/api/data/_credentials", Some(&admin), None).await?;
    assert_eq!(res.status, StatusCode::NOT_FOUND);

    let res = send(
        &app.router,
        Method::POST,
        "/api/find/_credentials",
        Some(&admin),
        Some(json!({})),
    )
    .await?;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn registration_can_be_switched_off() -> Result<()> {
    let store = Arc::new(CountingStore::new(MemoryDocumentStore::new()));
    let router = build_app(store.clone(), test_config(&[("AUTH_ALLOW_REGISTRATION", "false")]));

    let res = send(
        &router,
        Method::POST,
        "/api/auth/register",
        None,
        Some(registration("ann@example.com", "correct-horse")),
    )
    .await?;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert_eq!(store.writes(), 0);
    Ok(())
}
