mod common;

use std::sync::atomic::Ordering;

use anyhow::Result;
use axum::http::{header, Method, StatusCode};
use serde_json::json;

use common::{send, spawn_app, token, SECRET};
use uigisc_api_rust::auth::{generate_jwt, Claims};

#[tokio::test]
async fn health_endpoint_responds() -> Result<()> {
    let app = spawn_app();
    let res = send(&app.router, Method::GET, "/health", None, None).await?;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["status"], "ok");
    assert_eq!(res.body["data"]["store"], "counting");
    assert_eq!(res.body["data"]["auth"], "jwt");
    Ok(())
}

#[tokio::test]
async fn whoami_echoes_the_verified_identity() -> Result<()> {
    let app = spawn_app();
    let alice = token("alice", &["user"]);

    let res = send(&app.router, Method::GET, "/api/auth/whoami", Some(&alice), None).await?;

    assert_eq!(res.status, StatusCode::OK, "body: {}", res.body);
    assert_eq!(res.body["success"], true);
    assert_eq!(res.body["data"]["subject"], "alice");
    assert_eq!(res.body["data"]["roles"], json!(["user"]));
    Ok(())
}

#[tokio::test]
async fn missing_or_bad_credentials_are_401_with_challenge() -> Result<()> {
    let app = spawn_app();

    let expired = {
        let claims = Claims::new("alice", vec!["user".into()], chrono::Duration::minutes(-10));
        generate_jwt(&claims, SECRET, jsonwebtoken::Algorithm::HS256)?
    };
    let foreign = {
        let claims = Claims::new("mallory", vec!["admin".into()], chrono::Duration::minutes(10));
        generate_jwt(&claims, "some-other-secret", jsonwebtoken::Algorithm::HS256)?
    };

    for credential in [None, Some("not-a-jwt"), Some(expired.as_str()), Some(foreign.as_str())] {
        let res = send(&app.router, Method::GET, "/api/auth/whoami", credential, None).await?;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED, "credential {:?}", credential);
        assert_eq!(res.body["code"], "UNAUTHORIZED");
        assert_eq!(
            res.headers.get(header::WWW_AUTHENTICATE).and_then(|v| v.to_str().ok()),
            Some("Bearer")
        );
    }
    Ok(())
}

#[tokio::test]
async fn unauthenticated_requests_never_reach_the_store() -> Result<()> {
    let app = spawn_app();

    let create = send(
        &app.router,
        Method::POST,
        "/api/data/items",
        None,
        Some(json!({ "name": "widget" })),
    )
    .await?;
    assert_eq!(create.status, StatusCode::UNAUTHORIZED);

    let list = send(&app.router, Method::GET, "/api/data/items", Some("garbage"), None).await?;
    assert_eq!(list.status, StatusCode::UNAUTHORIZED);

    assert_eq!(app.store.total(), 0);
    Ok(())
}

#[tokio::test]
async fn validation_runs_before_authentication() -> Result<()> {
    let app = spawn_app();

    // No credential at all, but the payload is checked first
    let res = send(
        &app.router,
        Method::POST,
        "/api/data/items",
        None,
        Some(json!({ "color": "red" })),
    )
    .await?;

    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["code"], "VALIDATION_ERROR");
    let mut fields = common::violation_fields(&res.body);
    fields.sort();
    assert_eq!(fields, vec!["color", "name"]);
    assert_eq!(app.store.inserts.load(Ordering::SeqCst), 0);
    Ok(())
}
