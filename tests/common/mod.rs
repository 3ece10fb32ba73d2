#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use uigisc_api_rust::app::{app, AppState};
use uigisc_api_rust::auth::{generate_jwt, Claims};
use uigisc_api_rust::config::{AppConfig, Environment};
use uigisc_api_rust::filter::DocumentQuery;
use uigisc_api_rust::resources::ResourceRegistry;
use uigisc_api_rust::schema::ValidatedPayload;
use uigisc_api_rust::store::{Ack, Document, DocumentStore, DocumentStream, MemoryDocumentStore, StoreError};

pub const SECRET: &str = "integration-test-secret";

pub const RESOURCES: &str = r#"
resources:
  items:
    fields:
      name: { type: string, required: true, max: 20 }
      order: { type: integer, default: 0 }
      tags: { type: array }
    rules:
      - effect: allow
        operations: [read, query, create]
      - effect: allow
        operations: [update, delete]
        owner_only: true
  users:
    fields:
      email: { type: string, required: true, pattern: "^[^@\\s]+@[^@\\s]+$" }
      subdomain: { type: string, min: 3, max: 30, pattern: "^[a-z0-9]+$" }
      role: { type: string, enum: [admin, user], default: user }
      is_verified: { type: boolean, default: false }
      name: { type: string }
      mobile: { type: string }
    rules:
      - effect: allow
        operations: [read, update]
        owner_only: true
  notices:
    fields:
      title: { type: string, required: true }
    rules:
      - effect: allow
        operations: [read, query]
rules:
  - effect: allow
    roles: [admin]
"#;

pub fn test_config(extra: &[(&str, &str)]) -> AppConfig {
    let mut vars: HashMap<String, String> = HashMap::new();
    vars.insert("JWT_SECRET".into(), SECRET.into());
    vars.insert("API_DEFAULT_PAGE_SIZE".into(), "10".into());
    vars.insert("API_MAX_PAGE_SIZE".into(), "50".into());
    vars.insert("AUTH_PASSWORD_COST".into(), "4".into());
    vars.insert("ADMIN_EMAILS".into(), "boss@example.com".into());
    for (k, v) in extra {
        vars.insert(k.to_string(), v.to_string());
    }
    AppConfig::preset(Environment::Development).with_overrides(move |key| vars.get(key).cloned())
}

pub fn build_app(store: Arc<dyn DocumentStore>, config: AppConfig) -> Router {
    let registry = ResourceRegistry::from_yaml(RESOURCES).expect("test resources load");
    let state = AppState::new(config, registry, store).expect("app state");
    app(state)
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<CountingStore>,
}

/// Router over a counting memory store
pub fn spawn_app() -> TestApp {
    let store = Arc::new(CountingStore::new(MemoryDocumentStore::new()));
    let router = build_app(store.clone(), test_config(&[]));
    TestApp { router, store }
}

pub fn token(sub: &str, roles: &[&str]) -> String {
    let claims = Claims::new(sub, roles.iter().map(|r| r.to_string()).collect(), chrono::Duration::minutes(30));
    generate_jwt(&claims, SECRET, jsonwebtoken::Algorithm::HS256).expect("token")
}

pub fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub async fn call(router: &Router, req: Request<Body>) -> Result<TestResponse> {
    let response = router.clone().oneshot(req).await?;
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok(TestResponse { status, headers, body })
}

pub async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Result<TestResponse> {
    call(router, request(method, uri, token, body)).await
}

/// Field names listed in a validation error body
pub fn violation_fields(body: &Value) -> Vec<String> {
    body["field_errors"]
        .as_array()
        .map(|errors| {
            errors
                .iter()
                .filter_map(|e| e["field"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Memory store that counts calls, optionally delaying every call
pub struct CountingStore {
    inner: MemoryDocumentStore,
    delay: Duration,
    pub inserts: AtomicUsize,
    pub gets: AtomicUsize,
    pub updates: AtomicUsize,
    pub deletes: AtomicUsize,
    pub queries: AtomicUsize,
}

impl CountingStore {
    pub fn new(inner: MemoryDocumentStore) -> Self {
        Self::slow(inner, Duration::ZERO)
    }

    pub fn slow(inner: MemoryDocumentStore, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            inserts: AtomicUsize::new(0),
            gets: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            queries: AtomicUsize::new(0),
        }
    }

    pub fn total(&self) -> usize {
        [&self.inserts, &self.gets, &self.updates, &self.deletes, &self.queries]
            .iter()
            .map(|c| c.load(Ordering::SeqCst))
            .sum()
    }

    pub fn writes(&self) -> usize {
        self.inserts.load(Ordering::SeqCst) + self.updates.load(Ordering::SeqCst) + self.deletes.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl DocumentStore for CountingStore {
    fn backend(&self) -> &'static str {
        "counting"
    }

    async fn insert(&self, resource: &str, owner: Option<&str>, payload: ValidatedPayload) -> Result<Document, StoreError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.inner.insert(resource, owner, payload).await
    }

    async fn get(&self, resource: &str, id: Uuid) -> Result<Document, StoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.inner.get(resource, id).await
    }

    async fn update(
        &self,
        resource: &str,
        id: Uuid,
        expected_revision: u64,
        patch: ValidatedPayload,
    ) -> Result<Document, StoreError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.inner.update(resource, id, expected_revision, patch).await
    }

    async fn delete(&self, resource: &str, id: Uuid, expected_revision: u64) -> Result<Ack, StoreError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.inner.delete(resource, id, expected_revision).await
    }

    fn query(&self, resource: &str, query: &DocumentQuery) -> DocumentStream {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.query(resource, query)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Memory store whose first `stalls` successful writes commit and then hang
/// for `stall` before replying
pub struct StallingStore {
    inner: MemoryDocumentStore,
    stall: Duration,
    stalls_left: AtomicUsize,
}

impl StallingStore {
    pub fn new(inner: MemoryDocumentStore, stall: Duration, stalls: usize) -> Self {
        Self {
            inner,
            stall,
            stalls_left: AtomicUsize::new(stalls),
        }
    }

    async fn after_commit<T>(&self, result: &Result<T, StoreError>) {
        if result.is_err() {
            return;
        }
        let stalled = self
            .stalls_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stalled {
            tokio::time::sleep(self.stall).await;
        }
    }
}

#[async_trait]
impl DocumentStore for StallingStore {
    fn backend(&self) -> &'static str {
        "stalling"
    }

    async fn insert(&self, resource: &str, owner: Option<&str>, payload: ValidatedPayload) -> Result<Document, StoreError> {
        self.inner.insert(resource, owner, payload).await
    }

    async fn get(&self, resource: &str, id: Uuid) -> Result<Document, StoreError> {
        self.inner.get(resource, id).await
    }

    async fn update(
        &self,
        resource: &str,
        id: Uuid,
        expected_revision: u64,
        patch: ValidatedPayload,
    ) -> Result<Document, StoreError> {
        let result = self.inner.update(resource, id, expected_revision, patch).await;
        self.after_commit(&result).await;
        result
    }

    async fn delete(&self, resource: &str, id: Uuid, expected_revision: u64) -> Result<Ack, StoreError> {
        let result = self.inner.delete(resource, id, expected_revision).await;
        self.after_commit(&result).await;
        result
    }

    fn query(&self, resource: &str, query: &DocumentQuery) -> DocumentStream {
        self.inner.query(resource, query)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
