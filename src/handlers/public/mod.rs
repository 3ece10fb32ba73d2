pub mod auth;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::app::AppState;
use crate::middleware::ApiResponse;

/// GET / - service info
pub async fn root(State(state): State<AppState>) -> impl IntoResponse {
    let resources: Vec<&str> = state.mediator.registry().names().collect();

    ApiResponse::success(json!({
        "name": "UIGISC API (Rust)",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Validated, authorized, revision-checked document storage",
        "environment": state.config.environment,
        "resources": resources,
        "endpoints": {
            "home": "/ (public)",
            "health": "/health (public)",
            "auth": "/api/auth/whoami (protected), /api/auth/login and /api/auth/register (public, when accounts are enabled)",
            "data": "/api/data/:resource[/:id] (protected)",
            "find": "/api/find/:resource (protected)",
        }
    }))
}

/// GET /health - store connectivity
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();
    let store = state.mediator.store();
    let verifier = state.mediator.authenticator().verifier_name();

    match store.health_check().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "store": store.backend(),
                    "auth": verifier
                }
            })),
        ),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": "store unavailable",
                    "data": {
                        "status": "degraded",
                        "timestamp": now,
                        "store": store.backend(),
                        "auth": verifier
                    }
                })),
            )
        }
    }
}
