// Token acquisition: the only routes that accept a password instead of a
// bearer credential.

use axum::extract::{rejection::JsonRejection, State};
use axum::Json;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

use crate::accounts::{AccountService, Login, Registration, Session};
use crate::app::AppState;
use crate::error::ApiError;
use crate::handlers::protected::data::utils::json_body;
use crate::middleware::{ApiResponse, ApiResult};
use crate::schema::{ValidationError, BODY_FIELD};

/// POST /api/auth/login - exchange email and password for a bearer token
pub async fn login_post(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Session> {
    let login: Login = typed_body(body)?;
    let session = accounts(&state)?.login(login).await?;
    Ok(ApiResponse::success(session))
}

/// POST /api/auth/register - create an account and sign it in
pub async fn register_post(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Session> {
    let registration: Registration = typed_body(body)?;
    let session = accounts(&state)?.register(registration).await?;
    Ok(ApiResponse::created(session))
}

fn accounts(state: &AppState) -> Result<&Arc<AccountService>, ApiError> {
    state
        .accounts
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("Password accounts are not enabled".to_string()))
}

fn typed_body<T: DeserializeOwned>(body: Result<Json<Value>, JsonRejection>) -> Result<T, ValidationError> {
    serde_json::from_value(json_body(body)?).map_err(|e| ValidationError::single(BODY_FIELD, e.to_string()))
}
