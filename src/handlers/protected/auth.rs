use axum::extract::State;

use crate::app::AppState;
use crate::auth::{Credential, Identity};
use crate::error::ApiError;
use crate::mediator::MediatorError;
use crate::middleware::{ApiResponse, ApiResult};

/// GET /api/auth/whoami - echo the identity behind the presented credential
pub async fn whoami(State(state): State<AppState>, credential: Credential) -> ApiResult<Identity> {
    let identity = state
        .mediator
        .authenticator()
        .authenticate(&credential)
        .await
        .map_err(|e| ApiError::from(MediatorError::from(e)))?;
    Ok(ApiResponse::success(identity))
}
