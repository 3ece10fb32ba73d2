use axum::extract::{rejection::JsonRejection, Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde_json::Value;

use super::utils::{json_body, RevisionQuery};
use crate::app::AppState;
use crate::auth::Credential;
use crate::mediator::{MediatorRequest, MediatorResponse};
use crate::middleware::{if_match, ApiResponse, ApiResult};
use crate::types::Operation;

/// GET /api/data/:resource/:id
pub async fn get(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
    credential: Credential,
) -> ApiResult<MediatorResponse> {
    let request = MediatorRequest::new(Operation::Read, resource, credential).with_id(id);
    Ok(ApiResponse::from(state.mediator.handle(request).await?))
}

/// PUT /api/data/:resource/:id - same merge semantics as PATCH
pub async fn put(
    state: State<AppState>,
    path: Path<(String, String)>,
    query: Query<RevisionQuery>,
    headers: HeaderMap,
    credential: Credential,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<MediatorResponse> {
    patch(state, path, query, headers, credential, body).await
}

/// PATCH /api/data/:resource/:id - revision from `If-Match` or `?revision=`
pub async fn patch(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
    Query(query): Query<RevisionQuery>,
    headers: HeaderMap,
    credential: Credential,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<MediatorResponse> {
    let payload = json_body(body)?;
    let mut request = MediatorRequest::new(Operation::Update, resource, credential)
        .with_id(id)
        .with_payload(payload);
    request.revision = if_match(&headers).or(query.revision);
    Ok(ApiResponse::from(state.mediator.handle(request).await?))
}

/// DELETE /api/data/:resource/:id - tombstone
pub async fn delete(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
    Query(query): Query<RevisionQuery>,
    headers: HeaderMap,
    credential: Credential,
) -> ApiResult<MediatorResponse> {
    let mut request = MediatorRequest::new(Operation::Delete, resource, credential).with_id(id);
    request.revision = if_match(&headers).or(query.revision);
    Ok(ApiResponse::from(state.mediator.handle(request).await?))
}
