use axum::extract::{rejection::JsonRejection, Path, Query, State};
use axum::Json;
use serde_json::Value;

use super::utils::{json_body, ListQuery};
use crate::app::AppState;
use crate::auth::Credential;
use crate::mediator::{MediatorRequest, MediatorResponse};
use crate::middleware::{ApiResponse, ApiResult};
use crate::types::Operation;

/// GET /api/data/:resource - one page of documents
pub async fn get(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Query(query): Query<ListQuery>,
    credential: Credential,
) -> ApiResult<MediatorResponse> {
    let filter = query.into_filter_data()?;
    let request = MediatorRequest::new(Operation::Query, resource, credential).with_filter(filter);
    Ok(ApiResponse::from(state.mediator.handle(request).await?))
}

/// POST /api/data/:resource - create a document
pub async fn post(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    credential: Credential,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<MediatorResponse> {
    let payload = json_body(body)?;
    let request = MediatorRequest::new(Operation::Create, resource, credential).with_payload(payload);
    Ok(ApiResponse::from(state.mediator.handle(request).await?))
}
