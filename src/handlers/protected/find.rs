use axum::extract::{rejection::JsonRejection, Path, State};
use axum::Json;

use crate::app::AppState;
use crate::auth::Credential;
use crate::filter::FilterData;
use crate::mediator::{MediatorRequest, MediatorResponse};
use crate::middleware::{ApiResponse, ApiResult};
use crate::schema::{ValidationError, BODY_FIELD};
use crate::types::Operation;

/// POST /api/find/:resource - query with a JSON body `{ where, order, limit, cursor }`
pub async fn find_post(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    credential: Credential,
    body: Result<Json<FilterData>, JsonRejection>,
) -> ApiResult<MediatorResponse> {
    let Json(filter) = body.map_err(|e| ValidationError::single(BODY_FIELD, e.body_text()))?;

    let request = MediatorRequest::new(Operation::Query, resource, credential).with_filter(filter);
    Ok(ApiResponse::from(state.mediator.handle(request).await?))
}
