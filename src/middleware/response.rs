use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;

use crate::error::ApiError;
use crate::mediator::MediatorResponse;

/// Success body: `{ "success": true, "data": ... }`
#[derive(Serialize)]
struct Envelope<T> {
    success: bool,
    data: T,
}

/// Handler output wrapped in the success envelope
#[derive(Debug)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub status: StatusCode,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            data,
            status: StatusCode::OK,
        }
    }

    pub fn created(data: T) -> Self {
        Self {
            data,
            status: StatusCode::CREATED,
        }
    }
}

impl From<MediatorResponse> for ApiResponse<MediatorResponse> {
    fn from(response: MediatorResponse) -> Self {
        if response.is_created() {
            ApiResponse::created(response)
        } else {
            ApiResponse::success(response)
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let envelope = Envelope {
            success: true,
            data: self.data,
        };
        (self.status, Json(envelope)).into_response()
    }
}

pub type ApiResult<T> = Result<ApiResponse<T>, ApiError>;
