use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

use crate::mediator::MediatorError;
use crate::schema::{FieldViolation, ValidationError};

const INTERNAL_MESSAGE: &str = "An error occurred while processing your request";

/// The one error type that leaves the HTTP layer. Every mediator outcome
/// maps to exactly one variant.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    ValidationError {
        message: String,
        field_errors: Vec<FieldViolation>,
    },

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// Storage or credential verification did not answer in time
    #[error("{0}")]
    Timeout(String),

    #[error("{0}")]
    InternalServerError(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::ValidationError { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for clients
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::ValidationError { .. } => "VALIDATION_ERROR",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::Timeout(_) => "TIMEOUT",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    pub fn to_json(&self) -> Value {
        let mut body = json!({
            "success": false,
            "error": true,
            "message": self.to_string(),
            "code": self.error_code(),
        });
        if let ApiError::ValidationError { field_errors, .. } = self {
            body["field_errors"] = json!(field_errors);
        }
        body
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::ValidationError {
            message: "Validation failed".to_string(),
            field_errors: err.violations,
        }
    }
}

impl From<MediatorError> for ApiError {
    fn from(err: MediatorError) -> Self {
        match err {
            MediatorError::Validation(v) => v.into(),
            MediatorError::Unauthenticated(msg) => ApiError::Unauthorized(msg),
            MediatorError::Forbidden(msg) => ApiError::Forbidden(msg),
            MediatorError::NotFound(msg) => ApiError::NotFound(msg),
            e @ MediatorError::Conflict { .. } => ApiError::Conflict(e.to_string()),
            MediatorError::Timeout(msg) => ApiError::Timeout(msg),
            // logged by the mediator
            MediatorError::Internal(_) => ApiError::InternalServerError(INTERNAL_MESSAGE.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut response = (status, Json(self.to_json())).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
