use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use std::convert::Infallible;

use crate::auth::Credential;

/// Pull the bearer credential out of the request headers without judging it.
/// The authentication gate decides what a missing or malformed one means.
#[async_trait]
impl<S> FromRequestParts<S> for Credential
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(extract_credential(&parts.headers))
    }
}

/// Extract the credential from the Authorization header
pub fn extract_credential(headers: &HeaderMap) -> Credential {
    match headers.get(header::AUTHORIZATION) {
        None => Credential::Missing,
        Some(value) => match value.to_str() {
            Ok(raw) => Credential::from_header(Some(raw)),
            Err(_) => Credential::Malformed("Invalid Authorization header format".to_string()),
        },
    }
}

/// `If-Match` value, used as the expected revision for writes
pub fn if_match(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::IF_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
