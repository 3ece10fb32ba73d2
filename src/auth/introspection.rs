use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use super::{CredentialVerifier, Identity, VerifyError};

#[derive(Debug, Deserialize)]
struct IntrospectionResponse {
    active: bool,
    sub: Option<String>,
    #[serde(default)]
    roles: Vec<String>,
    email: Option<String>,
    exp: Option<i64>,
}

/// Asks a remote endpoint whether a token is live: POST `{"token": ...}`,
/// expects `{"active", "sub", "roles", "exp"}`.
pub struct IntrospectionVerifier {
    client: reqwest::Client,
    endpoint: Url,
}

impl IntrospectionVerifier {
    pub fn new(endpoint: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[async_trait]
impl CredentialVerifier for IntrospectionVerifier {
    fn name(&self) -> &'static str {
        "introspection"
    }

    async fn verify(&self, token: &str) -> Result<Identity, VerifyError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&json!({ "token": token }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    VerifyError::Timeout
                } else {
                    VerifyError::Unavailable(e.to_string())
                }
            })?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(VerifyError::Rejected("introspection refused the token".to_string()))
            }
            status if !status.is_success() => {
                return Err(VerifyError::Unavailable(format!("introspection returned {}", status)))
            }
            _ => {}
        }

        let body: IntrospectionResponse = response
            .json()
            .await
            .map_err(|e| VerifyError::Unavailable(format!("unreadable introspection response: {}", e)))?;

        if !body.active {
            return Err(VerifyError::Rejected("token is not active".to_string()));
        }
        let subject = body
            .sub
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| VerifyError::Malformed("introspection response has no subject".to_string()))?;
        let expires_at = body.exp.and_then(|exp| Utc.timestamp_opt(exp, 0).single());
        if matches!(expires_at, Some(exp) if exp <= Utc::now()) {
            return Err(VerifyError::Expired);
        }

        Ok(Identity {
            email: body.email,
            expires_at,
            ..Identity::new(subject, body.roles)
        })
    }
}
