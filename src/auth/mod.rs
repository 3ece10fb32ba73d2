// Authentication: credentials in, identities out

pub mod cache;
pub mod guard;
pub mod introspection;
pub mod password;
pub mod verifier;

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

pub use cache::VerificationCache;
pub use guard::Authenticator;
pub use introspection::IntrospectionVerifier;
pub use verifier::{CredentialVerifier, JwtVerifier, VerifyError};

/// Verified caller context. Lives for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub subject: String,
    pub roles: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Identity {
    pub fn new(subject: impl Into<String>, roles: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            subject: subject.into(),
            roles: roles.into_iter().map(Into::into).collect(),
            email: None,
            expires_at: None,
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// Bearer credential as presented by the caller, before verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Missing,
    Malformed(String),
    Bearer(String),
}

impl Credential {
    /// Parse an `Authorization` header value
    pub fn from_header(value: Option<&str>) -> Self {
        let Some(value) = value else {
            return Credential::Missing;
        };
        match value.strip_prefix("Bearer ") {
            Some(token) if !token.trim().is_empty() => Credential::Bearer(token.trim().to_string()),
            Some(_) => Credential::Malformed("Empty bearer token".to_string()),
            None => Credential::Malformed("Authorization header must use Bearer token format".to_string()),
        }
    }
}

/// Token claims. `role` carries a single role as older tokens do; `roles`
/// carries a list. Both feed the identity's role set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub exp: i64,
    #[serde(default)]
    pub iat: i64,
}

impl Claims {
    pub fn new(sub: impl Into<String>, roles: Vec<String>, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            sub: sub.into(),
            roles,
            role: None,
            email: None,
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn into_identity(self) -> Identity {
        let mut roles: BTreeSet<String> = self.roles.into_iter().collect();
        roles.extend(self.role);
        Identity {
            subject: self.sub,
            roles,
            email: self.email,
            expires_at: Utc.timestamp_opt(self.exp, 0).single(),
        }
    }
}

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("JWT generation error: {0}")]
    TokenGeneration(String),

    #[error("Invalid JWT secret")]
    InvalidSecret,
}

pub fn generate_jwt(claims: &Claims, secret: &str, algorithm: Algorithm) -> Result<String, JwtError> {
    if secret.is_empty() {
        return Err(JwtError::InvalidSecret);
    }

    let encoding_key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::new(algorithm), claims, &encoding_key)
        .map_err(|e| JwtError::TokenGeneration(e.to_string()))
}
