use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use thiserror::Error;

use super::{Claims, Identity, JwtError};

/// Why a credential did not yield an identity
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("Missing Authorization header")]
    Missing,

    #[error("Malformed credential: {0}")]
    Malformed(String),

    #[error("Credential rejected: {0}")]
    Rejected(String),

    #[error("Credential expired")]
    Expired,

    #[error("Credential verification timed out")]
    Timeout,

    /// The verifier itself failed (network, bad response); not the caller's fault
    #[error("Credential verifier unavailable: {0}")]
    Unavailable(String),
}

/// Maps a bearer token to an identity, checking integrity and expiry
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn verify(&self, token: &str) -> Result<Identity, VerifyError>;
}

/// Local signature check with a shared secret
pub struct JwtVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str, algorithm: Algorithm) -> Result<Self, JwtError> {
        if secret.is_empty() {
            return Err(JwtError::InvalidSecret);
        }
        let mut validation = Validation::new(algorithm);
        validation.set_required_spec_claims(&["exp", "sub"]);
        Ok(Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }
}

#[async_trait]
impl CredentialVerifier for JwtVerifier {
    fn name(&self) -> &'static str {
        "jwt"
    }

    async fn verify(&self, token: &str) -> Result<Identity, VerifyError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => VerifyError::Expired,
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                VerifyError::Rejected("invalid signature".to_string())
            }
            _ => VerifyError::Malformed(e.to_string()),
        })?;

        if data.claims.sub.trim().is_empty() {
            return Err(VerifyError::Malformed("empty subject".to_string()));
        }
        Ok(data.claims.into_identity())
    }
}
