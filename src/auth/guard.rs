use std::sync::Arc;
use std::time::Duration;

use super::{Credential, CredentialVerifier, Identity, VerificationCache, VerifyError};

/// Authentication gate: turns a presented credential into an identity.
///
/// Each call is bounded by `timeout`. Successful verifications are cached
/// when a cache is configured; failures never are.
pub struct Authenticator {
    verifier: Arc<dyn CredentialVerifier>,
    cache: Option<VerificationCache>,
    timeout: Duration,
}

impl Authenticator {
    pub fn new(verifier: Arc<dyn CredentialVerifier>, timeout: Duration) -> Self {
        Self {
            verifier,
            cache: None,
            timeout,
        }
    }

    pub fn with_cache(mut self, cache: VerificationCache) -> Self {
        self.cache = Some(cache).filter(VerificationCache::is_enabled);
        self
    }

    pub fn verifier_name(&self) -> &'static str {
        self.verifier.name()
    }

    pub async fn authenticate(&self, credential: &Credential) -> Result<Identity, VerifyError> {
        let token = match credential {
            Credential::Missing => return Err(VerifyError::Missing),
            Credential::Malformed(reason) => return Err(VerifyError::Malformed(reason.clone())),
            Credential::Bearer(token) => token,
        };

        if let Some(cache) = &self.cache {
            if let Some(identity) = cache.get(token).await {
                tracing::debug!("Credential cache hit for {}", identity.subject);
                return Ok(identity);
            }
        }

        let identity = match tokio::time::timeout(self.timeout, self.verifier.verify(token)).await {
            Ok(Ok(identity)) => identity,
            Ok(Err(e)) => {
                tracing::warn!("Rejected credential via {}: {}", self.verifier.name(), e);
                return Err(e);
            }
            Err(_) => {
                tracing::warn!(
                    "Credential verification via {} exceeded {}ms",
                    self.verifier.name(),
                    self.timeout.as_millis()
                );
                return Err(VerifyError::Timeout);
            }
        };

        if let Some(cache) = &self.cache {
            cache.insert(token, &identity).await;
        }
        Ok(identity)
    }
}
