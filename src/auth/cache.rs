use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::Identity;

type CredentialHash = [u8; 32];

#[derive(Debug, Clone)]
struct CacheEntry {
    identity: Identity,
    expires_at: DateTime<Utc>,
}

/// Short-lived map from credential hash to verified identity.
///
/// An optimization only: a miss always falls back to the verifier. Entries
/// expire at `now + ttl` or at the token's own expiry, whichever is sooner.
/// Raw credentials are never stored.
pub struct VerificationCache {
    ttl: Duration,
    capacity: usize,
    entries: Mutex<HashMap<CredentialHash, CacheEntry>>,
}

impl VerificationCache {
    pub fn new(ttl: std::time::Duration, capacity: usize) -> Self {
        Self {
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::zero()),
            capacity,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.capacity > 0 && self.ttl > Duration::zero()
    }

    pub async fn get(&self, credential: &str) -> Option<Identity> {
        self.get_at(credential, Utc::now()).await
    }

    pub async fn insert(&self, credential: &str, identity: &Identity) {
        self.insert_at(credential, identity, Utc::now()).await
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub(crate) async fn get_at(&self, credential: &str, now: DateTime<Utc>) -> Option<Identity> {
        let key = hash(credential);
        let mut entries = self.entries.lock().await;
        match entries.get(&key) {
            Some(entry) if entry.expires_at > now => Some(entry.identity.clone()),
            Some(_) => {
                entries.remove(&key);
                None
            }
            None => None,
        }
    }

    pub(crate) async fn insert_at(&self, credential: &str, identity: &Identity, now: DateTime<Utc>) {
        if !self.is_enabled() {
            return;
        }
        let expires_at = match identity.expires_at {
            Some(token_expiry) => token_expiry.min(now + self.ttl),
            None => now + self.ttl,
        };
        if expires_at <= now {
            return;
        }

        let key = hash(credential);
        let mut entries = self.entries.lock().await;
        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            entries.retain(|_, entry| entry.expires_at > now);
            if entries.len() >= self.capacity {
                let soonest = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.expires_at)
                    .map(|(k, _)| *k);
                if let Some(k) = soonest {
                    entries.remove(&k);
                }
            }
        }
        entries.insert(
            key,
            CacheEntry {
                identity: identity.clone(),
                expires_at,
            },
        );
    }
}

fn hash(credential: &str) -> CredentialHash {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(credential.as_bytes()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(subject: &str, expires_at: Option<DateTime<Utc>>) -> Identity {
        Identity {
            expires_at,
            ..Identity::new(subject, ["user"])
        }
    }

    #[tokio::test]
    async fn entry_expires_with_ttl() {
        let cache = VerificationCache::new(std::time::Duration::from_secs(30), 8);
        let now = Utc::now();
        cache.insert_at("tok", &identity("u1", None), now).await;

        assert_eq!(cache.get_at("tok", now + Duration::seconds(29)).await.map(|i| i.subject), Some("u1".into()));
        assert!(cache.get_at("tok", now + Duration::seconds(31)).await.is_none());
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn entry_never_outlives_token() {
        let cache = VerificationCache::new(std::time::Duration::from_secs(300), 8);
        let now = Utc::now();
        cache
            .insert_at("tok", &identity("u1", Some(now + Duration::seconds(10))), now)
            .await;
        assert!(cache.get_at("tok", now + Duration::seconds(9)).await.is_some());
        assert!(cache.get_at("tok", now + Duration::seconds(11)).await.is_none());

        cache
            .insert_at("old", &identity("u2", Some(now - Duration::seconds(1))), now)
            .await;
        assert!(cache.get_at("old", now).await.is_none());
    }

    #[tokio::test]
    async fn capacity_is_bounded() {
        let cache = VerificationCache::new(std::time::Duration::from_secs(60), 2);
        let now = Utc::now();
        cache.insert_at("a", &identity("a", Some(now + Duration::seconds(5))), now).await;
        cache.insert_at("b", &identity("b", None), now).await;
        cache.insert_at("c", &identity("c", None), now).await;

        assert_eq!(cache.len().await, 2);
        assert!(cache.get_at("a", now).await.is_none(), "soonest-expiring entry evicted");
        assert!(cache.get_at("b", now).await.is_some());
        assert!(cache.get_at("c", now).await.is_some());
    }

    #[tokio::test]
    async fn disabled_cache_stores_nothing() {
        let cache = VerificationCache::new(std::time::Duration::from_secs(60), 0);
        cache.insert("tok", &identity("u1", None)).await;
        assert!(cache.get("tok").await.is_none());
    }
}
