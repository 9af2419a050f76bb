//! In-process cache store used when no Redis is configured.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;

use super::{CacheFields, CacheStore};
use crate::types::CacheError;

#[derive(Debug, Default)]
struct CachedHash {
    fields: HashMap<String, String>,
    expires_at: Option<Instant>,
}

impl CachedHash {
    fn expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// Hash-per-key store with lazy expiry, mirroring the Redis semantics the cache relies on.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: DashMap<String, CachedHash>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn evict_expired(&self, key: &str) {
        let now = Instant::now();
        self.entries.remove_if(key, |_, hash| hash.expired(now));
    }

    fn merge_fields(&self, key: &str, fields: &[(String, String)], ttl: Option<Duration>) {
        self.evict_expired(key);
        let mut hash = self.entries.entry(key.to_string()).or_default();
        hash.fields.extend(fields.iter().cloned());
        if let Some(ttl) = ttl {
            hash.expires_at = Some(Instant::now() + ttl);
        }
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn read_all(&self, key: &str) -> Result<CacheFields, CacheError> {
        self.evict_expired(key);
        Ok(self
            .entries
            .get(key)
            .map(|hash| hash.fields.clone())
            .unwrap_or_default())
    }

    async fn read_field(&self, key: &str, field: &str) -> Result<Option<String>, CacheError> {
        self.evict_expired(key);
        Ok(self
            .entries
            .get(key)
            .and_then(|hash| hash.fields.get(field).cloned()))
    }

    async fn write_with_ttl(
        &self,
        key: &str,
        fields: &[(String, String)],
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.merge_fields(key, fields, Some(ttl));
        Ok(())
    }

    async fn merge(&self, key: &str, fields: &[(String, String)]) -> Result<(), CacheError> {
        self.merge_fields(key, fields, None);
        Ok(())
    }

    async fn remove_fields(&self, key: &str, fields: &[&str]) -> Result<(), CacheError> {
        if let Entry::Occupied(mut entry) = self.entries.entry(key.to_string()) {
            for field in fields {
                entry.get_mut().fields.remove(*field);
            }
            if entry.get().fields.is_empty() {
                entry.remove();
            }
        }
        Ok(())
    }
}
