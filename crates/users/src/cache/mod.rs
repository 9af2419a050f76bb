//! Hash-per-user cache backends and the field codec.

pub mod codec;
pub mod memory_store;
pub mod redis_store;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::types::CacheError;

pub use memory_store::MemoryCacheStore;
pub use redis_store::RedisCacheStore;

pub type CacheFields = HashMap<String, String>;

pub fn user_key(user_id: i64) -> String {
    format!("user:{user_id}")
}

/// A string-hash store with per-key expiry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Every field under `key`; empty when the key is absent or expired.
    async fn read_all(&self, key: &str) -> Result<CacheFields, CacheError>;

    async fn read_field(&self, key: &str, field: &str) -> Result<Option<String>, CacheError>;

    /// Merges `fields` and resets the key's expiry to `ttl` in one atomic step.
    async fn write_with_ttl(
        &self,
        key: &str,
        fields: &[(String, String)],
        ttl: Duration,
    ) -> Result<(), CacheError>;

    /// Merges `fields`, leaving the key's expiry alone.
    async fn merge(&self, key: &str, fields: &[(String, String)]) -> Result<(), CacheError>;

    async fn remove_fields(&self, key: &str, fields: &[&str]) -> Result<(), CacheError>;
}
