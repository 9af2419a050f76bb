//! Redis-backed cache store: one hash per user under `user:{id}`.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::info;

use super::{CacheFields, CacheStore};
use crate::types::CacheError;

#[derive(Clone)]
pub struct RedisCacheStore {
    connection: ConnectionManager,
}

impl RedisCacheStore {
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }

    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        info!("redis cache store connected");
        Ok(Self::new(connection))
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn read_all(&self, key: &str) -> Result<CacheFields, CacheError> {
        let mut connection = self.connection.clone();
        let fields: CacheFields = connection.hgetall(key).await?;
        Ok(fields)
    }

    async fn read_field(&self, key: &str, field: &str) -> Result<Option<String>, CacheError> {
        let mut connection = self.connection.clone();
        let value: Option<String> = connection.hget(key, field).await?;
        Ok(value)
    }

    async fn write_with_ttl(
        &self,
        key: &str,
        fields: &[(String, String)],
        ttl: Duration,
    ) -> Result<(), CacheError> {
        if fields.is_empty() {
            return Ok(());
        }
        let seconds = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX).max(1);

        let mut connection = self.connection.clone();
        redis::pipe()
            .atomic()
            .hset_multiple(key, fields)
            .ignore()
            .cmd("EXPIRE")
            .arg(key)
            .arg(seconds)
            .ignore()
            .query_async::<_, ()>(&mut connection)
            .await?;
        Ok(())
    }

    async fn merge(&self, key: &str, fields: &[(String, String)]) -> Result<(), CacheError> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut connection = self.connection.clone();
        connection.hset_multiple::<_, _, _, ()>(key, fields).await?;
        Ok(())
    }

    async fn remove_fields(&self, key: &str, fields: &[&str]) -> Result<(), CacheError> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut connection = self.connection.clone();
        connection.hdel::<_, _, ()>(key, fields).await?;
        Ok(())
    }
}
