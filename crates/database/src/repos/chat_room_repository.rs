//! Chat rooms. The realtime hub only needs to know whether one exists.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::entities::ChatRoom;
use crate::types::DatabaseResult;

#[derive(Clone)]
pub struct ChatRoomRepository {
    pool: SqlitePool,
}

impl ChatRoomRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, name: &str, company_id: Option<i64>) -> DatabaseResult<ChatRoom> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query("INSERT INTO chat_rooms (name, company_id, created_at) VALUES (?, ?, ?)")
            .bind(name)
            .bind(company_id)
            .bind(&now)
            .execute(&self.pool)
            .await?;

        Ok(ChatRoom {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            company_id,
            created_at: now,
        })
    }

    pub async fn exists(&self, id: i64) -> DatabaseResult<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM chat_rooms WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }
}
