//! Notification repository for database operations.

use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::entities::{NewNotification, Notification, NotificationStatus};
use crate::types::{DatabaseError, DatabaseResult};

const NOTIFICATION_COLUMNS: &str = "id, sender_id, receiver_id, kind, org_type, status, is_read, title, content, company_id, company_name, department_id, department_name, created_at, updated_at";

#[derive(Clone)]
pub struct NotificationRepository {
    pool: SqlitePool,
}

impl NotificationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, request: &NewNotification) -> DatabaseResult<Notification> {
        let id = cuid2::create_id();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO notifications (id, sender_id, receiver_id, kind, org_type, status, is_read, title, content, company_id, company_name, department_id, department_name, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(request.sender_id)
        .bind(request.receiver_id)
        .bind(request.kind.as_str())
        .bind(request.org_type.map(|org| org.as_str()))
        .bind(request.status.map(|status| status.as_str()))
        .bind(&request.title)
        .bind(&request.content)
        .bind(request.company_id)
        .bind(&request.company_name)
        .bind(request.department_id)
        .bind(&request.department_name)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.find_by_id(&id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("notification {id}")))
    }

    pub async fn find_by_id(&self, id: &str) -> DatabaseResult<Option<Notification>> {
        let row = sqlx::query(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_notification_row).transpose()
    }

    /// Newest first.
    pub async fn list_by_receiver(
        &self,
        receiver_id: i64,
        unread_only: bool,
        limit: u32,
        offset: u32,
    ) -> DatabaseResult<Vec<Notification>> {
        let filter = if unread_only { " AND is_read = 0" } else { "" };
        let rows = sqlx::query(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE receiver_id = ?{filter}
             ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?"
        ))
        .bind(receiver_id)
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_notification_row).collect()
    }

    /// Compare-and-set on the status column. Returns `false` when the stored status was not `from`.
    pub async fn transition_status(
        &self,
        id: &str,
        from: NotificationStatus,
        to: NotificationStatus,
    ) -> DatabaseResult<bool> {
        let result = sqlx::query(
            "UPDATE notifications SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(to.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Sets the read flag. Returns `true` only when the flag actually flipped.
    pub async fn mark_read(&self, id: &str) -> DatabaseResult<bool> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = 1, updated_at = ? WHERE id = ? AND is_read = 0",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

fn parse_column<T>(row: &SqliteRow, column: &str) -> DatabaseResult<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|value| {
        value
            .parse::<T>()
            .map_err(|e| DatabaseError::CorruptRow(format!("{column}: {e}")))
    })
    .transpose()
}

fn map_notification_row(row: &SqliteRow) -> DatabaseResult<Notification> {
    let kind = parse_column(row, "kind")?
        .ok_or_else(|| DatabaseError::CorruptRow("kind is null".to_string()))?;

    Ok(Notification {
        id: row.try_get("id")?,
        sender_id: row.try_get("sender_id")?,
        receiver_id: row.try_get("receiver_id")?,
        kind,
        org_type: parse_column(row, "org_type")?,
        status: parse_column(row, "status")?,
        is_read: row.try_get("is_read")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        company_id: row.try_get("company_id")?,
        company_name: row.try_get("company_name")?,
        department_id: row.try_get("department_id")?,
        department_name: row.try_get("department_name")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
