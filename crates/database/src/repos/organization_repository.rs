//! Companies and departments.

use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::entities::{Company, Department};
use crate::types::{DatabaseError, DatabaseResult};

#[derive(Clone)]
pub struct OrganizationRepository {
    pool: SqlitePool,
}

impl OrganizationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_company(&self, name: &str) -> DatabaseResult<Company> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query("INSERT INTO companies (name, created_at) VALUES (?, ?)")
            .bind(name)
            .bind(&now)
            .execute(&self.pool)
            .await?;

        Ok(Company {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            created_at: now,
        })
    }

    pub async fn create_department(&self, company_id: i64, name: &str) -> DatabaseResult<Department> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "INSERT INTO departments (company_id, name, created_at) VALUES (?, ?, ?)",
        )
        .bind(company_id)
        .bind(name)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(Department {
            id: result.last_insert_rowid(),
            company_id,
            name: name.to_string(),
            created_at: now,
        })
    }

    pub async fn find_company(&self, id: i64) -> DatabaseResult<Option<Company>> {
        let row = sqlx::query("SELECT id, name, created_at FROM companies WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| {
            Ok::<_, DatabaseError>(Company {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .transpose()
    }

    pub async fn find_department(&self, id: i64) -> DatabaseResult<Option<Department>> {
        let row = sqlx::query(
            "SELECT id, company_id, name, created_at FROM departments WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok::<_, DatabaseError>(Department {
                id: row.try_get("id")?,
                company_id: row.try_get("company_id")?,
                name: row.try_get("name")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .transpose()
    }
}
