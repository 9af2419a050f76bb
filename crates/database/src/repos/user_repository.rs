//! User repository: the source of truth behind the user cache.

use chrono::Utc;
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::entities::{NewUser, OrgRef, UserRecord, UserRole, UserUpdate};
use crate::types::{DatabaseError, DatabaseResult};

const USER_COLUMNS: &str = "id, name, email, nickname, phone, role, image, birthday, is_subscribed, company_id, entry_date, created_at, updated_at";

#[derive(Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, request: &NewUser) -> DatabaseResult<UserRecord> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            "INSERT INTO users (name, email, nickname, phone, role, image, birthday, is_subscribed, company_id, entry_date, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.name)
        .bind(&request.email)
        .bind(&request.nickname)
        .bind(&request.phone)
        .bind(request.role.level())
        .bind(&request.image)
        .bind(&request.birthday)
        .bind(request.is_subscribed)
        .bind(request.company_id)
        .bind(&request.entry_date)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!(user_id = id, "user created");
        self.find_by_id(id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("user {id}")))
    }

    pub async fn find_by_id(&self, id: i64) -> DatabaseResult<Option<UserRecord>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut user = map_user_row(&row)?;
        user.departments = self.memberships(id, MembershipTable::Departments).await?;
        user.teams = self.memberships(id, MembershipTable::Teams).await?;
        Ok(Some(user))
    }

    pub async fn exists(&self, id: i64) -> DatabaseResult<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    /// Applies `update` in a single transaction and returns the `updated_at` stamp written.
    pub async fn update(&self, id: i64, update: &UserUpdate) -> DatabaseResult<String> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE users SET updated_at = ");
        builder.push_bind(now.clone());
        if let Some(name) = &update.name {
            builder.push(", name = ").push_bind(name.clone());
        }
        if let Some(nickname) = &update.nickname {
            builder.push(", nickname = ").push_bind(nickname.clone());
        }
        if let Some(phone) = &update.phone {
            builder.push(", phone = ").push_bind(phone.clone());
        }
        if let Some(image) = &update.image {
            builder.push(", image = ").push_bind(image.clone());
        }
        if let Some(birthday) = &update.birthday {
            builder.push(", birthday = ").push_bind(birthday.clone());
        }
        if let Some(is_subscribed) = update.is_subscribed {
            builder.push(", is_subscribed = ").push_bind(is_subscribed);
        }
        if let Some(entry_date) = &update.entry_date {
            builder.push(", entry_date = ").push_bind(entry_date.clone());
        }
        if let Some(company_id) = update.company_id {
            builder.push(", company_id = ").push_bind(company_id);
        }
        builder.push(" WHERE id = ").push_bind(id);
        // A user joins at most one company; moving between companies is not a profile edit.
        if update.company_id.is_some() {
            builder.push(" AND company_id IS NULL");
        }

        let result = builder.build().execute(&mut *tx).await?;
        if result.rows_affected() == 0 {
            if update.company_id.is_some() && user_exists(&mut *tx, id).await? {
                return Err(DatabaseError::Conflict(format!(
                    "user {id} already belongs to a company"
                )));
            }
            return Err(DatabaseError::NotFound(format!("user {id}")));
        }

        if let Some(department_id) = update.join_department {
            let joined = sqlx::query(
                "INSERT OR IGNORE INTO user_departments (user_id, department_id, joined_at)
                 SELECT u.id, d.id, ? FROM users u JOIN departments d ON d.company_id = u.company_id
                 WHERE u.id = ? AND d.id = ?",
            )
            .bind(&now)
            .bind(id)
            .bind(department_id)
            .execute(&mut *tx)
            .await?;
            if joined.rows_affected() == 0 {
                return Err(DatabaseError::Conflict(format!(
                    "user {id} cannot join department {department_id}"
                )));
            }
        }

        tx.commit().await?;
        debug!(user_id = id, "user updated");
        Ok(now)
    }

    async fn memberships(&self, user_id: i64, table: MembershipTable) -> DatabaseResult<Vec<OrgRef>> {
        let sql = match table {
            MembershipTable::Departments => {
                "SELECT d.id, d.name FROM user_departments m JOIN departments d ON d.id = m.department_id
                 WHERE m.user_id = ? ORDER BY d.id"
            }
            MembershipTable::Teams => {
                "SELECT t.id, t.name FROM user_teams m JOIN teams t ON t.id = m.team_id
                 WHERE m.user_id = ? ORDER BY t.id"
            }
        };

        let rows = sqlx::query(sql).bind(user_id).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| {
                Ok(OrgRef {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                })
            })
            .collect()
    }
}

enum MembershipTable {
    Departments,
    Teams,
}

async fn user_exists(conn: &mut SqliteConnection, id: i64) -> DatabaseResult<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(found.is_some())
}

fn map_user_row(row: &SqliteRow) -> DatabaseResult<UserRecord> {
    let level: i64 = row.try_get("role")?;
    let role = UserRole::from_level(level)
        .ok_or_else(|| DatabaseError::CorruptRow(format!("unknown role level {level}")))?;

    Ok(UserRecord {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        nickname: row.try_get("nickname")?,
        phone: row.try_get("phone")?,
        role,
        image: row.try_get("image")?,
        birthday: row.try_get("birthday")?,
        is_subscribed: row.try_get("is_subscribed")?,
        company_id: row.try_get("company_id")?,
        departments: Vec::new(),
        teams: Vec::new(),
        entry_date: row.try_get("entry_date")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        is_online: false,
    })
}
