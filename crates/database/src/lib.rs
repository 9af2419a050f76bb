//! Link Database Crate
//!
//! Connection management, migrations, and the repositories that act as the
//! source of truth for users, organizations, chat rooms and notifications.

use link_config::DatabaseConfig;
use sqlx::SqlitePool;

pub mod connection;
pub mod entities;
pub mod migrations;
pub mod repos;
pub mod types;

pub use connection::prepare_database;
pub use migrations::run_migrations;

pub use repos::{
    ChatRoomRepository, NotificationRepository, OrganizationRepository, UserRepository,
};

pub use entities::{
    ChatRoom, Company, Department, NewNotification, NewUser, Notification, NotificationKind,
    NotificationStatus, OrgRef, OrgType, UserRecord, UserRole, UserUpdate,
};

pub use types::{DatabaseError, DatabaseResult};

/// Prepare the pool and apply every pending migration.
pub async fn initialize_database(config: &DatabaseConfig) -> DatabaseResult<SqlitePool> {
    let pool = prepare_database(config)
        .await
        .map_err(|e| DatabaseError::ConnectionError(format!("{e:#}")))?;

    run_migrations(&pool)
        .await
        .map_err(|e| DatabaseError::MigrationError(format!("{e:#}")))?;

    Ok(pool)
}
