//! Source-of-truth seam behind the cache.

use async_trait::async_trait;
use link_database::{DatabaseResult, NewUser, UserRecord, UserRepository, UserUpdate};

/// `lookupUser(id) -> record` plus the writes the cache fronts.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find(&self, user_id: i64) -> DatabaseResult<Option<UserRecord>>;

    async fn exists(&self, user_id: i64) -> DatabaseResult<bool>;

    async fn create(&self, user: &NewUser) -> DatabaseResult<UserRecord>;

    /// Commits `update` transactionally and returns the `updated_at` stamp it wrote.
    async fn update(&self, user_id: i64, update: &UserUpdate) -> DatabaseResult<String>;
}

#[async_trait]
impl UserStore for UserRepository {
    async fn find(&self, user_id: i64) -> DatabaseResult<Option<UserRecord>> {
        self.find_by_id(user_id).await
    }

    async fn exists(&self, user_id: i64) -> DatabaseResult<bool> {
        UserRepository::exists(self, user_id).await
    }

    async fn create(&self, user: &NewUser) -> DatabaseResult<UserRecord> {
        UserRepository::create(self, user).await
    }

    async fn update(&self, user_id: i64, update: &UserUpdate) -> DatabaseResult<String> {
        UserRepository::update(self, user_id, update).await
    }
}
