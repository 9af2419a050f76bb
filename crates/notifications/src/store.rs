//! Persistence seams used by the engine.

use async_trait::async_trait;
use link_database::{
    Company, DatabaseResult, Department, NewNotification, Notification, NotificationRepository,
    NotificationStatus, OrganizationRepository,
};

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn create(&self, notification: &NewNotification) -> DatabaseResult<Notification>;

    async fn find(&self, id: &str) -> DatabaseResult<Option<Notification>>;

    async fn list(
        &self,
        receiver_id: i64,
        unread_only: bool,
        limit: u32,
        offset: u32,
    ) -> DatabaseResult<Vec<Notification>>;

    /// Moves `id` from `from` to `to`; `false` when the stored status was not `from`.
    async fn transition_status(
        &self,
        id: &str,
        from: NotificationStatus,
        to: NotificationStatus,
    ) -> DatabaseResult<bool>;

    async fn mark_read(&self, id: &str) -> DatabaseResult<bool>;
}

#[async_trait]
impl NotificationStore for NotificationRepository {
    async fn create(&self, notification: &NewNotification) -> DatabaseResult<Notification> {
        NotificationRepository::create(self, notification).await
    }

    async fn find(&self, id: &str) -> DatabaseResult<Option<Notification>> {
        self.find_by_id(id).await
    }

    async fn list(
        &self,
        receiver_id: i64,
        unread_only: bool,
        limit: u32,
        offset: u32,
    ) -> DatabaseResult<Vec<Notification>> {
        self.list_by_receiver(receiver_id, unread_only, limit, offset)
            .await
    }

    async fn transition_status(
        &self,
        id: &str,
        from: NotificationStatus,
        to: NotificationStatus,
    ) -> DatabaseResult<bool> {
        NotificationRepository::transition_status(self, id, from, to).await
    }

    async fn mark_read(&self, id: &str) -> DatabaseResult<bool> {
        NotificationRepository::mark_read(self, id).await
    }
}

/// `lookupOrg(id) -> displayName`, split by organization kind.
#[async_trait]
pub trait OrgDirectory: Send + Sync {
    async fn company(&self, id: i64) -> DatabaseResult<Option<Company>>;

    async fn department(&self, id: i64) -> DatabaseResult<Option<Department>>;
}

#[async_trait]
impl OrgDirectory for OrganizationRepository {
    async fn company(&self, id: i64) -> DatabaseResult<Option<Company>> {
        self.find_company(id).await
    }

    async fn department(&self, id: i64) -> DatabaseResult<Option<Department>> {
        self.find_department(id).await
    }
}
