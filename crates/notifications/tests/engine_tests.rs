use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::Message;
use bytes::Bytes;
use futures_util::StreamExt;
use link_config::{CacheConfig, DatabaseConfig};
use link_database::{
    initialize_database, Company, DatabaseError, DatabaseResult, NewNotification, NewUser,
    Notification, NotificationRepository, OrganizationRepository, UserRecord, UserRepository,
    UserRole, UserUpdate,
};
use link_notifications::events::{INVITE_RESPONSE_TOPIC, MENTION_TOPIC};
use link_notifications::{
    EventEnvelope, EventMessage, EventPublisher, EventSubscriber, InviteRequest, JoinRequest,
    LocalEventBus, MentionRequest, NotificationEngine, NotificationError, NotificationKind,
    NotificationQuery, NotificationRelay, NotificationStatus, NotificationStore, OrgType,
    PublishError,
};
use link_realtime::{Hub, NoopPresence, OutboundQueue, RegistrationGuard};
use link_users::{MemoryCacheStore, UserStateCache};
use tempfile::TempDir;

type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

struct TestContext {
    users: Arc<UserStateCache>,
    organizations: OrganizationRepository,
    notifications: NotificationRepository,
    hub: Hub,
    bus: LocalEventBus,
    engine: NotificationEngine,
    _dir: TempDir,
}

impl TestContext {
    async fn new() -> TestResult<Self> {
        Self::with_publisher(None).await
    }

    async fn with_publisher(publisher: Option<Arc<dyn EventPublisher>>) -> TestResult<Self> {
        Self::build(publisher, |repository| Arc::new(repository)).await
    }

    async fn with_store(wrap: fn(NotificationRepository) -> Arc<dyn NotificationStore>) -> TestResult<Self> {
        Self::build(None, wrap).await
    }

    async fn build(
        publisher: Option<Arc<dyn EventPublisher>>,
        wrap: fn(NotificationRepository) -> Arc<dyn NotificationStore>,
    ) -> TestResult<Self> {
        let dir = TempDir::new()?;
        let pool = initialize_database(&DatabaseConfig {
            url: format!("sqlite://{}", dir.path().join("notifications.db").display()),
            max_connections: 4,
        })
        .await?;

        let users = Arc::new(UserStateCache::new(
            Arc::new(UserRepository::new(pool.clone())),
            Arc::new(MemoryCacheStore::new()),
            &CacheConfig::default(),
        ));
        let organizations = OrganizationRepository::new(pool.clone());
        let notifications = NotificationRepository::new(pool);
        let hub = Hub::new(Arc::new(NoopPresence), 16);
        let bus = LocalEventBus::default();

        let engine = NotificationEngine::new(
            wrap(notifications.clone()),
            users.clone(),
            Arc::new(organizations.clone()),
            hub.clone(),
            publisher.unwrap_or_else(|| Arc::new(bus.clone())),
            "node-a",
            Duration::from_millis(200),
        );

        Ok(Self {
            users,
            organizations,
            notifications,
            hub,
            bus,
            engine,
            _dir: dir,
        })
    }

    async fn user(&self, name: &str, role: UserRole, company: Option<&Company>) -> TestResult<UserRecord> {
        let mut user = NewUser::basic(name, format!("{}@example.com", name.to_lowercase()), role);
        user.company_id = company.map(|company| company.id);
        Ok(self.users.create(&user).await?)
    }

    fn connect(&self, user_id: i64) -> (RegistrationGuard, OutboundQueue) {
        let (connection, queue) = self.hub.open_connection(user_id);
        (self.hub.admit(connection, None), queue)
    }

    async fn status(&self, id: &str) -> TestResult<Option<NotificationStatus>> {
        Ok(self.notifications.find_by_id(id).await?.ok_or("missing")?.status)
    }
}

async fn next_push(queue: &mut OutboundQueue) -> serde_json::Value {
    let message = tokio::time::timeout(Duration::from_secs(1), queue.recv())
        .await
        .expect("timed out waiting for push")
        .expect("queue closed");
    match message {
        Message::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("expected text frame, got {other:?}"),
    }
}

fn company_invite(receiver_id: i64, company: &Company) -> InviteRequest {
    InviteRequest {
        receiver_id,
        invite_type: OrgType::Company,
        company_id: Some(company.id),
        department_id: None,
    }
}

#[tokio::test]
async fn accepted_company_invite_moves_the_receiver_and_answers_the_sender() -> TestResult {
    let ctx = TestContext::new().await?;
    let acme = ctx.organizations.create_company("Acme").await?;
    let ann = ctx.user("Ann", UserRole::CompanyManager, Some(&acme)).await?;
    let bob = ctx.user("Bob", UserRole::User, None).await?;

    let (_ann_guard, mut ann_queue) = ctx.connect(ann.id);
    let (_bob_guard, mut bob_queue) = ctx.connect(bob.id);
    let mut responses = ctx.bus.subscribe(&[INVITE_RESPONSE_TOPIC]).await?;

    let invite = ctx.engine.create_invite(ann.id, &company_invite(bob.id, &acme)).await?;
    assert_eq!(invite.notification.status, Some(NotificationStatus::Pending));
    assert_eq!(invite.notification.org_type, Some(OrgType::Company));
    assert_eq!(invite.notification.company_id, Some(acme.id));
    assert_eq!(invite.notification.content, "[COMPANY INVITE] Ann invited Bob to Acme");
    assert_eq!(invite.delivery.live_recipients, 1);
    assert!(invite.delivery.published);
    assert_eq!(next_push(&mut bob_queue).await["payload"]["id"], invite.notification.id);

    let answered = ctx
        .engine
        .respond(&invite.notification.id, bob.id, NotificationStatus::Accepted)
        .await?;
    ctx.users.wait_idle().await;

    assert_eq!(ctx.users.get(bob.id).await?.company_id, Some(acme.id));
    assert_eq!(answered.notification.status, Some(NotificationStatus::Accepted));
    assert!(answered.notification.is_read);

    let response = &answered.response;
    assert_eq!(response.kind, NotificationKind::Response);
    assert_eq!((response.sender_id, response.receiver_id), (bob.id, ann.id));
    assert_eq!(response.status, Some(NotificationStatus::Accepted));

    let frame = next_push(&mut ann_queue).await;
    assert_eq!(frame["type"], "notification");
    assert_eq!(frame["payload"]["id"], response.id);

    let event = tokio::time::timeout(Duration::from_secs(1), responses.next())
        .await?
        .ok_or("subscription ended")?;
    let envelope = EventEnvelope::decode(&event.payload)?;
    assert_eq!(envelope.origin, "node-a");
    assert_eq!(envelope.notification.id, response.id);
    Ok(())
}

#[tokio::test]
async fn only_the_receiver_can_answer() -> TestResult {
    let ctx = TestContext::new().await?;
    let acme = ctx.organizations.create_company("Acme").await?;
    let ann = ctx.user("Ann", UserRole::CompanyManager, Some(&acme)).await?;
    let bob = ctx.user("Bob", UserRole::User, None).await?;
    let eve = ctx.user("Eve", UserRole::User, None).await?;

    let invite = ctx.engine.create_invite(ann.id, &company_invite(bob.id, &acme)).await?;
    let id = invite.notification.id;

    let result = ctx.engine.respond(&id, eve.id, NotificationStatus::Accepted).await;
    assert!(matches!(result, Err(NotificationError::Forbidden(_))));
    assert_eq!(ctx.status(&id).await?, Some(NotificationStatus::Pending));
    assert_eq!(ctx.users.get(eve.id).await?.company_id, None);
    Ok(())
}

#[tokio::test]
async fn terminal_notifications_cannot_be_answered_again() -> TestResult {
    let ctx = TestContext::new().await?;
    let acme = ctx.organizations.create_company("Acme").await?;
    let ann = ctx.user("Ann", UserRole::CompanyManager, Some(&acme)).await?;
    let bob = ctx.user("Bob", UserRole::User, None).await?;

    let invite = ctx.engine.create_invite(ann.id, &company_invite(bob.id, &acme)).await?;
    let id = invite.notification.id;

    let rejected = ctx.engine.respond(&id, bob.id, NotificationStatus::Rejected).await?;
    assert_eq!(rejected.response.status, Some(NotificationStatus::Rejected));

    for decision in [NotificationStatus::Accepted, NotificationStatus::Rejected] {
        let again = ctx.engine.respond(&id, bob.id, decision).await;
        assert!(matches!(again, Err(NotificationError::InvalidState(_))));
    }
    assert_eq!(ctx.status(&id).await?, Some(NotificationStatus::Rejected));
    assert_eq!(ctx.users.get(bob.id).await?.company_id, None);

    let pending = ctx.engine.respond(&id, bob.id, NotificationStatus::Pending).await;
    assert!(matches!(pending, Err(NotificationError::InvalidInput(_))));
    Ok(())
}

#[tokio::test]
async fn concurrent_answers_have_a_single_winner() -> TestResult {
    let ctx = Arc::new(TestContext::new().await?);
    let acme = ctx.organizations.create_company("Acme").await?;
    let ann = ctx.user("Ann", UserRole::CompanyManager, Some(&acme)).await?;
    let bob = ctx.user("Bob", UserRole::User, None).await?;
    let invite = ctx.engine.create_invite(ann.id, &company_invite(bob.id, &acme)).await?;

    let mut tasks = Vec::new();
    for decision in [NotificationStatus::Accepted, NotificationStatus::Rejected] {
        let ctx = ctx.clone();
        let id = invite.notification.id.clone();
        tasks.push(tokio::spawn(async move {
            ctx.engine.respond(&id, bob.id, decision).await
        }));
    }

    let mut winners = 0;
    for task in tasks {
        match task.await? {
            Ok(_) => winners += 1,
            Err(NotificationError::InvalidState(_)) => {}
            Err(other) => return Err(other.into()),
        }
    }
    assert_eq!(winners, 1);
    Ok(())
}

#[tokio::test]
async fn company_acceptance_requires_the_joiner_to_be_free() -> TestResult {
    let ctx = TestContext::new().await?;
    let acme = ctx.organizations.create_company("Acme").await?;
    let globex = ctx.organizations.create_company("Globex").await?;
    let ann = ctx.user("Ann", UserRole::CompanyManager, Some(&acme)).await?;
    let gus = ctx.user("Gus", UserRole::CompanyManager, Some(&globex)).await?;
    let bob = ctx.user("Bob", UserRole::User, None).await?;

    let from_acme = ctx.engine.create_invite(ann.id, &company_invite(bob.id, &acme)).await?;
    let from_globex = ctx.engine.create_invite(gus.id, &company_invite(bob.id, &globex)).await?;

    ctx.engine
        .respond(&from_acme.notification.id, bob.id, NotificationStatus::Accepted)
        .await?;
    ctx.users.wait_idle().await;

    let second = ctx
        .engine
        .respond(&from_globex.notification.id, bob.id, NotificationStatus::Accepted)
        .await;
    assert!(matches!(second, Err(NotificationError::InvalidState(_))));
    assert_eq!(
        ctx.status(&from_globex.notification.id).await?,
        Some(NotificationStatus::Pending)
    );
    assert_eq!(ctx.users.get(bob.id).await?.company_id, Some(acme.id));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn rival_company_invites_accepted_together_join_one_company() -> TestResult {
    let ctx = Arc::new(TestContext::new().await?);
    let acme = ctx.organizations.create_company("Acme").await?;
    let globex = ctx.organizations.create_company("Globex").await?;
    let ann = ctx.user("Ann", UserRole::CompanyManager, Some(&acme)).await?;
    let gus = ctx.user("Gus", UserRole::CompanyManager, Some(&globex)).await?;
    let bob = ctx.user("Bob", UserRole::User, None).await?;

    let from_acme = ctx.engine.create_invite(ann.id, &company_invite(bob.id, &acme)).await?;
    let from_globex = ctx.engine.create_invite(gus.id, &company_invite(bob.id, &globex)).await?;

    let mut tasks = Vec::new();
    for (id, company_id) in [
        (from_acme.notification.id.clone(), acme.id),
        (from_globex.notification.id.clone(), globex.id),
    ] {
        let ctx = ctx.clone();
        tasks.push(tokio::spawn(async move {
            let outcome = ctx.engine.respond(&id, bob.id, NotificationStatus::Accepted).await;
            (id, company_id, outcome)
        }));
    }

    let mut joined = Vec::new();
    for task in tasks {
        let (id, company_id, outcome) = task.await?;
        match outcome {
            Ok(_) => {
                assert_eq!(ctx.status(&id).await?, Some(NotificationStatus::Accepted));
                joined.push(company_id);
            }
            Err(NotificationError::InvalidState(_)) => {
                assert_eq!(ctx.status(&id).await?, Some(NotificationStatus::Pending));
            }
            Err(other) => return Err(other.into()),
        }
    }
    assert_eq!(joined.len(), 1);
    assert_eq!(ctx.users.get_fresh(bob.id).await?.company_id, Some(joined[0]));
    Ok(())
}

#[tokio::test]
async fn back_to_back_acceptances_keep_the_first_company() -> TestResult {
    let ctx = TestContext::new().await?;
    let acme = ctx.organizations.create_company("Acme").await?;
    let globex = ctx.organizations.create_company("Globex").await?;
    let ann = ctx.user("Ann", UserRole::CompanyManager, Some(&acme)).await?;
    let gus = ctx.user("Gus", UserRole::CompanyManager, Some(&globex)).await?;
    let bob = ctx.user("Bob", UserRole::User, None).await?;

    let from_acme = ctx.engine.create_invite(ann.id, &company_invite(bob.id, &acme)).await?;
    let from_globex = ctx.engine.create_invite(gus.id, &company_invite(bob.id, &globex)).await?;

    // Warm the cache with the company-less record before either answer.
    assert_eq!(ctx.users.get(bob.id).await?.company_id, None);

    ctx.engine
        .respond(&from_acme.notification.id, bob.id, NotificationStatus::Accepted)
        .await?;
    let second = ctx
        .engine
        .respond(&from_globex.notification.id, bob.id, NotificationStatus::Accepted)
        .await;
    assert!(matches!(second, Err(NotificationError::InvalidState(_))));
    assert_eq!(
        ctx.status(&from_globex.notification.id).await?,
        Some(NotificationStatus::Pending)
    );
    assert_eq!(ctx.users.get_fresh(bob.id).await?.company_id, Some(acme.id));
    Ok(())
}

struct UnreadableStore(NotificationRepository);

#[async_trait]
impl NotificationStore for UnreadableStore {
    async fn create(&self, notification: &NewNotification) -> DatabaseResult<Notification> {
        self.0.create(notification).await
    }

    async fn find(&self, id: &str) -> DatabaseResult<Option<Notification>> {
        self.0.find_by_id(id).await
    }

    async fn list(
        &self,
        receiver_id: i64,
        unread_only: bool,
        limit: u32,
        offset: u32,
    ) -> DatabaseResult<Vec<Notification>> {
        self.0.list_by_receiver(receiver_id, unread_only, limit, offset).await
    }

    async fn transition_status(
        &self,
        id: &str,
        from: NotificationStatus,
        to: NotificationStatus,
    ) -> DatabaseResult<bool> {
        self.0.transition_status(id, from, to).await
    }

    async fn mark_read(&self, _id: &str) -> DatabaseResult<bool> {
        Err(DatabaseError::QueryError("database is locked".into()))
    }
}

#[tokio::test]
async fn answers_stand_when_the_read_flag_cannot_be_written() -> TestResult {
    let ctx = TestContext::with_store(|repository| Arc::new(UnreadableStore(repository))).await?;
    let acme = ctx.organizations.create_company("Acme").await?;
    let ann = ctx.user("Ann", UserRole::CompanyManager, Some(&acme)).await?;
    let bob = ctx.user("Bob", UserRole::User, None).await?;
    let (_ann_guard, mut ann_queue) = ctx.connect(ann.id);

    let invite = ctx.engine.create_invite(ann.id, &company_invite(bob.id, &acme)).await?;
    let answered = ctx
        .engine
        .respond(&invite.notification.id, bob.id, NotificationStatus::Accepted)
        .await?;

    assert_eq!(answered.notification.status, Some(NotificationStatus::Accepted));
    assert!(!answered.notification.is_read);
    assert_eq!(answered.response.receiver_id, ann.id);
    assert_eq!(next_push(&mut ann_queue).await["payload"]["id"], answered.response.id);

    let stored = ctx.notifications.find_by_id(&invite.notification.id).await?.ok_or("missing")?;
    assert_eq!(stored.status, Some(NotificationStatus::Accepted));
    assert!(!stored.is_read);
    assert!(ctx.notifications.find_by_id(&answered.response.id).await?.is_some());
    assert_eq!(ctx.users.get_fresh(bob.id).await?.company_id, Some(acme.id));
    Ok(())
}

#[tokio::test]
async fn invite_rules_follow_roles_and_membership() -> TestResult {
    let ctx = TestContext::new().await?;
    let acme = ctx.organizations.create_company("Acme").await?;
    let ann = ctx.user("Ann", UserRole::CompanySubManager, Some(&acme)).await?;
    let joe = ctx.user("Joe", UserRole::User, Some(&acme)).await?;
    let ops = ctx.user("Ops", UserRole::SubAdmin, None).await?;
    let bob = ctx.user("Bob", UserRole::User, None).await?;

    let by_plain_user = ctx.engine.create_invite(joe.id, &company_invite(bob.id, &acme)).await;
    assert!(matches!(by_plain_user, Err(NotificationError::Forbidden(_))));

    let to_operator = ctx.engine.create_invite(ann.id, &company_invite(ops.id, &acme)).await;
    assert!(matches!(to_operator, Err(NotificationError::Forbidden(_))));

    let to_member = ctx.engine.create_invite(ann.id, &company_invite(joe.id, &acme)).await;
    assert!(matches!(to_member, Err(NotificationError::InvalidState(_))));

    let to_self = ctx.engine.create_invite(ann.id, &company_invite(ann.id, &acme)).await;
    assert!(matches!(to_self, Err(NotificationError::InvalidInput(_))));

    let missing_department = ctx
        .engine
        .create_invite(
            ann.id,
            &InviteRequest {
                receiver_id: joe.id,
                invite_type: OrgType::Department,
                company_id: None,
                department_id: None,
            },
        )
        .await;
    assert!(matches!(missing_department, Err(NotificationError::InvalidInput(_))));

    let unknown_company = ctx
        .engine
        .create_invite(
            ops.id,
            &InviteRequest {
                receiver_id: bob.id,
                invite_type: OrgType::Company,
                company_id: Some(9_999),
                department_id: None,
            },
        )
        .await;
    assert!(matches!(unknown_company, Err(NotificationError::NotFound(_))));

    let unknown_receiver = ctx.engine.create_invite(ann.id, &company_invite(4_040, &acme)).await;
    assert!(matches!(unknown_receiver, Err(NotificationError::NotFound(_))));
    Ok(())
}

#[tokio::test]
async fn accepted_department_request_adds_the_sender() -> TestResult {
    let ctx = TestContext::new().await?;
    let acme = ctx.organizations.create_company("Acme").await?;
    let lab = ctx.organizations.create_department(acme.id, "Lab").await?;
    let ann = ctx.user("Ann", UserRole::CompanyManager, Some(&acme)).await?;
    let joe = ctx.user("Joe", UserRole::User, Some(&acme)).await?;

    let request = ctx
        .engine
        .create_request(
            joe.id,
            &JoinRequest {
                receiver_id: ann.id,
                request_type: OrgType::Department,
                department_id: Some(lab.id),
            },
        )
        .await?;
    assert_eq!(request.notification.kind, NotificationKind::Request);
    assert_eq!(request.notification.department_name.as_deref(), Some("Lab"));
    assert_eq!(request.notification.status, Some(NotificationStatus::Pending));

    let answered = ctx
        .engine
        .respond(&request.notification.id, ann.id, NotificationStatus::Accepted)
        .await?;
    assert_eq!(answered.response.receiver_id, joe.id);
    ctx.users.wait_idle().await;
    assert!(ctx.users.get(joe.id).await?.in_department(lab.id));

    let again = ctx
        .engine
        .create_request(
            joe.id,
            &JoinRequest {
                receiver_id: ann.id,
                request_type: OrgType::Department,
                department_id: Some(lab.id),
            },
        )
        .await;
    assert!(matches!(again, Err(NotificationError::InvalidState(_))));
    Ok(())
}

#[tokio::test]
async fn request_rules_swap_the_roles() -> TestResult {
    let ctx = TestContext::new().await?;
    let acme = ctx.organizations.create_company("Acme").await?;
    let ann = ctx.user("Ann", UserRole::CompanyManager, Some(&acme)).await?;
    let joe = ctx.user("Joe", UserRole::User, Some(&acme)).await?;
    let ops = ctx.user("Ops", UserRole::Admin, None).await?;
    let bob = ctx.user("Bob", UserRole::User, None).await?;

    let company = |receiver_id| JoinRequest {
        receiver_id,
        request_type: OrgType::Company,
        department_id: None,
    };

    let to_plain_user = ctx.engine.create_request(bob.id, &company(joe.id)).await;
    assert!(matches!(to_plain_user, Err(NotificationError::InvalidInput(_))));

    let from_operator = ctx.engine.create_request(ops.id, &company(ann.id)).await;
    assert!(matches!(from_operator, Err(NotificationError::Forbidden(_))));

    let already_member = ctx.engine.create_request(joe.id, &company(ann.id)).await;
    assert!(matches!(already_member, Err(NotificationError::InvalidState(_))));

    let created = ctx.engine.create_request(bob.id, &company(ann.id)).await?;
    assert_eq!(created.notification.company_id, Some(acme.id));
    assert_eq!(created.notification.company_name.as_deref(), Some("Acme"));

    ctx.engine
        .respond(&created.notification.id, ann.id, NotificationStatus::Accepted)
        .await?;
    ctx.users.wait_idle().await;
    assert_eq!(ctx.users.get(bob.id).await?.company_id, Some(acme.id));
    Ok(())
}

#[tokio::test]
async fn mark_read_is_idempotent_and_receiver_only() -> TestResult {
    let ctx = TestContext::new().await?;
    let ann = ctx.user("Ann", UserRole::User, None).await?;
    let bob = ctx.user("Bob", UserRole::User, None).await?;

    let mention = ctx
        .engine
        .create_mention(ann.id, &MentionRequest { receiver_id: bob.id })
        .await?;
    let id = mention.notification.id;
    assert!(!mention.notification.is_read);
    assert_eq!(mention.notification.status, None);

    let denied = ctx.engine.mark_read(&id, ann.id).await;
    assert!(matches!(denied, Err(NotificationError::Forbidden(_))));

    assert!(ctx.engine.mark_read(&id, bob.id).await?.is_read);
    assert!(ctx.engine.mark_read(&id, bob.id).await?.is_read);

    let missing = ctx.engine.mark_read("nope", bob.id).await;
    assert!(matches!(missing, Err(NotificationError::NotFound(_))));
    Ok(())
}

#[tokio::test]
async fn mentions_are_pushed_published_and_listed() -> TestResult {
    let ctx = TestContext::new().await?;
    let ann = ctx.user("Ann", UserRole::User, None).await?;
    let bob = ctx.user("Bob", UserRole::User, None).await?;
    let mut mentions = ctx.bus.subscribe(&[MENTION_TOPIC]).await?;

    let first = ctx.engine.create_mention(ann.id, &MentionRequest { receiver_id: bob.id }).await?;
    let second = ctx.engine.create_mention(ann.id, &MentionRequest { receiver_id: bob.id }).await?;
    assert_eq!(first.notification.content, "Ann mentioned Bob");
    assert_eq!(first.delivery.live_recipients, 0);

    let event = tokio::time::timeout(Duration::from_secs(1), mentions.next())
        .await?
        .ok_or("subscription ended")?;
    assert_eq!(EventEnvelope::decode(&event.payload)?.notification.id, first.notification.id);

    ctx.engine.mark_read(&first.notification.id, bob.id).await?;

    let all = ctx.engine.list(bob.id, &NotificationQuery::default()).await?;
    assert_eq!(all.len(), 2);

    let unread = ctx
        .engine
        .list(bob.id, &NotificationQuery { unread_only: true, ..NotificationQuery::default() })
        .await?;
    assert_eq!(unread.len(), 1);
    assert_eq!(unread[0].id, second.notification.id);

    assert!(ctx.engine.list(ann.id, &NotificationQuery::default()).await?.is_empty());

    let to_self = ctx.engine.create_mention(ann.id, &MentionRequest { receiver_id: ann.id }).await;
    assert!(matches!(to_self, Err(NotificationError::InvalidInput(_))));
    Ok(())
}

struct OfflinePublisher;

#[async_trait]
impl EventPublisher for OfflinePublisher {
    async fn publish(&self, _topic: &str, _payload: Bytes) -> Result<(), PublishError> {
        Err(PublishError::Transport("connection refused".into()))
    }
}

struct HangingPublisher;

#[async_trait]
impl EventPublisher for HangingPublisher {
    async fn publish(&self, _topic: &str, _payload: Bytes) -> Result<(), PublishError> {
        std::future::pending::<Result<(), PublishError>>().await
    }
}

#[tokio::test]
async fn publish_failures_do_not_block_live_delivery() -> TestResult {
    for publisher in [
        Arc::new(OfflinePublisher) as Arc<dyn EventPublisher>,
        Arc::new(HangingPublisher),
    ] {
        let ctx = TestContext::with_publisher(Some(publisher)).await?;
        let ann = ctx.user("Ann", UserRole::User, None).await?;
        let bob = ctx.user("Bob", UserRole::User, None).await?;
        let (_guard, mut queue) = ctx.connect(bob.id);

        let created = ctx
            .engine
            .create_mention(ann.id, &MentionRequest { receiver_id: bob.id })
            .await?;
        assert!(!created.delivery.published);
        assert_eq!(created.delivery.live_recipients, 1);
        assert_eq!(next_push(&mut queue).await["payload"]["id"], created.notification.id);
        assert!(ctx.notifications.find_by_id(&created.notification.id).await?.is_some());
    }
    Ok(())
}

#[tokio::test]
async fn relay_delivers_foreign_events_only() -> TestResult {
    let ctx = TestContext::new().await?;
    let ann = ctx.user("Ann", UserRole::User, None).await?;
    let bob = ctx.user("Bob", UserRole::User, None).await?;
    let (_guard, mut queue) = ctx.connect(bob.id);

    let created = ctx.engine.create_mention(ann.id, &MentionRequest { receiver_id: bob.id }).await?;
    next_push(&mut queue).await;

    let relay = NotificationRelay::new(ctx.hub.clone(), "node-a");
    let own = EventEnvelope::new("node-a", MENTION_TOPIC, created.notification.clone());
    let foreign = EventEnvelope::new("node-b", MENTION_TOPIC, created.notification.clone());

    let message = |envelope: &EventEnvelope| -> TestResult<EventMessage> {
        Ok(EventMessage { topic: MENTION_TOPIC.to_string(), payload: envelope.encode()? })
    };

    assert_eq!(relay.handle(&message(&own)?), 0);
    assert_eq!(relay.handle(&message(&foreign)?), 1);
    assert_eq!(
        relay.handle(&EventMessage { topic: MENTION_TOPIC.into(), payload: Bytes::from_static(b"{") }),
        0
    );
    assert_eq!(next_push(&mut queue).await["payload"]["id"], created.notification.id);

    // Spawned against the bus, the relay picks up events from another origin.
    let relay = NotificationRelay::new(ctx.hub.clone(), "node-c");
    let handle = relay.spawn(Arc::new(ctx.bus.clone())).await?;
    ctx.bus.publish(MENTION_TOPIC, foreign.encode()?).await?;
    assert_eq!(next_push(&mut queue).await["payload"]["id"], created.notification.id);
    handle.abort();
    Ok(())
}

#[tokio::test]
async fn department_invites_require_company_membership() -> TestResult {
    let ctx = TestContext::new().await?;
    let acme = ctx.organizations.create_company("Acme").await?;
    let lab = ctx.organizations.create_department(acme.id, "Lab").await?;
    let ann = ctx.user("Ann", UserRole::CompanyManager, Some(&acme)).await?;
    let joe = ctx.user("Joe", UserRole::User, Some(&acme)).await?;
    let bob = ctx.user("Bob", UserRole::User, None).await?;

    let department = |receiver_id| InviteRequest {
        receiver_id,
        invite_type: OrgType::Department,
        company_id: None,
        department_id: Some(lab.id),
    };

    let outsider = ctx.engine.create_invite(ann.id, &department(bob.id)).await;
    assert!(matches!(outsider, Err(NotificationError::InvalidState(_))));

    let invite = ctx.engine.create_invite(ann.id, &department(joe.id)).await?;
    assert_eq!(invite.notification.content, "[DEPARTMENT INVITE] Ann invited Joe to Lab");
    assert_eq!(invite.notification.company_name.as_deref(), Some("Acme"));

    ctx.users
        .update(joe.id, &UserUpdate::join_department(lab.id))
        .await?;
    ctx.users.wait_idle().await;

    let member = ctx
        .engine
        .respond(&invite.notification.id, joe.id, NotificationStatus::Accepted)
        .await;
    assert!(matches!(member, Err(NotificationError::InvalidState(_))));
    assert_eq!(
        ctx.status(&invite.notification.id).await?,
        Some(NotificationStatus::Pending)
    );
    Ok(())
}
