use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use link_config::{CacheConfig, DatabaseConfig};
use link_database::{
    initialize_database, DatabaseResult, NewUser, OrganizationRepository, UserRecord,
    UserRepository, UserRole, UserUpdate,
};
use link_realtime::Hub;
use link_users::{user_key, CacheStore, MemoryCacheStore, UserError, UserStateCache, UserStore};
use tempfile::TempDir;
use tokio::sync::Notify;

type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

struct TestContext {
    users: UserRepository,
    organizations: OrganizationRepository,
    cache: Arc<MemoryCacheStore>,
    state: Arc<UserStateCache>,
    _dir: TempDir,
}

impl TestContext {
    async fn new() -> TestResult<Self> {
        let dir = TempDir::new()?;
        let pool = initialize_database(&DatabaseConfig {
            url: format!("sqlite://{}", dir.path().join("users.db").display()),
            max_connections: 4,
        })
        .await?;

        let users = UserRepository::new(pool.clone());
        let cache = Arc::new(MemoryCacheStore::new());
        let state = Arc::new(UserStateCache::new(
            Arc::new(users.clone()),
            cache.clone(),
            &CacheConfig::default(),
        ));

        Ok(Self {
            users,
            organizations: OrganizationRepository::new(pool),
            cache,
            state,
            _dir: dir,
        })
    }

    async fn cached(&self, user_id: i64) -> link_users::CacheFields {
        self.cache.read_all(&user_key(user_id)).await.unwrap()
    }
}

fn alice() -> NewUser {
    NewUser::basic("Alice", "alice@example.com", UserRole::User)
}

#[tokio::test]
async fn create_writes_a_complete_record() -> TestResult {
    let ctx = TestContext::new().await?;
    let user = ctx.state.create(&alice()).await?;

    let fields = ctx.cached(user.id).await;
    assert!(link_users::cache::codec::is_complete(&fields));
    assert_eq!(fields["is_online"], "0");
    assert_eq!(fields["email"], "alice@example.com");
    Ok(())
}

#[tokio::test]
async fn complete_cache_entries_are_served_without_the_store() -> TestResult {
    let ctx = TestContext::new().await?;
    let user = ctx.state.create(&alice()).await?;

    // Bypass the cache so the store and the cached copy disagree.
    ctx.users
        .update(user.id, &UserUpdate { nickname: Some("direct".into()), ..UserUpdate::default() })
        .await?;

    let read = ctx.state.get(user.id).await?;
    assert_eq!(read.nickname, "Alice");
    Ok(())
}

#[tokio::test]
async fn incomplete_entries_fall_through_and_repopulate() -> TestResult {
    let ctx = TestContext::new().await?;
    let user = ctx.users.create(&alice()).await?;

    // Only a stale name: present, but not authoritative.
    ctx.cache
        .merge(&user_key(user.id), &[("name".to_string(), "Mallory".to_string())])
        .await?;

    let read = ctx.state.get(user.id).await?;
    assert_eq!(read.name, "Alice");

    ctx.state.wait_idle().await;
    let fields = ctx.cached(user.id).await;
    assert!(link_users::cache::codec::is_complete(&fields));
    assert_eq!(fields["name"], "Alice");
    Ok(())
}

#[tokio::test]
async fn unknown_users_are_not_found() -> TestResult {
    let ctx = TestContext::new().await?;
    assert_eq!(ctx.state.get(404).await, Err(UserError::NotFound(404)));
    assert!(!ctx.state.exists(404).await?);
    assert_eq!(
        ctx.state.update(404, &UserUpdate::join_company(1)).await,
        Err(UserError::NotFound(404))
    );
    Ok(())
}

#[tokio::test]
async fn update_commits_then_merges_changed_fields() -> TestResult {
    let ctx = TestContext::new().await?;
    let user = ctx.state.create(&alice()).await?;
    let company = ctx.organizations.create_company("Acme").await?;

    let stamp = ctx.state.update(user.id, &UserUpdate::join_company(company.id)).await?;

    // The commit is visible immediately, whatever the cache says.
    let stored = ctx.users.find_by_id(user.id).await?.unwrap();
    assert_eq!(stored.company_id, Some(company.id));
    assert_eq!(ctx.state.get_fresh(user.id).await?.company_id, Some(company.id));

    ctx.state.wait_idle().await;
    let fields = ctx.cached(user.id).await;
    assert_eq!(fields["company_id"], company.id.to_string());
    assert_eq!(fields["updated_at"], stamp);
    assert_eq!(fields["email"], "alice@example.com");
    assert_eq!(ctx.state.get(user.id).await?.company_id, Some(company.id));
    Ok(())
}

#[tokio::test]
async fn department_join_forces_a_refresh_of_memberships() -> TestResult {
    let ctx = TestContext::new().await?;
    let user = ctx.state.create(&alice()).await?;
    let company = ctx.organizations.create_company("Acme").await?;
    let department = ctx.organizations.create_department(company.id, "R&D").await?;

    ctx.state.update(user.id, &UserUpdate::join_company(company.id)).await?;
    ctx.state.update(user.id, &UserUpdate::join_department(department.id)).await?;
    ctx.state.wait_idle().await;

    assert!(!ctx.cached(user.id).await.contains_key("departments"));

    let read = ctx.state.get(user.id).await?;
    assert!(read.in_department(department.id));

    ctx.state.wait_idle().await;
    assert!(ctx.cached(user.id).await["departments"].contains("R&D"));
    Ok(())
}

#[tokio::test]
async fn online_flag_is_independent_of_completeness() -> TestResult {
    let ctx = TestContext::new().await?;
    let user = ctx.users.create(&alice()).await?;

    ctx.state.set_online(user.id, true).await?;
    let fields = ctx.cached(user.id).await;
    assert_eq!(fields.len(), 1);

    let read = ctx.state.get(user.id).await?;
    assert!(read.is_online);
    assert_eq!(read.name, "Alice");

    ctx.state.wait_idle().await;
    ctx.state.set_online(user.id, false).await?;
    assert!(!ctx.state.get(user.id).await?.is_online);
    Ok(())
}

#[tokio::test]
async fn hub_presence_flows_into_the_cache() -> TestResult {
    let ctx = TestContext::new().await?;
    let user = ctx.state.create(&alice()).await?;
    let hub = Hub::new(ctx.state.clone(), 8);

    let (first, _first_queue) = hub.open_connection(user.id);
    let (second, _second_queue) = hub.open_connection(user.id);
    let first = hub.admit(first, None);
    let second = hub.admit(second, None);
    ctx.state.wait_idle().await;
    assert!(ctx.state.get(user.id).await?.is_online);

    drop(first);
    ctx.state.wait_idle().await;
    assert!(ctx.state.get(user.id).await?.is_online);

    drop(second);
    ctx.state.wait_idle().await;
    assert!(!ctx.state.get(user.id).await?.is_online);
    Ok(())
}

/// Returns whatever the store held when `find` was entered, then parks until released.
struct PausingStore {
    inner: UserRepository,
    armed: AtomicBool,
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl UserStore for PausingStore {
    async fn find(&self, user_id: i64) -> DatabaseResult<Option<UserRecord>> {
        let snapshot = self.inner.find_by_id(user_id).await;
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        snapshot
    }

    async fn exists(&self, user_id: i64) -> DatabaseResult<bool> {
        self.inner.exists(user_id).await
    }

    async fn create(&self, user: &NewUser) -> DatabaseResult<UserRecord> {
        self.inner.create(user).await
    }

    async fn update(&self, user_id: i64, update: &UserUpdate) -> DatabaseResult<String> {
        self.inner.update(user_id, update).await
    }
}

#[tokio::test]
async fn stale_repopulation_never_overwrites_a_newer_update() -> TestResult {
    let ctx = TestContext::new().await?;
    let user = ctx.users.create(&alice()).await?;

    let store = Arc::new(PausingStore {
        inner: ctx.users.clone(),
        armed: AtomicBool::new(true),
        entered: Notify::new(),
        release: Notify::new(),
    });
    let state = Arc::new(UserStateCache::new(
        store.clone(),
        ctx.cache.clone(),
        &CacheConfig::default(),
    ));

    let reader = tokio::spawn({
        let state = state.clone();
        async move { state.get(user.id).await }
    });
    store.entered.notified().await;

    state
        .update(user.id, &UserUpdate { nickname: Some("fresh".into()), ..UserUpdate::default() })
        .await?;
    state.wait_idle().await;

    store.release.notify_one();
    let stale = reader.await??;
    assert_eq!(stale.nickname, "Alice");
    state.wait_idle().await;

    assert_eq!(state.get(user.id).await?.nickname, "fresh");
    Ok(())
}

#[tokio::test]
async fn concurrent_updates_never_leave_a_stale_complete_record() -> TestResult {
    let ctx = TestContext::new().await?;
    let user = ctx.state.create(&alice()).await?;

    let mut tasks = Vec::new();
    for n in 0..8 {
        let state = ctx.state.clone();
        tasks.push(tokio::spawn(async move {
            state
                .update(user.id, &UserUpdate { nickname: Some(format!("nick-{n}")), ..UserUpdate::default() })
                .await
        }));
    }
    for task in tasks {
        task.await??;
    }
    ctx.state.wait_idle().await;

    let stored = ctx.users.find_by_id(user.id).await?.unwrap();
    assert_eq!(ctx.state.get(user.id).await?.nickname, stored.nickname);
    Ok(())
}

#[tokio::test]
async fn create_rejects_blank_identity() -> TestResult {
    let ctx = TestContext::new().await?;
    let result = ctx.state.create(&NewUser::basic(" ", "x@example.com", UserRole::User)).await;
    assert!(matches!(result, Err(UserError::InvalidInput(_))));
    Ok(())
}

#[tokio::test]
async fn idle_users_release_their_write_ordering() -> TestResult {
    let ctx = TestContext::new().await?;
    let mut ids = Vec::new();
    for n in 0..4 {
        let user = ctx
            .state
            .create(&NewUser::basic(format!("User {n}"), format!("user{n}@example.com"), UserRole::User))
            .await?;
        ids.push(user.id);
    }

    for &id in &ids {
        ctx.cache.remove_fields(&user_key(id), &["email"]).await?;
        ctx.state.get(id).await?;
        ctx.state
            .update(id, &UserUpdate { nickname: Some("busy".into()), ..UserUpdate::default() })
            .await?;
        ctx.state.set_online(id, true).await?;
    }
    let _ = ctx.state.get(9_999).await;
    ctx.state.wait_idle().await;

    assert_eq!(ctx.state.tracked_users(), 0);
    assert_eq!(ctx.state.get(ids[0]).await?.nickname, "busy");
    Ok(())
}

#[tokio::test]
async fn company_moves_surface_as_conflicts() -> TestResult {
    let ctx = TestContext::new().await?;
    let acme = ctx.organizations.create_company("Acme").await?;
    let globex = ctx.organizations.create_company("Globex").await?;
    let user = ctx.state.create(&alice()).await?;

    ctx.state.update(user.id, &UserUpdate::join_company(acme.id)).await?;
    let moved = ctx.state.update(user.id, &UserUpdate::join_company(globex.id)).await;
    assert!(matches!(moved, Err(UserError::Conflict(_))));

    ctx.state.wait_idle().await;
    assert_eq!(ctx.state.get_fresh(user.id).await?.company_id, Some(acme.id));
    assert_eq!(ctx.state.get(user.id).await?.company_id, Some(acme.id));
    Ok(())
}
