use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use link_auth::JwtAuthenticator;
use link_config::AppConfig;
use link_database::{
    initialize_database, ChatRoomRepository, NotificationRepository, OrganizationRepository,
    UserRepository,
};
use link_gateway::{GatewayState, RoomDirectory, TokenAuthenticator};
use link_notifications::{
    EventPublisher, EventSubscriber, LocalEventBus, NotificationEngine, NotificationRelay,
    RedisEventBus,
};
use link_realtime::{ChatSessionValidator, Hub};
use link_users::{CacheStore, MemoryCacheStore, RedisCacheStore, UserStateCache};
use sqlx::SqlitePool;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const REDIS_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

pub mod telemetry {
    use anyhow::Result;
    use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

    pub fn init_tracing() -> Result<()> {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let subscriber = SubscriberBuilder::default()
            .with_env_filter(env_filter)
            .with_target(true)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|error| anyhow::anyhow!("failed to set tracing subscriber: {error}"))
    }
}

/// Which backend carries the user cache and the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Redis,
    InProcess,
}

#[derive(Clone)]
pub struct BackendServices {
    pub db_pool: SqlitePool,
    pub authenticator: Arc<JwtAuthenticator>,
    pub users: Arc<UserStateCache>,
    pub hub: Hub,
    pub sessions: Arc<ChatSessionValidator>,
    pub notifications: Arc<NotificationEngine>,
    pub events: Arc<dyn EventSubscriber>,
    pub instance_id: String,
    pub transport: Transport,
}

impl BackendServices {
    pub async fn initialise(config: &AppConfig) -> Result<Self> {
        let db_pool = initialize_database(&config.database).await?;

        let (cache, publisher, events, transport) = connect_transport(config).await;

        let users = Arc::new(UserStateCache::new(
            Arc::new(UserRepository::new(db_pool.clone())),
            cache,
            &config.cache,
        ));
        let hub = Hub::new(users.clone(), config.realtime.outbound_buffer);

        let authenticator = Arc::new(JwtAuthenticator::new(&config.auth));
        let sessions = Arc::new(ChatSessionValidator::new(
            hub.clone(),
            Arc::new(TokenAuthenticator(authenticator.as_ref().clone())),
            Arc::new(RoomDirectory(ChatRoomRepository::new(db_pool.clone()))),
            config.realtime.handshake_timeout(),
        ));

        let instance_id = config
            .events
            .instance_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let notifications = Arc::new(NotificationEngine::new(
            Arc::new(NotificationRepository::new(db_pool.clone())),
            users.clone(),
            Arc::new(OrganizationRepository::new(db_pool.clone())),
            hub.clone(),
            publisher,
            instance_id.clone(),
            config.events.publish_timeout(),
        ));

        info!(%instance_id, ?transport, "backend services ready");

        Ok(Self {
            db_pool,
            authenticator,
            users,
            hub,
            sessions,
            notifications,
            events,
            instance_id,
            transport,
        })
    }

    pub fn gateway_state(&self) -> GatewayState {
        GatewayState::new(
            self.authenticator.clone(),
            self.users.clone(),
            self.notifications.clone(),
            self.sessions.clone(),
        )
    }

    /// Starts pushing notifications published by other instances to local sockets.
    pub async fn spawn_relay(&self) -> Result<JoinHandle<()>> {
        NotificationRelay::new(self.hub.clone(), self.instance_id.clone())
            .spawn(self.events.clone())
            .await
            .context("failed to subscribe to notification events")
    }
}

type Transports = (
    Arc<dyn CacheStore>,
    Arc<dyn EventPublisher>,
    Arc<dyn EventSubscriber>,
    Transport,
);

/// Redis when configured and reachable, otherwise in-process stores.
async fn connect_transport(config: &AppConfig) -> Transports {
    if let Some(url) = config.redis.url.as_deref() {
        match connect_redis(url).await {
            Ok((cache, bus)) => {
                info!("redis connection established");
                let bus = Arc::new(bus);
                let publisher: Arc<dyn EventPublisher> = bus.clone();
                return (Arc::new(cache), publisher, bus, Transport::Redis);
            }
            Err(error) => {
                warn!(error = %format!("{error:#}"), "redis unavailable, using in-process cache and event bus");
            }
        }
    } else {
        info!("no redis configured, using in-process cache and event bus");
    }

    let bus = Arc::new(LocalEventBus::default());
    let publisher: Arc<dyn EventPublisher> = bus.clone();
    (
        Arc::new(MemoryCacheStore::new()),
        publisher,
        bus,
        Transport::InProcess,
    )
}

async fn connect_redis(url: &str) -> Result<(RedisCacheStore, RedisEventBus)> {
    let connect = async {
        let cache = RedisCacheStore::connect(url)
            .await
            .context("failed to connect redis cache")?;
        let bus = RedisEventBus::connect(url)
            .await
            .context("failed to connect redis event bus")?;
        Ok::<_, anyhow::Error>((cache, bus))
    };

    tokio::time::timeout(REDIS_CONNECT_TIMEOUT, connect)
        .await
        .context("timed out connecting to redis")?
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(?error, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                warn!(?error, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
