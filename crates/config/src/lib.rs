use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "link.toml",
    "config/link.toml",
    "crates/config/link.toml",
    "../link.toml",
    "../config/link.toml",
];

pub const CONFIG_PATH_VAR: &str = "LINK_CONFIG";
pub const ENV_PREFIX: &str = "LINK";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub events: EventsConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub address: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 7070,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://link.db".to_string(),
            max_connections: 10,
        }
    }
}

/// Redis backs the user cache and the cross-process event bus.
///
/// Leaving `url` unset keeps both in process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default)]
    pub url: Option<String>,
}

/// User State Cache tuning.
///
/// ```
/// use link_config::CacheConfig;
///
/// let cache = CacheConfig::default();
/// assert_eq!(cache.ttl().as_secs(), 3 * 24 * 60 * 60);
/// assert_eq!(cache.write_timeout().as_millis(), 2_000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "CacheConfig::default_ttl")]
    pub ttl_seconds: u64,
    #[serde(default = "CacheConfig::default_write_timeout")]
    pub write_timeout_ms: u64,
}

impl CacheConfig {
    const fn default_ttl() -> u64 {
        259_200
    }

    const fn default_write_timeout() -> u64 {
        2_000
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: Self::default_ttl(),
            write_timeout_ms: Self::default_write_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Frames buffered per connection before new pushes are dropped.
    #[serde(default = "RealtimeConfig::default_outbound_buffer")]
    pub outbound_buffer: usize,
    #[serde(default = "RealtimeConfig::default_handshake_timeout")]
    pub handshake_timeout_seconds: u64,
}

impl RealtimeConfig {
    const fn default_outbound_buffer() -> usize {
        64
    }

    const fn default_handshake_timeout() -> u64 {
        10
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_seconds)
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            outbound_buffer: Self::default_outbound_buffer(),
            handshake_timeout_seconds: Self::default_handshake_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "EventsConfig::default_publish_timeout")]
    pub publish_timeout_ms: u64,
    /// Identifies this process on the event bus; generated when absent.
    #[serde(default)]
    pub instance_id: Option<String>,
}

impl EventsConfig {
    const fn default_publish_timeout() -> u64 {
        2_000
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            publish_timeout_ms: Self::default_publish_timeout(),
            instance_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "AuthConfig::default_secret")]
    pub jwt_secret: String,
    #[serde(default = "AuthConfig::default_issuer")]
    pub issuer: String,
    #[serde(default = "AuthConfig::default_token_ttl")]
    pub token_ttl_seconds: u64,
}

impl AuthConfig {
    fn default_secret() -> String {
        "link-development-secret".to_string()
    }

    fn default_issuer() -> String {
        "link".to_string()
    }

    const fn default_token_ttl() -> u64 {
        86_400
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: Self::default_secret(),
            issuer: Self::default_issuer(),
            token_ttl_seconds: Self::default_token_ttl(),
        }
    }
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Load the application configuration by combining defaults, files, and environment overrides.
///
/// ```
/// use link_config::load;
///
/// std::env::remove_var("LINK_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert!(!config.http.address.is_empty());
/// ```
pub fn load() -> anyhow::Result<AppConfig> {
    let defaults = AppConfig::default();

    let mut builder = config::Config::builder()
        .set_default("http.address", defaults.http.address.clone())?
        .set_default("http.port", i64::from(defaults.http.port))?
        .set_default("database.url", defaults.database.url.clone())?
        .set_default(
            "database.max_connections",
            i64::from(defaults.database.max_connections),
        )?
        .set_default("cache.ttl_seconds", clamp_i64(defaults.cache.ttl_seconds))?
        .set_default(
            "cache.write_timeout_ms",
            clamp_i64(defaults.cache.write_timeout_ms),
        )?
        .set_default(
            "realtime.outbound_buffer",
            clamp_i64(defaults.realtime.outbound_buffer as u64),
        )?
        .set_default(
            "realtime.handshake_timeout_seconds",
            clamp_i64(defaults.realtime.handshake_timeout_seconds),
        )?
        .set_default(
            "events.publish_timeout_ms",
            clamp_i64(defaults.events.publish_timeout_ms),
        )?
        .set_default("auth.jwt_secret", defaults.auth.jwt_secret.clone())?
        .set_default("auth.issuer", defaults.auth.issuer.clone())?
        .set_default(
            "auth.token_ttl_seconds",
            clamp_i64(defaults.auth.token_ttl_seconds),
        )?;

    let environment_overrides = config::Environment::with_prefix(ENV_PREFIX).separator("__");

    let mut config_file_attached = false;

    if let Ok(path) = std::env::var(CONFIG_PATH_VAR) {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via LINK_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    builder = builder.add_source(environment_overrides);

    let cfg = builder.build().context("unable to build configuration")?;

    let config = cfg
        .try_deserialize::<AppConfig>()
        .context("invalid configuration")?;

    debug!(
        http.address = %config.http.address,
        http.port = config.http.port,
        database.url = %config.database.url,
        redis = config.redis.url.is_some(),
        "loaded backend configuration"
    );
    Ok(config)
}
