//! Read-through / write-through cache over the user store.

use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use link_config::CacheConfig;
use link_database::{DatabaseError, NewUser, UserRecord, UserUpdate};
use link_realtime::PresenceSink;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::codec::{self, DEPARTMENTS_FIELD, ONLINE_FIELD, REQUIRED_FIELDS};
use crate::cache::{user_key, CacheStore};
use crate::services::writer::BackgroundWriter;
use crate::store::UserStore;
use crate::types::{CacheError, UserError, UserResult};

/// Per-user ordering for background writes.
///
/// `generation` advances after every committed update and `presence` after
/// every online/offline transition; a background write only lands if the
/// counter it was scheduled under is still current when it takes `writes`.
/// Updates hold `commits` across commit and bump so generations follow commit order.
#[derive(Default)]
struct UserGate {
    commits: Mutex<()>,
    writes: Mutex<()>,
    generation: AtomicU64,
    presence: AtomicU64,
}

type Gates = Arc<DashMap<i64, Arc<UserGate>>>;

/// Shared use of a user's gate.
///
/// Counters are only compared through the same `Arc`, so a gate nobody
/// leases can be dropped and the next lease starts from a fresh one. The map
/// therefore only holds users with an operation or background write in flight.
struct GateLease {
    gates: Gates,
    user_id: i64,
    gate: Arc<UserGate>,
}

impl Deref for GateLease {
    type Target = UserGate;

    fn deref(&self) -> &UserGate {
        &self.gate
    }
}

impl Drop for GateLease {
    fn drop(&mut self) {
        drop(std::mem::take(&mut self.gate));
        // Leases are cloned out under the shard lock, so a count of one here
        // means nobody else can reach this gate.
        self.gates
            .remove_if(&self.user_id, |_, gate| Arc::strong_count(gate) == 1);
    }
}

pub struct UserStateCache {
    store: Arc<dyn UserStore>,
    cache: Arc<dyn CacheStore>,
    writer: BackgroundWriter,
    ttl: Duration,
    gates: Gates,
}

impl UserStateCache {
    pub fn new(store: Arc<dyn UserStore>, cache: Arc<dyn CacheStore>, config: &CacheConfig) -> Self {
        Self {
            store,
            cache,
            writer: BackgroundWriter::new(config.write_timeout()),
            ttl: config.ttl(),
            gates: Arc::new(DashMap::new()),
        }
    }

    pub fn writer(&self) -> &BackgroundWriter {
        &self.writer
    }

    /// Resolves once every scheduled cache write has finished or timed out.
    pub async fn wait_idle(&self) {
        self.writer.wait_idle().await;
    }

    fn gate(&self, user_id: i64) -> GateLease {
        let gate = self.gates.entry(user_id).or_default().clone();
        GateLease {
            gates: self.gates.clone(),
            user_id,
            gate,
        }
    }

    /// Number of users with an operation or background write in flight.
    pub fn tracked_users(&self) -> usize {
        self.gates.len()
    }

    /// Returns the user's profile with a live online flag.
    ///
    /// A cached hash is only served when it is complete; anything else falls
    /// through to the store and schedules a full write-back.
    pub async fn get(&self, user_id: i64) -> UserResult<UserRecord> {
        let key = user_key(user_id);

        match self.cache.read_all(&key).await {
            Ok(fields) => match codec::decode_record(&fields) {
                Ok(Some(mut record)) => {
                    debug!(user_id, "user cache hit");
                    record.is_online = self.online_flag(&key).await;
                    return Ok(record);
                }
                Ok(None) => debug!(user_id, "user cache miss or incomplete record"),
                Err(error) => warn!(user_id, %error, "discarding undecodable cached user"),
            },
            Err(error) => warn!(user_id, %error, "user cache read failed, using store"),
        }

        let gate = self.gate(user_id);
        let generation = gate.generation.load(Ordering::SeqCst);
        let mut record = self
            .store
            .find(user_id)
            .await?
            .ok_or(UserError::NotFound(user_id))?;

        self.schedule_repopulate(record.clone(), gate, generation);
        record.is_online = self.online_flag(&key).await;
        Ok(record)
    }

    /// Reads the store directly, for callers that must observe their own commit.
    pub async fn get_fresh(&self, user_id: i64) -> UserResult<UserRecord> {
        let mut record = self
            .store
            .find(user_id)
            .await?
            .ok_or(UserError::NotFound(user_id))?;
        record.is_online = self.online_flag(&user_key(user_id)).await;
        Ok(record)
    }

    /// Fetches several users, failing on the first unknown id.
    pub async fn get_many(&self, user_ids: &[i64]) -> UserResult<Vec<UserRecord>> {
        let mut records = Vec::with_capacity(user_ids.len());
        for &user_id in user_ids {
            records.push(self.get(user_id).await?);
        }
        Ok(records)
    }

    pub async fn exists(&self, user_id: i64) -> UserResult<bool> {
        if let Ok(fields) = self.cache.read_all(&user_key(user_id)).await {
            if codec::is_complete(&fields) {
                return Ok(true);
            }
        }
        Ok(self.store.exists(user_id).await?)
    }

    /// Persists a new user and writes the full record into the cache before returning.
    pub async fn create(&self, user: &NewUser) -> UserResult<UserRecord> {
        if user.name.trim().is_empty() || user.email.trim().is_empty() {
            return Err(UserError::InvalidInput("name and email are required".into()));
        }

        let record = self.store.create(user).await?;
        info!(user_id = record.id, "user created");

        let mut fields = codec::encode_record(&record)
            .map_err(|error| UserError::Upstream(error.to_string()))?;
        fields.extend(codec::online_fields(false));
        if let Err(error) = self
            .cache
            .write_with_ttl(&user_key(record.id), &fields, self.ttl)
            .await
        {
            warn!(user_id = record.id, %error, "failed to cache new user");
        }
        Ok(record)
    }

    /// Commits `update` to the store, then mirrors the changed fields into the cache in the background.
    ///
    /// Returns the `updated_at` stamp of the commit. Cache failures are logged only.
    pub async fn update(&self, user_id: i64, update: &UserUpdate) -> UserResult<String> {
        if update.is_empty() {
            return Err(UserError::InvalidInput("update carries no fields".into()));
        }

        let gate = self.gate(user_id);
        let (updated_at, generation) = {
            let _commit = gate.commits.lock().await;
            let updated_at = match self.store.update(user_id, update).await {
                Ok(stamp) => stamp,
                Err(DatabaseError::NotFound(_)) => return Err(UserError::NotFound(user_id)),
                Err(error) => return Err(error.into()),
            };
            (updated_at, gate.generation.fetch_add(1, Ordering::SeqCst) + 1)
        };
        info!(user_id, generation, "user updated");

        let cache = self.cache.clone();
        let key = user_key(user_id);
        let patch = codec::encode_update(update, &updated_at);
        let memberships_changed = update.join_department.is_some();

        self.writer.spawn("user-update-mirror", async move {
            let _writes = gate.writes.lock().await;
            if gate.generation.load(Ordering::SeqCst) != generation {
                // A later update raced this one; make the record incomplete so
                // the next read repopulates from the store.
                debug!(user_id, generation, "superseded mirror, invalidating cached user");
                return cache.remove_fields(&key, &REQUIRED_FIELDS).await;
            }

            cache.merge(&key, &patch).await?;
            if memberships_changed {
                cache.remove_fields(&key, &[DEPARTMENTS_FIELD]).await?;
            }
            Ok(())
        });

        Ok(updated_at)
    }

    /// Writes only the online flag, independent of the rest of the record.
    pub async fn set_online(&self, user_id: i64, online: bool) -> UserResult<()> {
        let gate = self.gate(user_id);
        let sequence = gate.presence.fetch_add(1, Ordering::SeqCst) + 1;
        write_presence(self.cache.as_ref(), &gate, user_id, online, sequence)
            .await
            .map_err(|error| UserError::Upstream(error.to_string()))
    }

    async fn online_flag(&self, key: &str) -> bool {
        match self.cache.read_field(key, ONLINE_FIELD).await {
            Ok(value) => codec::decode_bool(value.as_deref()),
            Err(error) => {
                debug!(%error, "online flag unavailable");
                false
            }
        }
    }

    fn schedule_repopulate(&self, record: UserRecord, gate: GateLease, generation: u64) {
        let cache = self.cache.clone();
        let ttl = self.ttl;

        self.writer.spawn("user-repopulate", async move {
            let _writes = gate.writes.lock().await;
            if gate.generation.load(Ordering::SeqCst) != generation {
                debug!(user_id = record.id, "skipping stale repopulation");
                return Ok(());
            }
            let fields = codec::encode_record(&record)?;
            cache.write_with_ttl(&user_key(record.id), &fields, ttl).await
        });
    }
}

async fn write_presence(
    cache: &dyn CacheStore,
    gate: &UserGate,
    user_id: i64,
    online: bool,
    sequence: u64,
) -> Result<(), CacheError> {
    let _writes = gate.writes.lock().await;
    if gate.presence.load(Ordering::SeqCst) != sequence {
        debug!(user_id, online, "skipping superseded presence write");
        return Ok(());
    }
    cache
        .merge(&user_key(user_id), &codec::online_fields(online))
        .await
}

impl PresenceSink for UserStateCache {
    fn presence_changed(&self, user_id: i64, online: bool) {
        let gate = self.gate(user_id);
        let sequence = gate.presence.fetch_add(1, Ordering::SeqCst) + 1;
        let cache = self.cache.clone();

        self.writer.spawn("user-presence", async move {
            write_presence(cache.as_ref(), &gate, user_id, online, sequence).await
        });
    }
}
