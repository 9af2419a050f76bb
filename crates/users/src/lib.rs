//! # Link Users
//!
//! The User State Cache: low-latency profile reads that stay eventually
//! consistent with the relational store.
//!
//! - [`UserStateCache`] serves reads from a per-user hash when it is complete,
//!   otherwise from the store, repopulating in the background.
//! - Updates commit first and are mirrored into the cache afterwards.
//! - Online status is written on its own and never affects completeness.
//! - Cache backends implement [`CacheStore`]: [`RedisCacheStore`] in
//!   production, [`MemoryCacheStore`] when Redis is absent and in tests.

pub mod cache;
pub mod services;
pub mod store;
pub mod types;

pub use cache::{user_key, CacheFields, CacheStore, MemoryCacheStore, RedisCacheStore};
pub use services::{BackgroundWriter, UserStateCache};
pub use store::UserStore;
pub use types::{CacheError, UserError, UserResult};

pub use link_database::{NewUser, OrgRef, UserRecord, UserRole, UserUpdate};
