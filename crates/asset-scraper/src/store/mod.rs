//! Key-value cache backends.
//!
//! Values are opaque strings with a TTL in whole seconds. `ttl` follows
//! Redis: [`TTL_MISSING`] for an absent key and [`TTL_PERSISTENT`] for a key
//! without expiry.

pub mod memory;
pub mod redis;

pub use memory::MemoryStore;
pub use self::redis::RedisStore;

use async_trait::async_trait;

pub const TTL_MISSING: i64 = -2;
pub const TTL_PERSISTENT: i64 = -1;

/// URL that selects the in-process backend.
pub const MEMORY_URL: &str = "memory://";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),

    #[error("cache command failed: {0}")]
    Command(String),
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write `value` so that it expires after `ttl_secs`.
    async fn set_ex(&self, key: &str, ttl_secs: u64, value: &str) -> Result<(), StoreError>;

    /// Remaining lifetime in seconds.
    async fn ttl(&self, key: &str) -> Result<i64, StoreError>;

    /// Keys matching a glob pattern where `*` matches any run of characters.
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;
}
