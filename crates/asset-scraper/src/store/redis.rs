//! Redis backend.

use super::{CacheStore, StoreError};
use ::redis::aio::ConnectionManager;
use ::redis::{AsyncCommands, Client, RedisError};
use async_trait::async_trait;
use tracing::debug;

/// Cache store on a Redis server.
///
/// The connection manager reconnects on its own after a dropped connection.
/// Commands issued while the server is unreachable fail with
/// [`StoreError::Command`].
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url)
            .map_err(|e| StoreError::Unavailable(format!("invalid Redis URL {url}: {e}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::Unavailable(format!("failed to connect to Redis: {e}")))?;
        debug!("connected to Redis at {url}");
        Ok(Self { conn })
    }
}

fn command(name: &str) -> impl FnOnce(RedisError) -> StoreError + '_ {
    move |e| StoreError::Command(format!("Redis {name} failed: {e}"))
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(command("GET"))
    }

    async fn set_ex(&self, key: &str, ttl_secs: u64, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl_secs)
            .await
            .map_err(command("SETEX"))
    }

    async fn ttl(&self, key: &str) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        conn.ttl(key).await.map_err(command("TTL"))
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        conn.keys(pattern).await.map_err(command("KEYS"))
    }
}
