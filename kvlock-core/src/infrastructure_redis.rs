//! Redis-backed LockStore implementation.
//! This is the store shared by every server instance.
//!
//! Enable with the `redis` feature flag:
//! ```toml
//! kvlock-core = { path = "../kvlock-core", features = ["redis"] }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use redis::Script;
use redis::aio::ConnectionManager;

use crate::error::StoreError;
use crate::infrastructure::{CompareOutcome, LockStore};

// KEYS[1] = lock key, ARGV[1] = token
const COMPARE_AND_DELETE: &str = r#"
local current = redis.call('GET', KEYS[1])
if not current then
    return 0
end
if current == ARGV[1] then
    redis.call('DEL', KEYS[1])
    return 1
end
return -1
"#;

// KEYS[1] = lock key, ARGV[1] = token, ARGV[2] = ttl in milliseconds
const COMPARE_AND_EXPIRE: &str = r#"
local current = redis.call('GET', KEYS[1])
if not current then
    return 0
end
if current == ARGV[1] then
    redis.call('PEXPIRE', KEYS[1], ARGV[2])
    return 1
end
return -1
"#;

/// A [`LockStore`] on a single Redis instance.
///
/// Acquisition is `SET NX PX`; the token-checked operations run as Lua
/// scripts so the comparison and the mutation happen in one round-trip.
pub struct RedisLockStore {
    conn: ConnectionManager,
    compare_and_delete: Script,
    compare_and_expire: Script,
}

impl RedisLockStore {
    /// Connect to `url` (e.g. `redis://:password@127.0.0.1:6379/0`) and verify
    /// the connection with a `PING`.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        let store = Self::with_connection(conn);
        store.ping().await?;
        Ok(store)
    }

    pub fn with_connection(conn: ConnectionManager) -> Self {
        Self {
            conn,
            compare_and_delete: Script::new(COMPARE_AND_DELETE),
            compare_and_expire: Script::new(COMPARE_AND_EXPIRE),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let reply: String = redis::cmd("PING").query_async(&mut conn).await?;
        if reply != "PONG" {
            return Err(StoreError::Protocol(format!("PING answered {:?}", reply)));
        }
        Ok(())
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)
}

#[async_trait]
impl LockStore for RedisLockStore {
    async fn set_if_absent(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn compare_and_delete(
        &self,
        key: &str,
        token: &str,
    ) -> Result<CompareOutcome, StoreError> {
        let mut conn = self.conn.clone();
        let reply: i64 = self
            .compare_and_delete
            .key(key)
            .arg(token)
            .invoke_async(&mut conn)
            .await?;
        CompareOutcome::from_reply(reply)
    }

    async fn compare_and_expire(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<CompareOutcome, StoreError> {
        let mut conn = self.conn.clone();
        let reply: i64 = self
            .compare_and_expire
            .key(key)
            .arg(token)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await?;
        CompareOutcome::from_reply(reply)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let mut conn = self.conn.clone();
        let reply: i64 = redis::cmd("PTTL").arg(key).query_async(&mut conn).await?;
        match reply {
            -2 => Ok(None),
            -1 => Err(StoreError::Protocol(format!(
                "{} exists without an expiry",
                key
            ))),
            ms if ms >= 0 => Ok(Some(Duration::from_millis(ms as u64))),
            other => Err(StoreError::Protocol(format!("PTTL returned {}", other))),
        }
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
