//! The lock primitive: acquire, release, refresh and ttl over a pluggable
//! [`LockStore`]. Guards and the retry policy are layered on top of it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::error::LockError;
use crate::guard::LockGuard;
use crate::infrastructure::{CompareOutcome, LockStore};
use crate::infrastructure_in_memory::InMemoryLockStore;
use crate::retry::RetryPolicy;
use crate::types::{FencingToken, LockKey};

/// Handle to the lock service. Cloning is cheap; every clone talks to the
/// same store.
#[derive(Clone)]
pub struct LockClient {
    store: Arc<dyn LockStore>,
}

impl LockClient {
    /// Wrap an explicitly constructed store.
    pub fn new(store: Arc<dyn LockStore>) -> Self {
        Self { store }
    }

    /// A client over a fresh process-local store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryLockStore::new()))
    }

    /// A client over the Redis instance at `url`.
    #[cfg(feature = "redis")]
    pub async fn connect_redis(url: &str) -> Result<Self, LockError> {
        let store = crate::infrastructure_redis::RedisLockStore::connect(url).await?;
        Ok(Self::new(Arc::new(store)))
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    /// One atomic set-if-absent probe. Never waits.
    pub async fn acquire(&self, key: &LockKey, ttl: Duration) -> Result<FencingToken, LockError> {
        check_ttl(ttl)?;
        let token = FencingToken::generate();
        if self
            .store
            .set_if_absent(key.as_str(), token.as_str(), ttl)
            .await?
        {
            debug!(key = %key, ttl_ms = ttl.as_millis() as u64, "lock acquired");
            Ok(token)
        } else {
            Err(LockError::Contention {
                key: key.to_string(),
            })
        }
    }

    /// Delete the lock if and only if it still holds `token`.
    pub async fn release(&self, key: &LockKey, token: &FencingToken) -> Result<(), LockError> {
        let outcome = self
            .store
            .compare_and_delete(key.as_str(), token.as_str())
            .await?;
        ownership(key, outcome)?;
        debug!(key = %key, "lock released");
        Ok(())
    }

    /// Reset the lock's expiry to `ttl` if and only if it still holds `token`.
    pub async fn refresh(
        &self,
        key: &LockKey,
        token: &FencingToken,
        ttl: Duration,
    ) -> Result<(), LockError> {
        check_ttl(ttl)?;
        let outcome = self
            .store
            .compare_and_expire(key.as_str(), token.as_str(), ttl)
            .await?;
        ownership(key, outcome)?;
        debug!(key = %key, ttl_ms = ttl.as_millis() as u64, "lock refreshed");
        Ok(())
    }

    /// Remaining time before the lock self-expires. Advisory: the answer may
    /// be stale by the time it is read.
    pub async fn ttl(&self, key: &LockKey) -> Result<Duration, LockError> {
        self.store
            .ttl(key.as_str())
            .await?
            .ok_or_else(|| LockError::NotHeld {
                key: key.to_string(),
            })
    }

    /// Single probe, returning a guard that owns the token.
    pub async fn lock(&self, key: &LockKey, ttl: Duration) -> Result<LockGuard, LockError> {
        let token = self.acquire(key, ttl).await?;
        Ok(LockGuard::new(self.clone(), key.clone(), token))
    }

    /// Probe under `policy`, returning a guard that owns the token.
    pub async fn lock_with_retry(
        &self,
        key: &LockKey,
        ttl: Duration,
        policy: &RetryPolicy,
    ) -> Result<LockGuard, LockError> {
        let token = policy.acquire(self, key, ttl).await?;
        Ok(LockGuard::new(self.clone(), key.clone(), token))
    }

    /// Probe under `policy` until `deadline`, returning a guard that owns the
    /// token.
    pub async fn lock_until(
        &self,
        key: &LockKey,
        ttl: Duration,
        policy: &RetryPolicy,
        deadline: Instant,
    ) -> Result<LockGuard, LockError> {
        let token = policy.acquire_until(self, key, ttl, deadline).await?;
        Ok(LockGuard::new(self.clone(), key.clone(), token))
    }
}

impl fmt::Debug for LockClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockClient")
            .field("backend", &self.store.backend())
            .finish()
    }
}

fn check_ttl(ttl: Duration) -> Result<(), LockError> {
    if ttl < Duration::from_millis(1) {
        return Err(LockError::InvalidTtl { ttl });
    }
    Ok(())
}

fn ownership(key: &LockKey, outcome: CompareOutcome) -> Result<(), LockError> {
    match outcome {
        CompareOutcome::Matched => Ok(()),
        CompareOutcome::Absent => Err(LockError::NotHeld {
            key: key.to_string(),
        }),
        CompareOutcome::HeldByOther => Err(LockError::Mismatch {
            key: key.to_string(),
        }),
    }
}
