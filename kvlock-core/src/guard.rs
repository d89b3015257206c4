//! Scoped acquisition: a lock is released on every exit path of the work it
//! protects, including errors, panics and cancellation of the caller's future.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tokio::time::Instant;
use tracing::warn;

use crate::client::LockClient;
use crate::error::LockError;
use crate::retry::RetryPolicy;
use crate::types::{FencingToken, LockKey};

/// Proof of a successful acquisition.
///
/// Call [`release`](Self::release) when done. A guard dropped without being
/// released (early return, cancelled future) releases in a task spawned on
/// the current tokio runtime; outside a runtime the key is left to expire.
#[must_use = "dropping the guard releases the lock"]
pub struct LockGuard {
    client: LockClient,
    key: LockKey,
    token: FencingToken,
    released: bool,
}

impl LockGuard {
    pub(crate) fn new(client: LockClient, key: LockKey, token: FencingToken) -> Self {
        Self {
            client,
            key,
            token,
            released: false,
        }
    }

    pub fn key(&self) -> &LockKey {
        &self.key
    }

    pub fn token(&self) -> &FencingToken {
        &self.token
    }

    /// Extend the lock to `ttl` from now. Fails with
    /// [`LockError::NotHeld`] or [`LockError::Mismatch`] if the lock was
    /// already lost.
    pub async fn refresh(&self, ttl: Duration) -> Result<(), LockError> {
        self.client.refresh(&self.key, &self.token, ttl).await
    }

    pub async fn ttl(&self) -> Result<Duration, LockError> {
        self.client.ttl(&self.key).await
    }

    /// Release the lock. The guard is consumed whether or not the store still
    /// held our token. If this future is dropped before the store answers,
    /// the drop path releases instead.
    pub async fn release(mut self) -> Result<(), LockError> {
        let result = self.client.release(&self.key, &self.token).await;
        self.released = true;
        result
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let client = self.client.clone();
        let key = self.key.clone();
        let token = self.token.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = client.release(&key, &token).await {
                        warn!(key = %key, error = %err, "release of dropped lock guard failed");
                    }
                });
            }
            Err(_) => {
                warn!(key = %key, "lock guard dropped outside a runtime; lock will expire on its ttl");
            }
        }
    }
}

/// Run `critical_section` while holding `key`, probing once.
///
/// The critical section is invoked exactly once, and only if the lock was
/// acquired; otherwise the lock error is returned as `E`. Its result is
/// returned unchanged. A failed release afterwards is logged and does not
/// alter that result.
pub async fn with_lock<F, Fut, T, E>(
    client: &LockClient,
    key: &LockKey,
    ttl: Duration,
    critical_section: F,
) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<LockError>,
{
    let guard = client.lock(key, ttl).await?;
    run_guarded(guard, critical_section).await
}

/// [`with_lock`], acquiring under `policy`.
pub async fn with_lock_retry<F, Fut, T, E>(
    client: &LockClient,
    key: &LockKey,
    ttl: Duration,
    policy: &RetryPolicy,
    critical_section: F,
) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<LockError>,
{
    let guard = client.lock_with_retry(key, ttl, policy).await?;
    run_guarded(guard, critical_section).await
}

/// [`with_lock`], acquiring under `policy` but starting no probe after
/// `deadline`.
pub async fn with_lock_until<F, Fut, T, E>(
    client: &LockClient,
    key: &LockKey,
    ttl: Duration,
    policy: &RetryPolicy,
    deadline: Instant,
    critical_section: F,
) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<LockError>,
{
    let guard = client.lock_until(key, ttl, policy, deadline).await?;
    run_guarded(guard, critical_section).await
}

async fn run_guarded<F, Fut, T, E>(guard: LockGuard, critical_section: F) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let outcome = AssertUnwindSafe(async move { critical_section().await })
        .catch_unwind()
        .await;

    let key = guard.key().clone();
    if let Err(err) = guard.release().await {
        warn!(
            key = %key,
            error = %err,
            "lock lost before the critical section finished; its ttl is too short"
        );
    }

    match outcome {
        Ok(result) => result,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}
