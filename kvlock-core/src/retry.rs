use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::client::LockClient;
use crate::error::LockError;
use crate::types::{FencingToken, LockKey};

/// Bounded fixed-delay retry around [`LockClient::acquire`].
///
/// The delay between probes is constant, not exponential. Waiters are not
/// queued: whoever probes first after a release wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// `max_attempts` is the total number of probes, clamped to at least one.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// One probe, no waiting.
    pub fn single_attempt() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Upper bound on the time spent sleeping between probes.
    pub fn max_wait(&self) -> Duration {
        self.delay * (self.max_attempts - 1)
    }

    /// Probe up to `max_attempts` times, sleeping `delay` after each
    /// contended probe except the last.
    ///
    /// Store failures abort immediately; only [`LockError::Contention`] is
    /// retried.
    pub async fn acquire(
        &self,
        client: &LockClient,
        key: &LockKey,
        ttl: Duration,
    ) -> Result<FencingToken, LockError> {
        self.run(client, key, ttl, None).await
    }

    /// Like [`acquire`](Self::acquire) but gives up with
    /// [`LockError::Timeout`] once `deadline` has passed. A probe already in
    /// flight is never abandoned, so a lock won at the last moment is still
    /// handed back to the caller.
    pub async fn acquire_until(
        &self,
        client: &LockClient,
        key: &LockKey,
        ttl: Duration,
        deadline: Instant,
    ) -> Result<FencingToken, LockError> {
        self.run(client, key, ttl, Some(deadline)).await
    }

    async fn run(
        &self,
        client: &LockClient,
        key: &LockKey,
        ttl: Duration,
        deadline: Option<Instant>,
    ) -> Result<FencingToken, LockError> {
        let mut attempts = 0;
        loop {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(LockError::Timeout {
                    key: key.to_string(),
                    attempts,
                });
            }

            attempts += 1;
            match client.acquire(key, ttl).await {
                Err(LockError::Contention { .. }) if attempts < self.max_attempts => {
                    let pause = match deadline {
                        Some(d) => self.delay.min(d.saturating_duration_since(Instant::now())),
                        None => self.delay,
                    };
                    debug!(
                        key = %key,
                        attempt = attempts,
                        max_attempts = self.max_attempts,
                        "lock contended, retrying"
                    );
                    sleep(pause).await;
                }
                other => return other,
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::single_attempt()
    }
}
