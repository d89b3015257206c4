use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::infrastructure::{CompareOutcome, LockStore};

struct Entry {
    token: String,
    expires_at: Instant,
}

/// A process-local [`LockStore`].
///
/// Gives the same atomicity as the shared store (every operation runs under
/// one mutex) but only excludes tasks within this process. Used for tests and
/// single-instance deployments. Expiry follows `tokio::time`, so paused-clock
/// tests can drive it.
pub struct InMemoryLockStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryLockStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> Result<MutexGuard<'_, HashMap<String, Entry>>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Unavailable("in-memory lock table poisoned".to_string()))
    }

    /// Drop every entry whose ttl has elapsed. Returns how many were removed.
    pub fn evict_expired(&self) -> Result<usize, StoreError> {
        let mut entries = self.entries()?;
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        Ok(before - entries.len())
    }

    /// Evict expired entries every `period` on the current runtime. Keys that
    /// are never touched again are otherwise kept forever. The task ends once
    /// the last handle to the store is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                match store.evict_expired() {
                    Ok(0) => {}
                    Ok(evicted) => debug!(evicted, "expired locks swept"),
                    Err(err) => {
                        warn!(error = %err, "lock sweep failed, stopping sweeper");
                        break;
                    }
                }
            }
        })
    }

    /// Number of keys currently held (expired entries excluded).
    pub fn held_count(&self) -> Result<usize, StoreError> {
        let now = Instant::now();
        Ok(self
            .entries()?
            .values()
            .filter(|entry| entry.expires_at > now)
            .count())
    }
}

impl Default for InMemoryLockStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Looks up `key`, treating an expired entry as absent and removing it.
fn live_entry<'a>(
    entries: &'a mut HashMap<String, Entry>,
    key: &str,
    now: Instant,
) -> Option<&'a mut Entry> {
    if entries.get(key).is_some_and(|entry| entry.expires_at <= now) {
        entries.remove(key);
    }
    entries.get_mut(key)
}

#[async_trait]
impl LockStore for InMemoryLockStore {
    async fn set_if_absent(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut entries = self.entries()?;
        let now = Instant::now();
        if live_entry(&mut entries, key, now).is_some() {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                token: token.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn compare_and_delete(
        &self,
        key: &str,
        token: &str,
    ) -> Result<CompareOutcome, StoreError> {
        let mut entries = self.entries()?;
        let outcome = match live_entry(&mut entries, key, Instant::now()) {
            None => CompareOutcome::Absent,
            Some(entry) if entry.token == token => CompareOutcome::Matched,
            Some(_) => CompareOutcome::HeldByOther,
        };
        if outcome == CompareOutcome::Matched {
            entries.remove(key);
        }
        Ok(outcome)
    }

    async fn compare_and_expire(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<CompareOutcome, StoreError> {
        let mut entries = self.entries()?;
        let now = Instant::now();
        Ok(match live_entry(&mut entries, key, now) {
            None => CompareOutcome::Absent,
            Some(entry) if entry.token == token => {
                entry.expires_at = now + ttl;
                CompareOutcome::Matched
            }
            Some(_) => CompareOutcome::HeldByOther,
        })
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let mut entries = self.entries()?;
        let now = Instant::now();
        Ok(live_entry(&mut entries, key, now).map(|entry| entry.expires_at - now))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
