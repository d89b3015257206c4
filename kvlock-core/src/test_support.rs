//! Store doubles shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::client::LockClient;
use crate::error::{RepositoryError, StoreError};
use crate::infrastructure::{CompareOutcome, LockStore};
use crate::infrastructure_in_memory::InMemoryLockStore;
use crate::repository::{UserRepository, UserTransaction};
use crate::types::{NewUser, User};

/// An in-memory store that counts acquisition probes.
#[derive(Default)]
pub struct CountingStore {
    inner: InMemoryLockStore,
    probes: AtomicUsize,
}

impl CountingStore {
    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LockStore for CountingStore {
    async fn set_if_absent(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.inner.set_if_absent(key, token, ttl).await
    }

    async fn compare_and_delete(
        &self,
        key: &str,
        token: &str,
    ) -> Result<CompareOutcome, StoreError> {
        self.inner.compare_and_delete(key, token).await
    }

    async fn compare_and_expire(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<CompareOutcome, StoreError> {
        self.inner.compare_and_expire(key, token, ttl).await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        self.inner.ttl(key).await
    }

    fn backend(&self) -> &'static str {
        "counting"
    }
}

/// An in-memory store whose deletes only reach the table after `delay`.
pub struct SlowReleaseStore {
    inner: InMemoryLockStore,
    delay: Duration,
}

#[async_trait]
impl LockStore for SlowReleaseStore {
    async fn set_if_absent(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.inner.set_if_absent(key, token, ttl).await
    }

    async fn compare_and_delete(
        &self,
        key: &str,
        token: &str,
    ) -> Result<CompareOutcome, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.compare_and_delete(key, token).await
    }

    async fn compare_and_expire(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<CompareOutcome, StoreError> {
        self.inner.compare_and_expire(key, token, ttl).await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        self.inner.ttl(key).await
    }

    fn backend(&self) -> &'static str {
        "slow-release"
    }
}

/// A store whose every call fails as if the network were down.
#[derive(Default)]
pub struct UnreachableStore {
    calls: AtomicUsize,
}

impl UnreachableStore {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self) -> Result<T, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}

#[async_trait]
impl LockStore for UnreachableStore {
    async fn set_if_absent(&self, _: &str, _: &str, _: Duration) -> Result<bool, StoreError> {
        self.fail()
    }

    async fn compare_and_delete(&self, _: &str, _: &str) -> Result<CompareOutcome, StoreError> {
        self.fail()
    }

    async fn compare_and_expire(
        &self,
        _: &str,
        _: &str,
        _: Duration,
    ) -> Result<CompareOutcome, StoreError> {
        self.fail()
    }

    async fn ttl(&self, _: &str) -> Result<Option<Duration>, StoreError> {
        self.fail()
    }

    fn backend(&self) -> &'static str {
        "unreachable"
    }
}

pub fn counting_client() -> (LockClient, Arc<CountingStore>) {
    let store = Arc::new(CountingStore::default());
    (LockClient::new(store.clone()), store)
}

pub fn unreachable_client() -> (LockClient, Arc<UnreachableStore>) {
    let store = Arc::new(UnreachableStore::default());
    (LockClient::new(store.clone()), store)
}

pub fn slow_release_client(delay: Duration) -> LockClient {
    LockClient::new(Arc::new(SlowReleaseStore {
        inner: InMemoryLockStore::new(),
        delay,
    }))
}

/// A user table without transaction isolation: each statement is atomic, but
/// a count and the insert after it can interleave with other transactions.
/// Counting stalls for `count_delay` to widen that window. Errors are never
/// rolled back.
pub struct UnisolatedUserRepository {
    users: Mutex<Vec<User>>,
    count_delay: Duration,
}

impl UnisolatedUserRepository {
    pub fn new(count_delay: Duration) -> Self {
        Self {
            users: Mutex::new(Vec::new()),
            count_delay,
        }
    }

    pub fn rows(&self) -> usize {
        self.users.lock().unwrap().len()
    }
}

struct UnisolatedTransaction<'a> {
    repo: &'a UnisolatedUserRepository,
}

impl UserTransaction for UnisolatedTransaction<'_> {
    fn count_live_by_username(&mut self, username: &str) -> Result<u64, RepositoryError> {
        let count = self
            .repo
            .users
            .lock()
            .unwrap()
            .iter()
            .filter(|u| !u.deleted && u.username == username)
            .count() as u64;
        std::thread::sleep(self.repo.count_delay);
        Ok(count)
    }

    fn find_live_by_id(&mut self, id: i64) -> Result<Option<User>, RepositoryError> {
        let users = self.repo.users.lock().unwrap();
        Ok(users.iter().find(|u| !u.deleted && u.id == id).cloned())
    }

    fn insert(&mut self, user: NewUser) -> Result<User, RepositoryError> {
        let mut users = self.repo.users.lock().unwrap();
        let row = User {
            id: users.len() as i64 + 1,
            username: user.username,
            password_hash: user.password_hash,
            nickname: user.nickname,
            deleted: false,
            created_at: user.created_at,
            updated_at: user.created_at,
        };
        users.push(row.clone());
        Ok(row)
    }

    fn update(&mut self, user: &User) -> Result<(), RepositoryError> {
        let mut users = self.repo.users.lock().unwrap();
        let row = users
            .iter_mut()
            .find(|u| u.id == user.id)
            .ok_or(RepositoryError::RowMissing { id: user.id })?;
        *row = user.clone();
        Ok(())
    }
}

impl UserRepository for UnisolatedUserRepository {
    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn UserTransaction) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        work(&mut UnisolatedTransaction { repo: self })
    }
}
