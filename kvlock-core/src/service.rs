//! User flows that mutate shared state under a distributed lock.
//!
//! Registration is create-if-absent keyed by username; profile updates are
//! read-modify-write keyed by user id. In both, the repository transaction
//! runs strictly between acquisition and release.

use std::future::Future;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::time::Instant;
use tracing::info;

use crate::client::LockClient;
use crate::config::LockConfig;
use crate::error::ServiceError;
use crate::guard::{with_lock_retry, with_lock_until};
use crate::repository::UserRepository;
use crate::types::{LockKey, NewUser, RegisterRequest, UpdateUserRequest, UserProfile};

const USERNAME_LEN: std::ops::RangeInclusive<usize> = 3..=50;
const PASSWORD_LEN: std::ops::RangeInclusive<usize> = 6..=50;
const NICKNAME_MAX: usize = 50;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

pub struct UserService<R: UserRepository> {
    locks: LockClient,
    repo: Arc<R>,
    config: LockConfig,
    hash_cost: u32,
}

impl<R: UserRepository> UserService<R> {
    pub fn new(locks: LockClient, repo: Arc<R>, config: LockConfig) -> Self {
        Self {
            locks,
            repo,
            config,
            hash_cost: bcrypt::DEFAULT_COST,
        }
    }

    /// Override the bcrypt cost. Tests use the minimum, 4.
    pub fn with_hash_cost(mut self, cost: u32) -> Self {
        self.hash_cost = cost;
        self
    }

    pub fn locks(&self) -> &LockClient {
        &self.locks
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repo
    }

    /// Create a user unless a live user with the same name exists.
    pub async fn register(&self, req: RegisterRequest) -> Result<UserProfile, ServiceError> {
        let username = req.username.trim().to_string();
        validate_username(&username)?;
        validate_password(&req.password)?;
        validate_nickname(&req.nickname)?;

        let key = LockKey::register(&username)?;
        let password_hash = self.hash_password(req.password).await?;
        let nickname = req.nickname;

        let user = self
            .guarded(&key, move || async move {
                self.repo.transaction(move |tx| {
                    if tx.count_live_by_username(&username)? > 0 {
                        return Err(ServiceError::UsernameTaken);
                    }
                    Ok(tx.insert(NewUser {
                        username,
                        password_hash,
                        nickname,
                        created_at: now_ms(),
                    })?)
                })
            })
            .await?;

        info!(user_id = user.id, "user registered");
        Ok(user.to_profile())
    }

    /// Apply `req` to user `id`. An empty request returns the current profile
    /// without writing.
    pub async fn update_user(
        &self,
        id: i64,
        req: UpdateUserRequest,
    ) -> Result<UserProfile, ServiceError> {
        if let Some(nickname) = &req.nickname {
            validate_nickname(nickname)?;
        }
        let unchanged = req.is_empty();
        let password_hash = match req.password {
            Some(password) => {
                validate_password(&password)?;
                Some(self.hash_password(password).await?)
            }
            None => None,
        };
        let nickname = req.nickname;

        let key = LockKey::update_user(id)?;
        let user = self
            .guarded(&key, move || async move {
                self.repo.transaction(move |tx| {
                    let mut user = tx
                        .find_live_by_id(id)?
                        .ok_or(ServiceError::UserNotFound)?;
                    if unchanged {
                        return Ok(user);
                    }
                    if let Some(nickname) = nickname {
                        user.nickname = nickname;
                    }
                    if let Some(hash) = password_hash {
                        user.password_hash = hash;
                    }
                    user.updated_at = now_ms();
                    tx.update(&user)?;
                    Ok(user)
                })
            })
            .await?;

        info!(user_id = user.id, "user updated");
        Ok(user.to_profile())
    }

    /// Unlocked read of a live user.
    pub fn get_user(&self, id: i64) -> Result<UserProfile, ServiceError> {
        self.repo
            .get_live(id)?
            .map(|user| user.to_profile())
            .ok_or(ServiceError::UserNotFound)
    }

    async fn guarded<F, Fut, T>(&self, key: &LockKey, critical_section: F) -> Result<T, ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let ttl = self.config.ttl();
        let policy = self.config.retry_policy();
        match self.config.deadline() {
            Some(budget) => {
                with_lock_until(
                    &self.locks,
                    key,
                    ttl,
                    &policy,
                    Instant::now() + budget,
                    critical_section,
                )
                .await
            }
            None => with_lock_retry(&self.locks, key, ttl, &policy, critical_section).await,
        }
    }

    async fn hash_password(&self, password: String) -> Result<String, ServiceError> {
        let cost = self.hash_cost;
        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| ServiceError::Internal(format!("password hashing task failed: {}", e)))?
            .map_err(ServiceError::from)
    }
}

fn validate_username(username: &str) -> Result<(), ServiceError> {
    let len = username.chars().count();
    if !USERNAME_LEN.contains(&len) {
        return Err(ServiceError::InvalidInput(format!(
            "username must be {} to {} characters",
            USERNAME_LEN.start(),
            USERNAME_LEN.end()
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(ServiceError::InvalidInput(
            "username may only contain letters, digits, '_', '-' and '.'".to_string(),
        ));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ServiceError> {
    let len = password.chars().count();
    if !PASSWORD_LEN.contains(&len) {
        return Err(ServiceError::InvalidInput(format!(
            "password must be {} to {} characters",
            PASSWORD_LEN.start(),
            PASSWORD_LEN.end()
        )));
    }
    Ok(())
}

fn validate_nickname(nickname: &str) -> Result<(), ServiceError> {
    if nickname.chars().count() > NICKNAME_MAX {
        return Err(ServiceError::InvalidInput(format!(
            "nickname must be at most {} characters",
            NICKNAME_MAX
        )));
    }
    Ok(())
}
